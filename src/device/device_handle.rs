// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use crate::error::Result;
use crate::error::RtlsdrError::RtlsdrErr;
use log::info;
use rusb::{Context, UsbContext};

use super::{INTERFACE_ID, KNOWN_DEVICES};

#[derive(Debug)]
pub struct DeviceHandle {
    handle: rusb::DeviceHandle<Context>,
}

impl DeviceHandle {
    /// Open the `index`-th recognised device and claim its interface.
    pub fn open(index: usize) -> Result<Self> {
        let mut context = Context::new()?;
        let handle = DeviceHandle::open_device(&mut context, index)?;
        handle.claim_interface(INTERFACE_ID)?;
        Ok(DeviceHandle { handle })
    }

    fn open_device<T: UsbContext>(
        context: &mut T,
        index: usize,
    ) -> Result<rusb::DeviceHandle<T>> {
        let devices = context
            .devices()
            .map_err(|e| RtlsdrErr(format!("Failed to get devices: {:?}", e)))?;

        let mut device_count = 0;
        for found in devices.iter() {
            let device_desc = match found.device_descriptor() {
                Ok(desc) => desc,
                Err(_) => continue,
            };
            for dev in KNOWN_DEVICES.iter() {
                if device_desc.vendor_id() == dev.vid && device_desc.product_id() == dev.pid {
                    if device_count == index {
                        info!("Opening device at index {}", index);
                        return found
                            .open()
                            .map_err(|e| RtlsdrErr(format!("Failed to open device: {:?}", e)));
                    }
                    device_count += 1;
                }
            }
        }
        Err(RtlsdrErr(format!("No device found at index {}", index)))
    }

    pub fn get_usb_strings(&self) -> Result<(Option<String>, Option<String>, Option<String>)> {
        let device = self.handle.device();
        let desc = device.device_descriptor()?;
        Ok((
            self.handle.read_manufacturer_string_ascii(&desc).ok(),
            self.handle.read_product_string_ascii(&desc).ok(),
            self.handle.read_serial_number_string_ascii(&desc).ok(),
        ))
    }

    pub fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        Ok(self
            .handle
            .read_control(request_type, request, value, index, buf, timeout)?)
    }

    pub fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize> {
        Ok(self
            .handle
            .write_control(request_type, request, value, index, buf, timeout)?)
    }

    pub fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        Ok(self.handle.read_bulk(endpoint, buf, timeout)?)
    }
}

pub mod constants;
pub use constants::*;
pub mod device_handle;
#[cfg(test)]
mod mock_device_handle;

#[cfg(not(test))]
use device_handle::DeviceHandle;
#[cfg(test)]
use mock_device_handle::MockDeviceHandle as DeviceHandle;

use crate::error::Result;
use byteorder::{ByteOrder, LittleEndian};
/// Low-level io functions for interfacing with rusb(libusb)
use log::{error, warn};
use rusb::{Context, UsbContext};

#[cfg(test)]
mod device_test;

/// One recognised RTL2832U device, in enumeration order. `index` is the
/// value accepted by [`Device::new`].
#[derive(Debug, Clone, Default)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
}

/// Enumerate all recognised devices with their USB string descriptors.
/// Devices that cannot be opened for string reads keep their slot (so
/// indexes stay aligned with [`Device::new`]) with empty strings.
pub fn list_devices() -> Result<Vec<DeviceDescriptor>> {
    let context = Context::new()?;
    let mut found: Vec<DeviceDescriptor> = Vec::new();
    for device in context.devices()?.iter() {
        let desc = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };
        if !KNOWN_DEVICES
            .iter()
            .any(|sig| sig.vid == desc.vendor_id() && sig.pid == desc.product_id())
        {
            continue;
        }
        let index = found.len();
        let mut descriptor = DeviceDescriptor {
            index,
            ..DeviceDescriptor::default()
        };
        match device.open() {
            Ok(handle) => {
                descriptor.manufacturer =
                    handle.read_manufacturer_string_ascii(&desc).unwrap_or_default();
                descriptor.product = handle.read_product_string_ascii(&desc).unwrap_or_default();
                descriptor.serial =
                    handle.read_serial_number_string_ascii(&desc).unwrap_or_default();
            }
            Err(e) => {
                warn!(
                    "Failed to open device {:04x}:{:04x} to read its strings: {}",
                    desc.vendor_id(),
                    desc.product_id(),
                    e
                );
            }
        }
        found.push(descriptor);
    }
    Ok(found)
}

#[derive(Debug)]
pub struct Device {
    handle: DeviceHandle,
}

impl Device {
    pub fn new(index: usize) -> Result<Device> {
        Ok(Device {
            handle: DeviceHandle::open(index)?,
        })
    }

    pub fn usb_strings(&self) -> Result<(Option<String>, Option<String>, Option<String>)> {
        self.handle.get_usb_strings()
    }

    pub fn test_write(&self) -> Result<()> {
        // try a dummy write to confirm the device accepts control transfers
        let len: usize = self.write_reg(BLOCK_USB, USB_SYSCTL, 0x09, 1)?;
        if len == 0 {
            warn!("Dummy write failed, device may be in a bad state");
        }
        Ok(())
    }

    pub fn reset_demod(&self) -> Result<()> {
        self.demod_write_reg(1, 0x01, 0x14, 1)?;
        self.demod_write_reg(1, 0x01, 0x10, 1)?;
        Ok(())
    }

    /// Only supports len of 1 or 2
    pub fn read_reg(&self, block: u16, addr: u16, len: usize) -> Result<u16> {
        assert!(len == 1 || len == 2);
        let mut data: [u8; 2] = [0, 0];
        let index: u16 = block << 8;
        self.handle
            .read_control(CTRL_IN, 0, addr, index, &mut data[..len], CTRL_TIMEOUT)?;
        // Read registers as little endian, but write as big; not sure why
        Ok(LittleEndian::read_u16(&data))
    }

    pub fn write_reg(&self, block: u16, addr: u16, val: u16, len: usize) -> Result<usize> {
        assert!(len == 1 || len == 2);
        // Read registers as little endian, but write as big; not sure why
        let data: [u8; 2] = val.to_be_bytes();
        let data_slice = if len == 1 { &data[1..2] } else { &data };
        let index = (block << 8) | 0x10;
        Ok(self
            .handle
            .write_control(CTRL_OUT, 0, addr, index, data_slice, CTRL_TIMEOUT)?)
    }

    /// Only supports u8 reads
    pub fn demod_read_reg(&self, page: u16, addr: u16) -> Result<u16> {
        let mut data = [0_u8];
        let index = page;
        match self.handle.read_control(
            CTRL_IN,
            0,
            (addr << 8) | 0x20,
            index,
            &mut data,
            CTRL_TIMEOUT,
        ) {
            Ok(n) => Ok(n),
            Err(e) => {
                error!(
                    "demod_read_reg failed: {} page: {:#02x} addr: {:#02x}",
                    e, page, addr
                );
                Err(e)
            }
        }?;
        Ok(data[0] as u16)
    }

    /// Only supports len of 1 or 2
    pub fn demod_write_reg(&self, page: u16, mut addr: u16, val: u16, len: usize) -> Result<usize> {
        assert!(len == 1 || len == 2);
        let index = 0x10 | page;
        addr = (addr << 8) | 0x20;
        let data: [u8; 2] = val.to_be_bytes();
        let data_slice = if len == 1 { &data[1..2] } else { &data };

        let bytes =
            match self
                .handle
                .write_control(CTRL_OUT, 0, addr, index, data_slice, CTRL_TIMEOUT)
            {
                Ok(n) => n,
                Err(e) => {
                    error!(
                        "demod_write_reg failed: {} page: {:#02x} addr: {:#02x} val: {:#02x}",
                        e, page, addr, val
                    );
                    0
                }
            };

        self.demod_read_reg(0x0a, 0x1)?;

        Ok(bytes)
    }

    /// Blocking read on the bulk IQ data endpoint.
    pub fn bulk_transfer(&self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.handle.read_bulk(EP_DATA, buf, BULK_TIMEOUT)?)
    }

    pub fn i2c_read_reg(&self, i2c_addr: u8, reg: u8) -> Result<u8> {
        let addr: u16 = i2c_addr.into();
        let reg: [u8; 1] = [reg];
        let mut data: [u8; 1] = [0];

        match self.write_array(BLOCK_IIC, addr, &reg, 1) {
            Ok(_res) => {
                self.read_array(BLOCK_IIC, addr, &mut data, 1)?;
                Ok(data[0])
            }
            Err(e) => Err(e),
        }
    }

    pub fn i2c_write(&self, i2c_addr: u16, buffer: &[u8]) -> Result<usize> {
        Ok(self.write_array(BLOCK_IIC, i2c_addr, buffer, buffer.len())?)
    }

    pub fn i2c_read(&self, i2c_addr: u16, buffer: &mut [u8], len: u8) -> Result<usize> {
        self.read_array(BLOCK_IIC, i2c_addr, buffer, len)
    }

    pub fn read_array(&self, block: u16, addr: u16, arr: &mut [u8], _len: u8) -> Result<usize> {
        let index: u16 = block << 8;
        Ok(self
            .handle
            .read_control(CTRL_IN, 0, addr, index, arr, CTRL_TIMEOUT)?)
    }

    pub fn write_array(&self, block: u16, addr: u16, arr: &[u8], len: usize) -> Result<usize> {
        let index: u16 = (block << 8) | 0x10;
        Ok(self
            .handle
            .write_control(CTRL_OUT, 0, addr, index, &arr[..len], CTRL_TIMEOUT)?)
    }
}

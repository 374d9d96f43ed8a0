#![allow(dead_code)]

use std::time::Duration;

pub struct UsbDeviceSignature {
    pub vid: u16,
    pub pid: u16,
    pub description: &'static str,
}

// The signatures seen in RTL2832U receiver banks; KerberosSDR units
// enumerate as the generic OEM dongle.
pub const KNOWN_DEVICES: &'static [UsbDeviceSignature] = &[
    UsbDeviceSignature {
        vid: 0x0bda,
        pid: 0x2832,
        description: "Generic RTL2832U",
    },
    UsbDeviceSignature {
        vid: 0x0bda,
        pid: 0x2838,
        description: "Generic RTL2832U OEM",
    },
    UsbDeviceSignature {
        vid: 0x0413,
        pid: 0x6680,
        description: "DigitalNow Quad DVB-T PCI-E card",
    },
    UsbDeviceSignature {
        vid: 0x1f4d,
        pid: 0xb803,
        description: "GTek T803",
    },
];

pub const INTERFACE_ID: u8 = 0;

// Blocks
pub const BLOCK_DEMOD: u16 = 0;
pub const BLOCK_USB: u16 = 1;
pub const BLOCK_SYS: u16 = 2;
pub const BLOCK_IIC: u16 = 6;

// Sys Registers
pub const DEMOD_CTL: u16 = 0x3000;
pub const GPO: u16 = 0x3001;
pub const GPI: u16 = 0x3002;
pub const GPOE: u16 = 0x3003;
pub const GPD: u16 = 0x3004;
pub const DEMOD_CTL_1: u16 = 0x300b;

// USB Registers
pub const USB_SYSCTL: u16 = 0x2000;
pub const USB_EPA_CTL: u16 = 0x2148;
pub const USB_EPA_MAXPKT: u16 = 0x2158;

// Bulk data endpoint
pub const EP_DATA: u8 = 0x81;

pub const CTRL_IN: u8 =
    rusb::constants::LIBUSB_ENDPOINT_IN | rusb::constants::LIBUSB_REQUEST_TYPE_VENDOR;
pub const CTRL_OUT: u8 =
    rusb::constants::LIBUSB_ENDPOINT_OUT | rusb::constants::LIBUSB_REQUEST_TYPE_VENDOR;
pub const CTRL_TIMEOUT: Duration = Duration::from_millis(300);

// Finite so a cancelled reader thread re-checks its cancel flag instead of
// parking in the kernel forever.
pub const BULK_TIMEOUT: Duration = Duration::from_secs(1);

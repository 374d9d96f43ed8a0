// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use mockall::predicate::{self, eq};

use crate::device::mock_device_handle::MockDeviceHandle;
use crate::device::Device;

use super::{BLOCK_SYS, BULK_TIMEOUT, CTRL_IN, CTRL_OUT, CTRL_TIMEOUT, EP_DATA, GPO};

#[test]
fn test_read_reg_u8() {
    let block = BLOCK_SYS;
    let index_expected = BLOCK_SYS << 8;
    let addr = GPO;
    let data_expected = 0x12_u16;

    let mut mock_handle = MockDeviceHandle::new();
    mock_handle
        .expect_read_control()
        .times(1)
        .with(
            eq(CTRL_IN),
            eq(0),
            eq(addr),
            eq(index_expected),
            predicate::always(),
            eq(CTRL_TIMEOUT),
        )
        .returning(move |_, _, _, _, data, _| {
            assert!(data.len() == 1);
            data[0] = data_expected as u8;
            Ok(1)
        });
    let device = Device {
        handle: mock_handle,
    };
    let result = device.read_reg(block, addr, 1).unwrap();
    assert_eq!(data_expected, result);
}

#[test]
fn test_read_reg_u16() {
    let block = BLOCK_SYS;
    let index_expected = BLOCK_SYS << 8;
    let addr = GPO;
    // Bytes are read as little-endian
    let data_expected = u16::to_le_bytes(0x123);

    let mut mock_handle = MockDeviceHandle::new();
    mock_handle
        .expect_read_control()
        .times(1)
        .with(
            eq(CTRL_IN),
            eq(0),
            eq(addr),
            eq(index_expected),
            predicate::always(),
            eq(CTRL_TIMEOUT),
        )
        .returning(move |_, _, _, _, data, _| {
            data[0] = data_expected[0];
            data[1] = data_expected[1];
            Ok(2)
        });
    let device = Device {
        handle: mock_handle,
    };
    let result = device.read_reg(block, addr, 2).unwrap();
    assert_eq!(u16::from_le_bytes(data_expected), result);
}

#[test]
fn test_write_reg_u8() {
    let block = BLOCK_SYS;
    let index_expected = (BLOCK_SYS << 8) | 0x10;
    let addr = GPO;
    let data_expected = 0xef_u16;

    let mut mock_handle = MockDeviceHandle::new();
    mock_handle
        .expect_write_control()
        .times(1)
        .with(
            eq(CTRL_OUT),
            eq(0),
            eq(addr),
            eq(index_expected),
            predicate::always(),
            eq(CTRL_TIMEOUT),
        )
        .returning(move |_, _, _, _, data, _| {
            assert!(data.len() == 1);
            assert_eq!(data[0], data_expected as u8);
            Ok(1)
        });
    let device = Device {
        handle: mock_handle,
    };
    let result = device.write_reg(block, addr, data_expected, 1).unwrap();
    assert_eq!(1, result);
}

#[test]
fn test_write_reg_u16() {
    let block = BLOCK_SYS;
    let index_expected = (BLOCK_SYS << 8) | 0x10;
    let addr = GPO;
    let data_expected = 0xefab_u16;

    let mut mock_handle = MockDeviceHandle::new();
    mock_handle
        .expect_write_control()
        .times(1)
        .with(
            eq(CTRL_OUT),
            eq(0),
            eq(addr),
            eq(index_expected),
            predicate::always(),
            eq(CTRL_TIMEOUT),
        )
        .returning(move |_, _, _, _, data, _| {
            assert!(data.len() == 2);
            assert_eq!(data, data_expected.to_be_bytes());
            Ok(1)
        });
    let device = Device {
        handle: mock_handle,
    };
    let result = device.write_reg(block, addr, data_expected, 2).unwrap();
    assert_eq!(1, result);
}

#[test]
fn test_demod_read_reg() {
    let page = 0xa_u16;
    let addr = 0x1_u16;
    let value = 0x12;

    let mut mock_handle = MockDeviceHandle::new();
    mock_handle
        .expect_read_control()
        .times(1)
        .with(
            eq(CTRL_IN),
            eq(0),
            eq((addr << 8) | 0x20),
            eq(page),
            predicate::always(),
            eq(CTRL_TIMEOUT),
        )
        .returning(move |_, _, _, _, data, _| {
            data[0] = value;
            Ok(2)
        });
    let device = Device {
        handle: mock_handle,
    };
    let result = device.demod_read_reg(page, addr).unwrap();
    assert_eq!(value as u16, result);
}

#[test]
fn test_demod_write_reg_confirms_with_status_read() {
    let page = 1_u16;
    let addr = 0x01_u16;
    let value = 0x14_u16;

    let mut mock_handle = MockDeviceHandle::new();
    mock_handle
        .expect_write_control()
        .times(1)
        .with(
            eq(CTRL_OUT),
            eq(0),
            eq((addr << 8) | 0x20),
            eq(0x10 | page),
            predicate::always(),
            eq(CTRL_TIMEOUT),
        )
        .returning(move |_, _, _, _, data, _| {
            assert_eq!(data, [value as u8]);
            Ok(1)
        });
    // Every demod write is followed by a status read of page 0x0a reg 0x01
    mock_handle
        .expect_read_control()
        .times(1)
        .with(
            eq(CTRL_IN),
            eq(0),
            eq((0x1_u16 << 8) | 0x20),
            eq(0x0a_u16),
            predicate::always(),
            eq(CTRL_TIMEOUT),
        )
        .returning(|_, _, _, _, data, _| {
            data[0] = 0;
            Ok(1)
        });
    let device = Device {
        handle: mock_handle,
    };
    let result = device.demod_write_reg(page, addr, value, 1).unwrap();
    assert_eq!(1, result);
}

#[test]
fn test_i2c_read_reg() {
    let i2c_addr = 0x34_u8;
    let reg = 0x00_u8;
    let reg_value = 0x69_u8;

    let mut mock_handle = MockDeviceHandle::new();
    mock_handle
        .expect_write_control()
        .times(1)
        .returning(move |_, _, _, _, data, _| {
            assert_eq!(data, [reg]);
            Ok(1)
        });
    mock_handle
        .expect_read_control()
        .times(1)
        .returning(move |_, _, _, _, data, _| {
            data[0] = reg_value;
            Ok(1)
        });
    let device = Device {
        handle: mock_handle,
    };
    let result = device.i2c_read_reg(i2c_addr, reg).unwrap();
    assert_eq!(reg_value, result);
}

#[test]
fn test_bulk_transfer_uses_the_data_endpoint() {
    let mut mock_handle = MockDeviceHandle::new();
    mock_handle
        .expect_read_bulk()
        .times(1)
        .with(eq(EP_DATA), predicate::always(), eq(BULK_TIMEOUT))
        .returning(|_, buf, _| {
            buf.fill(0x80);
            Ok(buf.len())
        });
    let device = Device {
        handle: mock_handle,
    };
    let mut buf = [0u8; 32];
    let n = device.bulk_transfer(&mut buf).unwrap();
    assert_eq!(n, 32);
    assert!(buf.iter().all(|&b| b == 0x80));
}

#[test]
fn test_usb_strings_delegates_to_handle() {
    let mut mock_handle = MockDeviceHandle::new();
    mock_handle
        .expect_get_usb_strings()
        .returning(|| Ok((Some("Realtek".to_string()), Some("RTL2838UHIDIR".to_string()), Some("1000".to_string()))));

    let device = Device {
        handle: mock_handle,
    };

    let (manufact, product, serial) = device.usb_strings().unwrap();
    assert_eq!(manufact.as_deref(), Some("Realtek"));
    assert_eq!(product.as_deref(), Some("RTL2838UHIDIR"));
    assert_eq!(serial.as_deref(), Some("1000"));
}

//! Fixed-layout binary header prepended to every emitted frame.
//!
//! The header occupies [`HEADER_SIZE`] bytes on the wire: the fields below
//! in order, little-endian, followed by zeroed reserved words. `if_gains`
//! is a fixed 32-entry table with zeros above `active_ant_chs`.

use crate::error::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

pub const SYNC_WORD: u32 = 0x2bf7_b95a;
pub const HEADER_VERSION: u32 = 7;
pub const HEADER_SIZE: usize = 1024;
pub const MAX_CHANNELS: usize = 32;
const HARDWARE_ID_LEN: usize = 16;
const RESERVED_WORDS: usize = 195;

pub const FRAME_TYPE_DATA: u32 = 0;
pub const FRAME_TYPE_DUMMY: u32 = 1;
pub const FRAME_TYPE_RAMP: u32 = 2;
pub const FRAME_TYPE_CAL: u32 = 3;
pub const FRAME_TYPE_TRIGW: u32 = 4;

pub const DATA_TYPE_DUMMY: u32 = 0;
pub const DATA_TYPE_REAL: u32 = 1;
pub const DATA_TYPE_IQ: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IqHeader {
    pub sync_word: u32,
    pub header_version: u32,
    pub hardware_id: [u8; HARDWARE_ID_LEN],
    pub unit_id: u32,
    pub active_ant_chs: u32,
    pub ioo_type: u32,
    pub rf_center_freq: u64,
    pub adc_sampling_freq: u64,
    pub sampling_freq: u64,
    pub cpi_length: u32,
    pub time_stamp: u64,
    pub daq_block_index: u32,
    pub cpi_index: u32,
    pub ext_integration_cntr: u32,
    pub frame_type: u32,
    pub data_type: u32,
    pub sample_bit_depth: u32,
    pub adc_overdrive_flags: u32,
    pub if_gains: [u32; MAX_CHANNELS],
    pub delay_sync_flag: u32,
    pub iq_sync_flag: u32,
    pub sync_state: u32,
    pub noise_source_state: u32,
}

impl Default for IqHeader {
    fn default() -> Self {
        IqHeader::new()
    }
}

impl IqHeader {
    pub fn new() -> IqHeader {
        IqHeader {
            sync_word: SYNC_WORD,
            header_version: HEADER_VERSION,
            hardware_id: [0; HARDWARE_ID_LEN],
            unit_id: 0,
            active_ant_chs: 0,
            ioo_type: 0,
            rf_center_freq: 0,
            adc_sampling_freq: 0,
            sampling_freq: 0,
            cpi_length: 0,
            time_stamp: 0,
            daq_block_index: 0,
            cpi_index: 0,
            ext_integration_cntr: 0,
            frame_type: FRAME_TYPE_DATA,
            data_type: DATA_TYPE_IQ,
            sample_bit_depth: 0,
            adc_overdrive_flags: 0,
            if_gains: [0; MAX_CHANNELS],
            delay_sync_flag: 0,
            iq_sync_flag: 0,
            sync_state: 0,
            noise_source_state: 0,
        }
    }

    /// Copy `name` into the fixed-width ASCII id field, NUL padded,
    /// truncating if needed.
    pub fn set_hardware_id(&mut self, name: &str) {
        self.hardware_id = [0; HARDWARE_ID_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(HARDWARE_ID_LEN);
        self.hardware_id[..len].copy_from_slice(&bytes[..len]);
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_u32::<LittleEndian>(self.sync_word)?;
        out.write_u32::<LittleEndian>(self.header_version)?;
        out.write_all(&self.hardware_id)?;
        out.write_u32::<LittleEndian>(self.unit_id)?;
        out.write_u32::<LittleEndian>(self.active_ant_chs)?;
        out.write_u32::<LittleEndian>(self.ioo_type)?;
        out.write_u64::<LittleEndian>(self.rf_center_freq)?;
        out.write_u64::<LittleEndian>(self.adc_sampling_freq)?;
        out.write_u64::<LittleEndian>(self.sampling_freq)?;
        out.write_u32::<LittleEndian>(self.cpi_length)?;
        out.write_u64::<LittleEndian>(self.time_stamp)?;
        out.write_u32::<LittleEndian>(self.daq_block_index)?;
        out.write_u32::<LittleEndian>(self.cpi_index)?;
        out.write_u32::<LittleEndian>(self.ext_integration_cntr)?;
        out.write_u32::<LittleEndian>(self.frame_type)?;
        out.write_u32::<LittleEndian>(self.data_type)?;
        out.write_u32::<LittleEndian>(self.sample_bit_depth)?;
        out.write_u32::<LittleEndian>(self.adc_overdrive_flags)?;
        for gain in self.if_gains.iter() {
            out.write_u32::<LittleEndian>(*gain)?;
        }
        out.write_u32::<LittleEndian>(self.delay_sync_flag)?;
        out.write_u32::<LittleEndian>(self.iq_sync_flag)?;
        out.write_u32::<LittleEndian>(self.sync_state)?;
        out.write_u32::<LittleEndian>(self.noise_source_state)?;
        out.write_all(&[0u8; RESERVED_WORDS * 4])?;
        Ok(())
    }

    pub fn read_from<R: Read>(input: &mut R) -> Result<IqHeader> {
        let mut header = IqHeader::new();
        header.sync_word = input.read_u32::<LittleEndian>()?;
        header.header_version = input.read_u32::<LittleEndian>()?;
        input.read_exact(&mut header.hardware_id)?;
        header.unit_id = input.read_u32::<LittleEndian>()?;
        header.active_ant_chs = input.read_u32::<LittleEndian>()?;
        header.ioo_type = input.read_u32::<LittleEndian>()?;
        header.rf_center_freq = input.read_u64::<LittleEndian>()?;
        header.adc_sampling_freq = input.read_u64::<LittleEndian>()?;
        header.sampling_freq = input.read_u64::<LittleEndian>()?;
        header.cpi_length = input.read_u32::<LittleEndian>()?;
        header.time_stamp = input.read_u64::<LittleEndian>()?;
        header.daq_block_index = input.read_u32::<LittleEndian>()?;
        header.cpi_index = input.read_u32::<LittleEndian>()?;
        header.ext_integration_cntr = input.read_u32::<LittleEndian>()?;
        header.frame_type = input.read_u32::<LittleEndian>()?;
        header.data_type = input.read_u32::<LittleEndian>()?;
        header.sample_bit_depth = input.read_u32::<LittleEndian>()?;
        header.adc_overdrive_flags = input.read_u32::<LittleEndian>()?;
        for gain in header.if_gains.iter_mut() {
            *gain = input.read_u32::<LittleEndian>()?;
        }
        header.delay_sync_flag = input.read_u32::<LittleEndian>()?;
        header.iq_sync_flag = input.read_u32::<LittleEndian>()?;
        header.sync_state = input.read_u32::<LittleEndian>()?;
        header.noise_source_state = input.read_u32::<LittleEndian>()?;
        let mut reserved = [0u8; RESERVED_WORDS * 4];
        input.read_exact(&mut reserved)?;
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ByteOrder;
    use std::io::Cursor;

    fn sample_header() -> IqHeader {
        let mut header = IqHeader::new();
        header.set_hardware_id("kerberos");
        header.unit_id = 1;
        header.active_ant_chs = 4;
        header.rf_center_freq = 140_000_000;
        header.adc_sampling_freq = 2_400_000;
        header.sampling_freq = 2_400_000;
        header.cpi_length = 131072;
        header.time_stamp = 1_600_000_000;
        header.daq_block_index = 42;
        header.frame_type = FRAME_TYPE_CAL;
        header.data_type = DATA_TYPE_REAL;
        header.sample_bit_depth = 8;
        header.adc_overdrive_flags = 0b0101;
        for ch in 0..4 {
            header.if_gains[ch] = 100 + ch as u32;
        }
        header.noise_source_state = 1;
        header
    }

    #[test]
    fn serialises_to_fixed_size() {
        let mut bytes = Vec::new();
        sample_header().write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
    }

    #[test]
    fn sync_word_leads_the_frame() {
        let mut bytes = Vec::new();
        sample_header().write_to(&mut bytes).unwrap();
        assert_eq!(LittleEndian::read_u32(&bytes[0..4]), SYNC_WORD);
        assert_eq!(LittleEndian::read_u32(&bytes[4..8]), HEADER_VERSION);
    }

    #[test]
    fn reference_field_offsets() {
        let mut bytes = Vec::new();
        sample_header().write_to(&mut bytes).unwrap();
        assert_eq!(&bytes[8..16], b"kerberos");
        assert_eq!(LittleEndian::read_u32(&bytes[28..32]), 4); // active_ant_chs
        assert_eq!(LittleEndian::read_u64(&bytes[36..44]), 140_000_000); // rf_center_freq
        assert_eq!(LittleEndian::read_u32(&bytes[60..64]), 131072); // cpi_length
        assert_eq!(LittleEndian::read_u64(&bytes[64..72]), 1_600_000_000); // time_stamp
        assert_eq!(LittleEndian::read_u32(&bytes[72..76]), 42); // daq_block_index
        assert_eq!(LittleEndian::read_u32(&bytes[84..88]), FRAME_TYPE_CAL);
        assert_eq!(LittleEndian::read_u32(&bytes[88..92]), DATA_TYPE_REAL);
        assert_eq!(LittleEndian::read_u32(&bytes[96..100]), 0b0101); // overdrive
        assert_eq!(LittleEndian::read_u32(&bytes[100..104]), 100); // if_gains[0]
        assert_eq!(LittleEndian::read_u32(&bytes[240..244]), 1); // noise_source_state
        // Reserved tail stays zeroed
        assert!(bytes[244..].iter().all(|&b| b == 0));
    }

    #[test]
    fn round_trips() {
        let header = sample_header();
        let mut bytes = Vec::new();
        header.write_to(&mut bytes).unwrap();
        let parsed = IqHeader::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(parsed, header);
    }
}

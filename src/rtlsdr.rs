//! Per-device driver facade: baseband init, tuner control and the bulk IQ
//! data endpoint for one RTL2832U receiver.

use crate::device::{
    Device, BLOCK_SYS, BLOCK_USB, DEMOD_CTL, DEMOD_CTL_1, GPD, GPO, GPOE, USB_EPA_CTL,
    USB_EPA_MAXPKT, USB_SYSCTL,
};
use crate::error::Result;
use crate::error::RtlsdrError::RtlsdrErr;
use crate::tuners::r820t::{R820T, R82XX_IF_FREQ, TUNER_ID};
use crate::tuners::{NoTuner, Tuner, KNOWN_TUNERS};
use crate::TunerGain;
use log::{error, info};
use std::sync::Arc;

const DEF_RTL_XTAL_FREQ: u32 = 28_800_000;

pub(crate) const FIR_LEN: usize = 16;
const DEFAULT_FIR: &'static [i32; FIR_LEN] = &[
    -54, -36, -41, -40, -32, -14, 14, 53, // i8
    101, 156, 215, 273, 327, 372, 404, 421, // i12
];

#[derive(Debug)]
pub struct RtlSdr {
    handle: Arc<Device>,
    tuner: Box<dyn Tuner>,
    freq: u32, // Hz
    rate: u32, // Hz
    xtal: u32,
    tuner_xtal: u32,
    fir: [i32; FIR_LEN],
}

impl RtlSdr {
    /// Open and initialise the `index`-th recognised device.
    pub fn open(index: usize) -> Result<RtlSdr> {
        let handle = Arc::new(Device::new(index)?);
        let mut sdr = RtlSdr::new(handle);
        sdr.init()?;
        Ok(sdr)
    }

    pub fn new(handle: Arc<Device>) -> Self {
        RtlSdr {
            handle,
            tuner: Box::new(NoTuner {}),
            freq: 0,
            rate: 0,
            xtal: DEF_RTL_XTAL_FREQ,
            tuner_xtal: DEF_RTL_XTAL_FREQ,
            fir: *DEFAULT_FIR,
        }
    }

    /// Second handle on the USB device for the bulk data path, so reads
    /// don't contend with tuner control.
    pub fn usb(&self) -> Arc<Device> {
        self.handle.clone()
    }

    pub fn init(&mut self) -> Result<()> {
        self.handle.test_write()?;
        self.init_baseband()?;
        self.set_i2c_repeater(true)?;

        let tuner_id = self
            .search_tuner()
            .ok_or_else(|| RtlsdrErr("Failed to find a recognized tuner".to_string()))?;
        info!("Got tuner ID {}", tuner_id);
        self.tuner = match tuner_id {
            TUNER_ID => Box::new(R820T::new()),
            _ => return Err(RtlsdrErr(format!("Unsupported tuner: {}", tuner_id))),
        };
        // Use the RTL clock value by default
        self.tuner_xtal = self.xtal;
        self.tuner.set_xtal_freq(self.tuner_xtal)?;

        // disable Zero-IF mode
        self.handle.demod_write_reg(1, 0xb1, 0x1a, 1)?;

        // only enable In-phase ADC input
        self.handle.demod_write_reg(0, 0x08, 0x4d, 1)?;

        // the R82XX use 3.57 MHz IF for the DVB-T 6 MHz mode
        self.set_if_freq(R82XX_IF_FREQ)?;

        // enable spectrum inversion
        self.handle.demod_write_reg(1, 0x15, 0x01, 1)?;

        info!("Init tuner");
        self.tuner.init(&self.handle)?;

        // Finished Init
        self.set_i2c_repeater(false)?;
        info!("Init complete");
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.deinit_baseband()
    }

    pub fn set_tuner_gain(&mut self, gain: TunerGain) -> Result<()> {
        self.set_i2c_repeater(true)?;
        self.tuner.set_gain(&self.handle, gain)?;
        self.set_i2c_repeater(false)?;
        Ok(())
    }

    /// PLL dithering; must be off on every unit of a coherent bank.
    pub fn set_dithering(&mut self, enable: bool) -> Result<()> {
        self.set_i2c_repeater(true)?;
        self.tuner.set_dither(&self.handle, enable)?;
        self.set_i2c_repeater(false)?;
        Ok(())
    }

    pub fn reset_buffer(&self) -> Result<()> {
        self.handle.write_reg(BLOCK_USB, USB_EPA_CTL, 0x1002, 2)?;
        self.handle.write_reg(BLOCK_USB, USB_EPA_CTL, 0x0000, 2)?;
        Ok(())
    }

    pub fn get_center_freq(&self) -> u32 {
        self.freq
    }

    pub fn set_center_freq(&mut self, freq: u32) -> Result<()> {
        self.set_i2c_repeater(true)?;
        self.tuner.set_freq(&self.handle, freq)?;
        self.set_i2c_repeater(false)?;
        self.freq = freq;
        Ok(())
    }

    pub fn get_sample_rate(&self) -> u32 {
        self.rate
    }

    pub fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        // Check if rate is supported by the resampler
        if rate <= 225_000 || rate > 3_200_000 || (rate > 300_000 && rate <= 900_000) {
            return Err(RtlsdrErr(format!("Invalid sample rate: {} Hz", rate)));
        }

        // Compute exact sample rate
        let rsamp_ratio =
            (self.xtal as u128 * 2_u128.pow(22) / rate as u128) & 0x0ffffffc;
        let real_resamp_ratio = rsamp_ratio | ((rsamp_ratio & 0x08000000) << 1);
        let real_rate = (self.xtal as u128 * 2_u128.pow(22)) as f64 / real_resamp_ratio as f64;
        if rate as f64 != real_rate {
            info!("Exact sample rate is {} Hz", real_rate);
        }
        // Save exact rate
        self.rate = real_rate as u32;

        // Configure tuner; the filter bandwidth tracks the sample rate
        self.set_i2c_repeater(true)?;
        self.tuner.set_bandwidth(&self.handle, self.rate, self.rate)?;
        self.set_i2c_repeater(false)?;
        if self.tuner.get_info()?.id == TUNER_ID {
            self.set_if_freq(self.tuner.get_if_freq()?)?;
            self.set_center_freq(self.freq)?;
        }

        let mut tmp: u16 = (rsamp_ratio >> 16) as u16;
        self.handle.demod_write_reg(1, 0x9f, tmp, 2)?;
        tmp = (rsamp_ratio & 0xffff) as u16;
        self.handle.demod_write_reg(1, 0xa1, tmp, 2)?;

        self.set_sample_freq_correction(0)?;

        // Reset demod (bit 3, soft_rst)
        self.handle.demod_write_reg(1, 0x01, 0x14, 1)?;
        self.handle.demod_write_reg(1, 0x01, 0x10, 1)?;
        Ok(())
    }

    /// Drive one of the RTL2832U GPIO pins; pin 0 switches the noise
    /// source / bias tee on KerberosSDR units.
    pub fn set_gpio(&self, gpio_pin: u8, on: bool) -> Result<()> {
        self.set_gpio_output(gpio_pin)?;
        self.set_gpio_bit(gpio_pin, on)
    }

    pub fn read_sync(&self, buf: &mut [u8]) -> Result<usize> {
        self.handle.bulk_transfer(buf)
    }

    fn set_if_freq(&self, freq: u32) -> Result<()> {
        let rtl_xtal: u32 = DEF_RTL_XTAL_FREQ;
        let base = 1u32 << 22;
        let if_freq: i32 = (freq as f64 * base as f64 / rtl_xtal as f64 * -1f64) as i32;

        let tmp = ((if_freq >> 16) as u16) & 0x3f;
        self.handle.demod_write_reg(1, 0x19, tmp, 1)?;
        let tmp = ((if_freq >> 8) as u16) & 0xff;
        self.handle.demod_write_reg(1, 0x1a, tmp, 1)?;
        let tmp = if_freq as u16 & 0xff;
        self.handle.demod_write_reg(1, 0x1b, tmp, 1)?;
        Ok(())
    }

    fn init_baseband(&self) -> Result<()> {
        // Init baseband
        self.handle.write_reg(BLOCK_USB, USB_SYSCTL, 0x09, 1)?;
        self.handle
            .write_reg(BLOCK_USB, USB_EPA_MAXPKT, 0x0002, 2)?;
        self.handle.write_reg(BLOCK_USB, USB_EPA_CTL, 0x1002, 2)?;

        // Power-on demod
        self.handle.write_reg(BLOCK_SYS, DEMOD_CTL_1, 0x22, 1)?;
        self.handle.write_reg(BLOCK_SYS, DEMOD_CTL, 0xe8, 1)?;

        // Reset demod (bit 3, soft_rst)
        self.handle.reset_demod()?;

        // Disable spectrum inversion and adjust channel rejection
        self.handle.demod_write_reg(1, 0x15, 0x00, 1)?;
        self.handle.demod_write_reg(1, 0x16, 0x00, 2)?;

        // Clear DDC shift and IF registers
        for i in 0..5 {
            self.handle.demod_write_reg(1, 0x16 + i, 0x00, 1)?;
        }
        let fir = self.fir;
        self.set_fir(&fir)?;

        // Enable SDR mode, disable DAGC (bit 5)
        self.handle.demod_write_reg(0, 0x19, 0x05, 1)?;

        // Init FSM state-holding register
        self.handle.demod_write_reg(1, 0x93, 0xf0, 1)?;
        self.handle.demod_write_reg(1, 0x94, 0x0f, 1)?;

        // Disable AGC (en_dagc, bit 0) (seems to have no effect)
        self.handle.demod_write_reg(1, 0x11, 0x00, 1)?;

        // Disable RF and IF AGC loop
        self.handle.demod_write_reg(1, 0x04, 0x00, 1)?;

        // Disable PID filter
        self.handle.demod_write_reg(0, 0x61, 0x60, 1)?;

        // opt_adc_iq = 0, default ADC_I/ADC_Q datapath
        self.handle.demod_write_reg(0, 0x06, 0x80, 1)?;

        // Enable Zero-IF mode, DC cancellation, and IQ estimation/compensation
        self.handle.demod_write_reg(1, 0xb1, 0x1b, 1)?;

        // Disable 4.096 MHz clock output on pin TP_CK0
        self.handle.demod_write_reg(0, 0x0d, 0x83, 1)?;

        Ok(())
    }

    fn deinit_baseband(&mut self) -> Result<()> {
        // Deinitialize tuner
        self.set_i2c_repeater(true)?;
        self.tuner.exit(&self.handle)?;
        self.set_i2c_repeater(false)?;

        // Power-off demodulator and ADCs
        self.handle.write_reg(BLOCK_SYS, DEMOD_CTL, 0x20, 1)?;
        Ok(())
    }

    fn set_sample_freq_correction(&self, ppm: i32) -> Result<()> {
        let offs = (ppm * (-1) * 2_i32.pow(24) / 1_000_000) as i16;
        self.handle
            .demod_write_reg(1, 0x3f, (offs & 0xff) as u16, 1)?;
        self.handle
            .demod_write_reg(1, 0x3e, ((offs >> 8) & 0x3f) as u16, 1)?;
        Ok(())
    }

    fn set_gpio_bit(&self, mut gpio: u8, val: bool) -> Result<()> {
        gpio = 1 << gpio;
        let mut r = self.handle.read_reg(BLOCK_SYS, GPO, 1)?;
        r = if val {
            r | gpio as u16
        } else {
            r & !gpio as u16
        };
        self.handle.write_reg(BLOCK_SYS, GPO, r, 1)?;
        Ok(())
    }

    fn set_gpio_output(&self, mut gpio: u8) -> Result<()> {
        gpio = 1 << gpio;
        let mut r = self.handle.read_reg(BLOCK_SYS, GPD, 1)?;
        self.handle.write_reg(BLOCK_SYS, GPD, r & !gpio as u16, 1)?;
        r = self.handle.read_reg(BLOCK_SYS, GPOE, 1)?;
        self.handle.write_reg(BLOCK_SYS, GPOE, r | gpio as u16, 1)?;
        Ok(())
    }

    fn set_i2c_repeater(&self, enable: bool) -> Result<()> {
        let val = match enable {
            true => 0x18,
            false => 0x10,
        };
        self.handle.demod_write_reg(1, 0x01, val, 1)?;
        Ok(())
    }

    fn set_fir(&self, fir: &[i32; FIR_LEN]) -> Result<()> {
        const TMP_LEN: usize = 20;
        let mut tmp: [u8; TMP_LEN] = [0; TMP_LEN];
        // First 8 values are i8
        for i in 0..8 {
            let val = fir[i];
            if val < -128 || val > 127 {
                return Err(RtlsdrErr(format!("i8 FIR coefficient out of bounds: {}", val)));
            }
            tmp[i] = val as u8;
        }
        // Next 12 are i12, so don't line up with byte boundaries and need to unpack
        // 12 i12 values from 4 pairs of bytes in fir. Example:
        // fir: 4b5, 7f8, 3e8, 619
        // tmp: 4b, 57, f8, 3e, 86, 19
        for i in (0..8).step_by(2) {
            let val0 = fir[8 + i];
            let val1 = fir[8 + i + 1];
            if val0 < -2048 || val0 > 2047 || val1 < -2048 || val1 > 2047 {
                return Err(RtlsdrErr(format!(
                    "i12 FIR coefficient out of bounds: {} {}",
                    val0, val1
                )));
            }
            tmp[8 + i * 3 / 2] = (val0 >> 4) as u8;
            tmp[8 + i * 3 / 2 + 1] = ((val0 << 4) | ((val1 >> 8) & 0x0f)) as u8;
            tmp[8 + i * 3 / 2 + 2] = val1 as u8;
        }

        for i in 0..TMP_LEN {
            self.handle
                .demod_write_reg(1, 0x1c + i as u16, tmp[i] as u16, 1)?;
        }
        Ok(())
    }

    fn search_tuner(&self) -> Option<&'static str> {
        for tuner_info in KNOWN_TUNERS.iter() {
            info!(
                "Probing I2C address {:#02x} checking address {:#02x}",
                tuner_info.i2c_addr, tuner_info.check_addr
            );
            match self
                .handle
                .i2c_read_reg(tuner_info.i2c_addr, tuner_info.check_addr)
            {
                Ok(val) => {
                    if val == tuner_info.check_val {
                        return Some(tuner_info.id);
                    }
                }
                Err(e) => {
                    error!("Reading failed, continuing. Err: {}", e);
                }
            };
        }
        None
    }
}

//! Parameters loaded from `daq_chain_config.ini`.

use crate::error::Result;
use crate::error::RtlsdrError::RtlsdrErr;
use configparser::ini::Ini;

#[derive(Debug, Clone)]
pub struct Config {
    pub num_ch: usize,
    pub hw_name: String,
    pub unit_id: u32,
    pub ioo_type: u32,
    /// IQ samples per channel per block; one ring slot holds twice this
    /// many bytes (interleaved 8-bit I and Q).
    pub daq_buffer_size: usize,
    pub sample_rate: u32,
    pub center_freq: u32,
    /// Tenths of a dB.
    pub gain: i32,
    pub en_noise_source_ctr: bool,
    pub ctr_channel_serial_no: u32,
    pub log_level: usize,
}

impl Config {
    pub fn load(path: &str) -> Result<Config> {
        let mut ini = Ini::new();
        ini.load(path)
            .map_err(|e| RtlsdrErr(format!("Configuration could not be loaded: {}", e)))?;
        Config::from_ini(&ini)
    }

    #[cfg(test)]
    fn from_text(content: &str) -> Result<Config> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|e| RtlsdrErr(format!("Configuration could not be loaded: {}", e)))?;
        Config::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Config> {
        Ok(Config {
            num_ch: require_int(ini, "hw", "num_ch")? as usize,
            hw_name: ini
                .get("hw", "name")
                .ok_or_else(|| missing("hw", "name"))?,
            unit_id: require_int(ini, "hw", "unit_id")? as u32,
            ioo_type: require_int(ini, "hw", "ioo_type")? as u32,
            daq_buffer_size: require_int(ini, "daq", "daq_buffer_size")? as usize,
            sample_rate: require_int(ini, "daq", "sample_rate")? as u32,
            center_freq: require_int(ini, "daq", "center_freq")? as u32,
            gain: require_int(ini, "daq", "gain")? as i32,
            en_noise_source_ctr: require_int(ini, "daq", "en_noise_source_ctr")? == 1,
            ctr_channel_serial_no: require_int(ini, "daq", "ctr_channel_serial_no")? as u32,
            log_level: require_int(ini, "daq", "log_level")? as usize,
        })
    }

    /// Bytes per channel per block: two interleaved u8 values per IQ sample.
    pub fn block_bytes(&self) -> usize {
        self.daq_buffer_size * 2
    }

    /// Map the config's numeric log level (0 trace .. 5 fatal) onto
    /// stderrlog's verbosity (0 error .. 4 trace).
    pub fn verbosity(&self) -> usize {
        4usize.saturating_sub(self.log_level)
    }
}

fn missing(section: &str, key: &str) -> crate::error::RtlsdrError {
    RtlsdrErr(format!("Missing config key [{}] {}", section, key))
}

fn require_int(ini: &Ini, section: &str, key: &str) -> Result<i64> {
    ini.getint(section, key)
        .map_err(|e| RtlsdrErr(format!("Bad config value [{}] {}: {}", section, key, e)))?
        .ok_or_else(|| missing(section, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_INI: &str = "
[hw]
num_ch = 4
name = kerberos
unit_id = 0
ioo_type = 0

[daq]
daq_buffer_size = 131072
sample_rate = 2400000
center_freq = 140000000
gain = 200
en_noise_source_ctr = 1
ctr_channel_serial_no = 1000
log_level = 2
";

    #[test]
    fn parses_full_config() {
        let config = Config::from_text(SAMPLE_INI).unwrap();
        assert_eq!(config.num_ch, 4);
        assert_eq!(config.hw_name, "kerberos");
        assert_eq!(config.daq_buffer_size, 131072);
        assert_eq!(config.block_bytes(), 262144);
        assert_eq!(config.sample_rate, 2_400_000);
        assert_eq!(config.center_freq, 140_000_000);
        assert_eq!(config.gain, 200);
        assert!(config.en_noise_source_ctr);
        assert_eq!(config.ctr_channel_serial_no, 1000);
    }

    #[test]
    fn missing_key_is_an_error() {
        let result = Config::from_text("[hw]\nnum_ch = 4\n");
        assert!(result.is_err());
    }

    #[test]
    fn log_level_maps_to_stderrlog_verbosity() {
        let mut config = Config::from_text(SAMPLE_INI).unwrap();
        assert_eq!(config.verbosity(), 2); // info -> info
        config.log_level = 0;
        assert_eq!(config.verbosity(), 4); // trace -> trace
        config.log_level = 5;
        assert_eq!(config.verbosity(), 0); // fatal -> error, the floor
    }
}

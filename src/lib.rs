//! Coherent multichannel acquisition core for banks of RTL2832U/R820T
//! receivers driven from a common reference clock (KerberosSDR-style
//! arrays). One reader thread per tuner fills a per-channel circular
//! buffer; the coordinator aligns the channels block-by-block, prepends an
//! IQ frame header and streams the result on stdout. Out-of-band control
//! (retune, gain, noise source, halt) arrives on a named FIFO.

pub mod buffer;
pub mod config;
pub mod control;
pub mod daq;
pub mod device;
pub mod error;
pub mod iq_header;
pub mod rtlsdr;
pub mod tuners;

/// Slots in the per-channel circular, coherent read buffer.
pub const NUM_BUFF: usize = 8;

/// Frames sent out as DUMMY after a control mutation, hiding the
/// reconfiguration transient from downstream.
pub const NO_DUMMY_FRAMES: u32 = 8;

/// Receiver control FIFO name.
pub const CONTROL_FIFO: &str = "_data_control/rec_control_fifo";

/// Configuration file name.
pub const INI_FNAME: &str = "daq_chain_config.ini";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerGain {
    Auto,
    /// Gain in tenths of a dB.
    Manual(i32),
}

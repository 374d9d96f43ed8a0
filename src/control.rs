//! Out-of-band receiver control.
//!
//! A dedicated thread performs blocking reads on the control FIFO, parses
//! one-byte commands (plus payload) and latches them into the
//! [`ControlMailbox`]. The coordinator drains the mailbox between frames,
//! so a command never lands in the middle of a frame emission.
//!
//! Valid commands:
//!
//! | byte  | meaning                                            |
//! |-------|----------------------------------------------------|
//! | `r`   | retune all channels, restarting the reads (deprecated) |
//! | `c`   | hot center-frequency tune                          |
//! | `g`   | hot per-channel gain change                        |
//! | `n`   | noise source on                                    |
//! | `f`   | noise source off                                   |
//! | 0x02  | graceful halt                                      |
//!
//! Payload integers are host byte order; this is local IPC, not a wire
//! protocol.

use crate::error::Result;
use crate::NO_DUMMY_FRAMES;
use byteorder::{NativeEndian, ReadBytesExt};
use log::{error, info, warn};
use std::fs::File;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

pub const CMD_RECONFIGURE: u8 = b'r';
pub const CMD_TUNE: u8 = b'c';
pub const CMD_GAIN: u8 = b'g';
pub const CMD_NOISE_ON: u8 = b'n';
pub const CMD_NOISE_OFF: u8 = b'f';
pub const CMD_HALT: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetuneParams {
    pub center_freq: u32,
    pub sample_rate: u32,
    pub gain: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reconfigure(RetuneParams),
    Tune(u32),
    Gains(Vec<i32>),
    NoiseOn,
    NoiseOff,
    Halt,
}

/// Read one command from the pipe. Returns `Ok(None)` for unknown command
/// bytes, which are ignored.
pub fn read_command<R: Read>(pipe: &mut R, ch_no: usize) -> Result<Option<Command>> {
    let mut cmd = [0u8; 1];
    pipe.read_exact(&mut cmd)?;
    match cmd[0] {
        CMD_RECONFIGURE => {
            info!("Signal 'r': Reconfiguring the tuner");
            let center_freq = pipe.read_u32::<NativeEndian>()?;
            let sample_rate = pipe.read_u32::<NativeEndian>()?;
            let gain = pipe.read_i32::<NativeEndian>()?;
            info!("Center freq: {} MHz", center_freq / 1_000_000);
            info!("Sample rate: {} MSps", sample_rate / 1_000_000);
            info!("Gain: {} dB", gain / 10);
            Ok(Some(Command::Reconfigure(RetuneParams {
                center_freq,
                sample_rate,
                gain,
            })))
        }
        CMD_TUNE => {
            info!("Signal 'c': Center frequency tuning request");
            let center_freq = pipe.read_u32::<NativeEndian>()?;
            info!("New center frequency: {} MHz", center_freq / 1_000_000);
            Ok(Some(Command::Tune(center_freq)))
        }
        CMD_GAIN => {
            info!("Signal 'g': Gain tuning request");
            let mut gains = Vec::with_capacity(ch_no);
            for _ in 0..ch_no {
                gains.push(pipe.read_i32::<NativeEndian>()?);
            }
            Ok(Some(Command::Gains(gains)))
        }
        CMD_NOISE_ON => {
            info!("Signal 'n': Turn on noise source");
            Ok(Some(Command::NoiseOn))
        }
        CMD_NOISE_OFF => {
            info!("Signal 'f': Turn off noise source");
            Ok(Some(Command::NoiseOff))
        }
        CMD_HALT => {
            info!("Signal 2: System halt request");
            Ok(Some(Command::Halt))
        }
        _ => Ok(None),
    }
}

/// Requests latched for the coordinator, taken all at once between frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingActions {
    pub reconfigure: Option<RetuneParams>,
    pub tune: Option<u32>,
    pub gains: Option<Vec<i32>>,
}

#[derive(Debug, Default)]
pub struct LatchState {
    pending: PendingActions,
    pub noise_on: bool,
    pub exit: bool,
    /// Set together with `exit` when a startup-fatal condition is detected
    /// off the main thread (control FIFO open failure).
    pub fatal: Option<String>,
    dummy_active: bool,
    dummy_cntr: u32,
}

impl LatchState {
    /// Take every one-shot request, leaving the persistent flags.
    pub fn drain(&mut self) -> PendingActions {
        std::mem::take(&mut self.pending)
    }

    pub fn dummy_window_active(&self) -> bool {
        self.dummy_active
    }

    /// Account one emitted frame against the dummy window.
    pub fn dummy_tick(&mut self) {
        if self.dummy_active {
            self.dummy_cntr += 1;
            if self.dummy_cntr == NO_DUMMY_FRAMES {
                self.dummy_active = false;
            }
        }
    }
}

/// Shared latch between the control thread, the reader callbacks and the
/// coordinator. Writers take the mutex; the per-ring write counters stay
/// outside it so the hot path never contends.
#[derive(Default)]
pub struct ControlMailbox {
    state: Mutex<LatchState>,
    signal: Condvar,
    // Mirror of LatchState::exit for the reader threads' per-transfer
    // check; the data path must not contend on the latch mutex.
    exit_flag: AtomicBool,
}

impl ControlMailbox {
    pub fn new() -> ControlMailbox {
        ControlMailbox::default()
    }

    /// Latch a command and open the dummy-frame window. Back-to-back
    /// commands restart the window rather than stacking.
    pub fn submit(&self, command: Command) {
        let mut state = self.state.lock().unwrap();
        match command {
            Command::Reconfigure(params) => state.pending.reconfigure = Some(params),
            Command::Tune(freq) => state.pending.tune = Some(freq),
            Command::Gains(gains) => state.pending.gains = Some(gains),
            Command::NoiseOn => state.noise_on = true,
            Command::NoiseOff => state.noise_on = false,
            Command::Halt => {
                state.exit = true;
                self.exit_flag.store(true, Ordering::Release);
            }
        }
        state.dummy_active = true;
        state.dummy_cntr = 0;
        self.signal.notify_one();
    }

    pub fn request_exit(&self) {
        let mut state = self.state.lock().unwrap();
        state.exit = true;
        self.exit_flag.store(true, Ordering::Release);
        self.signal.notify_one();
    }

    pub fn fail(&self, message: String) {
        let mut state = self.state.lock().unwrap();
        state.fatal = Some(message);
        state.exit = true;
        self.exit_flag.store(true, Ordering::Release);
        self.signal.notify_one();
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_flag.load(Ordering::Acquire)
    }

    /// Producer-side wakeup, without taking the latch. The transfer cadence
    /// is periodic, so a wakeup racing the coordinator's readiness check is
    /// recovered by the next block.
    pub fn notify_data(&self) {
        self.signal.notify_one();
    }

    pub fn lock(&self) -> MutexGuard<'_, LatchState> {
        self.state.lock().unwrap()
    }

    pub fn wait<'a>(&self, guard: MutexGuard<'a, LatchState>) -> MutexGuard<'a, LatchState> {
        self.signal.wait(guard).unwrap()
    }
}

/// Control FIFO read loop. A failed open is fatal for the whole process;
/// end-of-stream (every writer closed the FIFO) is treated as a halt
/// request so the shutdown path stays single.
pub fn control_task(path: &str, ch_no: usize, mailbox: &ControlMailbox) {
    let mut pipe = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open control FIFO {}: {}", path, e);
            mailbox.fail(format!("Failed to open control FIFO {}: {}", path, e));
            return;
        }
    };
    while !mailbox.exit_requested() {
        match read_command(&mut pipe, ch_no) {
            Ok(Some(Command::Halt)) => {
                mailbox.submit(Command::Halt);
                break;
            }
            Ok(Some(command)) => mailbox.submit(command),
            Ok(None) => {}
            Err(e) => {
                if !mailbox.exit_requested() {
                    warn!("Control FIFO closed: {}", e);
                    mailbox.request_exit();
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_tune_command() {
        let mut bytes = vec![CMD_TUNE];
        bytes.extend_from_slice(&100_000_000u32.to_ne_bytes());
        let command = read_command(&mut Cursor::new(bytes), 4).unwrap();
        assert_eq!(command, Some(Command::Tune(100_000_000)));
    }

    #[test]
    fn parses_per_channel_gains() {
        let mut bytes = vec![CMD_GAIN];
        for gain in [10i32, 20, 30, 40] {
            bytes.extend_from_slice(&gain.to_ne_bytes());
        }
        let command = read_command(&mut Cursor::new(bytes), 4).unwrap();
        assert_eq!(command, Some(Command::Gains(vec![10, 20, 30, 40])));
    }

    #[test]
    fn parses_reconfigure_payload() {
        let mut bytes = vec![CMD_RECONFIGURE];
        bytes.extend_from_slice(&433_000_000u32.to_ne_bytes());
        bytes.extend_from_slice(&2_400_000u32.to_ne_bytes());
        bytes.extend_from_slice(&496i32.to_ne_bytes());
        let command = read_command(&mut Cursor::new(bytes), 4).unwrap();
        assert_eq!(
            command,
            Some(Command::Reconfigure(RetuneParams {
                center_freq: 433_000_000,
                sample_rate: 2_400_000,
                gain: 496,
            }))
        );
    }

    #[test]
    fn unknown_bytes_are_ignored() {
        let command = read_command(&mut Cursor::new(vec![b'x']), 4).unwrap();
        assert_eq!(command, None);
    }

    #[test]
    fn noise_and_halt_have_no_payload() {
        assert_eq!(
            read_command(&mut Cursor::new(vec![CMD_NOISE_ON]), 4).unwrap(),
            Some(Command::NoiseOn)
        );
        assert_eq!(
            read_command(&mut Cursor::new(vec![CMD_NOISE_OFF]), 4).unwrap(),
            Some(Command::NoiseOff)
        );
        assert_eq!(
            read_command(&mut Cursor::new(vec![CMD_HALT]), 4).unwrap(),
            Some(Command::Halt)
        );
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut bytes = vec![CMD_TUNE];
        bytes.extend_from_slice(&[0u8; 2]);
        assert!(read_command(&mut Cursor::new(bytes), 4).is_err());
    }

    #[test]
    fn submit_opens_the_dummy_window_and_latches() {
        let mailbox = ControlMailbox::new();
        mailbox.submit(Command::Tune(100_000_000));
        let mut state = mailbox.lock();
        assert!(state.dummy_window_active());
        let actions = state.drain();
        assert_eq!(actions.tune, Some(100_000_000));
        // Drained once, gone after
        assert_eq!(state.drain(), PendingActions::default());
    }

    #[test]
    fn dummy_window_spans_exactly_no_dummy_frames() {
        let mailbox = ControlMailbox::new();
        mailbox.submit(Command::NoiseOn);
        let mut state = mailbox.lock();
        for _ in 0..NO_DUMMY_FRAMES {
            assert!(state.dummy_window_active());
            state.dummy_tick();
        }
        assert!(!state.dummy_window_active());
        // Ticks past the window are no-ops
        state.dummy_tick();
        assert!(!state.dummy_window_active());
    }

    #[test]
    fn rapid_fire_commands_collapse_into_one_window() {
        let mailbox = ControlMailbox::new();
        mailbox.submit(Command::Tune(100_000_000));
        {
            let mut state = mailbox.lock();
            state.dummy_tick();
            state.dummy_tick();
        }
        // A second command inside the window restarts it
        mailbox.submit(Command::Gains(vec![10, 20, 30, 40]));
        let mut state = mailbox.lock();
        for _ in 0..NO_DUMMY_FRAMES {
            assert!(state.dummy_window_active());
            state.dummy_tick();
        }
        assert!(!state.dummy_window_active());
        let actions = state.drain();
        assert_eq!(actions.tune, Some(100_000_000));
        assert_eq!(actions.gains, Some(vec![10, 20, 30, 40]));
    }

    #[test]
    fn halt_latches_exit() {
        let mailbox = ControlMailbox::new();
        assert!(!mailbox.exit_requested());
        mailbox.submit(Command::Halt);
        assert!(mailbox.exit_requested());
    }

    #[test]
    fn noise_state_persists_across_drains() {
        let mailbox = ControlMailbox::new();
        mailbox.submit(Command::NoiseOn);
        {
            let mut state = mailbox.lock();
            state.drain();
            assert!(state.noise_on);
        }
        mailbox.submit(Command::NoiseOff);
        assert!(!mailbox.lock().noise_on);
    }
}

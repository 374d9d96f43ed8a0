//! The coherent acquisition engine: receiver records, per-tuner reader
//! threads, the block-alignment coordinator and the orderly shutdown path.
//!
//! Every emitted non-dummy frame contains, for each channel, the ring slot
//! with the same block index: the coordinator only advances its read index
//! once every channel's write counter has passed it. Control commands are
//! drained between frames, so a command received while frame `k` is being
//! built first affects frame `k+1`, which the dummy window already hides.

use crate::buffer::ChannelRing;
use crate::config::Config;
use crate::control::{self, control_task, ControlMailbox, PendingActions};
use crate::device;
use crate::error::Result;
use crate::error::RtlsdrError::{self, RtlsdrErr};
use crate::iq_header::{IqHeader, DATA_TYPE_DUMMY, DATA_TYPE_IQ, DATA_TYPE_REAL, FRAME_TYPE_CAL,
    FRAME_TYPE_DATA, FRAME_TYPE_DUMMY, MAX_CHANNELS};
use crate::rtlsdr::RtlSdr;
use crate::TunerGain;
use crate::CONTROL_FIFO;
use log::{debug, error, info, warn};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Positive rail of the unsigned offset-binary ADC encoding. The negative
/// rail (0x00) is a valid sample and is not treated as clipping.
const CLIP_VALUE: u8 = 0xff;

/// GPIO pin switching the noise source (bias tee) on KerberosSDR units.
const NOISE_SOURCE_GPIO: u8 = 0;

/// Serial number of channel 0; channel i carries serial `1000 + i`.
const SERIAL_BASE: usize = 1000;

/// Tuner parameters as last applied, mirrored into the frame header.
#[derive(Debug, Clone, Copy)]
pub struct TunerParams {
    pub center_freq: u32,
    pub sample_rate: u32,
    /// Tenths of a dB.
    pub gain: i32,
}

/// One receiver channel: the opened device, its desired tuner parameters
/// and its slice of the circular buffer bank.
pub struct Receiver {
    pub ch: usize,
    pub dev_index: usize,
    pub params: Mutex<TunerParams>,
    pub ring: ChannelRing,
    sdr: Mutex<RtlSdr>,
    usb: Arc<device::Device>,
    cancel: AtomicBool,
}

impl Receiver {
    fn open(ch: usize, dev_index: usize, params: TunerParams, block_bytes: usize) -> Result<Receiver> {
        let sdr = RtlSdr::open(dev_index)?;
        let usb = sdr.usb();
        if let Ok((manufacturer, product, serial)) = usb.usb_strings() {
            info!(
                "Opened ch {}: {} {}, SN: {}",
                ch,
                manufacturer.unwrap_or_default(),
                product.unwrap_or_default(),
                serial.unwrap_or_default()
            );
        }
        Ok(Receiver {
            ch,
            dev_index,
            params: Mutex::new(params),
            ring: ChannelRing::new(block_bytes),
            sdr: Mutex::new(sdr),
            usb,
            cancel: AtomicBool::new(false),
        })
    }

    fn sdr(&self) -> MutexGuard<'_, RtlSdr> {
        self.sdr.lock().unwrap()
    }

    /// Make the channel's read loop return, as librtlsdr's cancel_async
    /// would.
    pub fn cancel_read(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    fn clear_cancel(&self) {
        self.cancel.store(false, Ordering::Release);
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

/// Scan one emitted block for full-scale samples.
pub fn overdriven(block: &[u8]) -> bool {
    block.iter().any(|&sample| sample == CLIP_VALUE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Dummy,
    Cal,
    Data,
}

impl FrameKind {
    /// The dummy window outranks everything; with the noise source on, the
    /// frame carries calibration data.
    pub fn classify(dummy_window: bool, noise_on: bool) -> FrameKind {
        if dummy_window {
            FrameKind::Dummy
        } else if noise_on {
            FrameKind::Cal
        } else {
            FrameKind::Data
        }
    }

    pub fn frame_type(self) -> u32 {
        match self {
            FrameKind::Dummy => FRAME_TYPE_DUMMY,
            FrameKind::Cal => FRAME_TYPE_CAL,
            FrameKind::Data => FRAME_TYPE_DATA,
        }
    }

    pub fn data_type(self) -> u32 {
        match self {
            FrameKind::Dummy => DATA_TYPE_DUMMY,
            FrameKind::Cal | FrameKind::Data => DATA_TYPE_REAL,
        }
    }

    pub fn cpi_length(self, samples_per_block: u32) -> u32 {
        match self {
            FrameKind::Dummy => 0,
            FrameKind::Cal | FrameKind::Data => samples_per_block,
        }
    }
}

/// Owns the list of receiver indices whose GPIO switches a noise source.
/// Multi-unit stacks need the control channel of the second physical unit
/// (receiver index 7) toggled as well; a hardware quirk, not a rule.
pub struct NoiseSourceController {
    enabled: bool,
    gpio_channels: Vec<usize>,
    last_state: bool,
}

/// Receiver indices carrying a controllable noise source GPIO.
pub fn noise_gpio_channels(ch_no: usize, ctr_channel: usize) -> Vec<usize> {
    let mut channels = vec![ctr_channel];
    if ch_no > 4 && ctr_channel != 7 {
        channels.push(7);
    }
    channels
}

impl NoiseSourceController {
    pub fn resolve(config: &Config, ctr_channel: usize) -> NoiseSourceController {
        let gpio_channels = noise_gpio_channels(config.num_ch, ctr_channel);
        if gpio_channels.len() > 1 {
            warn!("Noise source is controlled on the second unit as well");
        }
        NoiseSourceController {
            enabled: config.en_noise_source_ctr,
            gpio_channels,
            last_state: false,
        }
    }

    /// Called once per frame with the requested state; toggles the GPIOs
    /// only on a transition and only when enabled in the config.
    fn apply(&mut self, receivers: &[Arc<Receiver>], on: bool) {
        if on == self.last_state {
            return;
        }
        if self.enabled {
            for &ch in &self.gpio_channels {
                let rec = match receivers.get(ch) {
                    Some(rec) => rec,
                    None => continue,
                };
                match rec.sdr().set_gpio(NOISE_SOURCE_GPIO, on) {
                    Ok(()) => {
                        if on {
                            info!("Noise source turned on");
                        } else {
                            info!("Noise source turned off");
                        }
                    }
                    Err(e) => error!("Failed to switch noise source at ch {}: {}", ch, e),
                }
            }
        }
        self.last_state = on;
    }
}

/// Resolve the logical channel acting as noise-source control channel from
/// its configured serial number; falls back to channel 0 with a warning.
pub fn resolve_ctr_channel(config: &Config, serials: &[String]) -> usize {
    let target = config.ctr_channel_serial_no.to_string();
    match serials.iter().position(|serial| *serial == target) {
        Some(ch) => ch,
        None => {
            warn!(
                "Failed to identify control channel index based on its configured serial number:{}",
                target
            );
            warn!("Set to default device index: 0");
            0
        }
    }
}

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Map every configured channel serial to a USB enumeration index. A
/// missing serial is fatal: without it the channel order is undefined.
fn resolve_devices(config: &Config, serials: &[String]) -> Result<Vec<usize>> {
    let descriptors = device::list_devices()?;
    let mut indexes = Vec::with_capacity(config.num_ch);
    for serial in serials {
        match descriptors.iter().find(|desc| desc.serial == *serial) {
            Some(desc) => {
                info!("Device serial:{}, index: {}", serial, desc.index);
                indexes.push(desc.index);
            }
            None => {
                return Err(RtlsdrErr(format!(
                    "The serial numbers of the devices are not yet configured (no device with serial {})",
                    serial
                )))
            }
        }
    }
    Ok(indexes)
}

/// Tuner read and configuration thread, one per channel.
///
/// Configures the device, arms the read together with every other channel
/// through the barrier, then copies bulk transfers into the channel's ring
/// until cancelled. A cancel without an exit request is the deprecated
/// retune-restart path: loop back, reconfigure, re-arm.
fn reader_task(rec: &Receiver, barrier: &Barrier, mailbox: &ControlMailbox) {
    info!("Initializing RTL-SDR device, index:{}", rec.dev_index);
    {
        let mut sdr = rec.sdr();
        // Dithering must be off or the units drift apart in phase
        if let Err(e) = sdr.set_dithering(false) {
            error!("Failed to disable dithering: {}", e);
        }
    }
    while !mailbox.exit_requested() {
        configure(rec);
        rec.clear_cancel();
        // The coarse-grained coherence handshake: every channel arms its
        // read within the same scheduling window
        barrier.wait();
        read_into_ring(rec, mailbox);
    }
}

fn configure(rec: &Receiver) {
    let params = *rec.params.lock().unwrap();
    let mut sdr = rec.sdr();

    if let Err(e) = sdr.set_center_freq(params.center_freq) {
        error!("Failed to set center frequency: {}", e);
    } else {
        rec.params.lock().unwrap().center_freq = sdr.get_center_freq();
    }
    // Manual gain; AGC would break amplitude and phase calibration
    if let Err(e) = sdr.set_tuner_gain(TunerGain::Manual(params.gain)) {
        error!("Failed to set gain value: {}", e);
    }
    if let Err(e) = sdr.set_sample_rate(params.sample_rate) {
        error!("Failed to set sample rate: {}", e);
    }
    // Noise source into the default off state
    if let Err(e) = sdr.set_gpio(NOISE_SOURCE_GPIO, false) {
        error!("Failed to clear noise source GPIO: {}", e);
    }
    if let Err(e) = sdr.reset_buffer() {
        error!("Failed to reset receiver buffer: {}", e);
    }
    info!("Device is initialized {}", rec.ch);
    if rec.ch == 0 {
        info!("Exact sample rate: {} Hz", sdr.get_sample_rate());
        info!("Exact center frequency: {} Hz", sdr.get_center_freq());
    }
}

/// The channel's data path: blocking bulk reads assembled into ring slots.
/// Runs on the reader thread without touching the device mutex, so hot
/// tuner changes never stall the stream.
fn read_into_ring(rec: &Receiver, mailbox: &ControlMailbox) {
    let block_bytes = rec.ring.block_bytes();
    let mut block = vec![0u8; block_bytes];
    let mut filled = 0usize;
    while !rec.cancelled() && !mailbox.exit_requested() {
        match rec.usb.bulk_transfer(&mut block[filled..]) {
            Ok(n) => {
                filled += n;
                if filled == block_bytes {
                    rec.ring.produce(&block);
                    filled = 0;
                    debug!(
                        "Read at device:{}, buff index:{}",
                        rec.dev_index,
                        rec.ring.write_idx()
                    );
                    // Wake the coordinator; see ControlMailbox::notify_data
                    mailbox.notify_data();
                }
            }
            Err(RtlsdrError::Usb(rusb::Error::Timeout)) => continue,
            Err(e) => {
                // A channel that stops producing stalls the whole stream;
                // mid-run recovery is out of scope, keep retrying
                error!("Bulk read failed at device {}: {}", rec.dev_index, e);
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

/// Serialise one frame: header, then for non-dummy frames every channel's
/// slot for `read_idx` in channel order.
fn emit_frame<W: Write>(
    out: &mut W,
    header: &IqHeader,
    rings: &[&ChannelRing],
    read_idx: u64,
    kind: FrameKind,
) -> Result<()> {
    header.write_to(out)?;
    if kind != FrameKind::Dummy {
        for ring in rings {
            out.write_all(ring.block(read_idx))?;
        }
    }
    out.flush()?;
    Ok(())
}

/// The main data acquisition loop.
fn acquisition_loop<W: Write>(
    out: &mut W,
    receivers: &[Arc<Receiver>],
    mailbox: &ControlMailbox,
    noise: &mut NoiseSourceController,
    header: &mut IqHeader,
    samples_per_block: u32,
) -> Result<()> {
    let rings: Vec<&ChannelRing> = receivers.iter().map(|rec| &rec.ring).collect();
    let mut read_buff_ind: u64 = 0;
    let mut guard = mailbox.lock();
    loop {
        if guard.exit {
            break;
        }
        guard = mailbox.wait(guard);
        if guard.exit {
            break;
        }
        // Every reader must have passed the current block index before the
        // frame can go out; the wakeup is only a hint
        let data_ready = receivers
            .iter()
            .all(|rec| rec.ring.write_idx() > read_buff_ind);
        if !data_ready {
            continue;
        }

        let kind = FrameKind::classify(guard.dummy_window_active(), guard.noise_on);
        header.time_stamp = unix_time();
        header.daq_block_index = read_buff_ind as u32;
        header.frame_type = kind.frame_type();
        header.data_type = kind.data_type();
        header.cpi_length = kind.cpi_length(samples_per_block);
        header.noise_source_state = guard.noise_on as u32;
        let mut overdrive_flags: u32 = 0;
        for (i, rec) in receivers.iter().enumerate() {
            let params = rec.params.lock().unwrap();
            header.rf_center_freq = params.center_freq as u64;
            header.if_gains[i] = params.gain as u32;
            // Dummy frames carry no payload, so nothing can clip in them
            if kind != FrameKind::Dummy && overdriven(rec.ring.block(read_buff_ind)) {
                overdrive_flags |= 1 << i;
            }
        }
        header.adc_overdrive_flags = overdrive_flags;

        emit_frame(out, header, &rings, read_buff_ind, kind)?;
        if overdrive_flags != 0 {
            warn!("Overdrive detected, flags: 0x{:02X}", overdrive_flags);
        }
        debug!(
            "IQ frame written, block index: {}, type:{}",
            header.daq_block_index, header.frame_type
        );
        read_buff_ind += 1;
        guard.dummy_tick();

        // Tuner control, applied strictly after the frame is committed
        let actions = guard.drain();
        let noise_on = guard.noise_on;
        apply_control(receivers, actions, noise_on, noise);
    }
    match guard.fatal.take() {
        Some(message) => Err(RtlsdrErr(message)),
        None => Ok(()),
    }
}

/// Apply latched control requests. The retune-restart subsumes the hot
/// changes by forcing a full reconfigure, so it goes first.
fn apply_control(
    receivers: &[Arc<Receiver>],
    actions: PendingActions,
    noise_on: bool,
    noise: &mut NoiseSourceController,
) {
    if let Some(new) = actions.reconfigure {
        for rec in receivers {
            {
                let mut params = rec.params.lock().unwrap();
                params.center_freq = new.center_freq;
                params.sample_rate = new.sample_rate;
                params.gain = new.gain;
            }
            // The reader thread returns from its read and re-enters
            // configuration with the new parameters
            rec.cancel_read();
        }
    }
    if let Some(freq) = actions.tune {
        for (i, rec) in receivers.iter().enumerate() {
            let mut sdr = rec.sdr();
            match sdr.set_center_freq(freq) {
                Ok(()) => {
                    let actual = sdr.get_center_freq();
                    rec.params.lock().unwrap().center_freq = actual;
                    info!("Center frequency changed at ch: {}, frequency: {}", i, actual);
                }
                Err(e) => error!("Failed to set center frequency: {}", e),
            }
        }
    }
    if let Some(gains) = actions.gains {
        for (i, rec) in receivers.iter().enumerate() {
            if let Some(&gain) = gains.get(i) {
                match rec.sdr().set_tuner_gain(TunerGain::Manual(gain)) {
                    Ok(()) => {
                        rec.params.lock().unwrap().gain = gain;
                        info!("Gain change at ch: {}, gain {}", i, gain);
                    }
                    Err(e) => error!("Failed to set gain value: {}", e),
                }
            }
        }
    }
    noise.apply(receivers, noise_on);
}

/// Startup, the acquisition loop and orderly teardown. Returns only after
/// every thread has been collected; fatal startup conditions surface as an
/// error so the process can exit non-zero.
pub fn run(config: &Config) -> Result<()> {
    info!("Channel number: {}", config.num_ch);
    info!("Number of IQ samples per channel: {}", config.daq_buffer_size);
    info!("Starting multichannel coherent RTL-SDR receiver");
    if config.en_noise_source_ctr {
        info!("Noise source control: enabled");
    } else {
        info!("Noise source control: disabled");
    }
    if config.num_ch == 0 || config.num_ch > MAX_CHANNELS {
        return Err(RtlsdrErr(format!(
            "Unsupported channel count: {}",
            config.num_ch
        )));
    }

    // Channel i is the device with serial "1000 + i"
    let serials: Vec<String> = (0..config.num_ch)
        .map(|ch| (SERIAL_BASE + ch).to_string())
        .collect();
    let dev_indexes = resolve_devices(config, &serials)?;
    let ctr_channel = resolve_ctr_channel(config, &serials);

    // Static header fields
    let mut header = IqHeader::new();
    header.set_hardware_id(&config.hw_name);
    header.unit_id = config.unit_id;
    header.active_ant_chs = config.num_ch as u32;
    header.ioo_type = config.ioo_type;
    header.rf_center_freq = config.center_freq as u64;
    header.adc_sampling_freq = config.sample_rate as u64;
    header.sampling_freq = config.sample_rate as u64; // overwritten by the decimator
    header.cpi_length = config.daq_buffer_size as u32; // overwritten by the decimator
    header.data_type = DATA_TYPE_IQ;
    header.sample_bit_depth = 8; // RTL2832U
    for ch in 0..config.num_ch {
        header.if_gains[ch] = config.gain as u32;
    }

    let mailbox = Arc::new(ControlMailbox::new());

    // Control thread first; its commands are latched until the loop starts
    let control_handle = {
        let mailbox = mailbox.clone();
        let ch_no = config.num_ch;
        thread::spawn(move || control_task(CONTROL_FIFO, ch_no, &mailbox))
    };

    // SIGINT follows the same orderly path as the halt command
    {
        let mailbox = mailbox.clone();
        if let Err(e) = ctrlc::set_handler(move || mailbox.request_exit()) {
            warn!("Failed to set signal handler: {}", e);
        }
    }

    // Open the receivers
    let params = TunerParams {
        center_freq: config.center_freq,
        sample_rate: config.sample_rate,
        gain: config.gain,
    };
    let mut receivers: Vec<Arc<Receiver>> = Vec::with_capacity(config.num_ch);
    for (ch, &dev_index) in dev_indexes.iter().enumerate() {
        receivers.push(Arc::new(Receiver::open(
            ch,
            dev_index,
            params,
            config.block_bytes(),
        )?));
    }

    // Spawn reader threads behind a common barrier
    let barrier = Arc::new(Barrier::new(config.num_ch));
    let mut reader_handles = Vec::with_capacity(config.num_ch);
    for rec in &receivers {
        let rec = rec.clone();
        let barrier = barrier.clone();
        let mailbox = mailbox.clone();
        reader_handles.push(thread::spawn(move || reader_task(&rec, &barrier, &mailbox)));
    }

    let mut noise = NoiseSourceController::resolve(config, ctr_channel);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = acquisition_loop(
        &mut out,
        &receivers,
        &mailbox,
        &mut noise,
        &mut header,
        config.daq_buffer_size as u32,
    );

    info!("Exiting..");
    mailbox.request_exit();
    shutdown(&receivers, reader_handles, control_handle);
    info!("All the resources are free now");
    result
}

fn shutdown(
    receivers: &[Arc<Receiver>],
    reader_handles: Vec<JoinHandle<()>>,
    control_handle: JoinHandle<()>,
) {
    for rec in receivers {
        rec.cancel_read();
    }
    for handle in reader_handles {
        let _ = handle.join();
    }
    for rec in receivers {
        if let Err(e) = rec.sdr().close() {
            error!("Device close failed at ch {}: {}", rec.ch, e);
        }
    }
    // The control thread may still be parked in a blocking FIFO read (halt
    // by signal rather than by command); feed it the halt byte. The
    // non-blocking open fails instead of hanging when the read side is
    // already gone.
    if !control_handle.is_finished() {
        if let Ok(mut fifo) = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(CONTROL_FIFO)
        {
            let _ = fifo.write_all(&[control::CMD_HALT]);
        }
    }
    let _ = control_handle.join();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iq_header::{HEADER_SIZE, SYNC_WORD};
    use std::io::Cursor;

    #[test]
    fn overdrive_flags_full_scale_only() {
        assert!(!overdriven(&[0x00, 0x7f, 0x80, 0xfe]));
        assert!(overdriven(&[0x10, 0xff, 0x10]));
        // The negative rail is a valid sample, not a clip
        assert!(!overdriven(&[0x00; 16]));
    }

    #[test]
    fn frame_kind_matrix() {
        assert_eq!(FrameKind::classify(true, false), FrameKind::Dummy);
        assert_eq!(FrameKind::classify(true, true), FrameKind::Dummy);
        assert_eq!(FrameKind::classify(false, true), FrameKind::Cal);
        assert_eq!(FrameKind::classify(false, false), FrameKind::Data);
    }

    #[test]
    fn dummy_frames_have_no_cpi() {
        assert_eq!(FrameKind::Dummy.cpi_length(131072), 0);
        assert_eq!(FrameKind::Dummy.data_type(), DATA_TYPE_DUMMY);
        assert_eq!(FrameKind::Data.cpi_length(131072), 131072);
        assert_eq!(FrameKind::Cal.cpi_length(131072), 131072);
        assert_eq!(FrameKind::Cal.data_type(), DATA_TYPE_REAL);
    }

    #[test]
    fn noise_gpio_channel_list() {
        assert_eq!(noise_gpio_channels(4, 0), vec![0]);
        assert_eq!(noise_gpio_channels(4, 2), vec![2]);
        // Two-unit stacks also toggle the second unit's control channel
        assert_eq!(noise_gpio_channels(8, 0), vec![0, 7]);
        assert_eq!(noise_gpio_channels(8, 7), vec![7]);
    }

    fn test_config() -> Config {
        Config {
            num_ch: 4,
            hw_name: "kerberos".to_string(),
            unit_id: 0,
            ioo_type: 0,
            daq_buffer_size: 4,
            sample_rate: 2_400_000,
            center_freq: 140_000_000,
            gain: 200,
            en_noise_source_ctr: true,
            ctr_channel_serial_no: 1002,
            log_level: 2,
        }
    }

    #[test]
    fn ctr_channel_resolution() {
        let config = test_config();
        let serials: Vec<String> = (0..4).map(|ch| (SERIAL_BASE + ch).to_string()).collect();
        assert_eq!(resolve_ctr_channel(&config, &serials), 2);

        let mut missing = test_config();
        missing.ctr_channel_serial_no = 9999;
        assert_eq!(resolve_ctr_channel(&missing, &serials), 0);
    }

    fn filled_rings(block_bytes: usize, blocks: u64) -> Vec<ChannelRing> {
        let rings: Vec<ChannelRing> = (0..2).map(|_| ChannelRing::new(block_bytes)).collect();
        for idx in 0..blocks {
            for (ch, ring) in rings.iter().enumerate() {
                let fill = (0x10 * (ch as u8 + 1)) + idx as u8;
                ring.produce(&vec![fill; block_bytes]);
            }
        }
        rings
    }

    #[test]
    fn data_frame_layout_on_the_wire() {
        let block_bytes = 8;
        let rings = filled_rings(block_bytes, 1);
        let ring_refs: Vec<&ChannelRing> = rings.iter().collect();

        let mut header = IqHeader::new();
        header.active_ant_chs = 2;
        header.cpi_length = (block_bytes / 2) as u32;
        header.frame_type = FrameKind::Data.frame_type();

        let mut wire = Vec::new();
        emit_frame(&mut wire, &header, &ring_refs, 0, FrameKind::Data).unwrap();

        // Header then one block per channel in channel order
        assert_eq!(wire.len(), HEADER_SIZE + 2 * block_bytes);
        let parsed = IqHeader::read_from(&mut Cursor::new(&wire[..HEADER_SIZE])).unwrap();
        assert_eq!(parsed.sync_word, SYNC_WORD);
        assert_eq!(&wire[HEADER_SIZE..HEADER_SIZE + block_bytes], &[0x10; 8]);
        assert_eq!(&wire[HEADER_SIZE + block_bytes..], &[0x20; 8]);
    }

    #[test]
    fn dummy_frame_is_header_only() {
        let rings = filled_rings(8, 1);
        let ring_refs: Vec<&ChannelRing> = rings.iter().collect();

        let mut header = IqHeader::new();
        header.frame_type = FrameKind::Dummy.frame_type();
        header.cpi_length = 0;

        let mut wire = Vec::new();
        emit_frame(&mut wire, &header, &ring_refs, 0, FrameKind::Dummy).unwrap();
        assert_eq!(wire.len(), HEADER_SIZE);
    }

    #[test]
    fn consecutive_frames_walk_the_ring() {
        let block_bytes = 4;
        let rings = filled_rings(block_bytes, 3);
        let ring_refs: Vec<&ChannelRing> = rings.iter().collect();
        let mut header = IqHeader::new();

        let mut wire = Vec::new();
        for idx in 0..3u64 {
            header.daq_block_index = idx as u32;
            emit_frame(&mut wire, &header, &ring_refs, idx, FrameKind::Data).unwrap();
        }
        let frame_len = HEADER_SIZE + 2 * block_bytes;
        assert_eq!(wire.len(), 3 * frame_len);
        for idx in 0..3usize {
            let frame = &wire[idx * frame_len..(idx + 1) * frame_len];
            let parsed = IqHeader::read_from(&mut Cursor::new(&frame[..HEADER_SIZE])).unwrap();
            assert_eq!(parsed.daq_block_index, idx as u32);
            // Channel 0 slot for this block index
            assert_eq!(
                &frame[HEADER_SIZE..HEADER_SIZE + block_bytes],
                &[0x10 + idx as u8; 4]
            );
        }
    }
}

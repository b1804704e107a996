//! Transport Worker Engine
//!
//! One worker streams one direction of a transport:
//!
//! - **Encode**: local PCM source → volume → Bluetooth data channel
//! - **Decode**: Bluetooth data channel → volume → local PCM sink
//!
//! ## Loop
//!
//! ```text
//! Starting → Running ─┬─ wait(signal | pacing deadline | cancel)
//!                     ├─ Open/Resume: reset pacing clock
//!                     ├─ Pause: park (no deadline)
//!                     ├─ deadline: move one batch, advance clock
//!                     └─ Close / peer closed / fatal I/O / cancel → Stopping → Stopped
//! ```
//!
//! The wait select is the only suspension point that reacts to signals or
//! cancellation; batch I/O runs to completion once started. `Stopped` is
//! published by a guard owned by the worker, after its PCM endpoint and data
//! channel have been dropped, on every exit path including the future
//! itself being dropped.

use super::pcm::{PcmEndpoint, PcmFormat, PcmVolume};
use super::signal::{SignalChannel, TransportSignal};
use super::TransportError;
use crate::constants::{MAX_BATCH_SAMPLES, SAMPLE_BYTES};
use core::cell::Cell;
use embassy_futures::select::{Either, Either3, select, select3};
use embassy_sync::{
    blocking_mutex::{Mutex, raw::CriticalSectionRawMutex},
    signal::Signal,
};
use embassy_time::{Instant, Timer};
use embedded_io::{Error as _, ErrorKind};
use embedded_io_async::{Read, Write};

/// Streaming direction of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Local PCM → Bluetooth
    Encode,
    /// Bluetooth → local PCM
    Decode,
}

/// Worker lifecycle, only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WorkerState {
    /// Created, loop not entered
    Starting,
    /// Streaming or parked
    Running,
    /// Loop left, releasing resources
    Stopping,
    /// Resources released
    Stopped,
}

/// Why a worker left its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WorkerExit {
    /// `Close` signal received
    Closed,
    /// The peer closed the data channel
    ChannelClosed,
    /// Cancelled at the wait point
    Cancelled,
    /// Fatal I/O or endpoint failure
    Failed(TransportError),
}

impl WorkerExit {
    /// Whether the data link is gone and a paired worker should stop too
    #[must_use]
    pub const fn ends_link(self) -> bool {
        matches!(self, Self::ChannelClosed | Self::Failed(_))
    }
}

/// Shared, monotonic worker state
pub struct WorkerStatus {
    state: Mutex<CriticalSectionRawMutex, Cell<WorkerState>>,
    stops: Mutex<CriticalSectionRawMutex, Cell<u8>>,
}

impl WorkerStatus {
    /// Status of a worker that has not started
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(WorkerState::Starting)),
            stops: Mutex::new(Cell::new(0)),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state.lock(Cell::get)
    }

    /// How many times `Stopped` has been published
    #[must_use]
    pub fn stop_count(&self) -> u8 {
        self.stops.lock(Cell::get)
    }

    /// Move forward to `next`; returns false if already there or past it
    fn advance(&self, next: WorkerState) -> bool {
        let moved = self.state.lock(|state| {
            if next > state.get() {
                state.set(next);
                true
            } else {
                false
            }
        });
        if moved && next == WorkerState::Stopped {
            self.stops.lock(|stops| stops.set(stops.get().saturating_add(1)));
        }
        moved
    }
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything other tasks share with one worker
///
/// Lives outside the worker future, typically inside a [`Transport`](super::Transport).
pub struct WorkerControl {
    signals: SignalChannel,
    cancel: Signal<CriticalSectionRawMutex, ()>,
    status: WorkerStatus,
    volume: Mutex<CriticalSectionRawMutex, Cell<PcmVolume>>,
}

impl WorkerControl {
    /// Control with an empty signal queue
    #[must_use]
    pub const fn new(volume: PcmVolume) -> Self {
        Self {
            signals: SignalChannel::new(),
            cancel: Signal::new(),
            status: WorkerStatus::new(),
            volume: Mutex::new(Cell::new(volume)),
        }
    }

    /// Post a control signal, see [`SignalChannel::post`]
    ///
    /// # Errors
    /// Returns `TransportError::SignalQueueFull` if the queue is full
    pub fn post(&self, signal: TransportSignal) -> Result<(), TransportError> {
        self.signals.post(signal)
    }

    /// Request cancellation; honoured at the next wait
    pub fn cancel(&self) {
        self.cancel.signal(());
    }

    /// Lifecycle of the worker
    #[must_use]
    pub fn status(&self) -> &WorkerStatus {
        &self.status
    }

    /// Signal queue of the worker
    #[must_use]
    pub fn signals(&self) -> &SignalChannel {
        &self.signals
    }

    /// Change the volume applied from the next batch on
    pub fn set_volume(&self, volume: PcmVolume) {
        self.volume.lock(|cell| cell.set(volume));
    }

    /// Volume applied to the next batch
    #[must_use]
    pub fn volume(&self) -> PcmVolume {
        self.volume.lock(Cell::get)
    }
}

/// Sample-rate pacing clock
///
/// The next deadline is derived from the frames moved since the last reset,
/// so timer jitter never accumulates.
#[derive(Debug, Clone, Copy)]
pub struct RateSync {
    format: PcmFormat,
    start: Instant,
    frames: u64,
}

impl RateSync {
    /// Clock starting now
    #[must_use]
    pub fn new(format: PcmFormat) -> Self {
        Self {
            format,
            start: Instant::now(),
            frames: 0,
        }
    }

    /// Restart the clock at "now"
    pub fn reset(&mut self) {
        self.start = Instant::now();
        self.frames = 0;
    }

    /// Account for frames moved in the current period
    pub fn advance(&mut self, frames: usize) {
        self.frames += frames as u64;
    }

    /// When the next batch is due
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.start + self.format.duration_of(self.frames)
    }

    /// Frames moved since the last reset
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.frames
    }
}

enum Wake {
    Signal(TransportSignal),
    Tick,
    Cancelled,
}

struct StopGuard<'a> {
    control: &'a WorkerControl,
    direction: Direction,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.control.status.advance(WorkerState::Stopping);
        self.control.cancel.reset();
        if self.control.status.advance(WorkerState::Stopped) {
            info!("[WORKER] {:?} stopped", self.direction);
        }
    }
}

/// One direction of a running transport
///
/// The PCM endpoint and data channel are owned by the worker and dropped
/// before `Stopped` is published.
pub struct Worker<'a, P, C> {
    direction: Direction,
    control: &'a WorkerControl,
    format: PcmFormat,
    batch_frames: usize,
    mtu: usize,
    pcm: P,
    channel: C,
    // declared last so it drops after `pcm` and `channel`
    guard: StopGuard<'a>,
}

impl<'a, P, C> Worker<'a, P, C>
where
    P: PcmEndpoint,
    C: Read + Write,
{
    /// Create a worker; `batch_frames` is clamped to the batch buffer and
    /// `mtu` is the write MTU for encode, read MTU for decode
    #[must_use]
    pub fn new(
        direction: Direction,
        control: &'a WorkerControl,
        format: PcmFormat,
        batch_frames: usize,
        mtu: u16,
        pcm: P,
        channel: C,
    ) -> Self {
        let channels = usize::from(format.channels.max(1));
        Self {
            direction,
            control,
            format,
            batch_frames: batch_frames.clamp(1, MAX_BATCH_SAMPLES / channels),
            mtu: usize::from(mtu.max(1)),
            pcm,
            channel,
            guard: StopGuard { control, direction },
        }
    }

    /// Run until closed, cancelled or failed
    pub async fn run(self) -> WorkerExit {
        let Self {
            direction,
            control,
            format,
            batch_frames,
            mtu,
            pcm,
            channel,
            guard,
        } = self;
        let _guard = guard;
        let mut pcm = pcm;
        let mut channel = channel;

        let channels = usize::from(format.channels.max(1));
        let mut samples = [0i16; MAX_BATCH_SAMPLES];
        let mut bytes = [0u8; MAX_BATCH_SAMPLES * SAMPLE_BYTES];
        let mut sync = RateSync::new(format);
        let mut paused = false;

        control.status.advance(WorkerState::Running);
        info!(
            "[WORKER] {:?} running at {=u32} Hz, {=usize} frames per batch",
            direction,
            format.rate,
            batch_frames
        );

        let exit = loop {
            let active = !paused && pcm.is_active();
            let wake = if active {
                match select3(
                    control.signals.recv(),
                    Timer::at(sync.deadline()),
                    control.cancel.wait(),
                )
                .await
                {
                    Either3::First(signal) => Wake::Signal(signal),
                    Either3::Second(()) => Wake::Tick,
                    Either3::Third(()) => Wake::Cancelled,
                }
            } else {
                match select(control.signals.recv(), control.cancel.wait()).await {
                    Either::First(signal) => Wake::Signal(signal),
                    Either::Second(()) => Wake::Cancelled,
                }
            };

            match wake {
                Wake::Signal(TransportSignal::Open | TransportSignal::Resume) => {
                    debug!("[WORKER] {:?} resume", direction);
                    paused = false;
                    sync.reset();
                    continue;
                }
                Wake::Signal(TransportSignal::Pause) => {
                    debug!("[WORKER] {:?} pause", direction);
                    paused = true;
                    continue;
                }
                Wake::Signal(TransportSignal::Close) => break WorkerExit::Closed,
                Wake::Cancelled => break WorkerExit::Cancelled,
                Wake::Tick => {}
            }

            let len = batch_frames * channels;
            let result = match direction {
                Direction::Encode => {
                    encode_batch(
                        &mut pcm,
                        &mut channel,
                        &mut samples[..len],
                        &mut bytes,
                        channels,
                        mtu,
                        control.volume(),
                    )
                    .await
                }
                Direction::Decode => {
                    decode_batch(
                        &mut pcm,
                        &mut channel,
                        &mut samples[..len],
                        &mut bytes,
                        channels,
                        mtu,
                        control.volume(),
                    )
                    .await
                }
            };

            match result {
                Ok(()) => {
                    sync.advance(batch_frames);
                    trace!("[WORKER] {:?} batch, {=u64} frames", direction, sync.frames());
                }
                Err(TransportError::ChannelClosed) => {
                    info!("[WORKER] {:?} channel closed by peer", direction);
                    break WorkerExit::ChannelClosed;
                }
                Err(e) => {
                    error!("[WORKER] {:?} I/O failure: {:?}", direction, e);
                    break WorkerExit::Failed(e);
                }
            }
        };

        control.status.advance(WorkerState::Stopping);
        debug!("[WORKER] {:?} stopping: {:?}", direction, exit);
        exit
    }
}

/// Read one batch from the PCM source and send it, chunked to `mtu`
///
/// A short PCM read is retried; once the source has nothing more the rest
/// of the batch is silence, so the stream keeps its rate.
async fn encode_batch<P: PcmEndpoint, C: Write>(
    pcm: &mut P,
    channel: &mut C,
    samples: &mut [i16],
    bytes: &mut [u8],
    channels: usize,
    mtu: usize,
    volume: PcmVolume,
) -> Result<(), TransportError> {
    let mut filled = 0;
    while filled < samples.len() {
        let frames = pcm.read_frames(&mut samples[filled..]).await?;
        if frames == 0 {
            break;
        }
        filled = (filled + frames * channels).min(samples.len());
    }
    samples[filled..].fill(0);

    volume.scale(samples, channels);

    let bytes = &mut bytes[..samples.len() * SAMPLE_BYTES];
    for (sample, out) in samples.iter().zip(bytes.chunks_exact_mut(SAMPLE_BYTES)) {
        out.copy_from_slice(&sample.to_le_bytes());
    }

    for chunk in bytes.chunks(mtu) {
        write_fully(channel, chunk).await?;
    }
    Ok(())
}

/// Receive one batch from the channel and hand it to the PCM sink
async fn decode_batch<P: PcmEndpoint, C: Read>(
    pcm: &mut P,
    channel: &mut C,
    samples: &mut [i16],
    bytes: &mut [u8],
    channels: usize,
    mtu: usize,
    volume: PcmVolume,
) -> Result<(), TransportError> {
    let bytes = &mut bytes[..samples.len() * SAMPLE_BYTES];
    let mut filled = 0;
    while filled < bytes.len() {
        let end = (filled + mtu).min(bytes.len());
        filled += read_some(channel, &mut bytes[filled..end]).await?;
    }

    for (sample, raw) in samples.iter_mut().zip(bytes.chunks_exact(SAMPLE_BYTES)) {
        *sample = i16::from_le_bytes([raw[0], raw[1]]);
    }

    volume.scale(samples, channels);

    let mut written = 0;
    while written < samples.len() {
        let frames = pcm.write_frames(&samples[written..]).await?;
        if frames == 0 {
            debug!("[WORKER] sink dropped {=usize} samples", samples.len() - written);
            break;
        }
        written += frames * channels;
    }
    Ok(())
}

async fn write_fully<C: Write>(channel: &mut C, mut data: &[u8]) -> Result<(), TransportError> {
    while !data.is_empty() {
        match channel.write(data).await {
            Ok(0) => return Err(TransportError::ChannelClosed),
            Ok(n) => data = &data[n.min(data.len())..],
            Err(e) => match classify(e.kind()) {
                None => continue,
                Some(err) => return Err(err),
            },
        }
    }
    Ok(())
}

async fn read_some<C: Read>(channel: &mut C, buffer: &mut [u8]) -> Result<usize, TransportError> {
    loop {
        match channel.read(buffer).await {
            Ok(0) => return Err(TransportError::ChannelClosed),
            Ok(n) => return Ok(n),
            Err(e) => match classify(e.kind()) {
                None => continue,
                Some(err) => return Err(err),
            },
        }
    }
}

/// Map an I/O error kind; `None` means retry
fn classify(kind: ErrorKind) -> Option<TransportError> {
    match kind {
        ErrorKind::Interrupted => None,
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::NotConnected => {
            Some(TransportError::ChannelClosed)
        }
        _ => Some(TransportError::FatalIo),
    }
}

//! Audio Transport Lifecycle
//!
//! A [`Transport`] is one audio path to a remote [`Device`]: an A2DP stream
//! in one direction, or a SCO link carrying speech both ways.
//!
//! ## Architecture
//!
//! ```text
//! Created ──stream()──▶ Acquiring ──▶ Active ──▶ Stopping ──▶ Destroyed
//!    ▲                      │
//!    └── acquisition failed ┘
//! ```
//!
//! - **Acquisition**: a [`ChannelProvider`] hands over the Bluetooth data
//!   channel(s) and MTUs
//! - **Workers**: one [`Worker`] per direction (A2DP: one, SCO: two), each
//!   with its own [`WorkerControl`]
//! - **Teardown**: `destroy()` posts `Close` to the workers; when one SCO
//!   worker loses its channel, the other is closed as well
//!
//! `stream()` returns once every worker has stopped. Channels are dropped
//! and the device hold is released before the state reaches `Destroyed`.

pub mod pcm;
pub mod signal;
pub mod worker;

pub use pcm::{PcmEndpoint, PcmFormat, PcmVolume};
pub use signal::{SignalChannel, TransportSignal};
pub use worker::{
    Direction, RateSync, Worker, WorkerControl, WorkerExit, WorkerState, WorkerStatus,
};

use crate::a2dp::CodecType;
use crate::constants::{DEFAULT_BATCH_FRAMES, DEFAULT_MTU, HFP_MAX_GAIN};
use crate::device::Device;
use crate::hfp::HfpCodec;
use bt_hci::param::ConnHandle;
use core::cell::Cell;
use embassy_futures::join::join;
use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use embedded_io_async::{Read, Write};

/// Transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// No data channel could be obtained
    AcquisitionFailed,
    /// The peer closed the data channel
    ChannelClosed,
    /// Unexpected I/O failure on the data channel or PCM endpoint
    FatalIo,
    /// Operation not allowed in the current state
    InvalidState,
    /// The worker signal queue is full
    SignalQueueFull,
    /// The profile is not enabled in the transport configuration
    ProfileDisabled,
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AcquisitionFailed => write!(f, "Transport acquisition failed"),
            Self::ChannelClosed => write!(f, "Data channel closed by peer"),
            Self::FatalIo => write!(f, "Fatal transport I/O error"),
            Self::InvalidState => write!(f, "Invalid transport state"),
            Self::SignalQueueFull => write!(f, "Transport signal queue full"),
            Self::ProfileDisabled => write!(f, "Profile not enabled"),
        }
    }
}

/// Bluetooth audio profile and local role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Profile {
    /// A2DP, local audio is sent to the peer
    A2dpSource,
    /// A2DP, peer audio is played locally
    A2dpSink,
    /// HFP audio gateway
    HfpAg,
    /// HFP hands-free unit
    HfpHf,
    /// HSP audio gateway
    HspAg,
    /// HSP headset
    HspHs,
}

impl Profile {
    /// Whether audio flows over a SCO link
    #[must_use]
    pub const fn is_sco(self) -> bool {
        !matches!(self, Self::A2dpSource | Self::A2dpSink)
    }

    /// Directions this profile streams in: `(encode, decode)`
    #[must_use]
    pub const fn directions(self) -> (bool, bool) {
        match self {
            Self::A2dpSource => (true, false),
            Self::A2dpSink => (false, true),
            _ => (true, true),
        }
    }

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Set of enabled profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProfileSet(u8);

impl ProfileSet {
    /// No profile enabled
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every profile enabled
    #[must_use]
    pub const fn all() -> Self {
        Self(0x3F)
    }

    /// Enable a profile
    #[must_use]
    pub const fn with(self, profile: Profile) -> Self {
        Self(self.0 | profile.bit())
    }

    /// Disable a profile
    #[must_use]
    pub const fn without(self, profile: Profile) -> Self {
        Self(self.0 & !profile.bit())
    }

    /// Whether a profile is enabled
    #[must_use]
    pub const fn contains(self, profile: Profile) -> bool {
        (self.0 & profile.bit()) != 0
    }
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self::all()
    }
}

/// Codec carried by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportCodec {
    /// A2DP media codec
    A2dp(CodecType),
    /// SCO speech codec
    Sco(HfpCodec),
}

/// Profile and codec of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportType {
    /// Profile and local role
    pub profile: Profile,
    /// Negotiated codec
    pub codec: TransportCodec,
}

impl TransportType {
    /// A2DP transport type
    #[must_use]
    pub const fn a2dp(profile: Profile, codec: CodecType) -> Self {
        Self {
            profile,
            codec: TransportCodec::A2dp(codec),
        }
    }

    /// SCO transport type
    #[must_use]
    pub const fn sco(profile: Profile, codec: HfpCodec) -> Self {
        Self {
            profile,
            codec: TransportCodec::Sco(codec),
        }
    }
}

/// What a [`ChannelProvider`] needs to know to open the data channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportInfo {
    /// Profile and codec
    pub transport_type: TransportType,
    /// ACL connection of the device
    pub handle: ConnHandle,
    /// PCM format the workers pace at
    pub format: PcmFormat,
}

/// Channels handed over by a successful acquisition
pub struct Acquired<C> {
    /// Channel for the encode direction
    pub encode: Option<C>,
    /// Channel for the decode direction
    pub decode: Option<C>,
    /// Decode direction MTU, `0` if unknown
    pub read_mtu: u16,
    /// Encode direction MTU, `0` if unknown
    pub write_mtu: u16,
}

/// Collaborator that opens Bluetooth data channels
#[allow(async_fn_in_trait)]
pub trait ChannelProvider {
    /// Byte channel carrying encoded audio
    type Channel: Read + Write;

    /// Open the data channel(s) for a transport
    ///
    /// # Errors
    /// Returns `TransportError::AcquisitionFailed` (or another error) when
    /// no channel can be obtained
    async fn acquire(
        &mut self,
        info: &TransportInfo,
    ) -> Result<Acquired<Self::Channel>, TransportError>;
}

/// Transport configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportConfig {
    /// Profiles transports may be created for
    pub profiles: ProfileSet,
    /// PCM frames moved per worker batch
    pub batch_frames: usize,
    /// Initial volume; `None` selects the profile maximum
    pub volume: Option<PcmVolume>,
}

impl TransportConfig {
    /// Set the enabled profiles
    #[must_use]
    pub fn with_profiles(mut self, profiles: ProfileSet) -> Self {
        self.profiles = profiles;
        self
    }

    /// Set the frames per batch
    #[must_use]
    pub fn with_batch_frames(mut self, frames: usize) -> Self {
        self.batch_frames = frames;
        self
    }

    /// Set the initial volume
    #[must_use]
    pub fn with_volume(mut self, volume: PcmVolume) -> Self {
        self.volume = Some(volume);
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            profiles: ProfileSet::all(),
            batch_frames: DEFAULT_BATCH_FRAMES,
            volume: None,
        }
    }
}

/// Transport lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportState {
    /// Not streamed yet
    Created,
    /// Waiting for the data channel(s)
    Acquiring,
    /// Workers running
    Active,
    /// Teardown in progress
    Stopping,
    /// Workers stopped and channels released
    Destroyed,
}

/// How each worker of a finished stream ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamReport {
    /// Encode worker exit, `None` if the profile has no encode direction
    pub encode: Option<WorkerExit>,
    /// Decode worker exit, `None` if the profile has no decode direction
    pub decode: Option<WorkerExit>,
}

type StateCell = Mutex<CriticalSectionRawMutex, Cell<TransportState>>;

/// Settles the state when `stream()` returns or is dropped
struct Settle<'a> {
    state: &'a StateCell,
    acquired: bool,
}

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        self.state.lock(|state| {
            let next = if self.acquired || state.get() == TransportState::Stopping {
                TransportState::Destroyed
            } else {
                TransportState::Created
            };
            state.set(next);
        });
    }
}

/// One audio path to a remote device
pub struct Transport<'a> {
    device: &'a Device,
    info: TransportInfo,
    config: TransportConfig,
    state: StateCell,
    encode: WorkerControl,
    decode: WorkerControl,
}

impl<'a> Transport<'a> {
    /// Create a transport in the `Created` state
    ///
    /// # Errors
    /// Returns `TransportError::ProfileDisabled` if `config` does not enable
    /// the profile of `transport_type`
    pub fn new(
        device: &'a Device,
        handle: ConnHandle,
        transport_type: TransportType,
        format: PcmFormat,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        if !config.profiles.contains(transport_type.profile) {
            warn!("[TRANSPORT] {:?} disabled", transport_type.profile);
            return Err(TransportError::ProfileDisabled);
        }

        let volume = config.volume.unwrap_or(if transport_type.profile.is_sco() {
            PcmVolume::hfp(HFP_MAX_GAIN)
        } else {
            PcmVolume::default()
        });

        Ok(Self {
            device,
            info: TransportInfo {
                transport_type,
                handle,
                format,
            },
            config,
            state: Mutex::new(Cell::new(TransportState::Created)),
            encode: WorkerControl::new(volume),
            decode: WorkerControl::new(volume),
        })
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> TransportState {
        self.state.lock(Cell::get)
    }

    /// Type, connection and format
    #[must_use]
    pub const fn info(&self) -> &TransportInfo {
        &self.info
    }

    /// Configuration the transport was created with
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Device the transport belongs to
    #[must_use]
    pub const fn device(&self) -> &'a Device {
        self.device
    }

    /// Control handle of one direction
    #[must_use]
    pub const fn control(&self, direction: Direction) -> &WorkerControl {
        match direction {
            Direction::Encode => &self.encode,
            Direction::Decode => &self.decode,
        }
    }

    fn controls(&self) -> impl Iterator<Item = &WorkerControl> {
        let (encode, decode) = self.info.transport_type.profile.directions();
        [(encode, &self.encode), (decode, &self.decode)]
            .into_iter()
            .filter_map(|(used, control)| used.then_some(control))
    }

    /// Post a signal to every worker of this transport
    ///
    /// # Errors
    /// Returns the first `TransportError::SignalQueueFull` encountered; the
    /// other workers still receive the signal
    pub fn post(&self, signal: TransportSignal) -> Result<(), TransportError> {
        self.controls()
            .map(|control| control.post(signal))
            .fold(Ok(()), Result::and)
    }

    /// Change the volume of one direction
    pub fn set_volume(&self, direction: Direction, volume: PcmVolume) {
        self.control(direction).set_volume(volume);
    }

    /// Cancel every worker at its next wait
    pub fn cancel(&self) {
        for control in self.controls() {
            control.cancel();
        }
    }

    /// Request teardown
    ///
    /// A transport that never streamed is destroyed at once. Otherwise the
    /// workers are closed and `stream()` finishes the teardown.
    pub fn destroy(&self) {
        let previous = self.state.lock(|state| {
            let previous = state.get();
            match previous {
                TransportState::Created => state.set(TransportState::Destroyed),
                TransportState::Acquiring | TransportState::Active => {
                    state.set(TransportState::Stopping);
                }
                TransportState::Stopping | TransportState::Destroyed => {}
            }
            previous
        });

        if matches!(previous, TransportState::Acquiring | TransportState::Active) {
            info!("[TRANSPORT] destroy requested in {:?}", previous);
            for control in [&self.encode, &self.decode] {
                // Close is latched and cannot fail
                let _ = control.post(TransportSignal::Close);
            }
        }
    }

    fn begin(&self) -> Result<(), TransportError> {
        self.state.lock(|state| {
            if state.get() == TransportState::Created {
                state.set(TransportState::Acquiring);
                Ok(())
            } else {
                Err(TransportError::InvalidState)
            }
        })
    }

    fn activate(&self) -> bool {
        self.state.lock(|state| {
            if state.get() == TransportState::Acquiring {
                state.set(TransportState::Active);
                true
            } else {
                false
            }
        })
    }

    /// Acquire the data channel(s) and stream until every worker stops
    ///
    /// `source` feeds the encode worker and `sink` receives from the decode
    /// worker; the profile decides which of them are required. The device is
    /// held from the start of acquisition until the workers have stopped.
    ///
    /// # Errors
    /// - `TransportError::InvalidState` if the transport is not `Created` or
    ///   a required PCM endpoint is missing
    /// - the provider's error, or `TransportError::AcquisitionFailed` if it
    ///   did not return a channel for a required direction. The transport
    ///   stays `Created` and may be streamed again.
    pub async fn stream<P, S, K>(
        &self,
        provider: &mut P,
        source: Option<S>,
        sink: Option<K>,
    ) -> Result<StreamReport, TransportError>
    where
        P: ChannelProvider,
        S: PcmEndpoint,
        K: PcmEndpoint,
    {
        let (needs_encode, needs_decode) = self.info.transport_type.profile.directions();
        if (needs_encode && source.is_none()) || (needs_decode && sink.is_none()) {
            return Err(TransportError::InvalidState);
        }

        self.begin()?;
        let mut settle = Settle {
            state: &self.state,
            acquired: false,
        };
        let hold = self.device.hold();

        info!(
            "[TRANSPORT] acquiring {:?} on {=u16:#x}",
            self.info.transport_type.profile,
            self.info.handle.raw()
        );
        let acquired = match provider.acquire(&self.info).await {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!("[TRANSPORT] acquisition failed: {}", e);
                return Err(e);
            }
        };

        let Acquired {
            encode,
            decode,
            read_mtu,
            write_mtu,
        } = acquired;
        if (needs_encode && encode.is_none()) || (needs_decode && decode.is_none()) {
            warn!("[TRANSPORT] provider returned no channel for a required direction");
            return Err(TransportError::AcquisitionFailed);
        }
        settle.acquired = true;
        // zero means the provider does not know
        let read_mtu = if read_mtu == 0 { DEFAULT_MTU } else { read_mtu };
        let write_mtu = if write_mtu == 0 { DEFAULT_MTU } else { write_mtu };

        let format = self.info.format;
        let batch = self.config.batch_frames;
        let encode_worker = encode.zip(source).filter(|_| needs_encode).map(|(channel, pcm)| {
            Worker::new(Direction::Encode, &self.encode, format, batch, write_mtu, pcm, channel)
        });
        let decode_worker = decode.zip(sink).filter(|_| needs_decode).map(|(channel, pcm)| {
            Worker::new(Direction::Decode, &self.decode, format, batch, read_mtu, pcm, channel)
        });

        if !self.activate() {
            info!("[TRANSPORT] destroyed while acquiring");
            return Ok(StreamReport::default());
        }
        info!(
            "[TRANSPORT] active, mtu {=u16}/{=u16}",
            read_mtu,
            write_mtu
        );

        let encode_run = async {
            let exit = encode_worker?.run().await;
            if exit.ends_link() {
                let _ = self.decode.post(TransportSignal::Close);
            }
            Some(exit)
        };
        let decode_run = async {
            let exit = decode_worker?.run().await;
            if exit.ends_link() {
                let _ = self.encode.post(TransportSignal::Close);
            }
            Some(exit)
        };
        let (encode, decode) = join(encode_run, decode_run).await;

        self.state.lock(|state| state.set(TransportState::Stopping));
        debug!("[TRANSPORT] workers stopped: {:?} {:?}", encode, decode);
        drop(hold);
        drop(settle);
        info!("[TRANSPORT] destroyed");

        Ok(StreamReport { encode, decode })
    }
}

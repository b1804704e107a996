//! `Warbler` Constants
//!
//! Limits, default values and Bluetooth profile parameters used throughout the
//! library. Capacities are compile-time constants because every collection in
//! the crate is a fixed-size `heapless` container.

/// Maximum length of an AT command name (`BRSF`, `CIND`, `VGS`, ...)
pub const AT_NAME_CAPACITY: usize = 32;

/// Maximum length of an AT command value payload
pub const AT_VALUE_CAPACITY: usize = 256;

/// Size of the buffer used to render one outgoing AT message
pub const AT_MESSAGE_CAPACITY: usize = 300;

/// Maximum number of indicators a `+CIND` test response may describe
pub const MAX_INDICATORS: usize = 20;

/// Number of indicator kinds the codec recognises (service .. battchg)
pub const INDICATOR_KINDS: usize = 7;

/// Number of parameters carried by `AT+CMER`
pub const CMER_PARAMETERS: usize = 5;

/// Depth of the per-worker control signal queue (`Close` is latched separately)
pub const SIGNAL_QUEUE_DEPTH: usize = 8;

/// Default number of PCM frames moved per worker batch
pub const DEFAULT_BATCH_FRAMES: usize = 256;

/// Upper bound on interleaved samples a worker batch may hold
pub const MAX_BATCH_SAMPLES: usize = 2048;

/// Size of one PCM sample on the wire (signed 16-bit little endian)
pub const SAMPLE_BYTES: usize = 2;

/// Maximum number of codecs a peer may list in `AT+BAC`
pub const MAX_PEER_CODECS: usize = 4;

/// Maximum number of replies the service level session emits per command
pub const MAX_REPLIES: usize = 4;

/// Sampling rate of a CVSD SCO link
pub const CVSD_SAMPLE_RATE: u32 = 8_000;

/// Sampling rate of an mSBC (wide band speech) SCO link
pub const MSBC_SAMPLE_RATE: u32 = 16_000;

/// Maximum HFP speaker/microphone gain (`AT+VGS`, `AT+VGM`)
pub const HFP_MAX_GAIN: u8 = 15;

/// Maximum A2DP absolute volume
pub const A2DP_MAX_VOLUME: u8 = 127;

/// HSP button press code sent with `AT+CKPD`
pub const HSP_BUTTON_PRESS: u16 = 200;

/// Default read/write MTU assumed for a freshly acquired channel
pub const DEFAULT_MTU: u16 = 256;

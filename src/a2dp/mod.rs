//! A2DP Stream Configuration
//!
//! A2DP media streams are configured through AVDTP codec information
//! elements. This module decodes the SBC element into the PCM format a
//! transport worker paces at.
//!
//! ## Architecture
//!
//! - **Codec IDs**: [`CodecType`] as carried in the AVDTP media codec capability
//! - **SBC**: capability bitfields, configuration selection and decoding
//!
//! ## Usage
//!
//! ```rust
//! use warbler::a2dp::{SbcCapabilities, SbcConfiguration};
//!
//! let config = SbcConfiguration::select(&SbcCapabilities::default(), &SbcCapabilities::high_quality()).unwrap();
//! let format = config.pcm_format().unwrap();
//! assert_eq!((format.rate, format.channels), (48_000, 2));
//! ```

pub mod codec;

pub use codec::{
    CodecType, SbcAllocationMethod, SbcBlockLength, SbcCapabilities, SbcChannelMode,
    SbcConfiguration, SbcSamplingFrequency, SbcSubbands,
};

/// A2DP Errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum A2dpError {
    /// Codec not supported
    UnsupportedCodec,
    /// Codec information element is malformed or selects nothing
    InvalidConfiguration,
    /// No configuration satisfies both capability sets
    NoCommonConfiguration,
    /// Buffer too small for the codec information element
    BufferTooSmall,
}

impl core::fmt::Display for A2dpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnsupportedCodec => write!(f, "Codec not supported"),
            Self::InvalidConfiguration => write!(f, "Invalid codec configuration"),
            Self::NoCommonConfiguration => write!(f, "No common codec configuration"),
            Self::BufferTooSmall => write!(f, "Buffer too small"),
        }
    }
}

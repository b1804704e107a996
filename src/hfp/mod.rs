//! HFP / HSP Control Link
//!
//! Hands-Free and Headset profiles negotiate audio over an RFCOMM channel
//! carrying AT commands (see [`crate::at`]). The audio itself flows over a
//! SCO link whose codec is chosen here.
//!
//! ## Architecture
//!
//! - **Features**: `AT+BRSF` feature bitmasks for both roles
//! - **Codecs**: CVSD (narrow band) and mSBC (wide band speech)
//! - **Session**: [`ServiceLevel`] drives the service level connection
//!   (SLC) from either role and reports [`SessionEvent`]s
//!
//! ## Usage
//!
//! ```rust
//! use warbler::at;
//! use warbler::hfp::{ServiceLevel, ServiceLevelConfig, SlcState};
//!
//! let mut session = ServiceLevel::new(ServiceLevelConfig::audio_gateway());
//! session.connect();
//! let outcome = session.handle(&at::parse("AT+BRSF=4095\r"));
//! assert_eq!(outcome.replies.len(), 2);
//! assert_eq!(session.state(), SlcState::Brsf);
//! ```

pub mod session;

pub use session::{Outcome, ServiceLevel, ServiceLevelConfig, SessionEvent};

use crate::constants::{CVSD_SAMPLE_RATE, MSBC_SAMPLE_RATE};
use crate::transport::PcmFormat;

/// SCO audio codec, identified by its `AT+BCS` codec ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HfpCodec {
    /// Mandatory narrow band codec, 8 kHz
    Cvsd = 0x01,
    /// Wide band speech, 16 kHz
    Msbc = 0x02,
}

impl HfpCodec {
    /// Look up a codec by its ID
    #[must_use]
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            0x01 => Some(Self::Cvsd),
            0x02 => Some(Self::Msbc),
            _ => None,
        }
    }

    /// Codec ID used in `AT+BAC` and `+BCS`
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// PCM format of the decoded SCO stream
    #[must_use]
    pub const fn pcm_format(self) -> PcmFormat {
        match self {
            Self::Cvsd => PcmFormat::mono(CVSD_SAMPLE_RATE),
            Self::Msbc => PcmFormat::mono(MSBC_SAMPLE_RATE),
        }
    }
}

/// Local role on the control link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Audio gateway (phone side)
    AudioGateway,
    /// Hands-free unit or headset
    HandsFree,
}

/// Service level connection progress
///
/// The HF role walks every step; the AG role jumps to the step matching the
/// last command it answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlcState {
    /// No RFCOMM link
    Disconnected,
    /// RFCOMM link up, nothing exchanged
    Connected,
    /// Supported features exchanged
    Brsf,
    /// Available codecs listed
    Bac,
    /// Indicator map exchanged
    CindTest,
    /// Indicator values exchanged
    Cind,
    /// Event reporting enabled
    Cmer,
    /// Service level connection established
    SlcConnected,
}

/// Audio gateway supported features (`+BRSF`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AgFeatures(pub u32);

impl AgFeatures {
    /// Three-way calling
    pub const THREE_WAY_CALLING: u32 = 1 << 0;
    /// Echo cancelling and noise reduction
    pub const EC_NR: u32 = 1 << 1;
    /// Voice recognition
    pub const VOICE_RECOGNITION: u32 = 1 << 2;
    /// In-band ring tone
    pub const IN_BAND_RING: u32 = 1 << 3;
    /// Attach a number to a voice tag
    pub const VOICE_TAG: u32 = 1 << 4;
    /// Reject a call
    pub const REJECT_CALL: u32 = 1 << 5;
    /// Enhanced call status
    pub const ENHANCED_CALL_STATUS: u32 = 1 << 6;
    /// Enhanced call control
    pub const ENHANCED_CALL_CONTROL: u32 = 1 << 7;
    /// Extended error result codes
    pub const EXTENDED_ERROR_CODES: u32 = 1 << 8;
    /// Codec negotiation
    pub const CODEC_NEGOTIATION: u32 = 1 << 9;
    /// HF indicators
    pub const HF_INDICATORS: u32 = 1 << 10;
    /// eSCO S4 settings
    pub const ESCO_S4: u32 = 1 << 11;

    /// Check if a feature bit is set
    #[must_use]
    pub const fn supports(&self, feature: u32) -> bool {
        (self.0 & feature) != 0
    }
}

/// Hands-free supported features (`AT+BRSF`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HfFeatures(pub u32);

impl HfFeatures {
    /// Echo cancelling and noise reduction
    pub const EC_NR: u32 = 1 << 0;
    /// Three-way calling
    pub const THREE_WAY_CALLING: u32 = 1 << 1;
    /// Calling line identification
    pub const CLI_PRESENTATION: u32 = 1 << 2;
    /// Voice recognition activation
    pub const VOICE_RECOGNITION: u32 = 1 << 3;
    /// Remote volume control
    pub const REMOTE_VOLUME: u32 = 1 << 4;
    /// Enhanced call status
    pub const ENHANCED_CALL_STATUS: u32 = 1 << 5;
    /// Enhanced call control
    pub const ENHANCED_CALL_CONTROL: u32 = 1 << 6;
    /// Codec negotiation
    pub const CODEC_NEGOTIATION: u32 = 1 << 7;
    /// HF indicators
    pub const HF_INDICATORS: u32 = 1 << 8;
    /// eSCO S4 settings
    pub const ESCO_S4: u32 = 1 << 9;

    /// Check if a feature bit is set
    #[must_use]
    pub const fn supports(&self, feature: u32) -> bool {
        (self.0 & feature) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_ids() {
        assert_eq!(HfpCodec::from_id(1), Some(HfpCodec::Cvsd));
        assert_eq!(HfpCodec::from_id(2), Some(HfpCodec::Msbc));
        assert_eq!(HfpCodec::from_id(3), None);
        assert_eq!(HfpCodec::Msbc.id(), 2);
    }

    #[test]
    fn test_codec_formats() {
        assert_eq!(HfpCodec::Cvsd.pcm_format(), PcmFormat::mono(8_000));
        assert_eq!(HfpCodec::Msbc.pcm_format(), PcmFormat::mono(16_000));
    }

    #[test]
    fn test_feature_bits() {
        let ag = AgFeatures(AgFeatures::CODEC_NEGOTIATION | AgFeatures::EC_NR);
        assert!(ag.supports(AgFeatures::CODEC_NEGOTIATION));
        assert!(!ag.supports(AgFeatures::IN_BAND_RING));

        let hf = HfFeatures(HfFeatures::REMOTE_VOLUME);
        assert!(hf.supports(HfFeatures::REMOTE_VOLUME));
        assert!(!hf.supports(HfFeatures::CODEC_NEGOTIATION));
    }
}

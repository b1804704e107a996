//! A2DP codec identifiers and the SBC information element
//!
//! The SBC element is four octets on the wire:
//!
//! ```text
//! octet 0: sampling frequency (7..4) | channel mode (3..0)
//! octet 1: block length (7..4) | subbands (3..2) | allocation method (1..0)
//! octet 2: minimum bitpool
//! octet 3: maximum bitpool
//! ```
//!
//! Capabilities may set several bits per field; a configuration sets exactly
//! one.

use super::A2dpError;
use crate::transport::PcmFormat;

/// Media codec type of the AVDTP codec capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CodecType {
    /// SBC (Sub-Band Coding), mandatory for A2DP
    Sbc = 0x00,
    /// MPEG-1,2 Audio
    Mpeg12Audio = 0x01,
    /// MPEG-2,4 AAC
    Mpeg24Aac = 0x02,
    /// ATRAC family
    Atrac = 0x04,
    /// Vendor codec (aptX, LDAC, ...), identified inside the element
    VendorSpecific = 0xFF,
}

impl CodecType {
    /// Look up a codec type by its identifier
    ///
    /// # Errors
    /// Returns `A2dpError::UnsupportedCodec` for unassigned identifiers
    pub const fn from_id(id: u8) -> Result<Self, A2dpError> {
        match id {
            0x00 => Ok(Self::Sbc),
            0x01 => Ok(Self::Mpeg12Audio),
            0x02 => Ok(Self::Mpeg24Aac),
            0x04 => Ok(Self::Atrac),
            0xFF => Ok(Self::VendorSpecific),
            _ => Err(A2dpError::UnsupportedCodec),
        }
    }

    /// Identifier carried in the codec capability
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }
}

/// SBC sampling frequency bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcSamplingFrequency(pub u8);

impl SbcSamplingFrequency {
    /// 16 kHz
    pub const HZ_16000: u8 = 0x08;
    /// 32 kHz
    pub const HZ_32000: u8 = 0x04;
    /// 44.1 kHz
    pub const HZ_44100: u8 = 0x02;
    /// 48 kHz
    pub const HZ_48000: u8 = 0x01;

    /// Every option set
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::HZ_16000 | Self::HZ_32000 | Self::HZ_44100 | Self::HZ_48000)
    }

    /// 44.1 kHz and 48 kHz
    #[must_use]
    pub const fn standard() -> Self {
        Self(Self::HZ_44100 | Self::HZ_48000)
    }

    /// Check if an option bit is set
    #[must_use]
    pub const fn supports(&self, freq: u8) -> bool {
        (self.0 & freq) != 0
    }

    /// Rate in Hz of a single selected bit
    #[must_use]
    pub const fn rate(&self) -> Option<u32> {
        match self.0 {
            Self::HZ_16000 => Some(16_000),
            Self::HZ_32000 => Some(32_000),
            Self::HZ_44100 => Some(44_100),
            Self::HZ_48000 => Some(48_000),
            _ => None,
        }
    }
}

/// SBC channel mode bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcChannelMode(pub u8);

impl SbcChannelMode {
    /// Mono
    pub const MONO: u8 = 0x08;
    /// Dual channel
    pub const DUAL_CHANNEL: u8 = 0x04;
    /// Stereo
    pub const STEREO: u8 = 0x02;
    /// Joint stereo
    pub const JOINT_STEREO: u8 = 0x01;

    /// Every option set
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::MONO | Self::DUAL_CHANNEL | Self::STEREO | Self::JOINT_STEREO)
    }

    /// Stereo and joint stereo
    #[must_use]
    pub const fn stereo() -> Self {
        Self(Self::STEREO | Self::JOINT_STEREO)
    }

    /// Check if an option bit is set
    #[must_use]
    pub const fn supports(&self, mode: u8) -> bool {
        (self.0 & mode) != 0
    }

    /// PCM channel count of a single selected bit
    #[must_use]
    pub const fn channels(&self) -> Option<u8> {
        match self.0 {
            Self::MONO => Some(1),
            Self::DUAL_CHANNEL | Self::STEREO | Self::JOINT_STEREO => Some(2),
            _ => None,
        }
    }
}

/// SBC block length bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcBlockLength(pub u8);

impl SbcBlockLength {
    /// 4 blocks
    pub const BLOCKS_4: u8 = 0x08;
    /// 8 blocks
    pub const BLOCKS_8: u8 = 0x04;
    /// 12 blocks
    pub const BLOCKS_12: u8 = 0x02;
    /// 16 blocks
    pub const BLOCKS_16: u8 = 0x01;

    /// Every option set
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::BLOCKS_4 | Self::BLOCKS_8 | Self::BLOCKS_12 | Self::BLOCKS_16)
    }

    /// Check if an option bit is set
    #[must_use]
    pub const fn supports(&self, blocks: u8) -> bool {
        (self.0 & blocks) != 0
    }
}

/// SBC subband bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcSubbands(pub u8);

impl SbcSubbands {
    /// 4 subbands
    pub const SUBBANDS_4: u8 = 0x02;
    /// 8 subbands
    pub const SUBBANDS_8: u8 = 0x01;

    /// Every option set
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::SUBBANDS_4 | Self::SUBBANDS_8)
    }

    /// Check if an option bit is set
    #[must_use]
    pub const fn supports(&self, subbands: u8) -> bool {
        (self.0 & subbands) != 0
    }
}

/// SBC allocation method bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcAllocationMethod(pub u8);

impl SbcAllocationMethod {
    /// SNR allocation
    pub const SNR: u8 = 0x02;
    /// Loudness allocation
    pub const LOUDNESS: u8 = 0x01;

    /// Every option set
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::SNR | Self::LOUDNESS)
    }

    /// Check if an option bit is set
    #[must_use]
    pub const fn supports(&self, method: u8) -> bool {
        (self.0 & method) != 0
    }
}

/// SBC capability or configuration element
///
/// The same layout serves both; [`SbcConfiguration`] wraps one with a single
/// bit per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcCapabilities {
    /// Sampling frequency bits
    pub sampling_frequencies: SbcSamplingFrequency,
    /// Channel mode bits
    pub channel_modes: SbcChannelMode,
    /// Block length bits
    pub block_lengths: SbcBlockLength,
    /// Subband bits
    pub subbands: SbcSubbands,
    /// Allocation method bits
    pub allocation_methods: SbcAllocationMethod,
    /// Minimum bitpool value (2-250)
    pub min_bitpool: u8,
    /// Maximum bitpool value (2-250)
    pub max_bitpool: u8,
}

impl SbcCapabilities {
    /// Encoded size of the element
    pub const LENGTH: usize = 4;

    /// Stereo at 44.1/48 kHz, 16 blocks of 8 subbands, loudness allocation
    #[must_use]
    pub const fn high_quality() -> Self {
        Self {
            sampling_frequencies: SbcSamplingFrequency::standard(),
            channel_modes: SbcChannelMode::stereo(),
            block_lengths: SbcBlockLength(SbcBlockLength::BLOCKS_16),
            subbands: SbcSubbands(SbcSubbands::SUBBANDS_8),
            allocation_methods: SbcAllocationMethod(SbcAllocationMethod::LOUDNESS),
            min_bitpool: 2,
            max_bitpool: 53,
        }
    }

    /// Check the bitpool range and that every field offers something
    ///
    /// # Errors
    /// Returns `A2dpError::InvalidConfiguration` otherwise
    pub const fn validate(&self) -> Result<(), A2dpError> {
        if self.min_bitpool < 2 || self.max_bitpool > 250 || self.min_bitpool > self.max_bitpool {
            return Err(A2dpError::InvalidConfiguration);
        }
        if self.sampling_frequencies.0 == 0
            || self.channel_modes.0 == 0
            || self.block_lengths.0 == 0
            || self.subbands.0 == 0
            || self.allocation_methods.0 == 0
        {
            return Err(A2dpError::InvalidConfiguration);
        }
        Ok(())
    }

    /// Decode the four-octet element
    ///
    /// # Errors
    /// Returns `A2dpError::InvalidConfiguration` if `data` is too short
    pub const fn decode(data: &[u8]) -> Result<Self, A2dpError> {
        if data.len() < Self::LENGTH {
            return Err(A2dpError::InvalidConfiguration);
        }
        Ok(Self {
            sampling_frequencies: SbcSamplingFrequency(data[0] >> 4),
            channel_modes: SbcChannelMode(data[0] & 0x0F),
            block_lengths: SbcBlockLength(data[1] >> 4),
            subbands: SbcSubbands((data[1] >> 2) & 0x03),
            allocation_methods: SbcAllocationMethod(data[1] & 0x03),
            min_bitpool: data[2],
            max_bitpool: data[3],
        })
    }

    /// Encode into `buffer`, returning the length written
    ///
    /// # Errors
    /// Returns `A2dpError::BufferTooSmall` if `buffer` is shorter than
    /// [`Self::LENGTH`]
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, A2dpError> {
        let out = buffer
            .get_mut(..Self::LENGTH)
            .ok_or(A2dpError::BufferTooSmall)?;
        out[0] = (self.sampling_frequencies.0 << 4) | (self.channel_modes.0 & 0x0F);
        out[1] = (self.block_lengths.0 << 4)
            | ((self.subbands.0 & 0x03) << 2)
            | (self.allocation_methods.0 & 0x03);
        out[2] = self.min_bitpool;
        out[3] = self.max_bitpool;
        Ok(Self::LENGTH)
    }

    /// Whether any configuration satisfies both capability sets
    #[must_use]
    pub const fn is_compatible_with(&self, other: &Self) -> bool {
        (self.sampling_frequencies.0 & other.sampling_frequencies.0) != 0
            && (self.channel_modes.0 & other.channel_modes.0) != 0
            && (self.block_lengths.0 & other.block_lengths.0) != 0
            && (self.subbands.0 & other.subbands.0) != 0
            && (self.allocation_methods.0 & other.allocation_methods.0) != 0
            && self.max_bitpool >= other.min_bitpool
            && self.min_bitpool <= other.max_bitpool
    }
}

impl Default for SbcCapabilities {
    fn default() -> Self {
        Self {
            sampling_frequencies: SbcSamplingFrequency::all(),
            channel_modes: SbcChannelMode::all(),
            block_lengths: SbcBlockLength::all(),
            subbands: SbcSubbands::all(),
            allocation_methods: SbcAllocationMethod::all(),
            min_bitpool: 2,
            max_bitpool: 250,
        }
    }
}

/// A single SBC configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcConfiguration(SbcCapabilities);

/// Pick the first bit of `order` present in `mask`
fn pick(mask: u8, order: &[u8]) -> Option<u8> {
    order.iter().copied().find(|bit| mask & bit != 0)
}

impl SbcConfiguration {
    /// Wrap an element, checking that it selects exactly one option per field
    ///
    /// # Errors
    /// Returns `A2dpError::InvalidConfiguration` otherwise
    pub fn new(element: SbcCapabilities) -> Result<Self, A2dpError> {
        element.validate()?;
        let single = [
            element.sampling_frequencies.0,
            element.channel_modes.0,
            element.block_lengths.0,
            element.subbands.0,
            element.allocation_methods.0,
        ]
        .iter()
        .all(|bits| bits.count_ones() == 1);
        if !single {
            return Err(A2dpError::InvalidConfiguration);
        }
        Ok(Self(element))
    }

    /// Decode a configuration element received from the peer
    ///
    /// # Errors
    /// Returns `A2dpError::InvalidConfiguration` for a short or ambiguous
    /// element
    pub fn decode(data: &[u8]) -> Result<Self, A2dpError> {
        Self::new(SbcCapabilities::decode(data)?)
    }

    /// Choose the best configuration both sides support
    ///
    /// Preference: 48 kHz over 44.1 kHz over lower rates, joint stereo over
    /// stereo over dual channel over mono, 16 blocks, 8 subbands, loudness.
    ///
    /// # Errors
    /// Returns `A2dpError::NoCommonConfiguration` if no field overlaps
    pub fn select(local: &SbcCapabilities, peer: &SbcCapabilities) -> Result<Self, A2dpError> {
        let no_match = A2dpError::NoCommonConfiguration;
        let frequency = pick(
            local.sampling_frequencies.0 & peer.sampling_frequencies.0,
            &[
                SbcSamplingFrequency::HZ_48000,
                SbcSamplingFrequency::HZ_44100,
                SbcSamplingFrequency::HZ_32000,
                SbcSamplingFrequency::HZ_16000,
            ],
        )
        .ok_or(no_match)?;
        let mode = pick(
            local.channel_modes.0 & peer.channel_modes.0,
            &[
                SbcChannelMode::JOINT_STEREO,
                SbcChannelMode::STEREO,
                SbcChannelMode::DUAL_CHANNEL,
                SbcChannelMode::MONO,
            ],
        )
        .ok_or(no_match)?;
        let blocks = pick(
            local.block_lengths.0 & peer.block_lengths.0,
            &[
                SbcBlockLength::BLOCKS_16,
                SbcBlockLength::BLOCKS_12,
                SbcBlockLength::BLOCKS_8,
                SbcBlockLength::BLOCKS_4,
            ],
        )
        .ok_or(no_match)?;
        let subbands = pick(
            local.subbands.0 & peer.subbands.0,
            &[SbcSubbands::SUBBANDS_8, SbcSubbands::SUBBANDS_4],
        )
        .ok_or(no_match)?;
        let allocation = pick(
            local.allocation_methods.0 & peer.allocation_methods.0,
            &[SbcAllocationMethod::LOUDNESS, SbcAllocationMethod::SNR],
        )
        .ok_or(no_match)?;

        let min_bitpool = local.min_bitpool.max(peer.min_bitpool);
        let max_bitpool = local.max_bitpool.min(peer.max_bitpool);
        if min_bitpool > max_bitpool {
            return Err(no_match);
        }

        let config = Self::new(SbcCapabilities {
            sampling_frequencies: SbcSamplingFrequency(frequency),
            channel_modes: SbcChannelMode(mode),
            block_lengths: SbcBlockLength(blocks),
            subbands: SbcSubbands(subbands),
            allocation_methods: SbcAllocationMethod(allocation),
            min_bitpool,
            max_bitpool,
        })
        .map_err(|_| no_match)?;
        debug!("[A2DP] selected SBC configuration {:?}", config);
        Ok(config)
    }

    /// The underlying element
    #[must_use]
    pub const fn element(&self) -> &SbcCapabilities {
        &self.0
    }

    /// PCM format of the decoded stream
    ///
    /// # Errors
    /// Returns `A2dpError::InvalidConfiguration` if a field has no single bit
    pub const fn pcm_format(&self) -> Result<PcmFormat, A2dpError> {
        match (
            self.0.sampling_frequencies.rate(),
            self.0.channel_modes.channels(),
        ) {
            (Some(rate), Some(channels)) => Ok(PcmFormat::new(rate, channels)),
            _ => Err(A2dpError::InvalidConfiguration),
        }
    }

    /// Encode into `buffer`, see [`SbcCapabilities::encode`]
    ///
    /// # Errors
    /// Returns `A2dpError::BufferTooSmall` if `buffer` is too short
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, A2dpError> {
        self.0.encode(buffer)
    }
}

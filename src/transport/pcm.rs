//! Local PCM endpoint contract, stream format and volume scaling

use super::TransportError;
use crate::constants::{A2DP_MAX_VOLUME, HFP_MAX_GAIN};
use embassy_time::Duration;

/// Local audio source or sink
///
/// Samples are signed 16-bit, interleaved by channel. Counts passed in and
/// returned are in frames (one sample per channel). Callers post
/// `TransportSignal::Open` to the worker when the endpoint becomes active.
#[allow(async_fn_in_trait)]
pub trait PcmEndpoint {
    /// Whether a local client is attached and streaming
    fn is_active(&self) -> bool;

    /// Read up to `samples.len() / channels` frames
    ///
    /// Returns the number of frames read; `0` means the source has nothing
    /// more for this batch.
    ///
    /// # Errors
    /// Any error ends the worker
    async fn read_frames(&mut self, samples: &mut [i16]) -> Result<usize, TransportError>;

    /// Write the interleaved frames in `samples`
    ///
    /// Returns the number of frames accepted; `0` means the sink dropped the
    /// remainder.
    ///
    /// # Errors
    /// Any error ends the worker
    async fn write_frames(&mut self, samples: &[i16]) -> Result<usize, TransportError>;
}

/// Rate and channel count the worker paces at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PcmFormat {
    /// Frames per second
    pub rate: u32,
    /// Interleaved channels (1 or 2)
    pub channels: u8,
}

impl PcmFormat {
    /// Format from rate and channel count
    #[must_use]
    pub const fn new(rate: u32, channels: u8) -> Self {
        Self { rate, channels }
    }

    /// Single channel format
    #[must_use]
    pub const fn mono(rate: u32) -> Self {
        Self::new(rate, 1)
    }

    /// Two channel format
    #[must_use]
    pub const fn stereo(rate: u32) -> Self {
        Self::new(rate, 2)
    }

    /// Bytes of one frame on the wire
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        self.channels as usize * crate::constants::SAMPLE_BYTES
    }

    /// Nominal playback time of `frames` frames
    #[must_use]
    pub const fn duration_of(&self, frames: u64) -> Duration {
        if self.rate == 0 {
            return Duration::from_ticks(0);
        }
        Duration::from_micros(frames * 1_000_000 / self.rate as u64)
    }
}

/// Per-channel software volume
///
/// Levels are in the range of the owning profile: HFP gain `0..=15` or A2DP
/// absolute volume `0..=127`. The maximum level passes samples through
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PcmVolume {
    levels: [u8; 2],
    muted: [bool; 2],
    max: u8,
}

impl PcmVolume {
    /// HFP speaker/microphone gain
    #[must_use]
    pub const fn hfp(gain: u8) -> Self {
        let gain = if gain > HFP_MAX_GAIN { HFP_MAX_GAIN } else { gain };
        Self {
            levels: [gain; 2],
            muted: [false; 2],
            max: HFP_MAX_GAIN,
        }
    }

    /// A2DP absolute volume
    #[must_use]
    pub const fn a2dp(volume: u8) -> Self {
        let volume = if volume > A2DP_MAX_VOLUME {
            A2DP_MAX_VOLUME
        } else {
            volume
        };
        Self {
            levels: [volume; 2],
            muted: [false; 2],
            max: A2DP_MAX_VOLUME,
        }
    }

    /// Set the level of one channel, clamped to the profile range
    #[must_use]
    pub fn with_level(mut self, channel: usize, level: u8) -> Self {
        if let Some(slot) = self.levels.get_mut(channel) {
            *slot = level.min(self.max);
        }
        self
    }

    /// Set the level of every channel
    #[must_use]
    pub fn with_levels(mut self, level: u8) -> Self {
        self.levels = [level.min(self.max); 2];
        self
    }

    /// Mute or unmute one channel
    #[must_use]
    pub fn with_mute(mut self, channel: usize, muted: bool) -> Self {
        if let Some(slot) = self.muted.get_mut(channel) {
            *slot = muted;
        }
        self
    }

    /// Level of one channel
    #[must_use]
    pub fn level(&self, channel: usize) -> u8 {
        self.levels.get(channel).copied().unwrap_or(self.max)
    }

    /// Maximum level of the profile range
    #[must_use]
    pub const fn max(&self) -> u8 {
        self.max
    }

    /// Whether one channel is muted
    #[must_use]
    pub fn is_muted(&self, channel: usize) -> bool {
        self.muted.get(channel).copied().unwrap_or(false)
    }

    fn is_unity(&self) -> bool {
        self.levels == [self.max; 2] && self.muted == [false; 2]
    }

    /// Scale interleaved samples in place
    pub fn scale(&self, samples: &mut [i16], channels: usize) {
        if self.is_unity() || channels == 0 || self.max == 0 {
            return;
        }
        for frame in samples.chunks_mut(channels) {
            for (channel, sample) in frame.iter_mut().enumerate() {
                // mono streams follow the first channel
                let channel = channel.min(1);
                *sample = if self.muted[channel] {
                    0
                } else {
                    let scaled = i32::from(*sample) * i32::from(self.levels[channel])
                        / i32::from(self.max);
                    // |scaled| <= |sample|
                    scaled as i16
                };
            }
        }
    }
}

impl Default for PcmVolume {
    fn default() -> Self {
        Self::a2dp(A2DP_MAX_VOLUME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        let format = PcmFormat::mono(16_000);
        assert_eq!(format.duration_of(160), Duration::from_millis(10));
        assert_eq!(format.frame_bytes(), 2);

        let stereo = PcmFormat::stereo(48_000);
        assert_eq!(stereo.duration_of(480), Duration::from_millis(10));
        assert_eq!(stereo.frame_bytes(), 4);
    }

    #[test]
    fn test_unity_volume_is_passthrough() {
        let mut samples = [i16::MIN, -1, 0, 1, i16::MAX];
        PcmVolume::hfp(HFP_MAX_GAIN).scale(&mut samples, 1);
        assert_eq!(samples, [i16::MIN, -1, 0, 1, i16::MAX]);
    }

    #[test]
    fn test_volume_scales_per_channel() {
        let volume = PcmVolume::a2dp(A2DP_MAX_VOLUME).with_level(1, 0);
        let mut samples = [1000, 1000, -1000, -1000];
        volume.scale(&mut samples, 2);
        assert_eq!(samples, [1000, 0, -1000, 0]);
    }

    #[test]
    fn test_volume_mute() {
        let volume = PcmVolume::hfp(15).with_mute(0, true);
        let mut samples = [1234, -1234];
        volume.scale(&mut samples, 1);
        assert_eq!(samples, [0, 0]);
        assert!(volume.is_muted(0));
    }

    #[test]
    fn test_volume_clamps_to_profile_range() {
        assert_eq!(PcmVolume::hfp(40).level(0), HFP_MAX_GAIN);
        assert_eq!(PcmVolume::a2dp(200).level(1), A2DP_MAX_VOLUME);

        let half = PcmVolume::hfp(0).with_levels(99);
        assert_eq!(half.level(0), HFP_MAX_GAIN);
    }

    #[test]
    fn test_half_gain() {
        let volume = PcmVolume::a2dp(0).with_levels(127 / 2);
        let mut samples = [12_700];
        volume.scale(&mut samples, 1);
        assert_eq!(samples, [6300]);
    }
}

//! Immutable, interleaved sample data handed to the render side.

use alloc::vec::Vec;
use core::fmt;

/// Maximum channel count the render side processes per frame.
pub const MAX_CHANNELS: usize = 8;

/// Error type for sample buffer construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SampleError {
    /// Channel count outside `1..=MAX_CHANNELS`
    UnsupportedChannels(u16),
    /// Sample count not a multiple of the channel count
    Misaligned { samples: usize, channels: u16 },
    /// Sample rate of zero
    ZeroSampleRate,
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::UnsupportedChannels(c) => write!(f, "unsupported channel count {}", c),
            SampleError::Misaligned { samples, channels } => {
                write!(f, "{} samples do not divide into {} channels", samples, channels)
            }
            SampleError::ZeroSampleRate => write!(f, "sample rate is zero"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SampleError {}

/// Interleaved float samples plus their layout. Empty buffers are allowed;
/// consumers render silence from them.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    data: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(data: Vec<f32>, channels: u16, sample_rate: u32) -> Result<Self, SampleError> {
        if channels == 0 || channels as usize > MAX_CHANNELS {
            return Err(SampleError::UnsupportedChannels(channels));
        }
        if data.len() % channels as usize != 0 {
            return Err(SampleError::Misaligned { samples: data.len(), channels });
        }
        if sample_rate == 0 {
            return Err(SampleError::ZeroSampleRate);
        }
        Ok(Self { data, channels, sample_rate })
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.data.len() / self.channels as usize
    }

    pub fn channels(&self) -> usize {
        self.channels as usize
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sample at `frame` on channel `channel`. Channels beyond the buffer's
    /// count wrap, so a mono buffer feeds every output channel.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let ch = self.channels as usize;
        self.data
            .get(frame * ch + channel % ch)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn frames_and_channels() {
        let buf = SampleBuffer::new(vec![0.0; 8], 2, 44100).unwrap();
        assert_eq!(buf.frames(), 4);
        assert_eq!(buf.channels(), 2);
    }

    #[test]
    fn rejects_bad_layouts() {
        assert_eq!(
            SampleBuffer::new(vec![0.0; 3], 2, 44100),
            Err(SampleError::Misaligned { samples: 3, channels: 2 })
        );
        assert_eq!(
            SampleBuffer::new(vec![], 0, 44100),
            Err(SampleError::UnsupportedChannels(0))
        );
        assert_eq!(SampleBuffer::new(vec![], 1, 0), Err(SampleError::ZeroSampleRate));
    }

    #[test]
    fn mono_feeds_every_channel() {
        let buf = SampleBuffer::new(vec![0.1, 0.2], 1, 44100).unwrap();
        assert_eq!(buf.sample(1, 0), 0.2);
        assert_eq!(buf.sample(1, 1), 0.2);
    }

    #[test]
    fn out_of_range_reads_silence() {
        let buf = SampleBuffer::new(vec![0.5, -0.5], 2, 44100).unwrap();
        assert_eq!(buf.sample(1, 0), 0.0);
        let empty = SampleBuffer::new(vec![], 2, 44100).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.sample(0, 0), 0.0);
    }
}

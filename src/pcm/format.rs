//! PCM format description
//!
//! [`PcmFormat`] is an immutable value: every "set" operation returns a new
//! value and owners never share a mutable format.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TalkbookError};
use crate::time::{Time, TimeDelta};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Description of a linear PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PcmFormatFields")]
pub struct PcmFormat {
    channels: u16,
    sample_rate: u32,
    bit_depth: u16,
}

/// Unvalidated wire form used when deserializing a [`PcmFormat`].
#[derive(Deserialize)]
struct PcmFormatFields {
    channels: u16,
    sample_rate: u32,
    bit_depth: u16,
}

impl TryFrom<PcmFormatFields> for PcmFormat {
    type Error = TalkbookError;

    fn try_from(fields: PcmFormatFields) -> Result<Self> {
        PcmFormat::new(fields.channels, fields.sample_rate, fields.bit_depth)
    }
}

impl Default for PcmFormat {
    /// Mono, 44.1kHz, 16-bit.
    fn default() -> Self {
        PcmFormat {
            channels: 1,
            sample_rate: 44100,
            bit_depth: 16,
        }
    }
}

impl PcmFormat {
    /// Create a validated PCM format.
    ///
    /// # Errors
    /// * `InvalidPcmFormat` - if `channels` or `sample_rate` is zero, if
    ///   `bit_depth` is not a non-zero multiple of 8, or if the resulting
    ///   byte rate does not fit the 32-bit RIFF field
    pub fn new(channels: u16, sample_rate: u32, bit_depth: u16) -> Result<Self> {
        if channels == 0 {
            return Err(TalkbookError::InvalidPcmFormat {
                reason: "channel count must be at least 1".to_string(),
            });
        }
        if sample_rate == 0 {
            return Err(TalkbookError::InvalidPcmFormat {
                reason: "sample rate must be at least 1 Hz".to_string(),
            });
        }
        if bit_depth == 0 || bit_depth % 8 != 0 {
            return Err(TalkbookError::InvalidPcmFormat {
                reason: format!("bit depth {} is not a non-zero multiple of 8", bit_depth),
            });
        }

        let block_align = u32::from(channels) * u32::from(bit_depth / 8);
        if block_align > u32::from(u16::MAX)
            || u64::from(block_align) * u64::from(sample_rate) > u64::from(u32::MAX)
        {
            return Err(TalkbookError::InvalidPcmFormat {
                reason: format!(
                    "{} channels at {} Hz and {} bits overflow the RIFF header fields",
                    channels, sample_rate, bit_depth
                ),
            });
        }

        Ok(PcmFormat {
            channels,
            sample_rate,
            bit_depth,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    /// Bytes consumed by one sample frame across all channels
    pub fn block_align(&self) -> u16 {
        self.channels * (self.bit_depth / 8)
    }

    /// Bytes per second
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }

    /// Two formats are compatible iff channels, sample rate and bit depth are all equal.
    pub fn is_compatible_with(&self, other: &PcmFormat) -> bool {
        self == other
    }

    pub fn with_channels(&self, channels: u16) -> Result<Self> {
        Self::new(channels, self.sample_rate, self.bit_depth)
    }

    pub fn with_sample_rate(&self, sample_rate: u32) -> Result<Self> {
        Self::new(self.channels, sample_rate, self.bit_depth)
    }

    pub fn with_bit_depth(&self, bit_depth: u16) -> Result<Self> {
        Self::new(self.channels, self.sample_rate, bit_depth)
    }

    /// Number of PCM bytes covering `duration`: `floor(duration * byte_rate)`,
    /// rounded down to a whole sample frame.
    pub fn pcm_length(&self, duration: TimeDelta) -> u64 {
        let bytes = u128::from(duration.as_nanos()) * u128::from(self.byte_rate()) / NANOS_PER_SEC;
        self.align_down(u64::try_from(bytes).unwrap_or(u64::MAX))
    }

    /// Byte offset of a non-negative time position, aligned to a sample frame.
    /// Negative times map to offset 0; callers validate bounds first.
    pub fn byte_offset(&self, time: Time) -> u64 {
        if time.is_negative() {
            return 0;
        }
        self.pcm_length(TimeDelta::from_nanos(time.as_nanos() as u64))
    }

    /// Duration of `bytes` PCM bytes.
    ///
    /// Rounded up to the next nanosecond so that `pcm_length(duration_of(n)) == n`
    /// for every frame-aligned `n`.
    pub fn duration_of(&self, bytes: u64) -> TimeDelta {
        let rate = u128::from(self.byte_rate());
        if rate == 0 {
            return TimeDelta::ZERO;
        }
        let nanos = (u128::from(bytes) * NANOS_PER_SEC + rate - 1) / rate;
        TimeDelta::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Round a byte count down to a whole number of sample frames.
    pub fn align_down(&self, bytes: u64) -> u64 {
        let block = u64::from(self.block_align());
        bytes - bytes % block
    }

    pub fn is_frame_aligned(&self, bytes: u64) -> bool {
        bytes % u64::from(self.block_align()) == 0
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch {}Hz {}-bit",
            self.channels, self.sample_rate, self.bit_depth
        )
    }
}

/// A PCM format together with the length of the PCM payload.
///
/// This is the structured form of a RIFF/WAVE header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmDataInfo {
    pub format: PcmFormat,
    /// Count of PCM bytes
    pub data_length: u32,
}

impl PcmDataInfo {
    pub fn new(format: PcmFormat, data_length: u32) -> Self {
        PcmDataInfo {
            format,
            data_length,
        }
    }

    /// Duration of the PCM payload.
    ///
    /// # Errors
    /// * `InvalidPcmFormat` - if the byte rate is zero
    pub fn duration(&self) -> Result<TimeDelta> {
        if self.format.byte_rate() == 0 {
            return Err(TalkbookError::InvalidPcmFormat {
                reason: "byte rate is zero".to_string(),
            });
        }
        Ok(self.format.duration_of(u64::from(self.data_length)))
    }
}

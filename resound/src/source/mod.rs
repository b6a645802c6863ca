//! Decoded audio sources feeding the streaming pipeline.
//!
//! An [`AudioSource`] is a lazy, finite, seekable sequence of raw PCM chunks.
//! Resound ships two implementations:
//! - [`SymphoniaSource`]: decodes a file incrementally with Symphonia
//! - [`MemorySource`]: serves PCM that is already in memory

mod memory;
mod symphonia_source;

use crate::error::Result;
use std::time::Duration;

pub use memory::MemorySource;
pub use symphonia_source::SymphoniaSource;

/// Sample encoding of PCM bytes, always little-endian and interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    I16,
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::I16 => 2,
            Self::F32 => 4,
        }
    }
}

/// Shape of the PCM a source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl WaveFormat {
    pub fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_format.bytes_per_sample()
    }

    pub fn average_bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.bytes_per_frame() as u64
    }

    /// Playback time covered by `bytes` of PCM in this format.
    pub fn duration_of(&self, bytes: u64) -> Duration {
        let rate = self.average_bytes_per_second();
        if rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((bytes as u128 * 1_000_000_000 / rate as u128) as u64)
    }

    /// Byte offset of `time`, rounded down to a whole frame.
    pub fn byte_offset_of(&self, time: Duration) -> u64 {
        let frame = (time.as_secs_f64() * self.sample_rate as f64) as u64;
        frame * self.bytes_per_frame() as u64
    }
}

/// One decoded chunk borrowed from the source's internal scratch space.
#[derive(Debug)]
pub struct SourceChunk<'a> {
    pub data: &'a [u8],
    /// The source knows this is the final chunk of the stream.
    pub is_last: bool,
}

/// A seekable stream of decoded PCM chunks.
///
/// Implementations are driven from the streaming thread only, so they need to
/// be `Send` but not `Sync`.
pub trait AudioSource: Send {
    /// PCM format of every chunk this source yields.
    fn format(&self) -> WaveFormat;

    /// Total playback length of the stream.
    fn duration(&self) -> Duration;

    /// Moves the decode cursor so the next chunk starts at `position`.
    ///
    /// Positions past the end leave the source exhausted.
    fn seek(&mut self, position: Duration) -> Result<()>;

    /// Decodes the next chunk, or returns `None` once the stream is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`ResoundError::Decode`](crate::ResoundError::Decode) when the
    /// underlying data cannot be decoded. The source is not retried.
    fn next_chunk(&mut self) -> Result<Option<SourceChunk<'_>>>;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn format(&self) -> WaveFormat {
        (**self).format()
    }

    fn duration(&self) -> Duration {
        (**self).duration()
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        (**self).seek(position)
    }

    fn next_chunk(&mut self) -> Result<Option<SourceChunk<'_>>> {
        (**self).next_chunk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wave_format_byte_math() {
        let format = WaveFormat::new(48_000, 2, SampleFormat::I16);
        assert_eq!(format.bytes_per_frame(), 4);
        assert_eq!(format.average_bytes_per_second(), 192_000);
        assert_eq!(format.duration_of(96_000), Duration::from_millis(500));
        assert_eq!(format.byte_offset_of(Duration::from_millis(500)), 96_000);
    }
}

use crate::error::{ResoundError, Result};
use crate::source::{AudioSource, SampleFormat, SourceChunk, WaveFormat};
use std::sync::Arc;
use std::time::Duration;

/// PCM already in memory, served in fixed-size chunks.
///
/// Cloning is cheap: the PCM bytes are shared, the cursor is not.
#[derive(Debug, Clone)]
pub struct MemorySource {
    format: WaveFormat,
    data: Arc<[u8]>,
    chunk_bytes: usize,
    cursor: usize,
}

impl MemorySource {
    /// Wraps raw interleaved little-endian PCM.
    ///
    /// # Arguments
    ///
    /// * `format` - Format of `data`
    /// * `data` - PCM bytes; trailing bytes that do not form a whole frame are dropped
    /// * `chunk_frames` - Frames per chunk returned by `next_chunk`
    ///
    /// # Errors
    ///
    /// Returns an error if the format has no channels or `chunk_frames` is zero.
    pub fn from_pcm(format: WaveFormat, data: impl Into<Arc<[u8]>>, chunk_frames: usize) -> Result<Self> {
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(ResoundError::AudioFormat(
                "Sample rate and channel count must be greater than 0".to_string(),
            ));
        }
        if chunk_frames == 0 {
            return Err(ResoundError::AudioFormat(
                "Chunk size must be greater than 0".to_string(),
            ));
        }

        let mut data: Arc<[u8]> = data.into();
        let frame = format.bytes_per_frame();
        let whole = data.len() - data.len() % frame;
        if whole != data.len() {
            log::warn!(
                "Dropping {} trailing bytes that do not form a whole frame",
                data.len() - whole
            );
            data = Arc::from(&data[..whole]);
        }

        Ok(Self {
            format,
            data,
            chunk_bytes: chunk_frames * frame,
            cursor: 0,
        })
    }

    /// Encodes interleaved f32 samples as little-endian float PCM.
    pub fn from_f32(samples: &[f32], sample_rate: u32, channels: u16, chunk_frames: usize) -> Result<Self> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::from_pcm(
            WaveFormat::new(sample_rate, channels, SampleFormat::F32),
            bytes,
            chunk_frames,
        )
    }

    /// Encodes interleaved i16 samples as little-endian 16-bit PCM.
    pub fn from_i16(samples: &[i16], sample_rate: u32, channels: u16, chunk_frames: usize) -> Result<Self> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::from_pcm(
            WaveFormat::new(sample_rate, channels, SampleFormat::I16),
            bytes,
            chunk_frames,
        )
    }

    /// A mono sine tone, handy for demos and tests.
    pub fn tone(frequency: f32, duration: Duration, sample_rate: u32, chunk_frames: usize) -> Result<Self> {
        let frames = (duration.as_secs_f64() * sample_rate as f64) as usize;
        let step = std::f32::consts::TAU * frequency / sample_rate as f32;
        let samples: Vec<f32> = (0..frames).map(|i| (i as f32 * step).sin() * 0.5).collect();
        Self::from_f32(&samples, sample_rate, 1, chunk_frames)
    }

    /// Total PCM bytes in the stream.
    pub fn len_bytes(&self) -> usize {
        self.data.len()
    }
}

impl AudioSource for MemorySource {
    fn format(&self) -> WaveFormat {
        self.format
    }

    fn duration(&self) -> Duration {
        self.format.duration_of(self.data.len() as u64)
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let offset = self.format.byte_offset_of(position) as usize;
        self.cursor = offset.min(self.data.len());
        Ok(())
    }

    fn next_chunk(&mut self) -> Result<Option<SourceChunk<'_>>> {
        if self.cursor >= self.data.len() {
            return Ok(None);
        }
        let start = self.cursor;
        let end = (start + self.chunk_bytes).min(self.data.len());
        self.cursor = end;
        Ok(Some(SourceChunk {
            data: &self.data[start..end],
            is_last: end == self.data.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_cover_all_bytes() {
        let samples = vec![0i16; 1000];
        let mut source = MemorySource::from_i16(&samples, 1000, 1, 300).unwrap();
        let mut sizes = Vec::new();
        let mut last_flags = Vec::new();
        while let Some(chunk) = source.next_chunk().unwrap() {
            sizes.push(chunk.data.len());
            last_flags.push(chunk.is_last);
        }
        assert_eq!(sizes, vec![600, 600, 600, 200]);
        assert_eq!(last_flags, vec![false, false, false, true]);
    }

    #[test]
    fn seek_restarts_sequence() {
        let mut source = MemorySource::tone(440.0, Duration::from_secs(1), 8000, 800).unwrap();
        while source.next_chunk().unwrap().is_some() {}
        source.seek(Duration::from_millis(500)).unwrap();
        let mut remaining = 0;
        while let Some(chunk) = source.next_chunk().unwrap() {
            remaining += chunk.data.len();
        }
        assert_eq!(remaining, source.len_bytes() / 2);
    }

    #[test]
    fn seek_past_end_exhausts() {
        let mut source = MemorySource::tone(440.0, Duration::from_millis(100), 8000, 64).unwrap();
        source.seek(Duration::from_secs(5)).unwrap();
        assert!(source.next_chunk().unwrap().is_none());
    }

    #[test]
    fn rejects_zero_chunk() {
        assert!(MemorySource::from_i16(&[0, 0], 8000, 1, 0).is_err());
    }
}

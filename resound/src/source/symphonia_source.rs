use crate::error::{ResoundError, Result};
use crate::source::{AudioSource, SampleFormat, SourceChunk, WaveFormat};
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use symphonia::{
    core::{
        audio::{SampleBuffer, SignalSpec},
        codecs::{Decoder, DecoderOptions},
        errors::Error,
        formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
        io::MediaSourceStream,
        meta::MetadataOptions,
        probe::Hint,
        units::Time,
    },
    default::{get_codecs, get_probe},
};

/// Incremental file decoder built on Symphonia.
///
/// Each call to `next_chunk` decodes one container packet and yields it as
/// interleaved little-endian f32 PCM. Supports every format enabled in
/// Symphonia's default feature set (WAV, FLAC, OGG/Vorbis, ...).
pub struct SymphoniaSource {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    wave_format: WaveFormat,
    duration: Duration,
    total_frames: Option<u64>,
    frames_decoded: u64,
    /// Timestamp an accurate seek asked for; frames before it are dropped.
    seek_target: Option<u64>,
    sample_buf: Option<SampleBuffer<f32>>,
    scratch: Vec<u8>,
}

impl SymphoniaSource {
    /// Opens and probes an audio file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, has no decodable default
    /// track, or lacks sample rate/channel information.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| ResoundError::Decode(format!("Failed to probe audio format: {:?}", e)))?;

        let format_reader = probed.format;

        let track = format_reader
            .default_track()
            .ok_or_else(|| ResoundError::Decode("No default audio track found".to_string()))?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| ResoundError::Decode("Sample rate not found".to_string()))?;

        let channels = track
            .codec_params
            .channels
            .ok_or_else(|| ResoundError::Decode("Channel count not found".to_string()))?
            .count() as u16;

        let total_frames = track.codec_params.n_frames;
        let duration = total_frames
            .map(|frames| Duration::from_secs_f64(frames as f64 / sample_rate as f64))
            .unwrap_or_default();
        let track_id = track.id;

        let decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| ResoundError::Decode(format!("Failed to create decoder: {:?}", e)))?;

        log::info!(
            "Opened {} ({} Hz, {} channels, {:.2}s)",
            path.display(),
            sample_rate,
            channels,
            duration.as_secs_f64()
        );

        Ok(Self {
            format_reader,
            decoder,
            track_id,
            wave_format: WaveFormat::new(sample_rate, channels, SampleFormat::F32),
            duration,
            total_frames,
            frames_decoded: 0,
            seek_target: None,
            sample_buf: None,
            scratch: Vec::new(),
        })
    }
}

impl AudioSource for SymphoniaSource {
    fn format(&self) -> WaveFormat {
        self.wave_format
    }

    fn duration(&self) -> Duration {
        self.duration
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let time = Time::new(position.as_secs(), position.subsec_nanos() as f64 / 1e9);
        match self.format_reader.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time,
                track_id: Some(self.track_id),
            },
        ) {
            Ok(seeked) => {
                self.frames_decoded = seeked.required_ts;
                self.seek_target = Some(seeked.required_ts);
            }
            // Seeking past the end leaves the reader exhausted
            Err(Error::SeekError(_)) if position >= self.duration => {
                self.frames_decoded = self.total_frames.unwrap_or(0);
                self.seek_target = None;
            }
            Err(e) => return Err(ResoundError::Decode(format!("Seek failed: {}", e))),
        }
        self.decoder.reset();
        Ok(())
    }

    fn next_chunk(&mut self) -> Result<Option<SourceChunk<'_>>> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(Error::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    return Err(ResoundError::Decode(format!("Error reading packet: {}", e)));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::DecodeError(e)) => {
                    log::warn!("Skipping corrupt packet: {}", e);
                    continue;
                }
                Err(e) => {
                    return Err(ResoundError::Decode(format!("Error decoding packet: {}", e)));
                }
            };

            if decoded.frames() == 0 {
                continue;
            }

            // The reader lands on the packet holding the target; trim its lead-in
            let skip = match self.seek_target {
                Some(target) => {
                    let skip = target.saturating_sub(packet.ts());
                    if skip >= decoded.frames() as u64 {
                        continue;
                    }
                    self.seek_target = None;
                    skip as usize
                }
                None => 0,
            };

            let spec = SignalSpec::new(decoded.spec().rate, decoded.spec().channels);
            let needs_realloc = self
                .sample_buf
                .as_ref()
                .is_none_or(|buf| buf.capacity() < decoded.capacity());
            if needs_realloc {
                self.sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            }
            let Some(sample_buf) = self.sample_buf.as_mut() else {
                return Err(ResoundError::Decode(
                    "Decoder sample buffer unavailable".to_string(),
                ));
            };
            let frames = (decoded.frames() - skip) as u64;
            sample_buf.copy_interleaved_ref(decoded);

            let kept = &sample_buf.samples()[skip * spec.channels.count()..];
            self.scratch.clear();
            self.scratch.extend(kept.iter().flat_map(|s| s.to_le_bytes()));
            self.frames_decoded += frames;

            let is_last = self
                .total_frames
                .is_some_and(|total| self.frames_decoded >= total);
            return Ok(Some(SourceChunk {
                data: &self.scratch,
                is_last,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use std::path::PathBuf;

    /// Writes one second of 16-bit mono PCM where every sample holds its frame index.
    fn write_ramp_wav(name: &str) -> PathBuf {
        let rate: u32 = 8000;
        let data: Vec<u8> = (0..rate as i16).flat_map(|s| s.to_le_bytes()).collect();
        let mut wav = Vec::with_capacity(44 + data.len());
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&rate.to_le_bytes());
        wav.extend_from_slice(&(rate * 2).to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(data.len() as u32).to_le_bytes());
        wav.extend_from_slice(&data);

        let path = std::env::temp_dir().join(format!("resound-{}-{}.wav", name, std::process::id()));
        std::fs::write(&path, wav).unwrap();
        path
    }

    fn samples(chunk: &SourceChunk<'_>) -> Vec<f32> {
        chunk
            .data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    #[test]
    fn open_missing_file_is_io_error() {
        let result = SymphoniaSource::open("does/not/exist.wav");
        assert!(matches!(result, Err(ResoundError::Io(_))));
    }

    #[test]
    fn decodes_wav_in_order() {
        let path = write_ramp_wav("order");
        let mut source = SymphoniaSource::open(&path).unwrap();
        assert_eq!(source.format().channels, 1);
        assert_eq!(source.duration(), Duration::from_secs(1));

        let mut decoded = Vec::new();
        while let Some(chunk) = source.next_chunk().unwrap() {
            decoded.extend(samples(&chunk));
        }
        std::fs::remove_file(&path).unwrap();
        assert_eq!(decoded.len(), 8000);
        assert_relative_eq!(decoded[1234], 1234.0 / 32768.0);
    }

    #[test]
    fn seek_starts_at_the_requested_frame() {
        let path = write_ramp_wav("seek");
        let mut source = SymphoniaSource::open(&path).unwrap();
        // Land inside a packet rather than on its boundary
        source.seek(Duration::from_micros(515_625)).unwrap();

        let mut decoded = Vec::new();
        while let Some(chunk) = source.next_chunk().unwrap() {
            decoded.extend(samples(&chunk));
        }
        std::fs::remove_file(&path).unwrap();
        assert_eq!(decoded.len(), 8000 - 4125);
        assert_relative_eq!(decoded[0], 4125.0 / 32768.0);
    }
}

//! Device voices: the low-level consumers of submitted audio buffers.
//!
//! A [`DeviceVoice`] accepts PCM buffers, plays them in submission order, and
//! exposes the per-voice mix parameters the output router writes each tick.
//! Buffer lifecycle is reported back through a [`VoiceCallback`].
//!
//! - [`CaptureVoice`]: records everything in memory, for tests and offline use
//! - [`CpalVoice`]: plays through the default output device via cpal

mod capture;
mod cpal_voice;

use crate::error::Result;
use crate::playback::AudioBuffer;
use crate::source::WaveFormat;
use std::sync::Arc;

pub use capture::{CaptureVoice, DrainMode};
pub use cpal_voice::{CpalVoice, CpalVoiceDesc};

/// Which send a filter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterTarget {
    /// The dry path to the output device.
    Direct,
    /// The send to the reverb submix.
    Reverb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    LowPass,
    BandPass,
    HighPass,
    Notch,
    LowPassOnePole,
    HighPassOnePole,
}

/// Voice filter state.
///
/// `frequency` is the radian cutoff, `2·sin(π·f/fs)`, in `0.0..=1.0` where
/// 1.0 leaves the signal unfiltered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParameters {
    pub filter_type: FilterType,
    pub frequency: f32,
    pub one_over_q: f32,
}

impl FilterParameters {
    pub fn low_pass(frequency: f32) -> Self {
        Self {
            filter_type: FilterType::LowPass,
            frequency: frequency.clamp(0.0, 1.0),
            one_over_q: 1.0,
        }
    }
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self::low_pass(1.0)
    }
}

/// Parameters of the environmental reverb submix.
///
/// Preset tables live with the host application; Resound only forwards the
/// values to the voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbParameters {
    /// Wet/dry mix, 0 (all dry) to 100 (all wet).
    pub wet_dry_mix: f32,
    pub reflections_delay_ms: u32,
    pub reverb_delay_ms: u32,
    pub decay_time_s: f32,
    pub room_size_ft: f32,
    pub density: f32,
}

impl Default for ReverbParameters {
    fn default() -> Self {
        Self {
            wet_dry_mix: 100.0,
            reflections_delay_ms: 5,
            reverb_delay_ms: 5,
            decay_time_s: 1.0,
            room_size_ft: 100.0,
            density: 100.0,
        }
    }
}

/// Buffer lifecycle notifications raised by a voice.
///
/// Called from whatever thread the voice processes audio on. Implementations
/// must not block.
pub trait VoiceCallback: Send + Sync {
    /// The voice started reading `buffer`.
    fn on_buffer_start(&self, buffer: &AudioBuffer);
    /// The voice finished with `buffer`; it no longer counts as queued.
    fn on_buffer_end(&self, buffer: &AudioBuffer);
    /// The voice reached the end of a buffer submitted with a nonzero loop count.
    fn on_loop_end(&self, buffer: &AudioBuffer);
}

/// A low-level playback voice.
///
/// All methods take `&self`: the streaming thread submits buffers while the
/// update thread writes mix parameters concurrently.
pub trait DeviceVoice: Send + Sync {
    /// PCM format the voice expects in submitted buffers.
    fn format(&self) -> WaveFormat;

    /// Channel count of submitted buffers.
    fn source_channels(&self) -> u16 {
        self.format().channels
    }

    /// Channel count of the voice's output (the speaker layout's channel count).
    fn destination_channels(&self) -> u16;

    /// Appends a buffer to the voice queue.
    fn submit_buffer(&self, buffer: AudioBuffer) -> Result<()>;

    /// Starts (or resumes) consuming queued buffers.
    fn start(&self) -> Result<()>;

    /// Stops consuming buffers; queued buffers are kept.
    fn stop(&self) -> Result<()>;

    /// Drops every queued buffer without playing it. Dropped buffers still get
    /// an `on_buffer_end` notification.
    fn flush_buffers(&self);

    /// Buffers submitted and not yet finished.
    fn queued_buffer_count(&self) -> usize;

    fn set_frequency_ratio(&self, ratio: f32);

    fn set_volume(&self, volume: f32);

    /// Sets the `source_channels × destination_channels` level matrix; the level
    /// from source `s` to destination `d` is `levels[d * source_channels + s]`.
    fn set_output_matrix(&self, source_channels: u16, destination_channels: u16, levels: &[f32]) -> Result<()>;

    fn set_filter_parameters(&self, target: FilterTarget, parameters: FilterParameters);

    /// Level of the send into the reverb submix.
    fn set_reverb_level(&self, level: f32);

    /// Enables the reverb submix with `parameters`, or disables it with `None`.
    fn set_reverb(&self, parameters: Option<ReverbParameters>);

    fn set_callbacks(&self, callbacks: Arc<dyn VoiceCallback>);
}

/// Validates a level matrix against its declared dimensions.
pub(crate) fn check_matrix(source_channels: u16, destination_channels: u16, levels: &[f32]) -> Result<()> {
    let expected = source_channels as usize * destination_channels as usize;
    if levels.len() != expected {
        return Err(crate::error::ResoundError::AudioFormat(format!(
            "Output matrix has {} levels, expected {}x{} = {}",
            levels.len(),
            source_channels,
            destination_channels,
            expected
        )));
    }
    Ok(())
}

use crate::config::{SpatialDesc, StreamingDesc};
use crate::device::{DeviceVoice, ReverbParameters};
use crate::error::{ResoundError, Result};
use crate::events::{EventReceiver, ResoundEvent};
use crate::playback::{PlaybackEngine, PlaybackState};
use crate::router::{OutputMatrix, OutputRouter};
use crate::source::{AudioSource, WaveFormat};
use crate::spatial::{CalculateFlags, DspResult, Emitter, Listener, SpatialCalculator};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Process-unique handle of a sound instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One playable, streamed sound: the transport controls, the mix properties
/// and the per-tick 3D update.
///
/// Property setters clamp silently: pan to `-1..=1`, pitch to `-1..=1`
/// octave, volume to `0..=1`.
pub struct SoundInstance {
    engine: PlaybackEngine,
    router: OutputRouter,
    calculator: SpatialCalculator,
    events: EventReceiver,
    pitch: f32,
    volume: f32,
    dsp: Option<DspResult>,
    reverb: Option<ReverbParameters>,
}

impl SoundInstance {
    /// Creates a stopped instance streaming `source` into `voice`.
    ///
    /// # Errors
    ///
    /// Fails if the voice's output channel count does not match the speaker
    /// layout in `spatial`, or the playback engine cannot start.
    pub fn new<S: AudioSource + 'static>(
        source: S,
        voice: Arc<dyn DeviceVoice>,
        streaming: StreamingDesc,
        spatial: SpatialDesc,
    ) -> Result<Self> {
        let layout = spatial.speaker_layout;
        if voice.destination_channels() != layout.channel_count() {
            return Err(ResoundError::AudioFormat(format!(
                "Voice has {} output channels but {:?} needs {}",
                voice.destination_channels(),
                layout,
                layout.channel_count()
            )));
        }
        let source_channels = source.format().channels;
        let (sender, events) = crossbeam_channel::unbounded();
        let engine = PlaybackEngine::new(InstanceId::next(), source, voice, streaming, sender)?;

        let mut instance = Self {
            engine,
            router: OutputRouter::new(layout, source_channels),
            calculator: SpatialCalculator::new(spatial),
            events,
            pitch: 0.0,
            volume: 1.0,
            dsp: None,
            reverb: None,
        };
        instance.engine.voice().set_volume(instance.volume);
        instance.push_mix()?;
        Ok(instance)
    }

    pub fn id(&self) -> InstanceId {
        self.engine.id()
    }

    pub fn format(&self) -> WaveFormat {
        self.engine.format()
    }

    pub fn duration(&self) -> Duration {
        self.engine.duration()
    }

    pub fn play(&self) -> Result<()> {
        self.engine.play()
    }

    pub fn play_from(&self, start: Duration) -> Result<()> {
        self.engine.play_from(start)
    }

    pub fn pause(&self) -> Result<()> {
        self.engine.pause()
    }

    pub fn resume(&self) -> Result<()> {
        self.engine.resume()
    }

    pub fn stop(&self, immediate: bool) -> Result<()> {
        self.engine.stop(immediate)
    }

    /// Stops immediately and restores pan, pitch, volume and 3D state to defaults.
    pub fn reset(&mut self) -> Result<()> {
        self.engine.stop(true)?;
        if self.engine.is_disposed() {
            return Ok(());
        }
        self.router.reset();
        self.pitch = 0.0;
        self.volume = 1.0;
        self.dsp = None;
        self.engine.voice().set_volume(self.volume);
        self.push_mix()
    }

    pub fn state(&self) -> PlaybackState {
        self.engine.state()
    }

    pub fn position(&self) -> Duration {
        self.engine.position()
    }

    pub fn set_position(&self, position: Duration) -> Result<()> {
        self.engine.set_position(position)
    }

    pub fn is_looped(&self) -> bool {
        self.engine.is_looped()
    }

    pub fn set_looped(&self, looped: bool) {
        self.engine.set_looped(looped);
    }

    pub fn pan(&self) -> f32 {
        self.router.pan()
    }

    pub fn set_pan(&mut self, pan: f32) -> Result<()> {
        self.router.set_pan(pan);
        self.push_mix()
    }

    /// Pitch shift in octaves.
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn set_pitch(&mut self, pitch: f32) -> Result<()> {
        self.pitch = pitch.clamp(-1.0, 1.0);
        self.push_mix()
    }

    /// Frequency ratio from pitch alone (doppler excluded).
    pub fn pitch_ratio(&self) -> f32 {
        2f32.powf(self.pitch)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if !self.engine.is_disposed() {
            self.engine.voice().set_volume(self.volume);
        }
    }

    /// Recomputes and applies the spatial mix for this tick.
    ///
    /// An emitter describing a different channel count than the source is
    /// spread over the source's channels, keeping its channel radius.
    pub fn apply_3d(&mut self, listener: &Listener, emitter: &Emitter) -> Result<()> {
        let mut flags = CalculateFlags::default();
        if self.reverb.is_some() {
            flags = flags.with_reverb();
        }
        let channels = self.format().channels;
        let dsp = if emitter.channel_count() == channels {
            self.calculator.calculate(listener, emitter, flags)
        } else {
            let mut matched = emitter.clone();
            matched.set_channel_count(channels, emitter.channel_radius());
            self.calculator.calculate(listener, &matched, flags)
        };
        self.dsp = Some(dsp);
        self.push_mix()
    }

    /// Leaves spatial mode; the manual pan matrix applies again.
    pub fn disable_3d(&mut self) -> Result<()> {
        self.dsp = None;
        self.push_mix()
    }

    pub fn is_3d(&self) -> bool {
        self.dsp.is_some()
    }

    /// Result of the latest `apply_3d`, while in spatial mode.
    pub fn dsp(&self) -> Option<&DspResult> {
        self.dsp.as_ref()
    }

    pub fn spatial_desc(&self) -> &SpatialDesc {
        self.calculator.desc()
    }

    /// Updates engine-wide spatial settings. The speaker layout is fixed by the voice.
    pub fn set_spatial_desc(&mut self, mut desc: SpatialDesc) {
        desc.speaker_layout = self.router.layout();
        self.calculator.set_desc(desc);
    }

    /// Enables the reverb send with `parameters`, or disables it.
    pub fn set_reverb(&mut self, parameters: Option<ReverbParameters>) {
        self.reverb = parameters;
        if !self.engine.is_disposed() {
            self.engine.voice().set_reverb(parameters);
        }
    }

    pub fn reverb(&self) -> Option<ReverbParameters> {
        self.reverb
    }

    /// The matrix most recently written to the voice.
    pub fn output_matrix(&self) -> &OutputMatrix {
        self.router.output_matrix()
    }

    /// Drains the notifications raised since the last call.
    pub fn poll_events(&self) -> Vec<ResoundEvent> {
        self.events.try_iter().collect()
    }

    pub fn is_due_for_disposal(&self) -> bool {
        self.engine.is_due_for_disposal()
    }

    pub fn failure(&self) -> Option<&str> {
        self.engine.failure()
    }

    pub fn dispose(&mut self) {
        self.engine.dispose();
    }

    fn push_mix(&mut self) -> Result<()> {
        if self.engine.is_disposed() {
            return Ok(());
        }
        let ratio = self.pitch_ratio();
        self.router
            .apply(self.engine.voice().as_ref(), self.dsp.as_ref(), ratio)
    }
}

impl fmt::Debug for SoundInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundInstance")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("pan", &self.pan())
            .field("pitch", &self.pitch)
            .field("volume", &self.volume)
            .field("is_3d", &self.is_3d())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CaptureVoice, DrainMode, FilterTarget};
    use crate::math::{Pose, Vec3};
    use crate::source::MemorySource;
    use crate::spatial::SpeakerLayout;
    use approx::assert_relative_eq;

    fn instance(layout: SpeakerLayout) -> (SoundInstance, Arc<CaptureVoice>) {
        let source = MemorySource::tone(440.0, Duration::from_millis(500), 8000, 400).unwrap();
        let voice = Arc::new(CaptureVoice::new(
            source.format(),
            layout.channel_count(),
            DrainMode::Immediate,
        ));
        let instance = SoundInstance::new(
            source,
            voice.clone(),
            StreamingDesc::default(),
            SpatialDesc::default().with_speaker_layout(layout),
        )
        .unwrap();
        (instance, voice)
    }

    #[test]
    fn setters_clamp_silently() {
        let (mut instance, voice) = instance(SpeakerLayout::Stereo);
        instance.set_pan(3.0).unwrap();
        instance.set_pitch(-4.0).unwrap();
        instance.set_volume(1.5);
        assert_eq!(instance.pan(), 1.0);
        assert_eq!(instance.pitch(), -1.0);
        assert_eq!(instance.volume(), 1.0);
        assert_relative_eq!(voice.frequency_ratio(), 0.5);
        assert_eq!(voice.output_matrix(), vec![0.0, 2.0]);
    }

    #[test]
    fn default_matrix_is_unity() {
        let (instance, voice) = instance(SpeakerLayout::FivePointOne);
        assert!(instance.output_matrix().levels().iter().all(|&l| l == 1.0));
        assert_eq!(voice.output_matrix().len(), 6);
    }

    #[test]
    fn apply_3d_then_reset() {
        let (mut instance, voice) = instance(SpeakerLayout::Stereo);
        let listener = Listener::default();
        let emitter = Emitter::new(Pose::from_position(Vec3::new(3.0, 0.0, 0.0)))
            .with_radius(10.0)
            .unwrap();
        instance.set_pitch(1.0).unwrap();
        instance.apply_3d(&listener, &emitter).unwrap();
        assert!(instance.is_3d());
        let levels = voice.output_matrix();
        assert!(levels[1] > levels[0]);
        assert!(voice.filter(FilterTarget::Direct).unwrap().frequency < 1.0);
        assert_relative_eq!(voice.frequency_ratio(), 2.0);

        instance.reset().unwrap();
        assert!(!instance.is_3d());
        assert_eq!(instance.pitch(), 0.0);
        assert_eq!(voice.output_matrix(), vec![1.0, 1.0]);
        assert_relative_eq!(voice.frequency_ratio(), 1.0);
        assert_eq!(instance.state(), PlaybackState::Stopped);
    }

    #[test]
    fn mono_emitter_on_stereo_source_mixes_both_channels() {
        let samples: Vec<f32> = (0..1600).map(|i| if i % 2 == 0 { 0.25 } else { -0.25 }).collect();
        let source = MemorySource::from_f32(&samples, 8000, 2, 400).unwrap();
        let voice = Arc::new(CaptureVoice::new(source.format(), 2, DrainMode::Immediate));
        let mut instance = SoundInstance::new(
            source,
            voice.clone(),
            StreamingDesc::default(),
            SpatialDesc::default(),
        )
        .unwrap();
        let emitter = Emitter::new(Pose::from_position(Vec3::new(0.0, 0.0, -2.0)));
        assert_eq!(emitter.channel_count(), 1);

        instance.apply_3d(&Listener::default(), &emitter).unwrap();
        let levels = voice.output_matrix();
        assert_eq!(levels.len(), 4);
        assert!(levels.iter().all(|l| l.is_finite()));
        let dsp = instance.dsp().unwrap();
        assert_eq!(dsp.source_channels, 2);
        assert_eq!(dsp.matrix.len(), 4);
    }

    #[test]
    fn plays_to_end_and_reports_events() {
        let (instance, _voice) = instance(SpeakerLayout::Stereo);
        instance.play().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !instance.is_due_for_disposal() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        let events = instance.poll_events();
        assert_eq!(
            events,
            vec![
                ResoundEvent::AudioStart { instance: instance.id() },
                ResoundEvent::AudioEnd { instance: instance.id() },
            ]
        );
        assert_eq!(instance.state(), PlaybackState::Stopped);
    }

    #[test]
    fn rejects_voice_with_wrong_channel_count() {
        let source = MemorySource::tone(440.0, Duration::from_millis(10), 8000, 400).unwrap();
        let voice = Arc::new(CaptureVoice::new(source.format(), 6, DrainMode::Manual));
        let result = SoundInstance::new(source, voice, StreamingDesc::default(), SpatialDesc::default());
        assert!(matches!(result, Err(ResoundError::AudioFormat(_))));
    }
}

use crate::device::{
    DeviceVoice, FilterParameters, FilterTarget, ReverbParameters, VoiceCallback, check_matrix,
};
use crate::error::Result;
use crate::playback::AudioBuffer;
use crate::source::WaveFormat;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// How a [`CaptureVoice`] consumes its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Buffers are consumed as soon as they are queued on a started voice.
    Immediate,
    /// Buffers stay queued until [`CaptureVoice::drain`] is called.
    Manual,
}

#[derive(Default)]
struct CaptureState {
    running: bool,
    queue: VecDeque<AudioBuffer>,
    played: Vec<u8>,
    buffers_submitted: usize,
    buffers_played: usize,
    max_queued: usize,
    frequency_ratio: f32,
    volume: f32,
    matrix: Vec<f32>,
    filters: HashMap<FilterTarget, FilterParameters>,
    reverb: Option<ReverbParameters>,
    reverb_level: f32,
}

/// An in-memory voice that records the bytes it "plays" and the last value of
/// every mix parameter.
///
/// Callbacks are invoked with no internal lock held.
pub struct CaptureVoice {
    format: WaveFormat,
    destination_channels: u16,
    mode: DrainMode,
    state: Mutex<CaptureState>,
    callbacks: Mutex<Option<Arc<dyn VoiceCallback>>>,
}

impl CaptureVoice {
    pub fn new(format: WaveFormat, destination_channels: u16, mode: DrainMode) -> Self {
        Self {
            format,
            destination_channels,
            mode,
            state: Mutex::new(CaptureState {
                frequency_ratio: 1.0,
                volume: 1.0,
                ..Default::default()
            }),
            callbacks: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, CaptureState> {
        // A panicking test thread must not wedge the voice for everyone else
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn callbacks(&self) -> Option<Arc<dyn VoiceCallback>> {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Plays up to `count` queued buffers if the voice is running. Returns how
    /// many were consumed.
    pub fn drain(&self, count: usize) -> usize {
        let consumed: Vec<AudioBuffer> = {
            let mut state = self.state();
            if !state.running {
                return 0;
            }
            let take = count.min(state.queue.len());
            let consumed: Vec<AudioBuffer> = state.queue.drain(..take).collect();
            for buffer in &consumed {
                state.played.extend_from_slice(buffer.bytes());
            }
            state.buffers_played += consumed.len();
            consumed
        };
        self.notify_played(&consumed);
        consumed.len()
    }

    /// Plays everything currently queued.
    pub fn drain_all(&self) -> usize {
        self.drain(usize::MAX)
    }

    fn notify_played(&self, buffers: &[AudioBuffer]) {
        if buffers.is_empty() {
            return;
        }
        if let Some(callbacks) = self.callbacks() {
            for buffer in buffers {
                callbacks.on_buffer_start(buffer);
                if buffer.loop_count > 0 {
                    callbacks.on_loop_end(buffer);
                }
                callbacks.on_buffer_end(buffer);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    /// Every byte played so far, in order.
    pub fn played_bytes(&self) -> Vec<u8> {
        self.state().played.clone()
    }

    pub fn played_len(&self) -> usize {
        self.state().played.len()
    }

    pub fn buffers_submitted(&self) -> usize {
        self.state().buffers_submitted
    }

    pub fn buffers_played(&self) -> usize {
        self.state().buffers_played
    }

    /// Highest queue depth observed since creation.
    pub fn max_queued(&self) -> usize {
        self.state().max_queued
    }

    pub fn frequency_ratio(&self) -> f32 {
        self.state().frequency_ratio
    }

    pub fn volume(&self) -> f32 {
        self.state().volume
    }

    pub fn output_matrix(&self) -> Vec<f32> {
        self.state().matrix.clone()
    }

    pub fn filter(&self, target: FilterTarget) -> Option<FilterParameters> {
        self.state().filters.get(&target).copied()
    }

    pub fn reverb(&self) -> Option<ReverbParameters> {
        self.state().reverb
    }

    pub fn reverb_level(&self) -> f32 {
        self.state().reverb_level
    }
}

impl DeviceVoice for CaptureVoice {
    fn format(&self) -> WaveFormat {
        self.format
    }

    fn destination_channels(&self) -> u16 {
        self.destination_channels
    }

    fn submit_buffer(&self, buffer: AudioBuffer) -> Result<()> {
        let drain_now = {
            let mut state = self.state();
            state.queue.push_back(buffer);
            state.buffers_submitted += 1;
            state.max_queued = state.max_queued.max(state.queue.len());
            state.running && self.mode == DrainMode::Immediate
        };
        if drain_now {
            self.drain_all();
        }
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.state().running = true;
        if self.mode == DrainMode::Immediate {
            self.drain_all();
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.state().running = false;
        Ok(())
    }

    fn flush_buffers(&self) {
        let flushed: Vec<AudioBuffer> = self.state().queue.drain(..).collect();
        if let Some(callbacks) = self.callbacks() {
            for buffer in &flushed {
                callbacks.on_buffer_end(buffer);
            }
        }
    }

    fn queued_buffer_count(&self) -> usize {
        self.state().queue.len()
    }

    fn set_frequency_ratio(&self, ratio: f32) {
        self.state().frequency_ratio = ratio;
    }

    fn set_volume(&self, volume: f32) {
        self.state().volume = volume;
    }

    fn set_output_matrix(&self, source_channels: u16, destination_channels: u16, levels: &[f32]) -> Result<()> {
        check_matrix(source_channels, destination_channels, levels)?;
        self.state().matrix = levels.to_vec();
        Ok(())
    }

    fn set_filter_parameters(&self, target: FilterTarget, parameters: FilterParameters) {
        self.state().filters.insert(target, parameters);
    }

    fn set_reverb_level(&self, level: f32) {
        self.state().reverb_level = level;
    }

    fn set_reverb(&self, parameters: Option<ReverbParameters>) {
        self.state().reverb = parameters;
    }

    fn set_callbacks(&self, callbacks: Arc<dyn VoiceCallback>) {
        *self.callbacks.lock().unwrap_or_else(|e| e.into_inner()) = Some(callbacks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SampleFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        ended: AtomicUsize,
    }

    impl VoiceCallback for Counter {
        fn on_buffer_start(&self, _buffer: &AudioBuffer) {}
        fn on_buffer_end(&self, _buffer: &AudioBuffer) {
            self.ended.fetch_add(1, Ordering::SeqCst);
        }
        fn on_loop_end(&self, _buffer: &AudioBuffer) {}
    }

    fn format() -> WaveFormat {
        WaveFormat::new(8000, 1, SampleFormat::I16)
    }

    #[test]
    fn manual_voice_queues_until_drained() {
        let voice = CaptureVoice::new(format(), 2, DrainMode::Manual);
        let counter = Arc::new(Counter::default());
        voice.set_callbacks(counter.clone());
        voice.start().unwrap();
        voice.submit_buffer(AudioBuffer::from_bytes(vec![1, 2])).unwrap();
        voice.submit_buffer(AudioBuffer::from_bytes(vec![3, 4])).unwrap();
        assert_eq!(voice.queued_buffer_count(), 2);
        assert_eq!(voice.drain(1), 1);
        assert_eq!(voice.played_bytes(), vec![1, 2]);
        assert_eq!(counter.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn immediate_voice_holds_buffers_while_stopped() {
        let voice = CaptureVoice::new(format(), 2, DrainMode::Immediate);
        voice.submit_buffer(AudioBuffer::from_bytes(vec![9, 9])).unwrap();
        assert_eq!(voice.queued_buffer_count(), 1);
        voice.start().unwrap();
        assert_eq!(voice.queued_buffer_count(), 0);
        assert_eq!(voice.played_len(), 2);
    }

    #[test]
    fn flush_reports_buffer_end() {
        let voice = CaptureVoice::new(format(), 2, DrainMode::Manual);
        let counter = Arc::new(Counter::default());
        voice.set_callbacks(counter.clone());
        voice.submit_buffer(AudioBuffer::from_bytes(vec![0; 4])).unwrap();
        voice.flush_buffers();
        assert_eq!(voice.queued_buffer_count(), 0);
        assert_eq!(voice.played_len(), 0);
        assert_eq!(counter.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejects_mismatched_matrix() {
        let voice = CaptureVoice::new(format(), 2, DrainMode::Manual);
        assert!(voice.set_output_matrix(1, 2, &[1.0]).is_err());
        voice.set_output_matrix(1, 2, &[0.5, 1.5]).unwrap();
        assert_eq!(voice.output_matrix(), vec![0.5, 1.5]);
    }
}

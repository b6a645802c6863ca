use crate::config::LimiterSettings;
use crate::device::{
    DeviceVoice, FilterParameters, FilterTarget, ReverbParameters, VoiceCallback, check_matrix,
};
use crate::error::{ResoundError, Result};
use crate::playback::AudioBuffer;
use crate::source::{SampleFormat, WaveFormat};
use crate::spatial::SpeakerLayout;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{RecvTimeoutError, Sender};
use ringbuf::traits::{Consumer as _, Observer as _, Producer as _, Split as _};
use ringbuf::{HeapCons, HeapRb};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

/// Largest frequency ratio change the resampler accepts, either way.
const MAX_RELATIVE_RATIO: f64 = 8.0;

/// Configuration of a [`CpalVoice`].
#[derive(Debug, Clone)]
pub struct CpalVoiceDesc {
    /// Source frames rendered per block.
    pub block_size: usize,
    /// Output frames buffered between the render thread and the device callback.
    pub ring_length: usize,
    /// Peak limiter on the final mix; `None` lets samples clip.
    pub limiter: Option<LimiterSettings>,
}

impl Default for CpalVoiceDesc {
    fn default() -> Self {
        Self {
            block_size: 512,
            ring_length: 4096,
            limiter: Some(LimiterSettings::default()),
        }
    }
}

impl CpalVoiceDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_ring_length(mut self, frames: usize) -> Self {
        self.ring_length = frames;
        self
    }

    pub fn with_limiter(mut self, limiter: Option<LimiterSettings>) -> Self {
        self.limiter = limiter;
        self
    }
}

struct QueuedBuffer {
    buffer: AudioBuffer,
    offset: usize,
    loops_left: u32,
    started: bool,
}

struct VoiceState {
    running: bool,
    queue: VecDeque<QueuedBuffer>,
    frequency_ratio: f32,
    volume: f32,
    matrix: Vec<f32>,
    direct_filter: FilterParameters,
    reverb_filter: FilterParameters,
    reverb_level: f32,
    reverb: Option<ReverbParameters>,
}

struct VoiceShared {
    state: Mutex<VoiceState>,
    callbacks: Mutex<Option<Arc<dyn VoiceCallback>>>,
    failure: OnceLock<String>,
}

impl VoiceShared {
    fn new(source_channels: u16, destination_channels: u16) -> Self {
        Self {
            state: Mutex::new(VoiceState {
                running: false,
                queue: VecDeque::new(),
                frequency_ratio: 1.0,
                volume: 1.0,
                matrix: vec![1.0; source_channels as usize * destination_channels as usize],
                direct_filter: FilterParameters::default(),
                reverb_filter: FilterParameters::default(),
                reverb_level: 0.0,
                reverb: None,
            }),
            callbacks: Mutex::new(None),
            failure: OnceLock::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, VoiceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn callbacks(&self) -> Option<Arc<dyn VoiceCallback>> {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn check_alive(&self) -> Result<()> {
        match self.failure.get() {
            Some(reason) => Err(ResoundError::AudioDevice(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Lifecycle change of a queued buffer, reported once the state lock is released.
enum Notice {
    Start(AudioBuffer),
    LoopEnd(AudioBuffer),
    End(AudioBuffer),
}

fn notify(callbacks: Option<Arc<dyn VoiceCallback>>, notices: &[Notice]) {
    let Some(callbacks) = callbacks else {
        return;
    };
    for notice in notices {
        match notice {
            Notice::Start(buffer) => callbacks.on_buffer_start(buffer),
            Notice::LoopEnd(buffer) => callbacks.on_loop_end(buffer),
            Notice::End(buffer) => callbacks.on_buffer_end(buffer),
        }
    }
}

/// Single feedback comb standing in for the environmental reverb submix.
struct ReverbLine {
    delay: Vec<f32>,
    index: usize,
    feedback: f32,
    wet: f32,
}

impl ReverbLine {
    fn new(parameters: &ReverbParameters, sample_rate: u32) -> Self {
        let delay_ms = (parameters.reflections_delay_ms + parameters.reverb_delay_ms).max(1);
        let delay_frames = ((delay_ms as u64 * sample_rate as u64) / 1000).max(1) as usize;
        let delay_s = delay_frames as f32 / sample_rate as f32;
        // Decays by 60 dB over decay_time_s
        let feedback = 0.001f32.powf(delay_s / parameters.decay_time_s.max(0.01));
        Self {
            delay: vec![0.0; delay_frames],
            index: 0,
            feedback: feedback.min(0.98),
            wet: (parameters.wet_dry_mix / 100.0).clamp(0.0, 1.0),
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let out = self.delay[self.index];
        self.delay[self.index] = input + out * self.feedback;
        self.index = (self.index + 1) % self.delay.len();
        out * self.wet
    }
}

/// Peak limiter with instant attack and exponential release.
struct Limiter {
    threshold: f32,
    release: f32,
    gain: f32,
}

impl Limiter {
    fn new(settings: &LimiterSettings, sample_rate: u32) -> Self {
        let release_frames = (settings.release_seconds() * sample_rate as f32).max(1.0);
        Self {
            threshold: settings.threshold(),
            release: 1.0 - (-1.0 / release_frames).exp(),
            gain: 1.0,
        }
    }

    fn process(&mut self, frame: &mut [f32]) {
        let peak = frame.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let target = if peak > self.threshold {
            self.threshold / peak
        } else {
            1.0
        };
        if target < self.gain {
            self.gain = target;
        } else {
            self.gain += (target - self.gain) * self.release;
        }
        for sample in frame.iter_mut() {
            *sample *= self.gain;
        }
    }
}

/// Turns queued PCM into interleaved f32 device frames, one block at a time.
struct Renderer {
    shared: Arc<VoiceShared>,
    format: WaveFormat,
    destination_channels: usize,
    device_rate: u32,
    block_size: usize,
    resampler: FastFixedIn<f32>,
    input: Vec<Vec<f32>>,
    direct_state: Vec<f32>,
    reverb_state: Vec<f32>,
    reverb_lines: Vec<ReverbLine>,
    reverb: Option<ReverbParameters>,
    limiter: Option<Limiter>,
    output: Vec<f32>,
}

impl Renderer {
    fn new(
        shared: Arc<VoiceShared>,
        format: WaveFormat,
        destination_channels: u16,
        device_rate: u32,
        desc: &CpalVoiceDesc,
    ) -> Result<Self> {
        let channels = format.channels as usize;
        let block_size = desc.block_size.max(16);
        let resampler = FastFixedIn::<f32>::new(
            device_rate as f64 / format.sample_rate as f64,
            MAX_RELATIVE_RATIO,
            PolynomialDegree::Cubic,
            block_size,
            channels,
        )
        .map_err(|e| ResoundError::AudioFormat(format!("Failed to create resampler: {}", e)))?;

        Ok(Self {
            shared,
            format,
            destination_channels: destination_channels as usize,
            device_rate,
            block_size,
            resampler,
            input: vec![vec![0.0; block_size]; channels],
            direct_state: vec![0.0; channels],
            reverb_state: vec![0.0; channels],
            reverb_lines: Vec::new(),
            reverb: None,
            limiter: desc.limiter.as_ref().map(|l| Limiter::new(l, device_rate)),
            output: Vec::new(),
        })
    }

    /// Output samples one block can produce at most.
    fn max_block_samples(&self) -> usize {
        self.resampler.output_frames_max() * self.destination_channels
    }

    /// Renders the next block. `None` while the voice is stopped or starved.
    fn render_block(&mut self) -> Result<Option<&[f32]>> {
        let mut notices = Vec::new();
        let shared = self.shared.clone();
        let (ratio, volume, matrix, direct, reverb_filter, reverb_level, reverb) = {
            let mut state = shared.state();
            if !state.running || state.queue.is_empty() {
                return Ok(None);
            }
            self.read_frames(&mut state.queue, &mut notices);
            (
                state.frequency_ratio,
                state.volume,
                state.matrix.clone(),
                state.direct_filter.frequency,
                state.reverb_filter.frequency,
                state.reverb_level,
                state.reverb,
            )
        };
        notify(shared.callbacks(), &notices);

        if reverb != self.reverb {
            self.reverb = reverb;
            self.reverb_lines = match &reverb {
                Some(parameters) => (0..self.destination_channels)
                    .map(|_| ReverbLine::new(parameters, self.device_rate))
                    .collect(),
                None => Vec::new(),
            };
        }

        let relative = 1.0 / (ratio as f64).clamp(1.0 / MAX_RELATIVE_RATIO, MAX_RELATIVE_RATIO);
        self.resampler
            .set_resample_ratio_relative(relative, true)
            .map_err(|e| ResoundError::AudioFormat(format!("Resampler rejected ratio {}: {}", ratio, e)))?;
        let resampled = self
            .resampler
            .process(self.input.as_slice(), None)
            .map_err(|e| ResoundError::AudioFormat(format!("Resampling failed: {}", e)))?;

        let sources = self.format.channels as usize;
        let frames = resampled.first().map_or(0, |c| c.len());
        self.output.clear();
        self.output.resize(frames * self.destination_channels, 0.0);
        let mut dry = vec![0.0f32; sources];
        let mut wet = vec![0.0f32; sources];
        for frame in 0..frames {
            for s in 0..sources {
                let x = resampled[s][frame];
                self.direct_state[s] += direct * (x - self.direct_state[s]);
                self.reverb_state[s] += reverb_filter * (x - self.reverb_state[s]);
                dry[s] = self.direct_state[s];
                wet[s] = self.reverb_state[s];
            }
            let out = &mut self.output
                [frame * self.destination_channels..(frame + 1) * self.destination_channels];
            for (d, sample) in out.iter_mut().enumerate() {
                let gains = &matrix[d * sources..(d + 1) * sources];
                let direct_mix: f32 = gains.iter().zip(&dry).map(|(g, x)| g * x).sum();
                let mut mixed = direct_mix;
                if let Some(line) = self.reverb_lines.get_mut(d) {
                    let send: f32 = gains.iter().zip(&wet).map(|(g, x)| g * x).sum();
                    mixed += line.process(send * reverb_level);
                }
                *sample = mixed * volume;
            }
            if let Some(limiter) = self.limiter.as_mut() {
                limiter.process(out);
            }
        }
        Ok(Some(self.output.as_slice()))
    }

    /// Fills one input block from the queue, padding with silence when it runs dry.
    fn read_frames(&mut self, queue: &mut VecDeque<QueuedBuffer>, notices: &mut Vec<Notice>) {
        let frame_bytes = self.format.bytes_per_frame();
        let sample_bytes = self.format.sample_format.bytes_per_sample();
        for frame in 0..self.block_size {
            let Some(front) = queue.front_mut() else {
                for channel in self.input.iter_mut() {
                    channel[frame] = 0.0;
                }
                continue;
            };
            if !front.started {
                front.started = true;
                notices.push(Notice::Start(front.buffer.clone()));
            }
            let bytes = front.buffer.bytes();
            if front.offset + frame_bytes <= bytes.len() {
                for (c, channel) in self.input.iter_mut().enumerate() {
                    let at = front.offset + c * sample_bytes;
                    channel[frame] = decode_sample(self.format.sample_format, &bytes[at..at + sample_bytes]);
                }
                front.offset += frame_bytes;
            } else {
                for channel in self.input.iter_mut() {
                    channel[frame] = 0.0;
                }
                front.offset = bytes.len();
            }

            if front.offset + frame_bytes > front.buffer.len() {
                if front.loops_left > 0 {
                    front.loops_left -= 1;
                    front.offset = 0;
                    notices.push(Notice::LoopEnd(front.buffer.clone()));
                } else if let Some(done) = queue.pop_front() {
                    notices.push(Notice::End(done.buffer));
                }
            }
        }
    }
}

fn decode_sample(format: SampleFormat, bytes: &[u8]) -> f32 {
    match format {
        SampleFormat::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
        SampleFormat::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

/// A voice that plays through the default output device.
///
/// A dedicated thread owns the cpal stream and renders queued buffers into a
/// ring that the device callback drains. Callbacks fire on that thread with no
/// voice lock held.
pub struct CpalVoice {
    format: WaveFormat,
    destination_channels: u16,
    device_sample_rate: u32,
    shared: Arc<VoiceShared>,
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalVoice {
    /// Opens the default output device with one channel per speaker of `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`ResoundError::AudioDevice`] if no device is available or the
    /// stream cannot be built, and [`ResoundError::AudioFormat`] for sample
    /// formats the device path does not support.
    pub fn new(format: WaveFormat, layout: SpeakerLayout, desc: CpalVoiceDesc) -> Result<Self> {
        let destination_channels = layout.channel_count();
        let shared = Arc::new(VoiceShared::new(format.channels, destination_channels));
        let (init_tx, init_rx) = crossbeam_channel::bounded::<Result<u32>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let thread_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name("resound-cpal".into())
            .spawn(move || {
                let (stream, producer_side) =
                    match open_stream(thread_shared.clone(), format, destination_channels, &desc) {
                        Ok(opened) => opened,
                        Err(e) => {
                            let _ = init_tx.send(Err(e));
                            return;
                        }
                    };
                let (mut renderer, mut producer) = producer_side;
                let _ = init_tx.send(Ok(renderer.device_rate));

                let idle = Duration::from_secs_f64(
                    renderer.block_size as f64 / renderer.device_rate.max(1) as f64 / 4.0,
                )
                .max(Duration::from_micros(500));
                loop {
                    match shutdown_rx.recv_timeout(idle) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                    while producer.vacant_len() >= renderer.max_block_samples() {
                        match renderer.render_block() {
                            Ok(Some(samples)) => {
                                producer.push_slice(samples);
                            }
                            Ok(None) => break,
                            Err(e) => {
                                log::error!("Output voice stopped rendering: {}", e);
                                let _ = thread_shared.failure.set(e.to_string());
                                return;
                            }
                        }
                    }
                }
                drop(stream);
                log::debug!("Output voice thread exiting");
            })
            .map_err(|e| ResoundError::AudioDevice(format!("Failed to spawn output thread: {}", e)))?;

        let device_sample_rate = match init_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(ResoundError::AudioDevice(
                    "Output thread exited during initialization".into(),
                ));
            }
        };
        log::info!(
            "Opened output voice: {:?} -> {} channels at {} Hz",
            format,
            destination_channels,
            device_sample_rate
        );

        Ok(Self {
            format,
            destination_channels,
            device_sample_rate,
            shared,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn device_sample_rate(&self) -> u32 {
        self.device_sample_rate
    }
}

type RenderSide = (Renderer, ringbuf::HeapProd<f32>);

fn open_stream(
    shared: Arc<VoiceShared>,
    format: WaveFormat,
    destination_channels: u16,
    desc: &CpalVoiceDesc,
) -> Result<(cpal::Stream, RenderSide)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| ResoundError::AudioDevice("No default output device available".into()))?;
    let default_config = device
        .default_output_config()
        .map_err(|e| ResoundError::AudioDevice(format!("Failed to get default config: {}", e)))?;
    let device_rate = default_config.sample_rate().0;
    let config = cpal::StreamConfig {
        channels: destination_channels,
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    let renderer = Renderer::new(shared, format, destination_channels, device_rate, desc)?;
    let capacity = desc.ring_length.max(renderer.resampler.output_frames_max() * 2)
        * destination_channels as usize;
    let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

    let stream = match default_config.sample_format() {
        cpal::SampleFormat::F32 => create_stream::<f32>(&device, &config, consumer)?,
        cpal::SampleFormat::I16 => create_stream::<i16>(&device, &config, consumer)?,
        cpal::SampleFormat::U16 => create_stream::<u16>(&device, &config, consumer)?,
        other => {
            return Err(ResoundError::AudioFormat(format!(
                "Unsupported device sample format {:?}",
                other
            )));
        }
    };
    stream
        .play()
        .map_err(|e| ResoundError::AudioDevice(format!("Failed to start stream: {}", e)))?;
    Ok((stream, (renderer, producer)))
}

fn create_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<f32>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let popped = consumer.pop_slice(&mut scratch[..data.len()]);
                for (i, sample) in data.iter_mut().enumerate() {
                    let value = if i < popped { scratch[i] } else { 0.0 };
                    *sample = T::from_sample(value);
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| ResoundError::AudioDevice(format!("Failed to build stream: {}", e)))
}

impl DeviceVoice for CpalVoice {
    fn format(&self) -> WaveFormat {
        self.format
    }

    fn destination_channels(&self) -> u16 {
        self.destination_channels
    }

    fn submit_buffer(&self, buffer: AudioBuffer) -> Result<()> {
        self.shared.check_alive()?;
        let loops_left = buffer.loop_count;
        self.shared.state().queue.push_back(QueuedBuffer {
            buffer,
            offset: 0,
            loops_left,
            started: false,
        });
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.shared.check_alive()?;
        self.shared.state().running = true;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.shared.state().running = false;
        Ok(())
    }

    fn flush_buffers(&self) {
        let notices: Vec<Notice> = self
            .shared
            .state()
            .queue
            .drain(..)
            .map(|queued| Notice::End(queued.buffer))
            .collect();
        notify(self.shared.callbacks(), &notices);
    }

    fn queued_buffer_count(&self) -> usize {
        self.shared.state().queue.len()
    }

    fn set_frequency_ratio(&self, ratio: f32) {
        self.shared.state().frequency_ratio = ratio;
    }

    fn set_volume(&self, volume: f32) {
        self.shared.state().volume = volume;
    }

    fn set_output_matrix(&self, source_channels: u16, destination_channels: u16, levels: &[f32]) -> Result<()> {
        check_matrix(source_channels, destination_channels, levels)?;
        if source_channels != self.format.channels || destination_channels != self.destination_channels {
            return Err(ResoundError::AudioFormat(format!(
                "Output matrix is {}x{}, voice is {}x{}",
                source_channels, destination_channels, self.format.channels, self.destination_channels
            )));
        }
        self.shared.state().matrix = levels.to_vec();
        Ok(())
    }

    fn set_filter_parameters(&self, target: FilterTarget, parameters: FilterParameters) {
        let mut state = self.shared.state();
        match target {
            FilterTarget::Direct => state.direct_filter = parameters,
            FilterTarget::Reverb => state.reverb_filter = parameters,
        }
    }

    fn set_reverb_level(&self, level: f32) {
        self.shared.state().reverb_level = level;
    }

    fn set_reverb(&self, parameters: Option<ReverbParameters>) {
        self.shared.state().reverb = parameters;
    }

    fn set_callbacks(&self, callbacks: Arc<dyn VoiceCallback>) {
        *self.shared.callbacks.lock().unwrap_or_else(|e| e.into_inner()) = Some(callbacks);
    }
}

impl Drop for CpalVoice {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Output voice thread panicked");
            }
        }
        // Buffers left behind still owe their end notification
        self.flush_buffers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        started: AtomicUsize,
        looped: AtomicUsize,
        ended: AtomicUsize,
    }

    impl VoiceCallback for Counter {
        fn on_buffer_start(&self, _buffer: &AudioBuffer) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_buffer_end(&self, _buffer: &AudioBuffer) {
            self.ended.fetch_add(1, Ordering::SeqCst);
        }
        fn on_loop_end(&self, _buffer: &AudioBuffer) {
            self.looped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pcm_f32(samples: &[f32]) -> AudioBuffer {
        AudioBuffer::from_bytes(samples.iter().flat_map(|s| s.to_le_bytes()).collect())
    }

    fn renderer(shared: Arc<VoiceShared>, desc: CpalVoiceDesc) -> Renderer {
        let format = WaveFormat::new(48_000, 1, SampleFormat::F32);
        Renderer::new(shared, format, 2, 48_000, &desc).unwrap()
    }

    fn queue(shared: &VoiceShared, buffer: AudioBuffer) {
        let loops_left = buffer.loop_count;
        shared.state().queue.push_back(QueuedBuffer {
            buffer,
            offset: 0,
            loops_left,
            started: false,
        });
    }

    #[test]
    fn stopped_or_empty_voice_renders_nothing() {
        let shared = Arc::new(VoiceShared::new(1, 2));
        let mut renderer = renderer(shared.clone(), CpalVoiceDesc::default());
        assert!(renderer.render_block().unwrap().is_none());
        queue(&shared, pcm_f32(&[0.5; 64]));
        assert!(renderer.render_block().unwrap().is_none());
    }

    #[test]
    fn buffers_are_consumed_in_order_with_callbacks() {
        let shared = Arc::new(VoiceShared::new(1, 2));
        let counter = Arc::new(Counter::default());
        *shared.callbacks.lock().unwrap() = Some(counter.clone() as Arc<dyn VoiceCallback>);
        let mut renderer = renderer(shared.clone(), CpalVoiceDesc::new().with_block_size(64));
        shared.state().running = true;

        queue(&shared, pcm_f32(&[0.25; 32]));
        let mut looped = pcm_f32(&[0.25; 16]);
        looped.loop_count = 1;
        queue(&shared, looped);

        let samples = renderer.render_block().unwrap().unwrap().len();
        assert_eq!(samples % 2, 0);
        assert_eq!(counter.started.load(Ordering::SeqCst), 2);
        assert_eq!(counter.looped.load(Ordering::SeqCst), 1);
        assert_eq!(counter.ended.load(Ordering::SeqCst), 2);
        assert_eq!(shared.state().queue.len(), 0);
    }

    #[test]
    fn matrix_and_volume_shape_the_output() {
        let shared = Arc::new(VoiceShared::new(1, 2));
        let mut renderer = renderer(shared.clone(), CpalVoiceDesc::new().with_limiter(None));
        {
            let mut state = shared.state();
            state.running = true;
            state.matrix = vec![1.0, 0.0];
            state.volume = 0.5;
        }
        queue(&shared, pcm_f32(&[0.8; 4096]));
        // Let the resampler's startup delay pass
        let mut last = (0.0, 0.0);
        for _ in 0..4 {
            let out = renderer.render_block().unwrap().unwrap();
            let n = out.len();
            last = (out[n - 2], out[n - 1]);
        }
        assert_relative_eq!(last.0, 0.4, epsilon = 1e-3);
        assert_relative_eq!(last.1, 0.0);
    }

    #[test]
    fn limiter_holds_peaks_under_threshold() {
        let settings = LimiterSettings::new(1, 500).unwrap();
        let mut limiter = Limiter::new(&settings, 48_000);
        let mut frame = [0.9, -1.0];
        limiter.process(&mut frame);
        assert_relative_eq!(frame[1], -0.5, epsilon = 1e-6);
        assert!(frame[0].abs() <= 0.5);

        let mut quiet = [0.1, 0.1];
        limiter.process(&mut quiet);
        assert!(quiet[0] < 0.1);
    }

    #[test]
    fn reverb_line_echoes_after_its_delay() {
        let parameters = ReverbParameters {
            reflections_delay_ms: 1,
            reverb_delay_ms: 1,
            ..Default::default()
        };
        let mut line = ReverbLine::new(&parameters, 1000);
        assert_eq!(line.process(1.0), 0.0);
        assert_eq!(line.process(0.0), 0.0);
        assert!(line.process(0.0) > 0.0);
    }

    #[test]
    fn decodes_both_sample_formats() {
        assert_relative_eq!(decode_sample(SampleFormat::I16, &i16::MIN.to_le_bytes()), -1.0);
        assert_relative_eq!(decode_sample(SampleFormat::F32, &0.25f32.to_le_bytes()), 0.25);
    }
}

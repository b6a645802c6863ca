use crate::config::StreamingDesc;
use crate::device::{DeviceVoice, VoiceCallback};
use crate::error::{ResoundError, Result};
use crate::events::{EventSender, ResoundEvent, emit};
use crate::instance::InstanceId;
use crate::playback::ring::{AudioBuffer, StreamingBufferRing};
use crate::playback::state::{PlaybackState, StreamShared};
use crate::source::{AudioSource, WaveFormat};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Drives one streaming instance: a dedicated thread decodes through a
/// [`StreamingBufferRing`] and keeps the device voice fed, while the owner
/// issues transport commands from the update thread.
///
/// Commands never block on the streaming thread except [`play`](Self::play),
/// which waits (bounded by [`StreamingDesc::first_buffer_timeout`]) until the
/// first buffer of the new pass is queued.
pub struct PlaybackEngine {
    id: InstanceId,
    shared: Arc<StreamShared>,
    voice: Arc<dyn DeviceVoice>,
    events: EventSender,
    desc: StreamingDesc,
    format: WaveFormat,
    duration: Duration,
    thread: Option<JoinHandle<Result<()>>>,
}

impl PlaybackEngine {
    /// Spawns the streaming thread for `source`, feeding `voice`.
    ///
    /// # Errors
    ///
    /// Fails if the source and voice disagree on PCM format or the thread
    /// cannot be spawned.
    pub fn new<S: AudioSource + 'static>(
        id: InstanceId,
        source: S,
        voice: Arc<dyn DeviceVoice>,
        desc: StreamingDesc,
        events: EventSender,
    ) -> Result<Self> {
        let format = source.format();
        if format != voice.format() {
            return Err(ResoundError::AudioFormat(format!(
                "Source format {:?} does not match voice format {:?}",
                format,
                voice.format()
            )));
        }
        let duration = source.duration();

        let shared = Arc::new(StreamShared::new(format, desc.poll_interval));
        voice.set_callbacks(Arc::new(EngineCallbacks {
            id,
            shared: shared.clone(),
            events: events.clone(),
        }));

        let streamer = Streamer {
            id,
            ring: StreamingBufferRing::new(source, desc.ring_capacity),
            shared: shared.clone(),
            voice: voice.clone(),
            events: events.clone(),
            loop_start: desc.loop_start,
            continue_generation: None,
            loop_count: 0,
        };
        let thread = std::thread::Builder::new()
            .name(format!("resound-stream-{}", id))
            .spawn(move || streamer.run())
            .map_err(|e| ResoundError::Engine(format!("Failed to spawn streaming thread: {}", e)))?;

        log::info!(
            "Created playback engine {} ({} Hz, {} ch, {:.2}s, ring of {})",
            id,
            format.sample_rate,
            format.channels,
            duration.as_secs_f64(),
            desc.ring_capacity.max(1)
        );

        Ok(Self {
            id,
            shared,
            voice,
            events,
            desc,
            format,
            duration,
            thread: Some(thread),
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn format(&self) -> WaveFormat {
        self.format
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn voice(&self) -> &Arc<dyn DeviceVoice> {
        &self.voice
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    pub fn position(&self) -> Duration {
        self.shared.position()
    }

    pub fn is_looped(&self) -> bool {
        self.shared.is_looped()
    }

    pub fn set_looped(&self, looped: bool) {
        self.shared.set_looped(looped);
    }

    /// Set once the stream ended naturally; cleared by the next `play`.
    pub fn is_due_for_disposal(&self) -> bool {
        self.shared.is_due_for_disposal()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// The decode error that ended the streaming thread, if any.
    pub fn failure(&self) -> Option<&str> {
        self.shared.failure()
    }

    /// Ok(false) means disposed: the command is silently ignored.
    fn check_alive(&self) -> Result<bool> {
        if self.shared.is_disposed() {
            return Ok(false);
        }
        if let Some(message) = self.shared.failure() {
            return Err(ResoundError::PlaybackFailed(message.to_string()));
        }
        Ok(true)
    }

    /// Starts playback from the requested position, or resumes if paused.
    pub fn play(&self) -> Result<()> {
        if !self.check_alive()? {
            return Ok(());
        }
        match self.shared.state() {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => self.resume(),
            PlaybackState::Stopped => self.start_from(self.shared.requested_position()),
        }
    }

    /// Starts playback at `start`. While playing this is a seek; while paused
    /// it resumes where playback stopped and `start` is ignored.
    pub fn play_from(&self, start: Duration) -> Result<()> {
        if !self.check_alive()? {
            return Ok(());
        }
        match self.shared.state() {
            PlaybackState::Stopped => self.start_from(start),
            PlaybackState::Playing => self.set_position(start),
            PlaybackState::Paused => self.resume(),
        }
    }

    fn start_from(&self, start: Duration) -> Result<()> {
        self.voice.flush_buffers();
        self.shared.set_requested_position(start);
        self.shared.reset_position(start);
        self.shared.set_due_for_disposal(false);
        let generation = self.shared.bump_generation();
        self.voice.start()?;

        // Sent before the thread can run so AudioStart always precedes AudioEnd
        emit(&self.events, ResoundEvent::AudioStart { instance: self.id });
        if !self.shared.transition(PlaybackState::Stopped, PlaybackState::Playing) {
            return Ok(());
        }
        log::debug!("Instance {} playing from {:?}", self.id, start);

        if !self
            .shared
            .wait_ready(generation, self.desc.first_buffer_timeout)
        {
            if let Some(message) = self.shared.failure() {
                return Err(ResoundError::PlaybackFailed(message.to_string()));
            }
            if self.shared.generation() == generation && !self.shared.is_disposed() {
                log::warn!(
                    "Instance {}: no buffer queued within {:?}",
                    self.id,
                    self.desc.first_buffer_timeout
                );
            }
        }
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        if !self.check_alive()? {
            return Ok(());
        }
        if self
            .shared
            .transition(PlaybackState::Playing, PlaybackState::Paused)
        {
            self.voice.stop()?;
            log::debug!("Instance {} paused at {:?}", self.id, self.position());
        }
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        if !self.check_alive()? {
            return Ok(());
        }
        if self
            .shared
            .transition(PlaybackState::Paused, PlaybackState::Playing)
        {
            self.voice.start()?;
            log::debug!("Instance {} resumed", self.id);
        }
        Ok(())
    }

    /// Stops playback and rewinds to the start.
    ///
    /// `immediate` halts the transport and discards queued buffers; otherwise
    /// no further buffers are submitted, the queued ones play out, and the
    /// streaming thread stops the transport once the voice runs dry.
    pub fn stop(&self, immediate: bool) -> Result<()> {
        if !self.check_alive()? {
            return Ok(());
        }
        let previous = self.shared.state();
        self.shared.set_state(PlaybackState::Stopped);
        self.shared.bump_generation();
        self.shared.set_requested_position(Duration::ZERO);
        if immediate || previous != PlaybackState::Playing {
            self.voice.stop()?;
            self.voice.flush_buffers();
        }
        self.shared.reset_position(Duration::ZERO);
        if previous != PlaybackState::Stopped {
            log::debug!("Instance {} stopped (immediate: {})", self.id, immediate);
        }
        Ok(())
    }

    /// Moves playback to `position`. Buffers decoded from the old position are
    /// discarded; a stopped instance starts from here on the next `play`.
    pub fn set_position(&self, position: Duration) -> Result<()> {
        if !self.check_alive()? {
            return Ok(());
        }
        self.shared.set_requested_position(position);
        self.shared.bump_generation();
        if self.shared.state() != PlaybackState::Stopped {
            self.voice.flush_buffers();
            self.shared.reset_position(position);
        }
        log::debug!("Instance {} seek to {:?}", self.id, position);
        Ok(())
    }

    /// Stops the streaming thread and releases the voice. Idempotent.
    pub fn dispose(&mut self) {
        if self.thread.is_none() {
            return;
        }
        self.shared.dispose();
        if let Some(handle) = self.thread.take() {
            match handle.join() {
                Ok(Ok(())) => log::debug!("Streaming thread {} exited", self.id),
                Ok(Err(e)) => log::debug!("Streaming thread {} exited with {}", self.id, e),
                Err(_) => log::error!("Streaming thread {} panicked", self.id),
            }
        }
        if let Err(e) = self.voice.stop() {
            log::warn!("Failed to stop voice of instance {}: {}", self.id, e);
        }
        self.voice.flush_buffers();
        log::info!("Disposed playback engine {}", self.id);
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Device notifications feeding position tracking and backpressure wake-ups.
struct EngineCallbacks {
    id: InstanceId,
    shared: Arc<StreamShared>,
    events: EventSender,
}

impl VoiceCallback for EngineCallbacks {
    fn on_buffer_start(&self, buffer: &AudioBuffer) {
        log::trace!("Instance {} buffer start ({} bytes)", self.id, buffer.len());
    }

    fn on_buffer_end(&self, buffer: &AudioBuffer) {
        // Tails of a stopped pass do not move the position
        if self.shared.state() == PlaybackState::Stopped {
            self.shared.notify();
        } else {
            self.shared.add_consumed(buffer.len());
        }
    }

    /// Re-raised for buffers submitted with a nonzero loop count. Stream loops
    /// driven by the streaming thread submit plain buffers and report their
    /// `LoopEnd` from `finish_stream` instead.
    fn on_loop_end(&self, buffer: &AudioBuffer) {
        emit(
            &self.events,
            ResoundEvent::LoopEnd {
                instance: self.id,
                loop_count: buffer.loop_count,
            },
        );
    }
}

enum PassOutcome {
    /// Paused, stopped, seeked or disposed before the stream ended.
    Superseded,
    /// The source is exhausted; `submitted` buffers were queued this pass.
    EndOfStream { submitted: usize },
}

/// State owned by the streaming thread.
struct Streamer<S: AudioSource> {
    id: InstanceId,
    ring: StreamingBufferRing<S>,
    shared: Arc<StreamShared>,
    voice: Arc<dyn DeviceVoice>,
    events: EventSender,
    loop_start: Duration,
    /// Generation whose pass left the ring cursor exactly where the next pass
    /// of that generation must continue (pause/resume, loop restart).
    continue_generation: Option<u64>,
    loop_count: u32,
}

impl<S: AudioSource> Streamer<S> {
    fn run(mut self) -> Result<()> {
        log::debug!("Streaming thread {} started", self.id);
        while self.shared.wait_until_playing() {
            let generation = self.shared.generation();
            let result = match self.run_pass(generation) {
                Ok(PassOutcome::Superseded) => {
                    self.stop_after_tail();
                    Ok(())
                }
                Ok(PassOutcome::EndOfStream { submitted }) => self.finish_stream(generation, submitted),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                self.fail(generation, &e);
                return Err(e);
            }
        }
        Ok(())
    }

    fn run_pass(&mut self, generation: u64) -> Result<PassOutcome> {
        if self.continue_generation != Some(generation) {
            let start = self.shared.requested_position();
            self.ring.set_position(start)?;
            self.shared.reset_position(start);
            self.continue_generation = Some(generation);
            self.loop_count = 0;
            log::debug!("Instance {} pass {} from {:?}", self.id, generation, start);
        }

        let capacity = self.ring.capacity();
        let mut submitted = 0;
        loop {
            let shared = &self.shared;
            let voice = &self.voice;
            let has_room = shared.wait_until(
                || voice.queued_buffer_count() < capacity,
                || !shared.pass_is_current(generation),
            );
            if !has_room {
                return Ok(PassOutcome::Superseded);
            }

            let Some(buffer) = self.ring.try_get_next()? else {
                return Ok(PassOutcome::EndOfStream { submitted });
            };
            // A seek landed while decoding
            if self.shared.generation() != generation {
                return Ok(PassOutcome::Superseded);
            }
            log::trace!(
                "Instance {} submitting {} bytes (eos: {})",
                self.id,
                buffer.len(),
                buffer.end_of_stream
            );
            self.voice.submit_buffer(buffer)?;
            if self.shared.generation() != generation {
                // Raced with a seek's flush; drop what we just queued
                self.voice.flush_buffers();
                return Ok(PassOutcome::Superseded);
            }
            if submitted == 0 {
                self.shared.signal_ready(generation);
            }
            submitted += 1;
        }
    }

    /// After a non-immediate stop, waits for the queued tail to play out and
    /// then halts the transport. Gives up as soon as a new pass starts.
    fn stop_after_tail(&self) {
        if self.shared.state() != PlaybackState::Stopped {
            return;
        }
        let generation = self.shared.generation();
        let shared = &self.shared;
        let voice = &self.voice;
        let still_stopped = || {
            !shared.is_disposed()
                && shared.state() == PlaybackState::Stopped
                && shared.generation() == generation
        };
        let drained = shared.wait_until(|| voice.queued_buffer_count() == 0, || !still_stopped());
        if !drained {
            return;
        }
        if let Err(e) = self.voice.stop() {
            log::warn!("Failed to stop voice of instance {}: {}", self.id, e);
        }
        // A play may have started its transport before the stop above; an
        // empty running voice is harmless, a stopped one under Playing is not
        if self.shared.generation() != generation {
            if let Err(e) = self.voice.start() {
                log::warn!("Failed to restart voice of instance {}: {}", self.id, e);
            }
        } else {
            log::debug!("Instance {} stopped after its queued tail", self.id);
        }
    }

    fn finish_stream(&mut self, generation: u64, submitted: usize) -> Result<()> {
        self.shared.signal_ready(generation);

        if self.shared.is_looped() {
            if submitted > 0 {
                self.loop_count = self.loop_count.saturating_add(1);
                self.ring.set_position(self.loop_start)?;
                self.shared.reset_position(self.loop_start);
                emit(
                    &self.events,
                    ResoundEvent::LoopEnd {
                        instance: self.id,
                        loop_count: self.loop_count,
                    },
                );
                return Ok(());
            }
            log::warn!(
                "Instance {}: nothing to play after loop start {:?}, ending instead",
                self.id,
                self.loop_start
            );
        }

        let shared = &self.shared;
        let voice = &self.voice;
        let drained = shared.wait_until(
            || voice.queued_buffer_count() == 0,
            || !shared.pass_is_current(generation),
        );
        if !drained {
            return Ok(());
        }

        if self.shared.generation() == generation
            && self
                .shared
                .transition(PlaybackState::Playing, PlaybackState::Stopped)
        {
            if let Err(e) = self.voice.stop() {
                log::warn!("Failed to stop voice of instance {}: {}", self.id, e);
            }
            self.shared.set_requested_position(Duration::ZERO);
            self.continue_generation = None;
            log::debug!("Instance {} reached end of stream", self.id);
            emit(&self.events, ResoundEvent::AudioEnd { instance: self.id });
            // AudioEnd is queued before any reaper can observe this flag
            self.shared.set_due_for_disposal(true);
        }
        Ok(())
    }

    fn fail(&self, generation: u64, error: &ResoundError) {
        log::error!("Instance {} streaming failed: {}", self.id, error);
        emit(
            &self.events,
            ResoundEvent::PlaybackFailed {
                instance: self.id,
                error: error.to_string(),
            },
        );
        self.shared.fail(error.to_string());
        self.shared.signal_ready(generation);
    }
}

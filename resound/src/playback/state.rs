//! State shared between the update thread and one streaming thread.
//!
//! Every field has a single writer per transition and is read opportunistically
//! by the other side. Staleness is resolved by the generation counter rather
//! than by holding a lock across the pipeline; the mutex/condvar pair exists
//! only so the streaming thread can sleep until something changes.

use crate::source::WaveFormat;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Playback state of a streaming instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PlaybackState {
    /// Not playing; position is at the start (or the last requested seek).
    Stopped = 0,
    /// The streaming thread is decoding and submitting buffers.
    Playing = 1,
    /// Transport halted; queued buffers and position are retained.
    Paused = 2,
}

impl PlaybackState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Playing,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

pub(crate) struct StreamShared {
    state: AtomicU8,
    generation: AtomicU64,
    requested_position_ns: AtomicU64,
    looped: AtomicBool,
    disposed: AtomicBool,
    due_for_disposal: AtomicBool,
    failure: OnceLock<String>,
    /// Last generation whose pass delivered its first buffer (or ended without one).
    ready_generation: AtomicU64,
    position_origin_ns: AtomicU64,
    consumed_bytes: AtomicU64,
    format: WaveFormat,
    poll_interval: Duration,
    wake_lock: Mutex<()>,
    wake: Condvar,
}

impl StreamShared {
    pub(crate) fn new(format: WaveFormat, poll_interval: Duration) -> Self {
        Self {
            state: AtomicU8::new(PlaybackState::Stopped as u8),
            generation: AtomicU64::new(0),
            requested_position_ns: AtomicU64::new(0),
            looped: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            due_for_disposal: AtomicBool::new(false),
            failure: OnceLock::new(),
            ready_generation: AtomicU64::new(0),
            position_origin_ns: AtomicU64::new(0),
            consumed_bytes: AtomicU64::new(0),
            format,
            poll_interval: poll_interval.max(Duration::from_micros(100)),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: PlaybackState) {
        self.state.store(state as u8, Ordering::Release);
        self.notify();
    }

    /// Atomically moves `from -> to`; returns false if the state was not `from`.
    pub(crate) fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        let changed = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if changed {
            self.notify();
        }
        changed
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invalidates every in-flight pass. Returns the new generation.
    pub(crate) fn bump_generation(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.notify();
        generation
    }

    pub(crate) fn requested_position(&self) -> Duration {
        Duration::from_nanos(self.requested_position_ns.load(Ordering::Acquire))
    }

    pub(crate) fn set_requested_position(&self, position: Duration) {
        self.requested_position_ns
            .store(duration_to_nanos(position), Ordering::Release);
    }

    pub(crate) fn is_looped(&self) -> bool {
        self.looped.load(Ordering::Acquire)
    }

    pub(crate) fn set_looped(&self, looped: bool) {
        self.looped.store(looped, Ordering::Release);
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.notify();
    }

    pub(crate) fn is_due_for_disposal(&self) -> bool {
        self.due_for_disposal.load(Ordering::Acquire)
    }

    pub(crate) fn set_due_for_disposal(&self, due: bool) {
        self.due_for_disposal.store(due, Ordering::Release);
    }

    pub(crate) fn failure(&self) -> Option<&str> {
        self.failure.get().map(String::as_str)
    }

    pub(crate) fn fail(&self, message: String) {
        let _ = self.failure.set(message);
        self.notify();
    }

    /// Playback position: origin of the current pass plus what the device has played.
    pub(crate) fn position(&self) -> Duration {
        let origin = Duration::from_nanos(self.position_origin_ns.load(Ordering::Acquire));
        origin + self.format.duration_of(self.consumed_bytes.load(Ordering::Acquire))
    }

    pub(crate) fn reset_position(&self, origin: Duration) {
        self.position_origin_ns
            .store(duration_to_nanos(origin), Ordering::Release);
        self.consumed_bytes.store(0, Ordering::Release);
    }

    pub(crate) fn add_consumed(&self, bytes: usize) {
        self.consumed_bytes
            .fetch_add(bytes as u64, Ordering::AcqRel);
        self.notify();
    }

    /// Opens the one-shot gate `play` waits on.
    pub(crate) fn signal_ready(&self, generation: u64) {
        self.ready_generation.fetch_max(generation, Ordering::AcqRel);
        self.notify();
    }

    /// True while the pass started at `generation` should keep running.
    pub(crate) fn pass_is_current(&self, generation: u64) -> bool {
        !self.is_disposed()
            && self.state() == PlaybackState::Playing
            && self.generation() == generation
    }

    pub(crate) fn notify(&self) {
        let _guard = self.wake_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.wake.notify_all();
    }

    /// Sleeps until `done` holds, for at most one poll interval per check.
    ///
    /// Returns false without waiting further once `abort` holds.
    pub(crate) fn wait_until(&self, mut done: impl FnMut() -> bool, mut abort: impl FnMut() -> bool) -> bool {
        let mut guard = self.wake_lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if abort() {
                return false;
            }
            if done() {
                return true;
            }
            guard = match self.wake.wait_timeout(guard, self.poll_interval) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
    }

    /// Blocks the streaming thread while the instance is not playing.
    ///
    /// Returns false once the instance is disposed.
    pub(crate) fn wait_until_playing(&self) -> bool {
        self.wait_until(
            || self.state() == PlaybackState::Playing,
            || self.is_disposed(),
        )
    }

    /// Blocks the caller of `play` until the pass for `generation` has its
    /// first buffer queued, the pass is superseded, or `timeout` elapses.
    pub(crate) fn wait_ready(&self, generation: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.wait_until(
            || self.ready_generation.load(Ordering::Acquire) >= generation,
            || {
                self.is_disposed()
                    || self.failure().is_some()
                    || self.generation() != generation
                    || self.state() != PlaybackState::Playing
                    || Instant::now() >= deadline
            },
        )
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SampleFormat;
    use std::sync::Arc;

    fn shared() -> StreamShared {
        StreamShared::new(
            WaveFormat::new(1000, 1, SampleFormat::I16),
            Duration::from_millis(1),
        )
    }

    #[test]
    fn transition_only_from_expected_state() {
        let shared = shared();
        assert!(!shared.transition(PlaybackState::Playing, PlaybackState::Paused));
        assert!(shared.transition(PlaybackState::Stopped, PlaybackState::Playing));
        assert_eq!(shared.state(), PlaybackState::Playing);
    }

    #[test]
    fn generation_is_monotonic() {
        let shared = shared();
        let first = shared.bump_generation();
        let second = shared.bump_generation();
        assert!(second > first);
        assert!(!shared.pass_is_current(first));
    }

    #[test]
    fn position_tracks_consumed_bytes() {
        let shared = shared();
        shared.reset_position(Duration::from_secs(1));
        shared.add_consumed(1000);
        assert_eq!(shared.position(), Duration::from_millis(1500));
    }

    #[test]
    fn wait_until_playing_returns_false_on_dispose() {
        let shared = Arc::new(shared());
        let waiter = {
            let shared = shared.clone();
            std::thread::spawn(move || shared.wait_until_playing())
        };
        std::thread::sleep(Duration::from_millis(10));
        shared.dispose();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn wait_ready_times_out() {
        let shared = shared();
        shared.set_state(PlaybackState::Playing);
        let generation = shared.bump_generation();
        assert!(!shared.wait_ready(generation, Duration::from_millis(5)));
        shared.signal_ready(generation);
        assert!(shared.wait_ready(generation, Duration::from_millis(5)));
    }
}

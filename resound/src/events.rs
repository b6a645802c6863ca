//! Event types for Resound
//!
//! Playback notifications are delivered as typed messages over a
//! `crossbeam-channel` rather than callbacks, so the host drains them on its own
//! thread with [`SoundInstance::poll_events`](crate::SoundInstance::poll_events)
//! or [`ResoundWorld::poll_events`](crate::ResoundWorld::poll_events).

use crate::instance::InstanceId;

#[derive(Debug, Clone, PartialEq)]
pub enum ResoundEvent {
    /// Playback started from `Stopped`. Resuming from pause does not fire this.
    AudioStart { instance: InstanceId },
    /// The stream reached its end with looping disabled and the instance stopped.
    AudioEnd { instance: InstanceId },
    /// The stream reached its end with looping enabled and restarted.
    LoopEnd {
        instance: InstanceId,
        loop_count: u32,
    },
    /// The streaming thread hit a fatal decode error. The instance must be recreated.
    PlaybackFailed { instance: InstanceId, error: String },
}

impl ResoundEvent {
    pub fn instance(&self) -> InstanceId {
        match self {
            Self::AudioStart { instance }
            | Self::AudioEnd { instance }
            | Self::LoopEnd { instance, .. }
            | Self::PlaybackFailed { instance, .. } => *instance,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::PlaybackFailed { .. })
    }
}

pub(crate) type EventSender = crossbeam_channel::Sender<ResoundEvent>;
pub(crate) type EventReceiver = crossbeam_channel::Receiver<ResoundEvent>;

/// Sends an event, ignoring a disconnected receiver (the host dropped its end).
pub(crate) fn emit(sender: &EventSender, event: ResoundEvent) {
    log::debug!("Emitting {:?}", event);
    if sender.send(event).is_err() {
        log::trace!("Event receiver dropped; event discarded");
    }
}

//! Streaming playback: the buffer ring and the per-instance streaming thread.

mod engine;
mod ring;
mod state;

pub use engine::PlaybackEngine;
pub use ring::{AudioBuffer, StreamingBufferRing};
pub use state::PlaybackState;

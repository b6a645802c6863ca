//! Resound: streamed playback and listener/emitter spatialization for game audio.
//!
//! Each [`SoundInstance`] streams decoded chunks from an [`AudioSource`] into a
//! [`DeviceVoice`] on its own thread, while the host thread drives transport
//! controls and a per-tick 3D update through [`ResoundWorld`].

pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod instance;
pub mod math;
pub mod playback;
pub mod router;
pub mod source;
pub mod spatial;
pub mod world;

pub use config::{LimiterSettings, SpatialDesc, StreamingDesc};
pub use device::{
    CaptureVoice, CpalVoice, CpalVoiceDesc, DeviceVoice, DrainMode, FilterParameters,
    FilterTarget, ReverbParameters, VoiceCallback,
};
pub use error::{ResoundError, Result};
pub use events::ResoundEvent;
pub use instance::{InstanceId, SoundInstance};
pub use math::Pose;
pub use playback::{AudioBuffer, PlaybackEngine, PlaybackState, StreamingBufferRing};
pub use router::{OutputMatrix, OutputRouter};
pub use source::{AudioSource, MemorySource, SampleFormat, SymphoniaSource, WaveFormat};
pub use spatial::{
    CalculateFlags, Cone, Curve, DspResult, Emitter, Listener, SpatialCalculator, SpeakerLayout,
};
pub use world::ResoundWorld;

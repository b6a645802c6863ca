//! Listener/emitter spatialization.
//!
//! [`SpatialCalculator::calculate`] turns a [`Listener`] and an [`Emitter`] into
//! a [`DspResult`]: a speaker matrix from distance curves, cones and speaker
//! azimuths, a doppler ratio from relative radial velocity, and low-pass
//! coefficients for the direct and reverb sends. It runs on the update thread
//! and never touches the streaming pipeline.

mod agent;
mod calculator;
mod cone;
mod curve;
mod speakers;

pub use agent::{Emitter, Listener};
pub use calculator::{
    CalculateFlags, DspResult, MAX_DOPPLER_RATIO, MIN_DOPPLER_RATIO, SpatialCalculator,
};
pub use cone::{Cone, ConeFactors};
pub use curve::{Curve, CurvePoint};
pub use speakers::SpeakerLayout;

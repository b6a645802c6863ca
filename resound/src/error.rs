//! Error types for Resound

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResoundError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid {name}: {value} (expected {min}..={max})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    #[error("{0} has been disposed")]
    Disposed(&'static str),

    #[error("Engine error: {0}")]
    Engine(String),
}

impl ResoundError {
    /// Returns an [`ResoundError::InvalidParameter`] unless `value` lies in `min..=max`.
    pub(crate) fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
        if (min..=max).contains(&value) {
            Ok(())
        } else {
            Err(Self::InvalidParameter {
                name,
                value,
                min,
                max,
            })
        }
    }
}

pub type Result<T> = std::result::Result<T, ResoundError>;

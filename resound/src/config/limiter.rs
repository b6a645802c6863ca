use crate::error::{ResoundError, Result};

/// Mastering limiter parameters.
///
/// Unlike pan, pitch and volume, out-of-range limiter values are rejected with
/// [`ResoundError::InvalidParameter`] instead of being clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSettings {
    release: u32,
    loudness: u32,
}

impl LimiterSettings {
    pub const MIN_RELEASE: u32 = 1;
    pub const MAX_RELEASE: u32 = 20;
    pub const MIN_LOUDNESS: u32 = 1;
    pub const MAX_LOUDNESS: u32 = 1800;

    /// Creates limiter settings.
    ///
    /// # Arguments
    ///
    /// * `release` - Release speed, 1 (fastest) to 20 (slowest), in 6 ms steps
    /// * `loudness` - Threshold, 1 to 1800, where 1000 is unity
    ///
    /// # Errors
    ///
    /// Returns [`ResoundError::InvalidParameter`] if either value is out of range.
    pub fn new(release: u32, loudness: u32) -> Result<Self> {
        ResoundError::check_range(
            "limiter release",
            release as f64,
            Self::MIN_RELEASE as f64,
            Self::MAX_RELEASE as f64,
        )?;
        ResoundError::check_range(
            "limiter loudness",
            loudness as f64,
            Self::MIN_LOUDNESS as f64,
            Self::MAX_LOUDNESS as f64,
        )?;
        Ok(Self { release, loudness })
    }

    pub fn release(&self) -> u32 {
        self.release
    }

    pub fn loudness(&self) -> u32 {
        self.loudness
    }

    /// Linear peak threshold the limiter holds output below.
    pub fn threshold(&self) -> f32 {
        self.loudness as f32 / 1000.0
    }

    /// Release time in seconds.
    pub fn release_seconds(&self) -> f32 {
        self.release as f32 * 0.006
    }
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            release: 6,
            loudness: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bounds() {
        assert!(LimiterSettings::new(1, 1).is_ok());
        assert!(LimiterSettings::new(20, 1800).is_ok());
    }

    #[test]
    fn rejects_out_of_range_release() {
        let err = LimiterSettings::new(21, 1000).unwrap_err();
        assert!(matches!(
            err,
            ResoundError::InvalidParameter {
                name: "limiter release",
                ..
            }
        ));
    }

    #[test]
    fn rejects_out_of_range_loudness() {
        assert!(LimiterSettings::new(6, 0).is_err());
        assert!(LimiterSettings::new(6, 1801).is_err());
    }
}

use std::f32::consts::PI;

/// Directional attenuation around an agent's forward axis.
///
/// Angles are full cone widths in radians (`0..=2π`). Inside the inner cone the
/// inner scalars apply, outside the outer cone the outer scalars; in between
/// they are blended linearly by angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cone {
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub inner_volume: f32,
    pub outer_volume: f32,
    pub inner_lpf: f32,
    pub outer_lpf: f32,
    pub inner_reverb: f32,
    pub outer_reverb: f32,
}

/// Scalars a cone contributes for one direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConeFactors {
    pub volume: f32,
    pub lpf: f32,
    pub reverb: f32,
}

impl Default for Cone {
    fn default() -> Self {
        Self {
            inner_angle: PI / 2.0,
            outer_angle: PI,
            inner_volume: 1.0,
            outer_volume: 0.5,
            inner_lpf: 1.0,
            outer_lpf: 0.75,
            inner_reverb: 1.0,
            outer_reverb: 1.0,
        }
    }
}

impl Cone {
    pub fn new(inner_angle: f32, outer_angle: f32, inner_volume: f32, outer_volume: f32) -> Self {
        let inner_angle = inner_angle.clamp(0.0, 2.0 * PI);
        Self {
            inner_angle,
            outer_angle: outer_angle.clamp(inner_angle, 2.0 * PI),
            inner_volume,
            outer_volume,
            ..Default::default()
        }
    }

    pub fn with_lpf(mut self, inner: f32, outer: f32) -> Self {
        self.inner_lpf = inner;
        self.outer_lpf = outer;
        self
    }

    pub fn with_reverb(mut self, inner: f32, outer: f32) -> Self {
        self.inner_reverb = inner;
        self.outer_reverb = outer;
        self
    }

    /// Factors for a direction `angle` radians off the forward axis (`0..=π`).
    pub fn factors(&self, angle: f32) -> ConeFactors {
        let inner_half = self.inner_angle * 0.5;
        let outer_half = self.outer_angle * 0.5;
        let t = if angle <= inner_half {
            0.0
        } else if angle >= outer_half || outer_half - inner_half <= f32::EPSILON {
            1.0
        } else {
            (angle - inner_half) / (outer_half - inner_half)
        };
        let lerp = |inner: f32, outer: f32| inner + (outer - inner) * t;
        ConeFactors {
            volume: lerp(self.inner_volume, self.outer_volume),
            lpf: lerp(self.inner_lpf, self.outer_lpf),
            reverb: lerp(self.inner_reverb, self.outer_reverb),
        }
    }
}

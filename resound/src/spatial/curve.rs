use crate::error::{ResoundError, Result};

/// One control point of a [`Curve`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    /// Normalized distance in `0.0..=1.0`.
    pub distance: f32,
    pub value: f32,
}

impl CurvePoint {
    pub const fn new(distance: f32, value: f32) -> Self {
        Self { distance, value }
    }
}

/// Piecewise-linear function of normalized distance.
///
/// Values before the first point hold the first value; values past the last
/// point hold the last value.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    points: Vec<CurvePoint>,
}

impl Curve {
    /// # Errors
    ///
    /// Fails with fewer than two points, or when distances leave `0..=1` or
    /// decrease.
    pub fn new(points: Vec<CurvePoint>) -> Result<Self> {
        if points.len() < 2 {
            return Err(ResoundError::InvalidParameter {
                name: "curve point count",
                value: points.len() as f64,
                min: 2.0,
                max: f64::INFINITY,
            });
        }
        let mut previous = 0.0f32;
        for point in &points {
            ResoundError::check_range("curve distance", point.distance as f64, previous as f64, 1.0)?;
            previous = point.distance;
        }
        Ok(Self { points })
    }

    /// Builds a curve from `(distance, value)` pairs.
    pub fn from_pairs(pairs: &[(f32, f32)]) -> Result<Self> {
        Self::new(pairs.iter().map(|&(d, v)| CurvePoint::new(d, v)).collect())
    }

    fn fixed(points: &[(f32, f32)]) -> Self {
        Self {
            points: points.iter().map(|&(d, v)| CurvePoint::new(d, v)).collect(),
        }
    }

    /// `value` at every distance.
    pub fn constant(value: f32) -> Self {
        Self::fixed(&[(0.0, value), (1.0, value)])
    }

    /// Full level at the emitter falling linearly to silence at distance 1.
    pub fn linear_falloff() -> Self {
        Self::fixed(&[(0.0, 1.0), (1.0, 0.0)])
    }

    /// Default direct-path low-pass curve.
    pub fn default_lpf_direct() -> Self {
        Self::fixed(&[(0.0, 1.0), (1.0, 0.75)])
    }

    /// Default reverb-path low-pass curve.
    pub fn default_lpf_reverb() -> Self {
        Self::fixed(&[(0.0, 0.75), (1.0, 0.75)])
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    pub fn evaluate(&self, distance: f32) -> f32 {
        let first = self.points[0];
        if distance <= first.distance {
            return first.value;
        }
        for pair in self.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if distance <= b.distance {
                let span = b.distance - a.distance;
                if span <= f32::EPSILON {
                    return b.value;
                }
                let t = (distance - a.distance) / span;
                return a.value + (b.value - a.value) * t;
            }
        }
        self.points[self.points.len() - 1].value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn interpolates_and_clamps() {
        let curve = Curve::from_pairs(&[(0.0, 1.0), (0.25, 0.0), (1.0, 0.0)]).unwrap();
        assert_relative_eq!(curve.evaluate(0.125), 0.5);
        assert_relative_eq!(curve.evaluate(0.5), 0.0);
        assert_relative_eq!(curve.evaluate(1.5), curve.evaluate(1.0));
        assert_relative_eq!(curve.evaluate(-1.0), 1.0);
    }

    #[test]
    fn step_at_repeated_distance() {
        let curve = Curve::from_pairs(&[(0.0, 1.0), (0.5, 1.0), (0.5, 0.2), (1.0, 0.2)]).unwrap();
        assert_relative_eq!(curve.evaluate(0.25), 1.0);
        assert_relative_eq!(curve.evaluate(0.75), 0.2);
    }

    #[test]
    fn rejects_bad_points() {
        assert!(Curve::from_pairs(&[(0.0, 1.0)]).is_err());
        assert!(Curve::from_pairs(&[(0.5, 1.0), (0.2, 0.0)]).is_err());
        assert!(Curve::from_pairs(&[(0.0, 1.0), (1.5, 0.0)]).is_err());
    }
}

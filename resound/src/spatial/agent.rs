use crate::error::{ResoundError, Result};
use crate::math::{Pose, Vec3};
use crate::spatial::{Cone, Curve, SpeakerLayout};
use std::f32::consts::TAU;
use std::time::Duration;

/// Velocity derived from successive positions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Motion {
    previous: Option<Vec3>,
    velocity: Vec3,
}

impl Motion {
    fn observe(&mut self, position: Vec3, elapsed: Duration) {
        let seconds = elapsed.as_secs_f32();
        self.velocity = match self.previous {
            Some(previous) if seconds > 0.0 => (position - previous) / seconds,
            _ => Vec3::ZERO,
        };
        self.previous = Some(position);
    }
}

/// The spatial receiver, usually attached to the camera.
#[derive(Debug, Clone, Default)]
pub struct Listener {
    pub pose: Pose,
    pub cone: Option<Cone>,
    motion: Motion,
}

impl Listener {
    pub fn new(pose: Pose) -> Self {
        Self {
            pose,
            ..Default::default()
        }
    }

    pub fn with_cone(mut self, cone: Cone) -> Self {
        self.cone = Some(cone);
        self
    }

    /// Moves the listener and derives its velocity from the displacement.
    pub fn update_pose(&mut self, pose: Pose, elapsed: Duration) {
        self.pose = pose;
        self.update_velocity(elapsed);
    }

    /// Derives velocity from the position change since the previous call.
    /// The first observation (and any with zero elapsed time) yields zero.
    pub fn update_velocity(&mut self, elapsed: Duration) {
        self.motion.observe(self.pose.position, elapsed);
    }

    /// World-space velocity in units per second, `(current - previous) / elapsed`.
    /// It points along the direction of travel.
    pub fn velocity(&self) -> Vec3 {
        self.motion.velocity
    }

    /// Overrides the derived velocity until the next update.
    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.motion.velocity = velocity;
    }
}

/// A spatial sound source.
#[derive(Debug, Clone)]
pub struct Emitter {
    pub pose: Pose,
    pub cone: Option<Cone>,
    radius: f32,
    channel_count: u16,
    channel_radius: f32,
    channel_azimuths: Vec<f32>,
    pub doppler_scale: f32,
    pub volume_curve: Curve,
    pub lfe_curve: Curve,
    pub reverb_curve: Curve,
    pub lpf_direct_curve: Curve,
    pub lpf_reverb_curve: Curve,
    motion: Motion,
}

impl Default for Emitter {
    fn default() -> Self {
        Self {
            pose: Pose::identity(),
            cone: None,
            radius: 1.0,
            channel_count: 1,
            channel_radius: 0.0,
            channel_azimuths: vec![0.0],
            doppler_scale: 1.0,
            volume_curve: Curve::linear_falloff(),
            lfe_curve: Curve::linear_falloff(),
            reverb_curve: Curve::constant(1.0),
            lpf_direct_curve: Curve::default_lpf_direct(),
            lpf_reverb_curve: Curve::default_lpf_reverb(),
            motion: Motion::default(),
        }
    }
}

impl Emitter {
    pub fn new(pose: Pose) -> Self {
        Self {
            pose,
            ..Default::default()
        }
    }

    pub fn with_cone(mut self, cone: Cone) -> Self {
        self.cone = Some(cone);
        self
    }

    /// Distance (before the global scale) that maps to normalized curve distance 1.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// # Errors
    ///
    /// The radius must be strictly positive.
    pub fn set_radius(&mut self, radius: f32) -> Result<()> {
        ResoundError::check_range("emitter radius", radius as f64, f32::MIN_POSITIVE as f64, f32::MAX as f64)?;
        self.radius = radius;
        Ok(())
    }

    pub fn with_radius(mut self, radius: f32) -> Result<Self> {
        self.set_radius(radius)?;
        Ok(self)
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn channel_radius(&self) -> f32 {
        self.channel_radius
    }

    /// Azimuth of each source channel around the emitter, in radians clockwise
    /// from the emitter's forward axis.
    pub fn channel_azimuths(&self) -> &[f32] {
        &self.channel_azimuths
    }

    /// Describes a multi-channel source with explicit channel azimuths.
    ///
    /// # Errors
    ///
    /// Fails if `azimuths` does not hold one entry per channel.
    pub fn set_channels(&mut self, channel_radius: f32, azimuths: Vec<f32>) -> Result<()> {
        if azimuths.is_empty() || azimuths.len() > u16::MAX as usize {
            return Err(ResoundError::InvalidParameter {
                name: "emitter channel count",
                value: azimuths.len() as f64,
                min: 1.0,
                max: u16::MAX as f64,
            });
        }
        self.channel_count = azimuths.len() as u16;
        self.channel_radius = channel_radius.max(0.0);
        self.channel_azimuths = azimuths;
        Ok(())
    }

    /// Uses the azimuths of the speaker layout matching `channels`, or spreads
    /// the channels evenly around the emitter.
    pub fn set_channel_count(&mut self, channels: u16, channel_radius: f32) {
        let channels = channels.max(1);
        let azimuths = match SpeakerLayout::from_channel_count(channels) {
            Some(layout) => layout.azimuths(),
            None => (0..channels)
                .map(|i| TAU * i as f32 / channels as f32)
                .collect(),
        };
        self.channel_count = channels;
        self.channel_radius = channel_radius.max(0.0);
        self.channel_azimuths = azimuths;
    }

    /// Moves the emitter and derives its velocity from the displacement.
    pub fn update_pose(&mut self, pose: Pose, elapsed: Duration) {
        self.pose = pose;
        self.update_velocity(elapsed);
    }

    pub fn update_velocity(&mut self, elapsed: Duration) {
        self.motion.observe(self.pose.position, elapsed);
    }

    /// World-space velocity in units per second, `(current - previous) / elapsed`.
    /// It points along the direction of travel, so an emitter closing in on
    /// the listener has a velocity pointing toward it.
    pub fn velocity(&self) -> Vec3 {
        self.motion.velocity
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.motion.velocity = velocity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn velocity_from_finite_difference() {
        let mut emitter = Emitter::default();
        emitter.update_pose(Pose::from_position(Vec3::ZERO), Duration::from_millis(500));
        assert_eq!(emitter.velocity(), Vec3::ZERO);

        emitter.update_pose(Pose::from_position(Vec3::new(1.0, 0.0, 0.0)), Duration::from_millis(500));
        assert_relative_eq!(emitter.velocity().x, 2.0);

        emitter.update_pose(Pose::from_position(Vec3::new(5.0, 0.0, 0.0)), Duration::ZERO);
        assert_eq!(emitter.velocity(), Vec3::ZERO);
    }

    #[test]
    fn approaching_emitter_moves_toward_listener() {
        let listener = Listener::default();
        let mut emitter = Emitter::default();
        emitter.update_pose(Pose::from_position(Vec3::new(0.0, 0.0, -10.0)), Duration::from_secs(1));
        emitter.update_pose(Pose::from_position(Vec3::new(0.0, 0.0, -9.0)), Duration::from_secs(1));
        let toward_listener = listener.pose.position - emitter.pose.position;
        assert!(emitter.velocity().dot(toward_listener) > 0.0);
        assert_relative_eq!(emitter.velocity().z, 1.0);
    }

    #[test]
    fn radius_must_be_positive() {
        let mut emitter = Emitter::default();
        assert!(emitter.set_radius(0.0).is_err());
        assert!(emitter.set_radius(-2.0).is_err());
        emitter.set_radius(4.0).unwrap();
        assert_eq!(emitter.radius(), 4.0);
    }

    #[test]
    fn channel_layouts() {
        let mut emitter = Emitter::default();
        emitter.set_channel_count(2, 1.0);
        assert_eq!(emitter.channel_azimuths(), SpeakerLayout::Stereo.azimuths().as_slice());
        emitter.set_channel_count(3, 1.0);
        assert_eq!(emitter.channel_azimuths().len(), 3);
        assert!(emitter.set_channels(1.0, Vec::new()).is_err());
    }
}

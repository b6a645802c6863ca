//! Math types for Resound

pub use glam::{Quat, Vec3};

/// Position and orientation of a listener or emitter.
///
/// Forward is `-Z` and up is `+Y` in the rotated frame, matching a right-handed
/// camera convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Builds a pose from explicit forward and up vectors.
    ///
    /// Both vectors are normalized; a degenerate pair (zero length or parallel)
    /// falls back to the identity orientation.
    pub fn from_orientation(position: Vec3, forward: Vec3, up: Vec3) -> Self {
        let forward = forward.normalize_or_zero();
        let up = up.normalize_or_zero();
        let right = forward.cross(up);
        if forward == Vec3::ZERO || right.length_squared() < 1e-12 {
            return Self::from_position(position);
        }
        let right = right.normalize();
        let up = right.cross(forward);
        let basis = glam::Mat3::from_cols(right, up, -forward);
        Self {
            position,
            rotation: Quat::from_mat3(&basis).normalize(),
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * (-Vec3::Z)
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn distance(&self, other: &Self) -> f32 {
        self.position.distance(other.position)
    }

    /// Rotates the pose so that it faces `target`, keeping the world `+Y` up.
    pub fn look_at(&mut self, target: Vec3) {
        let forward = target - self.position;
        *self = Self::from_orientation(self.position, forward, Vec3::Y);
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

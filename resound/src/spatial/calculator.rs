use crate::config::SpatialDesc;
use crate::math::Vec3;
use crate::spatial::{Emitter, Listener, SpeakerLayout};
use std::f32::consts::{FRAC_PI_2, PI, TAU};

/// Bounds of the doppler frequency ratio.
pub const MIN_DOPPLER_RATIO: f32 = 0.25;
pub const MAX_DOPPLER_RATIO: f32 = 4.0;

/// Which parts of a [`DspResult`] to compute. Skipped parts hold neutral values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalculateFlags {
    pub matrix: bool,
    pub doppler: bool,
    pub lpf_direct: bool,
    pub lpf_reverb: bool,
    pub reverb: bool,
}

impl Default for CalculateFlags {
    fn default() -> Self {
        Self {
            matrix: true,
            doppler: true,
            lpf_direct: true,
            lpf_reverb: false,
            reverb: false,
        }
    }
}

impl CalculateFlags {
    /// Also computes the reverb send and its low-pass coefficient.
    pub fn with_reverb(mut self) -> Self {
        self.reverb = true;
        self.lpf_reverb = true;
        self
    }
}

/// Output of one spatial calculation, recomputed every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct DspResult {
    /// `source_channels × destination_channels` gains; the gain from source `s`
    /// to speaker `d` is at `d * source_channels + s`.
    pub matrix: Vec<f32>,
    pub source_channels: u16,
    pub destination_channels: u16,
    /// Frequency ratio to apply for the doppler shift.
    pub doppler_ratio: f32,
    pub reverb_level: f32,
    /// Raw direct-path low-pass coefficient in `0..=1` (1 = unfiltered).
    pub lpf_direct_coefficient: f32,
    pub lpf_reverb_coefficient: f32,
    /// Listener-to-emitter distance in world units.
    pub distance: f32,
    /// Angle between the emitter's forward axis and the listener, in radians.
    pub emitter_angle: f32,
}

impl DspResult {
    /// Unity matrix, no doppler, no filtering.
    pub fn neutral(source_channels: u16, destination_channels: u16) -> Self {
        Self {
            matrix: vec![1.0; source_channels as usize * destination_channels as usize],
            source_channels,
            destination_channels,
            doppler_ratio: 1.0,
            reverb_level: 0.0,
            lpf_direct_coefficient: 1.0,
            lpf_reverb_coefficient: 1.0,
            distance: 0.0,
            emitter_angle: 0.0,
        }
    }

    pub fn level(&self, source: usize, destination: usize) -> f32 {
        self.matrix
            .get(destination * self.source_channels as usize + source)
            .copied()
            .unwrap_or(0.0)
    }

    /// One-pole cutoff for the direct path, `2·sin(π/6·c)`.
    pub fn lpf_direct_frequency(&self) -> f32 {
        lpf_frequency(self.lpf_direct_coefficient)
    }

    /// One-pole cutoff for the reverb path, `2·sin(π/6·c)`.
    pub fn lpf_reverb_frequency(&self) -> f32 {
        lpf_frequency(self.lpf_reverb_coefficient)
    }
}

fn lpf_frequency(coefficient: f32) -> f32 {
    2.0 * (PI / 6.0 * coefficient.clamp(0.0, 1.0)).sin()
}

/// Angle between two directions; zero when either is degenerate.
fn angle_between(a: Vec3, b: Vec3) -> f32 {
    if a.length_squared() < 1e-12 || b.length_squared() < 1e-12 {
        return 0.0;
    }
    a.angle_between(b)
}

/// Computes per-tick DSP settings from a listener and an emitter.
#[derive(Debug, Clone, Default)]
pub struct SpatialCalculator {
    desc: SpatialDesc,
}

impl SpatialCalculator {
    pub fn new(desc: SpatialDesc) -> Self {
        Self { desc }
    }

    pub fn desc(&self) -> &SpatialDesc {
        &self.desc
    }

    pub fn set_desc(&mut self, desc: SpatialDesc) {
        self.desc = desc;
    }

    pub fn speaker_layout(&self) -> SpeakerLayout {
        self.desc.speaker_layout
    }

    pub fn calculate(&self, listener: &Listener, emitter: &Emitter, flags: CalculateFlags) -> DspResult {
        let layout = self.desc.speaker_layout;
        let source_channels = emitter.channel_count();
        let destination_channels = layout.channel_count();

        let to_emitter = emitter.pose.position - listener.pose.position;
        let distance = to_emitter.length();
        let scaler = self.desc.distance_scale * emitter.radius();
        let normalized = if scaler > 0.0 { distance / scaler } else { 0.0 };

        let mut volume = emitter.volume_curve.evaluate(normalized);
        let lfe = emitter.lfe_curve.evaluate(normalized);
        let mut reverb = emitter.reverb_curve.evaluate(normalized);
        let mut lpf_direct = emitter.lpf_direct_curve.evaluate(normalized);
        let mut lpf_reverb = emitter.lpf_reverb_curve.evaluate(normalized);

        let emitter_angle = angle_between(emitter.pose.forward(), -to_emitter);
        let cones = [
            emitter.cone.map(|cone| cone.factors(emitter_angle)),
            listener
                .cone
                .map(|cone| cone.factors(angle_between(listener.pose.forward(), to_emitter))),
        ];
        for factors in cones.into_iter().flatten() {
            volume *= factors.volume;
            lpf_direct *= factors.lpf;
            lpf_reverb *= factors.lpf;
            reverb *= factors.reverb;
        }

        let matrix = if flags.matrix {
            self.channel_matrix(listener, emitter, volume, lfe)
        } else {
            vec![1.0; source_channels as usize * destination_channels as usize]
        };
        let doppler_ratio = if flags.doppler {
            self.doppler_ratio(listener, emitter, to_emitter, distance)
        } else {
            1.0
        };

        DspResult {
            matrix,
            source_channels,
            destination_channels,
            doppler_ratio,
            reverb_level: if flags.reverb { reverb } else { 0.0 },
            lpf_direct_coefficient: if flags.lpf_direct { lpf_direct } else { 1.0 },
            lpf_reverb_coefficient: if flags.lpf_reverb { lpf_reverb } else { 1.0 },
            distance,
            emitter_angle,
        }
    }

    fn channel_matrix(&self, listener: &Listener, emitter: &Emitter, volume: f32, lfe: f32) -> Vec<f32> {
        let layout = self.desc.speaker_layout;
        let sources = emitter.channel_count() as usize;
        let destinations = layout.channel_count() as usize;
        let lfe_index = layout.lfe_index();
        let speakers: Vec<(usize, f32)> = layout
            .azimuths()
            .into_iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != lfe_index)
            .collect();
        let to_local = listener.pose.rotation.inverse();

        let mut matrix = vec![0.0; sources * destinations];
        for s in 0..sources {
            let position = if sources == 1 {
                emitter.pose.position
            } else {
                let azimuth = emitter.channel_azimuths().get(s).copied().unwrap_or(0.0);
                let offset = Vec3::new(azimuth.sin(), 0.0, -azimuth.cos()) * emitter.channel_radius();
                emitter.pose.position + emitter.pose.rotation * offset
            };
            let local = to_local * (position - listener.pose.position);
            let gains = pan_gains(&speakers, local, destinations);
            for (d, gain) in gains.into_iter().enumerate() {
                matrix[d * sources + s] = gain * volume;
            }
            if let (true, Some(lfe_index)) = (self.desc.redirect_to_lfe, lfe_index) {
                matrix[lfe_index * sources + s] = lfe / sources as f32;
            }
        }
        matrix
    }

    fn doppler_ratio(&self, listener: &Listener, emitter: &Emitter, to_emitter: Vec3, distance: f32) -> f32 {
        let scale = self.desc.doppler_scale * emitter.doppler_scale;
        let speed_of_sound = self.desc.speed_of_sound;
        if scale <= 0.0 || speed_of_sound <= 0.0 || distance <= f32::EPSILON {
            return 1.0;
        }
        // Positive components point from the emitter towards the listener
        let direction = -to_emitter / distance;
        let limit = speed_of_sound / scale;
        let listener_speed = listener.velocity().dot(direction).clamp(-limit, limit);
        let emitter_speed = emitter.velocity().dot(direction).clamp(-limit, limit);
        let numerator = speed_of_sound - scale * listener_speed;
        let denominator = speed_of_sound - scale * emitter_speed;
        if denominator <= f32::EPSILON {
            return MAX_DOPPLER_RATIO;
        }
        (numerator / denominator).clamp(MIN_DOPPLER_RATIO, MAX_DOPPLER_RATIO)
    }
}

/// Constant-power gains placing a listener-space direction between the two
/// adjacent speakers that bracket its azimuth.
fn pan_gains(speakers: &[(usize, f32)], local: Vec3, destinations: usize) -> Vec<f32> {
    let mut gains = vec![0.0; destinations];
    match speakers {
        [] => return gains,
        [(only, _)] => {
            gains[*only] = 1.0;
            return gains;
        }
        _ => {}
    }

    if local.x.abs() + local.z.abs() < 1e-6 {
        let share = (1.0 / speakers.len() as f32).sqrt();
        for &(index, _) in speakers {
            gains[index] = share;
        }
        return gains;
    }

    let azimuth = local.x.atan2(-local.z);
    if let [(left, left_azimuth), (right, right_azimuth)] = speakers {
        // Front pair only: fold rear directions onto the frontal arc
        let folded = azimuth.sin().asin().clamp(*left_azimuth, *right_azimuth);
        let t = (folded - left_azimuth) / (right_azimuth - left_azimuth);
        gains[*left] = (t * FRAC_PI_2).cos();
        gains[*right] = (t * FRAC_PI_2).sin();
        return gains;
    }

    let mut ring: Vec<(usize, f32)> = speakers
        .iter()
        .map(|&(index, a)| (index, a.rem_euclid(TAU)))
        .collect();
    ring.sort_by(|a, b| a.1.total_cmp(&b.1));
    let target = azimuth.rem_euclid(TAU);

    for k in 0..ring.len() {
        let (from, start) = ring[k];
        let (to, mut end) = ring[(k + 1) % ring.len()];
        let mut x = target;
        if k + 1 == ring.len() {
            end += TAU;
            if x < start {
                x += TAU;
            }
        }
        if x >= start && x <= end {
            let span = end - start;
            let t = if span <= f32::EPSILON { 1.0 } else { (x - start) / span };
            gains[from] = (t * FRAC_PI_2).cos();
            gains[to] += (t * FRAC_PI_2).sin();
            break;
        }
    }
    gains
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Pose;
    use crate::spatial::Cone;
    use approx::assert_relative_eq;

    fn calculator(layout: SpeakerLayout) -> SpatialCalculator {
        SpatialCalculator::new(SpatialDesc::default().with_speaker_layout(layout))
    }

    fn emitter_at(position: Vec3) -> Emitter {
        Emitter::new(Pose::from_position(position)).with_radius(10.0).unwrap()
    }

    #[test]
    fn emitter_ahead_is_centered() {
        let result = calculator(SpeakerLayout::Stereo).calculate(
            &Listener::default(),
            &emitter_at(Vec3::new(0.0, 0.0, -1.0)),
            CalculateFlags::default(),
        );
        assert_eq!(result.matrix.len(), 2);
        assert_relative_eq!(result.level(0, 0), result.level(0, 1), epsilon = 1e-5);
        assert_relative_eq!(result.level(0, 0), 0.9 * 0.5f32.sqrt(), epsilon = 1e-4);
        assert_relative_eq!(result.distance, 1.0);
    }

    #[test]
    fn emitter_to_the_right_uses_right_speaker() {
        let result = calculator(SpeakerLayout::Stereo).calculate(
            &Listener::default(),
            &emitter_at(Vec3::new(5.0, 0.0, 0.0)),
            CalculateFlags::default(),
        );
        assert_relative_eq!(result.level(0, 0), 0.0, epsilon = 1e-5);
        assert_relative_eq!(result.level(0, 1), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn listener_rotation_is_respected() {
        let listener = Listener::new(Pose::from_orientation(Vec3::ZERO, Vec3::X, Vec3::Y));
        let result = calculator(SpeakerLayout::Stereo).calculate(
            &listener,
            &emitter_at(Vec3::new(5.0, 0.0, 0.0)),
            CalculateFlags::default(),
        );
        assert_relative_eq!(result.level(0, 0), result.level(0, 1), epsilon = 1e-4);
    }

    #[test]
    fn rear_left_emitter_on_five_one() {
        let desc = SpatialDesc::default()
            .with_speaker_layout(SpeakerLayout::FivePointOne)
            .with_lfe_redirect(true);
        let result = SpatialCalculator::new(desc).calculate(
            &Listener::default(),
            &emitter_at(Vec3::new(-1.0, 0.0, 1.0)),
            CalculateFlags::default(),
        );
        assert_eq!(result.matrix.len(), 6);
        let back_left = result.level(0, 4);
        let back_right = result.level(0, 5);
        assert!(back_left > back_right);
        assert!(back_right > 0.0);
        assert_relative_eq!(result.level(0, 0), 0.0);
        assert_relative_eq!(result.level(0, 2), 0.0);
        // LFE carries the LFE curve value at normalized distance √2/10
        assert_relative_eq!(result.level(0, 3), 1.0 - 2f32.sqrt() / 10.0, epsilon = 1e-5);
    }

    #[test]
    fn beyond_radius_is_silent() {
        let result = calculator(SpeakerLayout::Quad).calculate(
            &Listener::default(),
            &emitter_at(Vec3::new(0.0, 0.0, -50.0)),
            CalculateFlags::default(),
        );
        assert!(result.matrix.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn emitter_cone_attenuates_when_facing_away() {
        let calculator = calculator(SpeakerLayout::Stereo);
        let listener = Listener::default();
        let position = Vec3::new(0.0, 0.0, -1.0);
        let facing = emitter_at(position)
            .with_cone(Cone::new(PI / 2.0, PI, 1.0, 0.5));
        let mut away = facing.clone();
        away.pose = Pose::from_orientation(position, Vec3::new(0.0, 0.0, -1.0), Vec3::Y);
        let mut toward = facing;
        toward.pose = Pose::from_orientation(position, Vec3::Z, Vec3::Y);

        let toward = calculator.calculate(&listener, &toward, CalculateFlags::default());
        let away = calculator.calculate(&listener, &away, CalculateFlags::default());
        assert_relative_eq!(toward.emitter_angle, 0.0, epsilon = 1e-3);
        assert_relative_eq!(away.emitter_angle, PI, epsilon = 1e-3);
        assert_relative_eq!(away.level(0, 0), toward.level(0, 0) * 0.5, epsilon = 1e-5);
    }

    #[test]
    fn doppler_rises_when_approaching() {
        let calculator = calculator(SpeakerLayout::Stereo);
        let listener = Listener::default();
        let mut emitter = emitter_at(Vec3::new(0.0, 0.0, -5.0));
        emitter.set_velocity(Vec3::new(0.0, 0.0, 34.35));
        let approaching = calculator.calculate(&listener, &emitter, CalculateFlags::default());
        assert_relative_eq!(approaching.doppler_ratio, 1.0 / 0.9, epsilon = 1e-4);

        emitter.set_velocity(Vec3::new(0.0, 0.0, -34.35));
        let receding = calculator.calculate(&listener, &emitter, CalculateFlags::default());
        assert!(receding.doppler_ratio < 1.0);

        let mut flags = CalculateFlags::default();
        flags.doppler = false;
        assert_eq!(calculator.calculate(&listener, &emitter, flags).doppler_ratio, 1.0);
    }

    #[test]
    fn lpf_coefficients_map_to_frequencies() {
        let calculator = calculator(SpeakerLayout::Stereo);
        let near = calculator.calculate(
            &Listener::default(),
            &emitter_at(Vec3::ZERO),
            CalculateFlags::default().with_reverb(),
        );
        assert_relative_eq!(near.lpf_direct_coefficient, 1.0);
        assert_relative_eq!(near.lpf_direct_frequency(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(near.lpf_reverb_coefficient, 0.75);
        assert_relative_eq!(near.lpf_reverb_frequency(), 2.0 * (PI / 8.0).sin(), epsilon = 1e-6);
        assert_relative_eq!(near.reverb_level, 1.0);

        let dry = calculator.calculate(&Listener::default(), &emitter_at(Vec3::ZERO), CalculateFlags::default());
        assert_eq!(dry.reverb_level, 0.0);
        assert_eq!(dry.lpf_reverb_coefficient, 1.0);
    }

    #[test]
    fn stereo_source_spreads_across_speakers() {
        let mut emitter = emitter_at(Vec3::new(0.0, 0.0, -2.0));
        emitter.set_channels(1.0, vec![-FRAC_PI_2, FRAC_PI_2]).unwrap();
        let result = calculator(SpeakerLayout::Stereo).calculate(
            &Listener::default(),
            &emitter,
            CalculateFlags::default(),
        );
        assert_eq!(result.source_channels, 2);
        assert_eq!(result.matrix.len(), 4);
        // Source 0 sits left of the listener, source 1 right
        assert!(result.level(0, 0) > result.level(0, 1));
        assert!(result.level(1, 1) > result.level(1, 0));
    }

    #[test]
    fn matrix_size_matches_every_layout() {
        for layout in SpeakerLayout::ALL {
            let result = calculator(layout).calculate(
                &Listener::default(),
                &emitter_at(Vec3::new(1.0, 0.0, -1.0)),
                CalculateFlags::default(),
            );
            assert_eq!(result.matrix.len(), layout.channel_count() as usize);
            assert!(result.matrix.iter().all(|g| g.is_finite()));
        }
    }
}

//! Writes per-tick mix parameters into a device voice.

use crate::device::{DeviceVoice, FilterParameters, FilterTarget};
use crate::error::Result;
use crate::spatial::{DspResult, SpeakerLayout};

/// Flat `source_channels × destination_channels` gain matrix; the gain from
/// source `s` to destination `d` lives at `d * source_channels + s`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputMatrix {
    levels: Vec<f32>,
    source_channels: u16,
    destination_channels: u16,
}

impl OutputMatrix {
    pub fn unity(source_channels: u16, destination_channels: u16) -> Self {
        Self {
            levels: vec![1.0; source_channels as usize * destination_channels as usize],
            source_channels,
            destination_channels,
        }
    }

    pub fn source_channels(&self) -> u16 {
        self.source_channels
    }

    pub fn destination_channels(&self) -> u16 {
        self.destination_channels
    }

    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    pub fn get(&self, source: usize, destination: usize) -> f32 {
        self.levels[destination * self.source_channels as usize + source]
    }

    pub fn set(&mut self, source: usize, destination: usize, level: f32) {
        let index = destination * self.source_channels as usize + source;
        self.levels[index] = level;
    }

    /// Sets every source's gain into `destination`.
    fn set_destination(&mut self, destination: usize, level: f32) {
        for source in 0..self.source_channels as usize {
            self.set(source, destination, level);
        }
    }

    fn multiply(&mut self, other: &OutputMatrix) {
        for (level, factor) in self.levels.iter_mut().zip(&other.levels) {
            *level *= factor;
        }
    }

    fn from_dsp(dsp: &DspResult) -> Self {
        Self {
            levels: dsp.matrix.clone(),
            source_channels: dsp.source_channels,
            destination_channels: dsp.destination_channels,
        }
    }
}

/// Manual pan wiring for `layout`: left speakers get `(0.5 - 0.5·pan)·2`,
/// right speakers `(0.5 + 0.5·pan)·2`, everything else stays at unity.
pub fn pan_matrix(layout: SpeakerLayout, source_channels: u16, pan: f32) -> OutputMatrix {
    let pan = pan.clamp(-1.0, 1.0);
    let left = (0.5 - 0.5 * pan) * 2.0;
    let right = (0.5 + 0.5 * pan) * 2.0;
    let mut matrix = OutputMatrix::unity(source_channels, layout.channel_count());
    let (lefts, rights) = layout.pan_pairs();
    for &d in lefts {
        matrix.set_destination(d, left);
    }
    for &d in rights {
        matrix.set_destination(d, right);
    }
    matrix
}

/// Owns the persistent output matrix of one voice and pushes it once per tick.
#[derive(Debug, Clone)]
pub struct OutputRouter {
    layout: SpeakerLayout,
    source_channels: u16,
    pan: f32,
    pan_matrix: OutputMatrix,
    current: OutputMatrix,
    spatial: bool,
}

impl OutputRouter {
    pub fn new(layout: SpeakerLayout, source_channels: u16) -> Self {
        let unity = OutputMatrix::unity(source_channels, layout.channel_count());
        Self {
            layout,
            source_channels,
            pan: 0.0,
            pan_matrix: unity.clone(),
            current: unity,
            spatial: false,
        }
    }

    pub fn layout(&self) -> SpeakerLayout {
        self.layout
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Clamps `pan` to `-1..=1`; the wiring table is rebuilt only on change.
    pub fn set_pan(&mut self, pan: f32) {
        let pan = pan.clamp(-1.0, 1.0);
        if pan == self.pan {
            return;
        }
        self.pan = pan;
        self.pan_matrix = pan_matrix(self.layout, self.source_channels, pan);
        log::trace!("Pan {} -> {:?}", pan, self.pan_matrix.levels());
    }

    pub fn pan_matrix(&self) -> &OutputMatrix {
        &self.pan_matrix
    }

    /// The matrix most recently pushed to the voice.
    pub fn output_matrix(&self) -> &OutputMatrix {
        &self.current
    }

    pub fn is_spatial(&self) -> bool {
        self.spatial
    }

    /// Pushes frequency ratio, output matrix and (with `dsp`) the send filters
    /// and reverb level.
    ///
    /// With `dsp` the matrix is the DSP matrix times the pan matrix elementwise;
    /// without it the pan matrix is used as is.
    pub fn apply(&mut self, voice: &dyn DeviceVoice, dsp: Option<&DspResult>, pitch_ratio: f32) -> Result<()> {
        match dsp {
            Some(dsp) => {
                let mut matrix = OutputMatrix::from_dsp(dsp);
                if matrix.levels.len() == self.pan_matrix.levels.len() {
                    matrix.multiply(&self.pan_matrix);
                } else {
                    log::warn!(
                        "DSP matrix is {}x{}, router expects {}x{}; ignoring pan",
                        dsp.source_channels,
                        dsp.destination_channels,
                        self.source_channels,
                        self.layout.channel_count()
                    );
                }
                self.current = matrix;
                voice.set_frequency_ratio(pitch_ratio * dsp.doppler_ratio);
                voice.set_filter_parameters(
                    FilterTarget::Direct,
                    FilterParameters::low_pass(dsp.lpf_direct_frequency()),
                );
                voice.set_filter_parameters(
                    FilterTarget::Reverb,
                    FilterParameters::low_pass(dsp.lpf_reverb_frequency()),
                );
                voice.set_reverb_level(dsp.reverb_level);
                self.spatial = true;
            }
            None => {
                if self.spatial {
                    voice.set_filter_parameters(FilterTarget::Direct, FilterParameters::default());
                    voice.set_filter_parameters(FilterTarget::Reverb, FilterParameters::default());
                    voice.set_reverb_level(0.0);
                    self.spatial = false;
                }
                self.current = self.pan_matrix.clone();
                voice.set_frequency_ratio(pitch_ratio);
            }
        }
        voice.set_output_matrix(
            self.current.source_channels,
            self.current.destination_channels,
            &self.current.levels,
        )
    }

    /// Back to centered pan and the unity matrix.
    pub fn reset(&mut self) {
        self.set_pan(0.0);
        self.current = self.pan_matrix.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CaptureVoice, DrainMode};
    use crate::source::{SampleFormat, WaveFormat};
    use approx::assert_relative_eq;

    #[test]
    fn stereo_pan_extremes() {
        let hard_left = pan_matrix(SpeakerLayout::Stereo, 1, -1.0);
        assert_relative_eq!(hard_left.get(0, 0), 2.0);
        assert_relative_eq!(hard_left.get(0, 1), 0.0);

        let center = pan_matrix(SpeakerLayout::Stereo, 1, 0.0);
        assert_eq!(center.get(0, 0), center.get(0, 1));
        assert_relative_eq!(center.get(0, 0), 1.0);
    }

    #[test]
    fn mono_ignores_pan() {
        let matrix = pan_matrix(SpeakerLayout::Mono, 2, 1.0);
        assert!(matrix.levels().iter().all(|&l| l == 1.0));
    }

    #[test]
    fn surround_tables_keep_center_and_lfe_at_unity() {
        let matrix = pan_matrix(SpeakerLayout::SevenPointOne, 2, 0.5);
        for s in 0..2 {
            for d in [0, 4, 6] {
                assert_relative_eq!(matrix.get(s, d), 0.5);
            }
            for d in [1, 5, 7] {
                assert_relative_eq!(matrix.get(s, d), 1.5);
            }
            assert_relative_eq!(matrix.get(s, 2), 1.0);
            assert_relative_eq!(matrix.get(s, 3), 1.0);
        }

        let lcrs = pan_matrix(SpeakerLayout::Surround, 1, 1.0);
        assert_eq!(lcrs.levels(), &[0.0, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn pan_clamps() {
        let mut router = OutputRouter::new(SpeakerLayout::Quad, 1);
        router.set_pan(-7.0);
        assert_eq!(router.pan(), -1.0);
        assert_eq!(router.pan_matrix().levels(), &[2.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn spatial_mode_multiplies_pan_into_dsp_matrix() {
        let voice = CaptureVoice::new(WaveFormat::new(48_000, 1, SampleFormat::F32), 2, DrainMode::Manual);
        let mut router = OutputRouter::new(SpeakerLayout::Stereo, 1);
        router.set_pan(0.5);

        let mut dsp = DspResult::neutral(1, 2);
        dsp.matrix = vec![0.8, 0.4];
        dsp.doppler_ratio = 1.25;
        dsp.lpf_direct_coefficient = 0.5;
        router.apply(&voice, Some(&dsp), 2.0).unwrap();

        let levels = voice.output_matrix();
        assert_relative_eq!(levels[0], 0.8 * 0.5);
        assert_relative_eq!(levels[1], 0.4 * 1.5);
        assert_relative_eq!(voice.frequency_ratio(), 2.5);
        let direct = voice.filter(FilterTarget::Direct).unwrap();
        assert_relative_eq!(direct.frequency, dsp.lpf_direct_frequency());

        router.apply(&voice, None, 1.0).unwrap();
        assert_eq!(voice.output_matrix(), vec![0.5, 1.5]);
        assert_eq!(voice.filter(FilterTarget::Direct), Some(FilterParameters::default()));
        assert_relative_eq!(voice.frequency_ratio(), 1.0);
    }
}

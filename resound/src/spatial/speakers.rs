use std::f32::consts::PI;

const DEG: f32 = PI / 180.0;

/// Output speaker configuration.
///
/// Channel order follows the WAVE channel-mask convention (front left, front
/// right, front center, LFE, back/side pairs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpeakerLayout {
    Mono,
    #[default]
    Stereo,
    /// Front left/right, back left/right.
    Quad,
    /// LCRS: front left/right, front center, back center.
    Surround,
    /// Front left/right/center, LFE, back left/right.
    FivePointOne,
    /// Front left/right/center, LFE, side left/right.
    FivePointOneSurround,
    /// Front left/right/center, LFE, back left/right, front left/right of center.
    SevenPointOne,
    /// Front left/right/center, LFE, back left/right, side left/right.
    SevenPointOneSurround,
}

impl SpeakerLayout {
    pub const ALL: [SpeakerLayout; 8] = [
        Self::Mono,
        Self::Stereo,
        Self::Quad,
        Self::Surround,
        Self::FivePointOne,
        Self::FivePointOneSurround,
        Self::SevenPointOne,
        Self::SevenPointOneSurround,
    ];

    pub fn channel_count(&self) -> u16 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Quad | Self::Surround => 4,
            Self::FivePointOne | Self::FivePointOneSurround => 6,
            Self::SevenPointOne | Self::SevenPointOneSurround => 8,
        }
    }

    /// Layout commonly used for a device with `channels` outputs.
    pub fn from_channel_count(channels: u16) -> Option<Self> {
        match channels {
            1 => Some(Self::Mono),
            2 => Some(Self::Stereo),
            4 => Some(Self::Quad),
            6 => Some(Self::FivePointOne),
            8 => Some(Self::SevenPointOne),
            _ => None,
        }
    }

    /// Index of the low-frequency channel, if the layout has one.
    pub fn lfe_index(&self) -> Option<usize> {
        match self {
            Self::FivePointOne
            | Self::FivePointOneSurround
            | Self::SevenPointOne
            | Self::SevenPointOneSurround => Some(3),
            _ => None,
        }
    }

    /// Speaker azimuths in radians, clockwise from straight ahead (left is
    /// negative). The LFE entry is 0 and is never used for panning.
    pub fn azimuths(&self) -> Vec<f32> {
        let degrees: &[f32] = match self {
            Self::Mono => &[0.0],
            Self::Stereo => &[-30.0, 30.0],
            Self::Quad => &[-45.0, 45.0, -135.0, 135.0],
            Self::Surround => &[-30.0, 30.0, 0.0, 180.0],
            Self::FivePointOne => &[-30.0, 30.0, 0.0, 0.0, -110.0, 110.0],
            Self::FivePointOneSurround => &[-30.0, 30.0, 0.0, 0.0, -90.0, 90.0],
            Self::SevenPointOne => &[-30.0, 30.0, 0.0, 0.0, -150.0, 150.0, -15.0, 15.0],
            Self::SevenPointOneSurround => &[-30.0, 30.0, 0.0, 0.0, -150.0, 150.0, -90.0, 90.0],
        };
        degrees.iter().map(|d| d * DEG).collect()
    }

    /// Channels wired to the left and right pan gains in manual pan mode.
    /// Channels in neither list (center, LFE, back center) stay at unity.
    pub(crate) fn pan_pairs(&self) -> (&'static [usize], &'static [usize]) {
        match self {
            Self::Mono => (&[], &[]),
            Self::Stereo | Self::Surround => (&[0], &[1]),
            Self::Quad => (&[0, 2], &[1, 3]),
            Self::FivePointOne | Self::FivePointOneSurround => (&[0, 4], &[1, 5]),
            Self::SevenPointOne | Self::SevenPointOneSurround => (&[0, 4, 6], &[1, 5, 7]),
        }
    }
}

use crate::spatial::SpeakerLayout;

/// Engine-wide settings for the listener/emitter calculation
#[derive(Debug, Clone)]
pub struct SpatialDesc {
    /// Multiplied by each emitter's radius to get the distance that maps onto
    /// normalized curve distance 1.0.
    pub distance_scale: f32,
    /// Exaggerates (> 1) or dampens (< 1) the doppler shift. Zero disables it.
    pub doppler_scale: f32,
    /// Speed of sound in world units per second.
    pub speed_of_sound: f32,
    /// Route mono energy into the LFE channel when the layout has one.
    pub redirect_to_lfe: bool,
    /// Speaker configuration of the output device.
    pub speaker_layout: SpeakerLayout,
}

impl Default for SpatialDesc {
    fn default() -> Self {
        Self {
            distance_scale: 1.0,
            doppler_scale: 1.0,
            speed_of_sound: 343.5,
            redirect_to_lfe: false,
            speaker_layout: SpeakerLayout::Stereo,
        }
    }
}

impl SpatialDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_distance_scale(mut self, scale: f32) -> Self {
        self.distance_scale = scale;
        self
    }

    pub fn with_doppler_scale(mut self, scale: f32) -> Self {
        self.doppler_scale = scale.max(0.0);
        self
    }

    pub fn with_speed_of_sound(mut self, speed: f32) -> Self {
        self.speed_of_sound = speed;
        self
    }

    pub fn with_lfe_redirect(mut self, enable: bool) -> Self {
        self.redirect_to_lfe = enable;
        self
    }

    pub fn with_speaker_layout(mut self, layout: SpeakerLayout) -> Self {
        self.speaker_layout = layout;
        self
    }
}

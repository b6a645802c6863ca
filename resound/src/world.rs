use crate::config::SpatialDesc;
use crate::error::{ResoundError, Result};
use crate::events::ResoundEvent;
use crate::instance::{InstanceId, SoundInstance};
use crate::spatial::{Emitter, Listener};
use std::collections::HashMap;
use std::time::Duration;

struct WorldEntry {
    instance: SoundInstance,
    emitter: Option<Emitter>,
    /// Dropped by `update` once playback ends naturally.
    one_shot: bool,
}

/// Owns the listener and every live [`SoundInstance`], and runs the per-tick
/// spatial update on the caller's thread.
///
/// Streaming happens on each instance's own thread; nothing here blocks on it.
pub struct ResoundWorld {
    desc: SpatialDesc,
    listener: Listener,
    entries: HashMap<InstanceId, WorldEntry>,
    pending_events: Vec<ResoundEvent>,
}

impl ResoundWorld {
    pub fn new(desc: SpatialDesc) -> Self {
        log::info!(
            "Creating world ({:?}, speed of sound {})",
            desc.speaker_layout,
            desc.speed_of_sound
        );
        Self {
            desc,
            listener: Listener::default(),
            entries: HashMap::new(),
            pending_events: Vec::new(),
        }
    }

    pub fn desc(&self) -> &SpatialDesc {
        &self.desc
    }

    /// Replaces engine-wide spatial settings on the world and every instance.
    pub fn set_desc(&mut self, desc: SpatialDesc) {
        for entry in self.entries.values_mut() {
            entry.instance.set_spatial_desc(desc.clone());
        }
        self.desc = desc;
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut Listener {
        &mut self.listener
    }

    /// Adds a non-spatial instance.
    pub fn add_instance(&mut self, instance: SoundInstance) -> InstanceId {
        self.insert(instance, None, false)
    }

    /// Adds an instance positioned by `emitter`; it is spatialized on every update.
    pub fn add_spatial_instance(&mut self, instance: SoundInstance, emitter: Emitter) -> InstanceId {
        self.insert(instance, Some(emitter), false)
    }

    /// Starts `instance` and lets the world dispose of it when it ends.
    pub fn play_one_shot(&mut self, instance: SoundInstance, emitter: Option<Emitter>) -> Result<InstanceId> {
        instance.set_looped(false);
        let id = self.insert(instance, emitter, true);
        self.apply_spatial(id)?;
        if let Some(entry) = self.entries.get(&id) {
            entry.instance.play()?;
        }
        Ok(id)
    }

    fn insert(&mut self, mut instance: SoundInstance, mut emitter: Option<Emitter>, one_shot: bool) -> InstanceId {
        instance.set_spatial_desc(self.desc.clone());
        if let Some(emitter) = emitter.as_mut() {
            match_source_channels(emitter, &instance);
        }
        let id = instance.id();
        log::debug!(
            "Adding instance {} (spatial: {}, one-shot: {})",
            id,
            emitter.is_some(),
            one_shot
        );
        self.entries.insert(
            id,
            WorldEntry {
                instance,
                emitter,
                one_shot,
            },
        );
        id
    }

    pub fn instance(&self, id: InstanceId) -> Option<&SoundInstance> {
        self.entries.get(&id).map(|entry| &entry.instance)
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Option<&mut SoundInstance> {
        self.entries.get_mut(&id).map(|entry| &mut entry.instance)
    }

    pub fn emitter(&self, id: InstanceId) -> Option<&Emitter> {
        self.entries.get(&id).and_then(|entry| entry.emitter.as_ref())
    }

    pub fn emitter_mut(&mut self, id: InstanceId) -> Option<&mut Emitter> {
        self.entries
            .get_mut(&id)
            .and_then(|entry| entry.emitter.as_mut())
    }

    /// Attaches, replaces or (with `None`) detaches an instance's emitter.
    pub fn set_emitter(&mut self, id: InstanceId, emitter: Option<Emitter>) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(ResoundError::Disposed("sound instance"))?;
        let mut emitter = emitter;
        match emitter.as_mut() {
            Some(emitter) => match_source_channels(emitter, &entry.instance),
            None if entry.emitter.is_some() => entry.instance.disable_3d()?,
            None => {}
        }
        entry.emitter = emitter;
        Ok(())
    }

    /// Removes an instance, handing it back to the caller. Its pending events
    /// stay queued on the world.
    pub fn remove_instance(&mut self, id: InstanceId) -> Option<SoundInstance> {
        let entry = self.entries.remove(&id)?;
        self.pending_events.extend(entry.instance.poll_events());
        Some(entry.instance)
    }

    pub fn instance_count(&self) -> usize {
        self.entries.len()
    }

    pub fn instance_ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.entries.keys().copied()
    }

    /// Per-tick update: derives velocities from the poses set since the last
    /// call, recomputes the spatial mix of every positioned instance, and
    /// disposes one-shots that have finished.
    ///
    /// A failing instance is logged and skipped; the others are still updated.
    pub fn update(&mut self, elapsed: Duration) {
        self.listener.update_velocity(elapsed);
        for (id, entry) in self.entries.iter_mut() {
            let Some(emitter) = entry.emitter.as_mut() else {
                continue;
            };
            emitter.update_velocity(elapsed);
            if let Err(e) = entry.instance.apply_3d(&self.listener, emitter) {
                log::warn!("Spatial update of instance {} failed: {}", id, e);
            }
        }
        self.reap_finished();
    }

    fn apply_spatial(&mut self, id: InstanceId) -> Result<()> {
        let listener = &self.listener;
        match self.entries.get_mut(&id) {
            Some(WorldEntry {
                instance,
                emitter: Some(emitter),
                ..
            }) => instance.apply_3d(listener, emitter),
            _ => Ok(()),
        }
    }

    fn reap_finished(&mut self) {
        let finished: Vec<InstanceId> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.one_shot
                    && (entry.instance.is_due_for_disposal() || entry.instance.failure().is_some())
            })
            .map(|(id, _)| *id)
            .collect();
        for id in finished {
            if let Some(mut instance) = self.remove_instance(id) {
                instance.dispose();
                log::debug!("Reaped finished instance {}", id);
            }
        }
    }

    /// Drains notifications from every instance, including reaped ones.
    pub fn poll_events(&mut self) -> Vec<ResoundEvent> {
        let mut events = std::mem::take(&mut self.pending_events);
        for entry in self.entries.values() {
            events.extend(entry.instance.poll_events());
        }
        events
    }
}

/// Spreads an emitter over the source's channels when their counts differ.
fn match_source_channels(emitter: &mut Emitter, instance: &SoundInstance) {
    let channels = instance.format().channels;
    if emitter.channel_count() != channels {
        emitter.set_channel_count(channels, emitter.channel_radius());
    }
}

impl Drop for ResoundWorld {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            log::debug!("Disposing {} instances", self.entries.len());
        }
        for entry in self.entries.values_mut() {
            entry.instance.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamingDesc;
    use crate::device::{CaptureVoice, DrainMode};
    use crate::math::{Pose, Vec3};
    use crate::source::{AudioSource, MemorySource};
    use std::sync::Arc;
    use std::time::Instant;

    fn instance(duration: Duration) -> (SoundInstance, Arc<CaptureVoice>) {
        let source = MemorySource::tone(330.0, duration, 8000, 400).unwrap();
        let voice = Arc::new(CaptureVoice::new(source.format(), 2, DrainMode::Immediate));
        let instance = SoundInstance::new(
            source,
            voice.clone(),
            StreamingDesc::default(),
            SpatialDesc::default(),
        )
        .unwrap();
        (instance, voice)
    }

    #[test]
    fn update_spatializes_positioned_instances() {
        let mut world = ResoundWorld::new(SpatialDesc::default());
        let (sound, voice) = instance(Duration::from_millis(100));
        let emitter = Emitter::new(Pose::from_position(Vec3::new(-2.0, 0.0, 0.0)))
            .with_radius(10.0)
            .unwrap();
        let id = world.add_spatial_instance(sound, emitter);

        world.update(Duration::from_millis(16));
        let levels = voice.output_matrix();
        assert!(levels[0] > levels[1]);
        assert!(world.instance(id).unwrap().is_3d());

        world.set_emitter(id, None).unwrap();
        assert!(!world.instance(id).unwrap().is_3d());
        assert_eq!(voice.output_matrix(), vec![1.0, 1.0]);
    }

    #[test]
    fn emitters_take_the_source_channel_count() {
        let mut world = ResoundWorld::new(SpatialDesc::default());
        let samples = vec![0.1f32; 1600];
        let source = MemorySource::from_f32(&samples, 8000, 2, 400).unwrap();
        let voice = Arc::new(CaptureVoice::new(source.format(), 2, DrainMode::Immediate));
        let sound = SoundInstance::new(
            source,
            voice.clone(),
            StreamingDesc::default(),
            SpatialDesc::default(),
        )
        .unwrap();
        let id = world.add_spatial_instance(sound, Emitter::default());
        assert_eq!(world.emitter(id).unwrap().channel_count(), 2);

        world.update(Duration::from_millis(16));
        assert_eq!(voice.output_matrix().len(), 4);

        world.set_emitter(id, Some(Emitter::default())).unwrap();
        assert_eq!(world.emitter(id).unwrap().channel_count(), 2);
    }

    #[test]
    fn emitter_velocity_comes_from_pose_changes() {
        let mut world = ResoundWorld::new(SpatialDesc::default());
        let (sound, _voice) = instance(Duration::from_millis(100));
        let id = world.add_spatial_instance(sound, Emitter::default());

        world.update(Duration::from_millis(100));
        world.emitter_mut(id).unwrap().pose.position = Vec3::new(0.0, 0.0, -1.0);
        world.update(Duration::from_millis(100));
        let velocity = world.emitter(id).unwrap().velocity();
        assert!((velocity.z + 10.0).abs() < 1e-3);
    }

    #[test]
    fn one_shots_are_reaped_with_their_events() {
        let mut world = ResoundWorld::new(SpatialDesc::default());
        let (sound, _voice) = instance(Duration::from_millis(50));
        let id = world.play_one_shot(sound, None).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while world.instance_count() > 0 && Instant::now() < deadline {
            world.update(Duration::from_millis(1));
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(world.instance_count(), 0);
        let events = world.poll_events();
        assert_eq!(events.first(), Some(&ResoundEvent::AudioStart { instance: id }));
        assert_eq!(events.last(), Some(&ResoundEvent::AudioEnd { instance: id }));
    }

    #[test]
    fn unknown_instance_is_reported() {
        let mut world = ResoundWorld::new(SpatialDesc::default());
        let (sound, _voice) = instance(Duration::from_millis(10));
        let id = world.add_instance(sound);
        let removed = world.remove_instance(id);
        assert!(removed.is_some());
        assert!(matches!(
            world.set_emitter(id, Some(Emitter::default())),
            Err(ResoundError::Disposed(_))
        ));
    }
}

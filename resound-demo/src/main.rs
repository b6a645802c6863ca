mod cli;

use anyhow::{Context, Result};
use resound::math::Vec3;
use resound::{
    AudioSource, CpalVoice, CpalVoiceDesc, Emitter, MemorySource, Pose, ResoundEvent,
    ResoundWorld, ReverbParameters, SoundInstance, SpatialDesc, SpeakerLayout, StreamingDesc,
    SymphoniaSource,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(16);

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let options = cli::parse(std::env::args().skip(1))?;
    match options.path.clone() {
        Some(path) => {
            let source = SymphoniaSource::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            run(source, &options)
        }
        None => {
            log::info!("No file given, playing a generated tone");
            let source = MemorySource::tone(440.0, Duration::from_secs(2), 48_000, 1024)?;
            run(source, &options)
        }
    }
}

fn run<S: AudioSource + 'static>(source: S, options: &cli::Options) -> Result<()> {
    let layout = SpeakerLayout::Stereo;
    let voice = CpalVoice::new(source.format(), layout, CpalVoiceDesc::default())
        .context("failed to open the output device")?;
    let spatial = SpatialDesc::default().with_speaker_layout(layout);
    let mut instance = SoundInstance::new(source, Arc::new(voice), StreamingDesc::default(), spatial.clone())?;
    instance.set_looped(options.looped);
    if options.reverb {
        instance.set_reverb(Some(ReverbParameters::default()));
    }
    log::info!("Streaming {:.2}s of audio", instance.duration().as_secs_f32());

    let mut world = ResoundWorld::new(spatial);
    let id = if options.orbit > 0.0 {
        let emitter = Emitter::new(Pose::from_position(Vec3::new(0.0, 0.0, -options.orbit)))
            .with_radius(options.orbit * 4.0)?;
        world.add_spatial_instance(instance, emitter)
    } else {
        world.add_instance(instance)
    };

    if let Some(instance) = world.instance(id) {
        instance.play()?;
    }

    let started = Instant::now();
    let mut last_tick = started;
    while started.elapsed() < options.duration() {
        std::thread::sleep(TICK);
        let now = Instant::now();
        let elapsed = now - last_tick;
        last_tick = now;

        if let Some(emitter) = world.emitter_mut(id) {
            let angle = started.elapsed().as_secs_f32() * 0.8;
            emitter.pose.position = Vec3::new(angle.sin(), 0.0, -angle.cos()) * options.orbit;
        }
        world.update(elapsed);

        let mut finished = false;
        for event in world.poll_events() {
            match event {
                ResoundEvent::AudioStart { .. } => log::info!("Playback started"),
                ResoundEvent::LoopEnd { loop_count, .. } => log::info!("Loop {} finished", loop_count),
                ResoundEvent::AudioEnd { .. } => {
                    log::info!("Playback ended");
                    finished = true;
                }
                ResoundEvent::PlaybackFailed { error, .. } => {
                    log::error!("Playback failed: {}", error);
                    finished = true;
                }
            }
        }
        if finished {
            break;
        }
    }

    if let Some(instance) = world.instance(id) {
        log::info!("Stopping at {:.2}s", instance.position().as_secs_f32());
        instance.stop(true)?;
    }
    Ok(())
}

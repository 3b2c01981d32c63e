//! Play one pass live.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use storyreel_capture_engine::{ExportController, ExportOptions, GstCaptureSink, GstCodecSupport};
use storyreel_common::clock::MonotonicClock;
use storyreel_common::config::AppConfig;
use storyreel_engine::{Engine, EngineCommand, EngineConfig, EngineEvent, NullSurface, Surface};
use storyreel_playback::{AudioOutput, ClockedOutput};
use storyreel_render_engine::{Composition, FrameBuffer};
use storyreel_scene_model::{PlaybackSpeed, SceneStore};

pub async fn run(
    config: AppConfig,
    path: PathBuf,
    speed: Option<f64>,
    speaker: bool,
    snapshots: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("Playing storyboard at: {}", path.display());

    let mut engine_config = EngineConfig::from_config(&config);
    if let Some(speed) = speed {
        engine_config.speed = PlaybackSpeed::new(speed)?;
    }
    println!("  Speed: {}", engine_config.speed);

    let surface: Box<dyn Surface> = match snapshots {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            println!("  Snapshots: {}", dir.display());
            Box::new(SnapshotSurface::new(dir))
        }
        None => Box::new(NullSurface),
    };

    let store = super::load_scenes(&path).await?;
    println!("  Scenes: {}", store.len());

    #[cfg(feature = "speaker")]
    if speaker {
        let output = storyreel_playback::SpeakerOutput::new();
        return play_with(output, config, engine_config, store, surface).await;
    }
    #[cfg(not(feature = "speaker"))]
    if speaker {
        println!("  [WARN] Built without the `speaker` feature; playing silently");
    }

    play_with(ClockedOutput::new(), config, engine_config, store, surface).await
}

async fn play_with<O: AudioOutput>(
    output: O,
    config: AppConfig,
    engine_config: EngineConfig,
    store: Arc<SceneStore>,
    surface: Box<dyn Surface>,
) -> anyhow::Result<()> {
    let export = ExportController::new(
        GstCaptureSink::new("storyreel-export"),
        Box::new(GstCodecSupport),
        ExportOptions::from_config(&config),
    );
    let engine = Engine::new(
        store,
        output,
        export,
        super::compositor(&config),
        surface,
        engine_config,
    );

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    command_tx
        .send(EngineCommand::Play)
        .map_err(|_| anyhow::anyhow!("Engine is not running"))?;

    let watch = async move {
        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Some(EngineEvent::SceneStarted { index, scene_id }) => {
                        println!("  Scene {} (id {scene_id})", index + 1);
                    }
                    Some(EngineEvent::PlaybackStopped) => {
                        println!("Playback finished.");
                        break;
                    }
                    Some(EngineEvent::CommandRejected { message }) => {
                        println!("  [WARN] {message}");
                        break;
                    }
                    Some(_) => {}
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    println!("\nStopping playback.");
                    break;
                }
            }
        }
        let _ = command_tx.send(EngineCommand::Shutdown);
    };

    let clock = Arc::new(MonotonicClock::start());
    tokio::join!(engine.run(clock, command_rx, event_tx), watch);
    Ok(())
}

/// Saves the first frame of every scene as a PNG.
struct SnapshotSurface {
    dir: PathBuf,
    saved: HashSet<usize>,
}

impl SnapshotSurface {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            saved: HashSet::new(),
        }
    }
}

impl Surface for SnapshotSurface {
    fn present(
        &mut self,
        frame: &FrameBuffer,
        _composition: &Composition,
        scene_index: Option<usize>,
        _now_ns: u64,
    ) {
        let Some(index) = scene_index else {
            return;
        };
        if !self.saved.insert(index) {
            return;
        }

        let raster = frame.to_raster();
        let path = self.dir.join(format!("scene-{:03}.png", index + 1));
        let Some(image) = image::RgbaImage::from_raw(raster.width, raster.height, raster.pixels)
        else {
            tracing::warn!(scene = index, "Frame buffer has an unexpected size");
            return;
        };
        match image.save(&path) {
            Ok(()) => tracing::info!(scene = index, path = %path.display(), "Snapshot saved"),
            Err(e) => tracing::warn!(scene = index, error = %e, "Failed to save snapshot"),
        }
    }
}

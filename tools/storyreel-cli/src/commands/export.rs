//! Export a storyboard to video.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use storyreel_capture_engine::{
    ExportArtifact, ExportController, ExportOptions, ExportStage, GstCaptureSink, GstCodecSupport,
    VideoCodec,
};
use storyreel_common::clock::MonotonicClock;
use storyreel_common::config::AppConfig;
use storyreel_engine::{export_settings, Engine, EngineCommand, EngineConfig, EngineEvent, NullSurface};
use storyreel_playback::{AudioOutput, ClockedOutput};
use storyreel_scene_model::{ExportSettings, FrameRate, PlaybackSpeed, Resolution, SceneStore};

/// Command-line overrides of the configured export defaults.
pub struct ExportArgs {
    pub resolution: Option<String>,
    pub fps: Option<u32>,
    pub speed: Option<f64>,
    pub output: Option<PathBuf>,
    pub codec: Option<String>,
    pub speaker: bool,
}

pub async fn run(config: AppConfig, path: PathBuf, args: ExportArgs) -> anyhow::Result<()> {
    println!("Exporting storyboard at: {}", path.display());

    let mut settings = export_settings(&config)?;
    if let Some(resolution) = &args.resolution {
        settings.resolution = resolution.parse::<Resolution>()?;
    }
    if let Some(fps) = args.fps {
        settings.frame_rate = FrameRate::try_from(fps)?;
    }
    if let Some(speed) = args.speed {
        settings.speed = PlaybackSpeed::new(speed)?;
    }

    let mut options = ExportOptions::from_config(&config);
    if let Some(output) = args.output.clone() {
        options.output_dir = output;
    }
    if let Some(codec) = &args.codec {
        options.preferred_codec = Some(codec.parse::<VideoCodec>()?);
    }

    println!("  Output: {}", options.output_dir.display());
    println!("  Resolution: {}", settings.resolution.label());
    println!("  FPS: {}", settings.frame_rate.as_u32());
    println!("  Speed: {}", settings.speed);

    let store = super::load_scenes(&path).await?;
    println!("  Scenes: {}", store.len());

    #[cfg(feature = "speaker")]
    if args.speaker {
        let output = storyreel_playback::SpeakerOutput::new();
        return export_with(output, config, store, settings, options).await;
    }
    #[cfg(not(feature = "speaker"))]
    if args.speaker {
        println!("  [WARN] Built without the `speaker` feature; exporting silently");
    }

    export_with(ClockedOutput::new(), config, store, settings, options).await
}

async fn export_with<O: AudioOutput>(
    output: O,
    config: AppConfig,
    store: Arc<SceneStore>,
    settings: ExportSettings,
    options: ExportOptions,
) -> anyhow::Result<()> {
    let export = ExportController::new(
        GstCaptureSink::new("storyreel-export"),
        Box::new(GstCodecSupport),
        options,
    );
    let engine = Engine::new(
        store,
        output,
        export,
        super::compositor(&config),
        Box::new(NullSurface),
        EngineConfig::from_config(&config),
    );

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    command_tx
        .send(EngineCommand::StartExport(settings))
        .map_err(|_| anyhow::anyhow!("Engine is not running"))?;

    let clock = Arc::new(MonotonicClock::start());
    let (_, outcome) = tokio::join!(
        engine.run(clock, command_rx, event_tx),
        watch(command_tx, event_rx),
    );

    match outcome {
        Outcome::Finished(artifact) => {
            println!("\nExport complete: {}", artifact.path.display());
            println!("  Format: {}", artifact.profile.mime_type());
            println!("  Size: {} bytes", artifact.bytes);
            println!(
                "  Duration: {:.2}s video, {:.2}s audio (drift {:.1}ms)",
                artifact.video_duration.as_secs_f64(),
                artifact.audio_duration.as_secs_f64(),
                artifact.drift_ms
            );
            Ok(())
        }
        Outcome::Failed(message) => Err(anyhow::anyhow!("Export failed: {message}")),
        Outcome::Cancelled => {
            println!("\nExport cancelled; nothing was written.");
            Ok(())
        }
    }
}

enum Outcome {
    Finished(ExportArtifact),
    Failed(String),
    Cancelled,
}

/// Print progress until the export ends, then stop the engine.
async fn watch(
    commands: mpsc::UnboundedSender<EngineCommand>,
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
) -> Outcome {
    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(EngineEvent::ExportProgress(p)) if p.stage == ExportStage::Rendering => {
                    print!(
                        "\r  Progress: {:.1}% (scene {}/{}, {} frames, {:.1}s)  ",
                        p.progress * 100.0,
                        (p.scene_index + 1).min(p.scene_count.max(1)),
                        p.scene_count,
                        p.frames_captured,
                        p.elapsed_secs,
                    );
                }
                Some(EngineEvent::ExportFinished(artifact)) => break Outcome::Finished(artifact),
                Some(EngineEvent::ExportFailed { message })
                | Some(EngineEvent::CommandRejected { message }) => break Outcome::Failed(message),
                Some(EngineEvent::ExportCancelled { .. }) => break Outcome::Cancelled,
                Some(_) => {}
                None => break Outcome::Failed("Engine stopped unexpectedly".to_string()),
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\n  Cancelling export...");
                let _ = commands.send(EngineCommand::CancelExport);
            }
        }
    };

    let _ = commands.send(EngineCommand::Shutdown);
    outcome
}

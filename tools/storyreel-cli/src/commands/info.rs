//! Show storyboard information.

use std::path::PathBuf;
use std::time::Duration;

use storyreel_common::config::AppConfig;
use storyreel_media::load_wav;
use storyreel_scene_model::LoadedManifest;

pub fn run(config: AppConfig, path: PathBuf) -> anyhow::Result<()> {
    let loaded =
        LoadedManifest::load(&path).map_err(|e| anyhow::anyhow!("Failed to load storyboard: {e}"))?;
    let manifest = &loaded.manifest;
    let fallback = Duration::from_millis(config.playback.fallback_hold_ms);

    println!(
        "Storyboard: {}",
        manifest.title.as_deref().unwrap_or("(untitled)")
    );
    println!("  Root: {}", loaded.root.display());
    println!();

    println!("Scenes:");
    let mut total = Duration::ZERO;
    for (entry, id) in manifest.scenes.iter().zip(manifest.scene_ids()) {
        let visual = match (&entry.video, &entry.image) {
            (Some(video), _) => format!("video {}", video.display()),
            (None, Some(image)) => format!("image {}", image.display()),
            (None, None) => "none".to_string(),
        };
        let narration = entry
            .narration
            .as_ref()
            .and_then(|path| load_wav(&loaded.resolve(path)).ok())
            .map(|buffer| buffer.duration());
        total += narration.unwrap_or(fallback);

        println!("  [{id}] {}", entry.subtitle);
        println!("       Visual: {visual}");
        match narration {
            Some(duration) => println!("       Narration: {:.2}s", duration.as_secs_f64()),
            None => println!("       Narration: none (holds {:.1}s)", fallback.as_secs_f64()),
        }
    }
    println!();

    println!("Pass length at 1x: {:.1}s", total.as_secs_f64());
    println!();

    println!("Export defaults:");
    println!(
        "  {} @ {}fps, speed {}",
        config.export.resolution, config.export.fps, config.playback.speed
    );
    println!("  Output: {}", config.output_dir.display());

    Ok(())
}

pub mod check;
pub mod export;
pub mod info;
pub mod init;
pub mod play;
pub mod validate;

use std::sync::Arc;

use storyreel_common::config::AppConfig;
use storyreel_media::load_storyboard;
use storyreel_render_engine::{Compositor, SubtitleFont};
use storyreel_scene_model::SceneStore;

/// Load a storyboard and wait for every visual to decode.
pub async fn load_scenes(path: &std::path::Path) -> anyhow::Result<Arc<SceneStore>> {
    let storyboard = load_storyboard(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load storyboard: {e}"))?;

    let pending = storyboard.pending.len();
    if pending > 0 {
        println!("  Decoding {pending} visual asset(s)...");
    }
    let report = storyboard.pending.wait_all().await;
    for failed in &report.failed {
        println!("  [WARN] Could not decode {}", failed.display());
    }
    Ok(storyboard.store)
}

/// Compositor with the configured subtitle font, or the first system font found.
pub fn compositor(config: &AppConfig) -> Compositor {
    let font = match &config.subtitles.font_path {
        Some(path) => match SubtitleFont::load(path) {
            Ok(font) => Some(font),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to load subtitle font");
                None
            }
        },
        None => SubtitleFont::discover().map(|(path, font)| {
            tracing::debug!(path = %path.display(), "Using system subtitle font");
            font
        }),
    };
    Compositor::new(font)
}

//! Check system capabilities.

use storyreel_capture_engine::{probe_profiles, select_profile, GstCodecSupport};
use storyreel_render_engine::SubtitleFont;

pub fn run() -> anyhow::Result<()> {
    println!("Storyreel System Check");
    println!("{}", "=".repeat(50));

    let support = GstCodecSupport;
    println!("Export profiles (in preference order):");
    for (profile, available) in probe_profiles(&support) {
        let status = if available { "OK" } else { "MISSING" };
        println!(
            "  [{status}] {} ({} + {} in {})",
            profile.mime_type(),
            profile.video_encoder,
            profile.audio_encoders.join("/"),
            profile.muxer
        );
    }

    println!();
    match SubtitleFont::discover() {
        Some((path, _)) => println!("[OK] Subtitle font: {}", path.display()),
        None => println!("[WARN] No system font found; set subtitles.font_path in the config"),
    }

    println!();
    match select_profile(None, &support) {
        Ok(resolved) => {
            println!(
                "Exports will use {} (audio encoder: {}).",
                resolved.profile, resolved.audio_encoder
            );
        }
        Err(e) => {
            println!("{e}");
            println!("Install the GStreamer good/bad/ugly plugin sets to enable export.");
        }
    }

    Ok(())
}

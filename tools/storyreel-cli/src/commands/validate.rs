//! Validate a storyboard.

use std::path::PathBuf;

use storyreel_scene_model::LoadedManifest;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating storyboard at: {}", path.display());

    let loaded =
        LoadedManifest::load(&path).map_err(|e| anyhow::anyhow!("Failed to load storyboard: {e}"))?;

    if let Some(title) = &loaded.manifest.title {
        println!("  Title: {title}");
    }
    println!("  Scenes: {}", loaded.manifest.scenes.len());

    let errors = loaded.validate();
    if errors.is_empty() {
        println!("  Media: All present");
        println!("\nStoryboard is valid.");
    } else {
        println!("\nValidation issues:");
        for error in &errors {
            println!("  - {error}");
        }
        println!(
            "\n{} issue(s) found. Playback may show black frames or hold silent scenes.",
            errors.len()
        );
    }

    Ok(())
}

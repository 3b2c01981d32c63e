//! Initialize a new storyboard.

use std::path::PathBuf;

use storyreel_scene_model::{LoadedManifest, SceneEntry, StoryboardManifest};

pub fn run(dir: PathBuf, title: Option<String>, scenes: u32) -> anyhow::Result<()> {
    println!("Creating storyboard at {}", dir.display());

    let manifest = StoryboardManifest {
        title,
        scenes: (1..=scenes.max(1))
            .map(|id| SceneEntry {
                id: Some(id),
                subtitle: format!("Scene {id} subtitle"),
                image: Some(PathBuf::from(format!("images/scene-{id}.png"))),
                video: None,
                narration: Some(PathBuf::from(format!("audio/scene-{id}.wav"))),
            })
            .collect(),
    };

    let loaded = LoadedManifest::create(&dir, manifest)
        .map_err(|e| anyhow::anyhow!("Failed to create storyboard: {e}"))?;
    std::fs::create_dir_all(loaded.root.join("images"))?;
    std::fs::create_dir_all(loaded.root.join("audio"))?;

    println!("Storyboard created successfully:");
    println!("  Directory: {}", loaded.root.display());
    println!("  Scenes: {}", loaded.manifest.scenes.len());
    println!();
    println!("Directory structure:");
    println!("  {}/", dir.display());
    println!("  ├── storyboard.json  (scene order, subtitles, media paths)");
    println!("  ├── images/          (scene stills or clips)");
    println!("  └── audio/           (narration WAVs)");

    Ok(())
}

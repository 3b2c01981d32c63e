use std::path::PathBuf;
use std::time::Duration;

use storyreel_media::{load_storyboard, write_wav};
use storyreel_scene_model::{
    AudioBuffer, LoadedManifest, SceneEntry, StoryboardManifest, VisualAsset,
};

fn fixture(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(dir.join("media")).unwrap();

    image::RgbaImage::from_pixel(8, 4, image::Rgba([200, 10, 10, 255]))
        .save(dir.join("media/0.png"))
        .unwrap();
    write_wav(
        &dir.join("media/0.wav"),
        &AudioBuffer::silence(16_000, 1, Duration::from_secs(3)),
    )
    .unwrap();

    let manifest = StoryboardManifest {
        title: Some("fixture".to_string()),
        scenes: vec![
            SceneEntry {
                id: Some(0),
                subtitle: "Hello world".to_string(),
                image: Some("media/0.png".into()),
                narration: Some("media/0.wav".into()),
                ..SceneEntry::default()
            },
            SceneEntry {
                id: Some(1),
                subtitle: "The end".to_string(),
                image: Some("media/missing.png".into()),
                ..SceneEntry::default()
            },
        ],
    };
    LoadedManifest::create(&dir, manifest).unwrap();
    dir
}

#[tokio::test]
async fn loads_scenes_in_manifest_order() {
    let dir = fixture("storyreel_media_storyboard");
    let loaded = load_storyboard(&dir).await.unwrap();

    let store = &loaded.store;
    assert_eq!(store.len(), 2);
    assert_eq!(store.get(0).unwrap().subtitle_text, "Hello world");
    assert_eq!(
        store.get(0).unwrap().narration_duration(),
        Some(Duration::from_secs(3))
    );
    assert!(store.get(1).unwrap().narration.is_none());
    assert_eq!(loaded.pending.len(), 2);

    let report = loaded.pending.wait_all().await;
    assert_eq!(report.loaded, 1);
    assert_eq!(report.failed, vec![dir.join("media/missing.png")]);

    let Some(VisualAsset::Image(slot)) = &store.get(0).unwrap().visual else {
        panic!("scene 0 should have an image");
    };
    assert_eq!(slot.get().unwrap().width, 8);
    assert!(!store.get(1).unwrap().visual.as_ref().unwrap().is_ready());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn missing_manifest_is_an_error() {
    let dir = std::env::temp_dir().join("storyreel_media_no_manifest");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    assert!(load_storyboard(&dir).await.is_err());
    let _ = std::fs::remove_dir_all(&dir);
}

//! Assemble a scene store from a storyboard manifest.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;

use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_scene_model::{
    AssetSlot, AudioBuffer, LoadedManifest, Scene, SceneEntry, SceneStore, VisualAsset,
};

use crate::raster::load_image;
use crate::video::{load_video, MAX_CLIP_FRAMES};
use crate::wav::load_wav;

/// A store whose visuals may still be decoding.
#[derive(Debug)]
pub struct LoadedStoryboard {
    pub manifest: LoadedManifest,
    pub store: Arc<SceneStore>,
    pub pending: PendingAssets,
}

/// Outcome of the background decodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetReport {
    pub loaded: usize,
    pub failed: Vec<PathBuf>,
}

/// Handles of the visual decode tasks.
#[derive(Debug, Default)]
pub struct PendingAssets {
    tasks: Vec<(PathBuf, JoinHandle<bool>)>,
}

impl PendingAssets {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every decode. Failed assets leave their slot pending.
    pub async fn wait_all(self) -> AssetReport {
        let mut report = AssetReport::default();
        for (path, task) in self.tasks {
            match task.await {
                Ok(true) => report.loaded += 1,
                Ok(false) => report.failed.push(path),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Decode task aborted");
                    report.failed.push(path);
                }
            }
        }
        report
    }
}

/// Load a storyboard from a manifest file or a directory containing one.
///
/// Narration is decoded before this returns; visuals are decoded on
/// blocking tasks. Must be called from within a tokio runtime.
pub async fn load_storyboard(path: impl AsRef<Path>) -> StoryreelResult<LoadedStoryboard> {
    let manifest = LoadedManifest::load(path.as_ref())
        .map_err(|e| StoryreelError::asset(e.to_string()))?;

    for issue in manifest.validate() {
        tracing::warn!(issue = %issue, "Storyboard issue");
    }

    let ids = manifest.manifest.scene_ids();
    let mut scenes = Vec::with_capacity(ids.len());
    let mut pending = PendingAssets::default();

    for (entry, id) in manifest.manifest.scenes.iter().zip(ids) {
        let mut scene = Scene::new(id, entry.subtitle.clone());

        if let Some(narration) = load_narration(&manifest, entry, id) {
            scene = scene.with_narration(narration);
        }
        if let Some(visual) = spawn_visual(&manifest, entry, id, &mut pending) {
            scene = scene.with_visual(visual);
        }
        scenes.push(scene);
    }

    let store = SceneStore::new(scenes).map_err(|e| StoryreelError::asset(e.to_string()))?;
    tracing::info!(
        scenes = store.len(),
        decoding = pending.len(),
        narration_secs = store.total_narration().as_secs_f64(),
        "Storyboard loaded"
    );

    Ok(LoadedStoryboard {
        manifest,
        store: Arc::new(store),
        pending,
    })
}

fn load_narration(manifest: &LoadedManifest, entry: &SceneEntry, id: u32) -> Option<AudioBuffer> {
    let path = manifest.resolve(entry.narration.as_deref()?);
    match load_wav(&path) {
        Ok(buffer) => Some(buffer),
        Err(e) => {
            tracing::warn!(scene = id, error = %e, "Narration unavailable; scene will hold");
            None
        }
    }
}

fn spawn_visual(
    manifest: &LoadedManifest,
    entry: &SceneEntry,
    id: u32,
    pending: &mut PendingAssets,
) -> Option<VisualAsset> {
    if let Some(video) = entry.video.as_deref() {
        if entry.image.is_some() {
            tracing::warn!(scene = id, "Scene has both image and video; using the video");
        }
        let path = manifest.resolve(video);
        let slot = Arc::new(AssetSlot::pending());
        let task = spawn_decode(id, path.clone(), Arc::clone(&slot), |p| {
            load_video(p, MAX_CLIP_FRAMES)
        });
        pending.tasks.push((path, task));
        return Some(VisualAsset::Video(slot));
    }

    let path = manifest.resolve(entry.image.as_deref()?);
    let slot = Arc::new(AssetSlot::pending());
    let task = spawn_decode(id, path.clone(), Arc::clone(&slot), load_image);
    pending.tasks.push((path, task));
    Some(VisualAsset::Image(slot))
}

fn spawn_decode<T, F>(
    scene: u32,
    path: PathBuf,
    slot: Arc<AssetSlot<T>>,
    decode: F,
) -> JoinHandle<bool>
where
    T: Send + Sync + 'static,
    F: FnOnce(&Path) -> StoryreelResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || match decode(&path) {
        Ok(asset) => {
            slot.fill(asset);
            tracing::debug!(scene, path = %path.display(), "Visual ready");
            true
        }
        Err(e) => {
            tracing::warn!(scene, error = %e, "Visual failed to decode; scene renders black");
            false
        }
    })
}

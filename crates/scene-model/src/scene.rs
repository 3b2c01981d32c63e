//! Scenes and the ordered store a playback pass walks through.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::asset::VisualAsset;
use crate::audio::AudioBuffer;

/// One narrated segment of the slideshow.
#[derive(Debug, Clone)]
pub struct Scene {
    /// Unique ordinal. Store order, not the id value, defines playback order.
    pub id: u32,

    /// Text shown as the subtitle overlay.
    pub subtitle_text: String,

    /// Image or video layer; `None` renders a black frame.
    pub visual: Option<VisualAsset>,

    /// Decoded narration; `None` holds the scene for the fallback duration.
    pub narration: Option<Arc<AudioBuffer>>,
}

impl Scene {
    pub fn new(id: u32, subtitle_text: impl Into<String>) -> Self {
        Self {
            id,
            subtitle_text: subtitle_text.into(),
            visual: None,
            narration: None,
        }
    }

    pub fn with_visual(mut self, visual: VisualAsset) -> Self {
        self.visual = Some(visual);
        self
    }

    pub fn with_narration(mut self, narration: AudioBuffer) -> Self {
        self.narration = Some(Arc::new(narration));
        self
    }

    /// Narration length at 1.0x, if the scene has narration.
    pub fn narration_duration(&self) -> Option<Duration> {
        self.narration.as_ref().map(|n| n.duration())
    }
}

/// Fixed-length ordered sequence of scenes for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct SceneStore {
    scenes: Vec<Scene>,
}

impl SceneStore {
    /// Build a store, rejecting duplicate scene ids.
    pub fn new(scenes: Vec<Scene>) -> Result<Self, SceneStoreError> {
        let mut seen = HashSet::with_capacity(scenes.len());
        for scene in &scenes {
            if !seen.insert(scene.id) {
                return Err(SceneStoreError::DuplicateId { id: scene.id });
            }
        }
        Ok(Self { scenes })
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Scene at playback position `index`.
    pub fn get(&self, index: usize) -> Option<&Scene> {
        self.scenes.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.iter()
    }

    /// Playback position of the scene with the given id.
    pub fn position_of(&self, id: u32) -> Option<usize> {
        self.scenes.iter().position(|scene| scene.id == id)
    }

    /// Sum of all narration durations at 1.0x.
    pub fn total_narration(&self) -> Duration {
        self.scenes.iter().filter_map(Scene::narration_duration).sum()
    }

    /// Expected length of one pass at 1.0x, using `fallback` for scenes
    /// without narration.
    pub fn pass_duration(&self, fallback: Duration) -> Duration {
        self.scenes
            .iter()
            .map(|scene| scene.narration_duration().unwrap_or(fallback))
            .sum()
    }
}

/// Errors raised while assembling a scene store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneStoreError {
    #[error("Duplicate scene id {id}")]
    DuplicateId { id: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_preserves_insertion_order() {
        let store = SceneStore::new(vec![Scene::new(7, "first"), Scene::new(3, "second")]).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().id, 7);
        assert_eq!(store.position_of(3), Some(1));
        assert!(store.get(2).is_none());
    }

    #[test]
    fn test_store_rejects_duplicate_ids() {
        let err = SceneStore::new(vec![Scene::new(1, "a"), Scene::new(1, "b")]).unwrap_err();
        assert_eq!(err, SceneStoreError::DuplicateId { id: 1 });
    }

    #[test]
    fn test_pass_duration_uses_fallback_for_silent_scenes() {
        let store = SceneStore::new(vec![
            Scene::new(0, "Hello world").with_narration(AudioBuffer::silence(
                48_000,
                1,
                Duration::from_secs(3),
            )),
            Scene::new(1, "The end"),
        ])
        .unwrap();
        assert_eq!(
            store.pass_duration(Duration::from_secs(3)),
            Duration::from_secs(6)
        );
        assert_eq!(store.total_narration(), Duration::from_secs(3));
    }

    proptest::proptest! {
        #[test]
        fn prop_pass_duration_counts_every_scene(
            narrated in proptest::collection::vec(proptest::option::of(1u64..5_000), 0..12),
            fallback_ms in 1u64..5_000,
        ) {
            let scenes: Vec<Scene> = narrated
                .iter()
                .enumerate()
                .map(|(i, ms)| {
                    let scene = Scene::new(i as u32, "");
                    match ms {
                        Some(ms) => scene.with_narration(AudioBuffer::silence(
                            1_000,
                            1,
                            Duration::from_millis(*ms),
                        )),
                        None => scene,
                    }
                })
                .collect();
            let store = SceneStore::new(scenes).unwrap();

            let expected: u64 = narrated.iter().map(|ms| ms.unwrap_or(fallback_ms)).sum();
            proptest::prop_assert_eq!(
                store.pass_duration(Duration::from_millis(fallback_ms)),
                Duration::from_millis(expected)
            );
        }
    }
}

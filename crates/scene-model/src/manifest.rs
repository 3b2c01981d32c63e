//! Storyboard manifest: the on-disk hand-off from the content generator.
//!
//! ```json
//! {
//!   "title": "A short story",
//!   "scenes": [
//!     { "id": 0, "subtitle": "Hello world", "image": "images/0.png", "narration": "audio/0.wav" },
//!     { "id": 1, "subtitle": "The end", "video": "clips/1.mp4" }
//!   ]
//! }
//! ```
//!
//! Media paths are relative to the directory containing the manifest.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File name used when a directory is given instead of a manifest path.
pub const MANIFEST_FILE_NAME: &str = "storyboard.json";

/// Top-level manifest document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryboardManifest {
    /// Optional human-readable title.
    #[serde(default)]
    pub title: Option<String>,

    /// Scenes in playback order.
    pub scenes: Vec<SceneEntry>,
}

/// One scene as described by the content generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneEntry {
    /// Scene ordinal; defaults to the entry's position.
    #[serde(default)]
    pub id: Option<u32>,

    /// Subtitle text.
    #[serde(default)]
    pub subtitle: String,

    /// Still image (PNG/JPEG/WebP).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,

    /// Short video clip, used instead of an image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<PathBuf>,

    /// Narration audio (WAV).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<PathBuf>,
}

impl StoryboardManifest {
    /// Parse a manifest from JSON text.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Effective scene ids, falling back to entry positions.
    pub fn scene_ids(&self) -> Vec<u32> {
        self.scenes
            .iter()
            .enumerate()
            .map(|(index, entry)| entry.id.unwrap_or(index as u32))
            .collect()
    }
}

/// A manifest together with the directory its paths are relative to.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    /// Directory containing the manifest.
    pub root: PathBuf,

    /// Parsed document.
    pub manifest: StoryboardManifest,
}

impl LoadedManifest {
    /// Load a manifest from a file, or from `storyboard.json` inside a directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let manifest_path = if path.is_dir() {
            path.join(MANIFEST_FILE_NAME)
        } else {
            path.to_path_buf()
        };

        let json =
            std::fs::read_to_string(&manifest_path).map_err(|e| ManifestError::IoError {
                path: manifest_path.clone(),
                source: e,
            })?;

        let manifest =
            StoryboardManifest::parse(&json).map_err(|e| ManifestError::ParseError {
                path: manifest_path.clone(),
                source: e,
            })?;

        let root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self { root, manifest })
    }

    /// Write a manifest into `dir/storyboard.json`, creating the directory.
    pub fn create(dir: impl AsRef<Path>, manifest: StoryboardManifest) -> Result<Self, ManifestError> {
        let root = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| ManifestError::IoError {
            path: root.clone(),
            source: e,
        })?;

        let loaded = Self { root, manifest };
        loaded.save()?;
        Ok(loaded)
    }

    /// Save the manifest to `root/storyboard.json`.
    pub fn save(&self) -> Result<(), ManifestError> {
        let path = self.root.join(MANIFEST_FILE_NAME);
        let json = serde_json::to_string_pretty(&self.manifest).map_err(|e| {
            ManifestError::ParseError {
                path: path.clone(),
                source: e,
            }
        })?;
        std::fs::write(&path, json).map_err(|e| ManifestError::IoError { path, source: e })
    }

    /// Resolve a manifest-relative media path.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.root.join(relative)
        }
    }

    /// Report problems that would prevent a full playback pass.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = vec![];

        if self.manifest.scenes.is_empty() {
            errors.push("Storyboard has no scenes".to_string());
        }

        let mut seen = HashSet::new();
        for (index, id) in self.manifest.scene_ids().into_iter().enumerate() {
            if !seen.insert(id) {
                errors.push(format!("Scene {index}: duplicate id {id}"));
            }
        }

        for (index, entry) in self.manifest.scenes.iter().enumerate() {
            if entry.image.is_some() && entry.video.is_some() {
                errors.push(format!("Scene {index}: has both an image and a video"));
            }

            let media = [
                ("Image", &entry.image),
                ("Video", &entry.video),
                ("Narration", &entry.narration),
            ];
            for (label, path) in media {
                if let Some(path) = path {
                    if !self.resolve(path).exists() {
                        errors.push(format!(
                            "Scene {index}: {label} missing: {}",
                            path.display()
                        ));
                    }
                }
            }
        }

        errors
    }
}

/// Errors that can occur when working with manifests.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid storyboard: {message}")]
    ValidationError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults_ids_to_positions() {
        let manifest = StoryboardManifest::parse(
            r#"{ "scenes": [ { "subtitle": "Hello world" }, { "id": 9, "subtitle": "The end" } ] }"#,
        )
        .unwrap();
        assert_eq!(manifest.title, None);
        assert_eq!(manifest.scene_ids(), vec![0, 9]);
    }

    #[test]
    fn test_create_and_load_roundtrip() {
        let dir = std::env::temp_dir().join("storyreel_test_manifest");
        let _ = std::fs::remove_dir_all(&dir);

        let manifest = StoryboardManifest {
            title: Some("Test".to_string()),
            scenes: vec![SceneEntry {
                id: Some(0),
                subtitle: "Hello".to_string(),
                ..Default::default()
            }],
        };
        LoadedManifest::create(&dir, manifest).unwrap();

        let loaded = LoadedManifest::load(&dir).unwrap();
        assert_eq!(loaded.root, dir);
        assert_eq!(loaded.manifest.title.as_deref(), Some("Test"));
        assert!(loaded.validate().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_validate_reports_problems() {
        let loaded = LoadedManifest {
            root: std::env::temp_dir().join("storyreel_missing_root"),
            manifest: StoryboardManifest {
                title: None,
                scenes: vec![
                    SceneEntry {
                        id: Some(1),
                        subtitle: "a".to_string(),
                        image: Some(PathBuf::from("a.png")),
                        video: Some(PathBuf::from("a.mp4")),
                        narration: None,
                    },
                    SceneEntry {
                        id: Some(1),
                        subtitle: "b".to_string(),
                        ..Default::default()
                    },
                ],
            },
        };

        let errors = loaded.validate();
        assert!(errors.iter().any(|e| e.contains("duplicate id 1")));
        assert!(errors.iter().any(|e| e.contains("both an image and a video")));
        assert!(errors.iter().any(|e| e.contains("Image missing: a.png")));
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = LoadedManifest::load("/nonexistent/storyboard.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/storyboard.json"));
    }
}

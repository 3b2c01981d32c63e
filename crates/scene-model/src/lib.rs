//! Storyreel Scene Model
//!
//! Defines the core data contracts shared by the playback pipeline:
//! - **Scene:** one narrated segment (visual asset, narration, subtitle)
//! - **SceneStore:** the fixed, ordered sequence a playback pass walks through
//! - **Assets:** decoded raster images, video clips and PCM narration buffers
//! - **Settings:** export resolution, frame rate and playback speed presets
//! - **Manifest:** the on-disk storyboard produced by the content generator
//!
//! Scenes are immutable once built. Asset decoding may finish after a scene
//! is created; that is tracked by write-once [`AssetSlot`]s, never by
//! mutating the scene.

pub mod asset;
pub mod audio;
pub mod manifest;
pub mod scene;
pub mod settings;

pub use asset::*;
pub use audio::*;
pub use manifest::*;
pub use scene::*;
pub use settings::*;

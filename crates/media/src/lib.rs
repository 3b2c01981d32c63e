//! Storyreel Media
//!
//! Decoders that turn the storyboard's files into scene assets, and the
//! loader that assembles a [`SceneStore`](storyreel_scene_model::SceneStore)
//! from a manifest.
//!
//! Narration is decoded up front because scene timing depends on it. Images
//! and video clips decode on blocking tasks and land in the scenes'
//! [`AssetSlot`](storyreel_scene_model::AssetSlot)s whenever they finish;
//! until then the compositor draws black.

pub mod raster;
pub mod storyboard;
pub mod video;
pub mod wav;

pub use raster::{decode_image, load_image};
pub use storyboard::*;
pub use video::{load_video, MAX_CLIP_FRAMES};
pub use wav::{load_wav, write_wav};

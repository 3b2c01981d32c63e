//! Still image decoding.

use std::path::Path;

use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_scene_model::RasterImage;

/// Decode encoded image bytes (PNG, JPEG, WebP, ...) to straight RGBA8.
pub fn decode_image(bytes: &[u8]) -> StoryreelResult<RasterImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| StoryreelError::asset(format!("Failed to decode image: {e}")))?;
    into_raster(decoded)
}

pub fn load_image(path: &Path) -> StoryreelResult<RasterImage> {
    if !path.exists() {
        return Err(StoryreelError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let decoded = image::open(path).map_err(|e| {
        StoryreelError::asset(format!("Failed to decode image {}: {e}", path.display()))
    })?;
    let raster = into_raster(decoded)?;
    tracing::debug!(
        path = %path.display(),
        width = raster.width,
        height = raster.height,
        "Image decoded"
    );
    Ok(raster)
}

fn into_raster(decoded: image::DynamicImage) -> StoryreelResult<RasterImage> {
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(StoryreelError::asset("Image has no pixels"));
    }
    RasterImage::from_rgba(width, height, rgba.into_raw())
        .ok_or_else(|| StoryreelError::asset("Decoded image has an unexpected buffer size"))
}

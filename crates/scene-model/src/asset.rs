//! Decoded visual assets and their readiness tracking.

use std::fmt;
use std::sync::{Arc, OnceLock};

/// An RGBA8 raster, row-major, no padding.
#[derive(Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RasterImage {
    /// Wrap raw RGBA8 pixels. Returns `None` when the buffer size does not
    /// match the dimensions.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// A single-colour image.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Zero-sized images cannot be sampled.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Pixel at `(x, y)`. Coordinates are clamped to the image bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

impl fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// A short decoded video clip. Playback loops over its frames.
#[derive(Debug, Clone)]
pub struct VideoClip {
    /// Intrinsic width (0 until the decoder reported caps).
    pub width: u32,
    /// Intrinsic height (0 until the decoder reported caps).
    pub height: u32,
    /// Native frame rate.
    pub fps: f64,
    /// Decoded frames in presentation order.
    pub frames: Vec<RasterImage>,
}

impl VideoClip {
    /// Whether the clip can be sampled at all.
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0 && self.fps > 0.0 && !self.frames.is_empty()
    }

    /// Clip duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.fps <= 0.0 {
            return 0.0;
        }
        self.frames.len() as f64 / self.fps
    }

    /// The frame shown `time_secs` into playback, looping at the end.
    pub fn frame_at(&self, time_secs: f64) -> Option<&RasterImage> {
        if !self.is_ready() {
            return None;
        }
        let index = (time_secs.max(0.0) * self.fps).floor() as usize % self.frames.len();
        self.frames.get(index).filter(|frame| !frame.is_empty())
    }
}

/// A write-once cell holding an asset that may still be decoding.
pub struct AssetSlot<T> {
    cell: OnceLock<Arc<T>>,
}

impl<T> AssetSlot<T> {
    /// A slot whose asset has not been decoded yet.
    pub fn pending() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// A slot that is ready from the start.
    pub fn ready(value: T) -> Self {
        let slot = Self::pending();
        slot.fill(value);
        slot
    }

    /// Publish the decoded asset. The first fill wins; later fills are
    /// rejected and return `false`.
    pub fn fill(&self, value: T) -> bool {
        self.cell.set(Arc::new(value)).is_ok()
    }

    /// The decoded asset, if available.
    pub fn get(&self) -> Option<Arc<T>> {
        self.cell.get().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T> Default for AssetSlot<T> {
    fn default() -> Self {
        Self::pending()
    }
}

impl<T> fmt::Debug for AssetSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetSlot")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Kind tag of a [`VisualAsset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualKind {
    Image,
    Video,
}

/// The visual layer of a scene.
#[derive(Debug, Clone)]
pub enum VisualAsset {
    Image(Arc<AssetSlot<RasterImage>>),
    Video(Arc<AssetSlot<VideoClip>>),
}

impl VisualAsset {
    /// An image that is already decoded.
    pub fn image(image: RasterImage) -> Self {
        Self::Image(Arc::new(AssetSlot::ready(image)))
    }

    /// A video clip that is already decoded.
    pub fn video(clip: VideoClip) -> Self {
        Self::Video(Arc::new(AssetSlot::ready(clip)))
    }

    pub fn kind(&self) -> VisualKind {
        match self {
            Self::Image(_) => VisualKind::Image,
            Self::Video(_) => VisualKind::Video,
        }
    }

    /// Whether the asset has been decoded to something drawable.
    pub fn is_ready(&self) -> bool {
        match self {
            Self::Image(slot) => slot.get().is_some_and(|img| !img.is_empty()),
            Self::Video(slot) => slot.get().is_some_and(|clip| clip.is_ready()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(frames: usize, fps: f64) -> VideoClip {
        VideoClip {
            width: 4,
            height: 2,
            fps,
            frames: (0..frames)
                .map(|i| RasterImage::solid(4, 2, [i as u8, 0, 0, 255]))
                .collect(),
        }
    }

    #[test]
    fn test_from_rgba_rejects_size_mismatch() {
        assert!(RasterImage::from_rgba(2, 2, vec![0; 15]).is_none());
        assert!(RasterImage::from_rgba(2, 2, vec![0; 16]).is_some());
    }

    #[test]
    fn test_pixel_clamps_coordinates() {
        let img = RasterImage::solid(3, 3, [1, 2, 3, 4]);
        assert_eq!(img.pixel(10, 10), [1, 2, 3, 4]);
    }

    #[test]
    fn test_video_frame_at_loops() {
        let clip = clip(10, 10.0);
        assert_eq!(clip.frame_at(0.05).unwrap().pixel(0, 0)[0], 0);
        assert_eq!(clip.frame_at(0.55).unwrap().pixel(0, 0)[0], 5);
        // 1.25s into a 1s clip wraps to frame 2.
        assert_eq!(clip.frame_at(1.25).unwrap().pixel(0, 0)[0], 2);
        assert!((clip.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_video_without_dimensions_is_not_ready() {
        let mut undecoded = clip(3, 30.0);
        undecoded.width = 0;
        assert!(!undecoded.is_ready());
        assert!(undecoded.frame_at(0.0).is_none());
        assert!(clip(0, 30.0).frame_at(0.0).is_none());
    }

    #[test]
    fn test_asset_slot_first_fill_wins() {
        let slot = AssetSlot::pending();
        assert!(!slot.is_ready());
        assert!(slot.fill(1u32));
        assert!(!slot.fill(2u32));
        assert_eq!(*slot.get().unwrap(), 1);
    }

    #[test]
    fn test_visual_asset_readiness() {
        let pending = VisualAsset::Image(Arc::new(AssetSlot::pending()));
        assert!(!pending.is_ready());
        assert_eq!(pending.kind(), VisualKind::Image);

        let empty = VisualAsset::image(RasterImage::solid(0, 0, [0; 4]));
        assert!(!empty.is_ready());

        let video = VisualAsset::video(clip(2, 24.0));
        assert!(video.is_ready());
        assert_eq!(video.kind(), VisualKind::Video);
    }
}

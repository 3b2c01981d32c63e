//! RGBA frame buffer shared by the on-screen surface and the capture sink.

use storyreel_scene_model::RasterImage;

/// An opaque RGBA8 frame, row-major, no padding.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    /// A black frame of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        let mut frame = Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        };
        frame.fill([0, 0, 0, 255]);
        frame
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw RGBA bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Reallocate to a new size. The content is cleared to black.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        *self = Self::new(width, height);
    }

    /// Fill every pixel with one colour.
    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Pixel at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.index(x, y);
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    /// Overwrite a pixel. Out-of-bounds writes are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.index(x, y);
        self.pixels[i..i + 4].copy_from_slice(&rgba);
    }

    /// Source-over blend of an RGB colour with the given opacity.
    /// Signed coordinates let glyphs hang off the frame edges.
    pub fn blend_pixel(&mut self, x: i64, y: i64, rgb: [u8; 3], alpha: f32) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let i = self.index(x as u32, y as u32);
        for c in 0..3 {
            let dst = self.pixels[i + c] as f32;
            let src = rgb[c] as f32;
            self.pixels[i + c] = (src * alpha + dst * (1.0 - alpha)).round() as u8;
        }
        self.pixels[i + 3] = 255;
    }

    /// Darken a whole row towards black by `alpha`.
    pub fn darken_row(&mut self, y: u32, alpha: f32) {
        if y >= self.height {
            return;
        }
        let keep = 1.0 - alpha.clamp(0.0, 1.0);
        let start = self.index(0, y);
        let end = start + self.width as usize * 4;
        for px in self.pixels[start..end].chunks_exact_mut(4) {
            for c in &mut px[..3] {
                *c = (*c as f32 * keep).round() as u8;
            }
        }
    }

    /// Copy the frame out as a [`RasterImage`] (for snapshots).
    pub fn to_raster(&self) -> RasterImage {
        RasterImage {
            width: self.width,
            height: self.height,
            pixels: self.pixels.clone(),
        }
    }

    pub(crate) fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = self.index(0, y);
        let end = start + self.width as usize * 4;
        &mut self.pixels[start..end]
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

//! Subtitle text measurement, word wrapping and glyph rasterization.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use storyreel_common::error::{StoryreelError, StoryreelResult};

use crate::frame::FrameBuffer;

/// Measures the rendered width of a run of text.
///
/// Layout only depends on this trait, so wrapping can be exercised without
/// a font file.
pub trait TextMeasure {
    /// Advance width of `text` at `font_px`, in pixels.
    fn measure(&self, text: &str, font_px: f32) -> f32;
}

/// Fixed-advance approximation used when no font is available.
#[derive(Debug, Clone, Copy)]
pub struct ApproxMetrics {
    /// Advance per character as a fraction of the font size.
    pub advance_ratio: f32,
}

impl Default for ApproxMetrics {
    fn default() -> Self {
        Self { advance_ratio: 0.5 }
    }
}

impl TextMeasure for ApproxMetrics {
    fn measure(&self, text: &str, font_px: f32) -> f32 {
        text.chars().count() as f32 * font_px * self.advance_ratio
    }
}

/// Greedy word wrap.
///
/// Words are appended to the current line while its measured width stays
/// within `max_width`; otherwise a new line starts. The final partial line is
/// always flushed, and a word wider than `max_width` gets a line of its own
/// rather than being dropped.
pub fn wrap_words(
    text: &str,
    max_width: f32,
    font_px: f32,
    measure: &dyn TextMeasure,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }

        let candidate = format!("{current} {word}");
        if measure.measure(&candidate, font_px) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

/// Well-known locations probed by [`SubtitleFont::discover`].
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Bold.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

struct Glyph {
    metrics: fontdue::Metrics,
    coverage: Vec<u8>,
}

/// A TrueType/OpenType font rasterized with `fontdue`.
pub struct SubtitleFont {
    font: fontdue::Font,
    glyphs: HashMap<(char, u32), Glyph>,
}

impl SubtitleFont {
    /// Parse font data.
    pub fn from_bytes(bytes: &[u8]) -> StoryreelResult<Self> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| StoryreelError::render(format!("Invalid font data: {e}")))?;
        Ok(Self {
            font,
            glyphs: HashMap::new(),
        })
    }

    /// Load a font file.
    pub fn load(path: &Path) -> StoryreelResult<Self> {
        if !path.exists() {
            return Err(StoryreelError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// First usable font from a list of common system locations.
    pub fn discover() -> Option<(PathBuf, Self)> {
        SYSTEM_FONT_CANDIDATES.iter().find_map(|candidate| {
            let path = PathBuf::from(candidate);
            match Self::load(&path) {
                Ok(font) => Some((path, font)),
                Err(_) => None,
            }
        })
    }

    /// Distance from the baseline to the top of tall glyphs.
    pub fn ascent(&self, font_px: f32) -> f32 {
        self.font
            .horizontal_line_metrics(font_px)
            .map(|m| m.ascent)
            .unwrap_or(font_px * 0.8)
    }

    /// Draw `text` with its baseline starting at `origin`.
    pub fn draw(
        &mut self,
        frame: &mut FrameBuffer,
        text: &str,
        origin: (f32, f32),
        font_px: f32,
        rgb: [u8; 3],
        opacity: f32,
    ) {
        let (mut pen_x, baseline_y) = origin;
        for ch in text.chars() {
            let glyph = self.glyph(ch, font_px);
            let metrics = glyph.metrics;
            let left = pen_x.round() as i64 + metrics.xmin as i64;
            let top = baseline_y.round() as i64 - (metrics.height as i64 + metrics.ymin as i64);

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = glyph.coverage[gy * metrics.width + gx];
                    if coverage == 0 {
                        continue;
                    }
                    let alpha = coverage as f32 / 255.0 * opacity;
                    frame.blend_pixel(left + gx as i64, top + gy as i64, rgb, alpha);
                }
            }

            pen_x += metrics.advance_width;
        }
    }

    fn glyph(&mut self, ch: char, font_px: f32) -> &Glyph {
        let font = &self.font;
        self.glyphs
            .entry((ch, font_px.to_bits()))
            .or_insert_with(|| {
                let (metrics, coverage) = font.rasterize(ch, font_px);
                Glyph { metrics, coverage }
            })
    }
}

impl TextMeasure for SubtitleFont {
    fn measure(&self, text: &str, font_px: f32) -> f32 {
        text.chars()
            .map(|ch| self.font.metrics(ch, font_px).advance_width)
            .sum()
    }
}

impl std::fmt::Debug for SubtitleFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubtitleFont")
            .field("cached_glyphs", &self.glyphs.len())
            .finish()
    }
}

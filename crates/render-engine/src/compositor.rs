//! Frame compositor: combines the scene visual, gradient, and subtitles.
//!
//! Composition is a pure function of (frame size, scene, video time): equal
//! inputs always produce identical frames, and nothing is carried from one
//! tick to the next apart from the glyph cache.

use storyreel_scene_model::{RasterImage, Scene, VisualAsset};

use crate::frame::FrameBuffer;
use crate::text::{wrap_words, ApproxMetrics, SubtitleFont, TextMeasure};

/// Placement of a source raster scaled to cover a target rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    /// Uniform scale factor applied to the source.
    pub scale: f64,
    /// Left edge of the scaled source in target coordinates (zero or negative).
    pub x: f64,
    /// Top edge of the scaled source in target coordinates (zero or negative).
    pub y: f64,
    /// Scaled source width.
    pub width: f64,
    /// Scaled source height.
    pub height: f64,
}

/// Scale a `src_w`×`src_h` source to fully cover `dst_w`×`dst_h`, centered,
/// cropping overflow. Returns `None` for zero-sized inputs.
pub fn cover_fit(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Option<CoverFit> {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return None;
    }

    let scale = (dst_w as f64 / src_w as f64).max(dst_h as f64 / src_h as f64);
    let width = src_w as f64 * scale;
    let height = src_h as f64 * scale;

    Some(CoverFit {
        scale,
        x: (dst_w as f64 - width) / 2.0,
        y: (dst_h as f64 - height) / 2.0,
        width,
        height,
    })
}

/// Sizing of the subtitle overlay, expressed at a 1280px-wide reference frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubtitleStyle {
    /// Font size at the reference width.
    pub base_font_px: f32,
    /// Frame width the pixel sizes are expressed against.
    pub reference_width: f32,
    /// Maximum line width as a fraction of the frame width.
    pub max_width_ratio: f32,
    /// Distance between baselines as a multiple of the font size.
    pub line_spacing: f32,
    /// Gap between the last baseline and the bottom edge, at reference width.
    pub bottom_margin_px: f32,
    /// Drop-shadow offset, at reference width.
    pub shadow_offset_px: f32,
    /// Fraction of the frame height covered by the legibility gradient.
    pub gradient_height_ratio: f32,
    /// Gradient opacity at the bottom edge.
    pub gradient_max_alpha: f32,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            base_font_px: 32.0,
            reference_width: 1280.0,
            max_width_ratio: 0.9,
            line_spacing: 1.3,
            bottom_margin_px: 48.0,
            shadow_offset_px: 2.0,
            gradient_height_ratio: 0.35,
            gradient_max_alpha: 0.9,
        }
    }
}

impl SubtitleStyle {
    /// Resolution scale factor for a frame of the given width.
    pub fn scale(&self, frame_width: u32) -> f32 {
        frame_width as f32 / self.reference_width
    }
}

/// One positioned subtitle line.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleLine {
    pub text: String,
    /// Left edge of the centered line.
    pub x: f32,
    pub baseline_y: f32,
    pub width: f32,
}

/// Result of laying out a subtitle for one frame size.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleLayout {
    pub font_px: f32,
    pub max_width: f32,
    pub shadow_offset: f32,
    /// Lines in reading order (top to bottom).
    pub lines: Vec<SubtitleLine>,
}

/// Wrap and position subtitle text for a `width`×`height` frame.
///
/// Lines are centered horizontally and stacked upwards from the bottom
/// margin, so the last line always sits at the same height.
pub fn layout_subtitle(
    text: &str,
    width: u32,
    height: u32,
    style: &SubtitleStyle,
    measure: &dyn TextMeasure,
) -> SubtitleLayout {
    let scale = style.scale(width);
    let font_px = style.base_font_px * scale;
    let max_width = width as f32 * style.max_width_ratio;
    let line_height = font_px * style.line_spacing;
    let bottom_baseline = height as f32 - style.bottom_margin_px * scale;

    let wrapped = wrap_words(text, max_width, font_px, measure);
    let count = wrapped.len();

    let lines = wrapped
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let line_width = measure.measure(&text, font_px);
            SubtitleLine {
                x: (width as f32 - line_width) / 2.0,
                baseline_y: bottom_baseline - (count - 1 - i) as f32 * line_height,
                width: line_width,
                text,
            }
        })
        .collect();

    SubtitleLayout {
        font_px,
        max_width,
        shadow_offset: style.shadow_offset_px * scale,
        lines,
    }
}

/// What happened to the visual layer during one composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualLayer {
    /// No scene, or the scene has no visual.
    Absent,
    /// The asset is still decoding; the layer was skipped this tick.
    Pending,
    /// The asset was drawn.
    Drawn,
}

/// Summary of one composed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Composition {
    pub visual: VisualLayer,
    pub subtitle_lines: usize,
}

/// Draws scenes into a frame buffer.
#[derive(Debug)]
pub struct Compositor {
    style: SubtitleStyle,
    font: Option<SubtitleFont>,
    fallback_metrics: ApproxMetrics,
    warned_missing_font: bool,
}

impl Compositor {
    /// Create a compositor. Without a font, subtitles are laid out with
    /// approximate metrics but not drawn.
    pub fn new(font: Option<SubtitleFont>) -> Self {
        Self {
            style: SubtitleStyle::default(),
            font,
            fallback_metrics: ApproxMetrics::default(),
            warned_missing_font: false,
        }
    }

    pub fn with_style(mut self, style: SubtitleStyle) -> Self {
        self.style = style;
        self
    }

    pub fn style(&self) -> &SubtitleStyle {
        &self.style
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Subtitle layout this compositor would draw for `text`.
    pub fn layout(&self, text: &str, width: u32, height: u32) -> SubtitleLayout {
        let measure: &dyn TextMeasure = match &self.font {
            Some(font) => font,
            None => &self.fallback_metrics,
        };
        layout_subtitle(text, width, height, &self.style, measure)
    }

    /// Compose one frame for `scene` (or a blank frame when `None`).
    ///
    /// `video_time_secs` is the scene's video playhead position and is only
    /// used for video visuals.
    pub fn compose(
        &mut self,
        frame: &mut FrameBuffer,
        scene: Option<&Scene>,
        video_time_secs: f64,
    ) -> Composition {
        frame.fill([0, 0, 0, 255]);

        if frame.is_empty() {
            return Composition {
                visual: VisualLayer::Absent,
                subtitle_lines: 0,
            };
        }

        let visual = match scene.and_then(|s| s.visual.as_ref()) {
            Some(asset) => draw_visual(frame, asset, video_time_secs),
            None => VisualLayer::Absent,
        };

        self.draw_gradient(frame);

        let subtitle_lines = match scene {
            Some(scene) if !scene.subtitle_text.trim().is_empty() => {
                self.draw_subtitle(frame, &scene.subtitle_text)
            }
            _ => 0,
        };

        Composition {
            visual,
            subtitle_lines,
        }
    }

    fn draw_gradient(&self, frame: &mut FrameBuffer) {
        let height = frame.height();
        let rows = ((height as f32 * self.style.gradient_height_ratio).ceil() as u32).min(height);
        if rows == 0 {
            return;
        }

        let top = height - rows;
        let span = rows.saturating_sub(1).max(1) as f32;
        for y in top..height {
            let t = (y - top) as f32 / span;
            frame.darken_row(y, self.style.gradient_max_alpha * t);
        }
    }

    fn draw_subtitle(&mut self, frame: &mut FrameBuffer, text: &str) -> usize {
        let layout = self.layout(text, frame.width(), frame.height());

        match self.font.as_mut() {
            Some(font) => {
                for line in &layout.lines {
                    let shadow = (
                        line.x + layout.shadow_offset,
                        line.baseline_y + layout.shadow_offset,
                    );
                    font.draw(frame, &line.text, shadow, layout.font_px, [0, 0, 0], 0.8);
                    font.draw(
                        frame,
                        &line.text,
                        (line.x, line.baseline_y),
                        layout.font_px,
                        [255, 255, 255],
                        1.0,
                    );
                }
            }
            None => {
                if !self.warned_missing_font {
                    tracing::warn!("No subtitle font configured; subtitles will not be drawn");
                    self.warned_missing_font = true;
                }
            }
        }

        layout.lines.len()
    }
}

fn draw_visual(frame: &mut FrameBuffer, asset: &VisualAsset, video_time_secs: f64) -> VisualLayer {
    match asset {
        VisualAsset::Image(slot) => match slot.get() {
            Some(image) if !image.is_empty() => {
                draw_cover(frame, &image);
                VisualLayer::Drawn
            }
            _ => VisualLayer::Pending,
        },
        VisualAsset::Video(slot) => {
            let Some(clip) = slot.get() else {
                return VisualLayer::Pending;
            };
            match clip.frame_at(video_time_secs) {
                Some(image) => {
                    draw_cover(frame, image);
                    VisualLayer::Drawn
                }
                None => VisualLayer::Pending,
            }
        }
    }
}

/// Nearest-neighbour cover-fit blit. Source alpha is composited onto black.
fn draw_cover(frame: &mut FrameBuffer, image: &RasterImage) {
    let Some(fit) = cover_fit(image.width, image.height, frame.width(), frame.height()) else {
        return;
    };
    if image.pixels.len() < image.width as usize * image.height as usize * 4 {
        return;
    }

    let source_index = |dst: u32, offset: f64, limit: u32| -> u32 {
        let src = ((dst as f64 + 0.5 - offset) / fit.scale).floor();
        (src.max(0.0) as u32).min(limit - 1)
    };

    let columns: Vec<usize> = (0..frame.width())
        .map(|x| source_index(x, fit.x, image.width) as usize)
        .collect();

    for y in 0..frame.height() {
        let sy = source_index(y, fit.y, image.height) as usize;
        let src_row = &image.pixels[sy * image.width as usize * 4..(sy + 1) * image.width as usize * 4];
        let dst_row = frame.row_mut(y);

        for (x, &sx) in columns.iter().enumerate() {
            let src = &src_row[sx * 4..sx * 4 + 4];
            let dst = &mut dst_row[x * 4..x * 4 + 4];
            if src[3] == 255 {
                dst[..3].copy_from_slice(&src[..3]);
            } else {
                let alpha = src[3] as f32 / 255.0;
                for c in 0..3 {
                    dst[c] = (src[c] as f32 * alpha).round() as u8;
                }
            }
            dst[3] = 255;
        }
    }
}

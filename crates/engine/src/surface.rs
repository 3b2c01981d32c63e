//! Presentation targets for composed frames.

use storyreel_render_engine::{Composition, FrameBuffer};

/// Receives every composed frame.
pub trait Surface {
    /// `scene_index` is the playing scene, `None` while not playing.
    fn present(
        &mut self,
        frame: &FrameBuffer,
        composition: &Composition,
        scene_index: Option<usize>,
        now_ns: u64,
    );
}

/// Discards frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSurface;

impl Surface for NullSurface {
    fn present(&mut self, _: &FrameBuffer, _: &Composition, _: Option<usize>, _: u64) {}
}

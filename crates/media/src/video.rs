//! Video clip decoding.
//!
//! Clips are short loops, so they are decoded once to RGBA frames in memory
//! through `decodebin` and an `appsink`.

use std::path::Path;

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;

use storyreel_capture_engine::init_gstreamer;
use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_scene_model::{RasterImage, VideoClip};

/// Upper bound on decoded frames per clip (30 s at 30 fps).
pub const MAX_CLIP_FRAMES: usize = 900;

/// Upper bound on decoded RGBA bytes per clip.
pub const MAX_CLIP_BYTES: usize = 1 << 30;

/// Larger sources are scaled down to fit inside the biggest export size.
pub const MAX_CLIP_WIDTH: u32 = 1920;
pub const MAX_CLIP_HEIGHT: u32 = 1080;

/// Frame rate assumed when the stream does not declare one.
const FALLBACK_FPS: f64 = 30.0;

pub fn load_video(path: &Path, max_frames: usize) -> StoryreelResult<VideoClip> {
    if !path.exists() {
        return Err(StoryreelError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    init_gstreamer().map_err(|e| StoryreelError::asset(e.to_string()))?;

    let pipeline = gst::parse::launch(&decode_launch(path))
        .map_err(|e| StoryreelError::asset(format!("Failed to build decoder: {e}")))?
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| StoryreelError::asset("Launch string did not produce a pipeline"))?;
    let appsink = pipeline
        .by_name("frames")
        .and_then(|e| e.downcast::<gst_app::AppSink>().ok())
        .ok_or_else(|| StoryreelError::asset("Decoder has no 'frames' appsink"))?;

    if let Err(e) = pipeline.set_state(gst::State::Playing) {
        let _ = pipeline.set_state(gst::State::Null);
        return Err(StoryreelError::asset(format!(
            "Failed to start decoding {}: {e:?}",
            path.display()
        )));
    }

    let clip = pull_frames(&appsink, max_frames);

    let bus_error = pipeline
        .bus()
        .and_then(|bus| bus.pop_filtered(&[gst::MessageType::Error]))
        .and_then(|msg| match msg.view() {
            gst::MessageView::Error(e) => Some(e.error().to_string()),
            _ => None,
        });
    let _ = pipeline.set_state(gst::State::Null);

    if let Some(error) = bus_error {
        return Err(StoryreelError::asset(format!(
            "Failed to decode {}: {error}",
            path.display()
        )));
    }
    let clip = clip?;
    if !clip.is_ready() {
        return Err(StoryreelError::asset(format!(
            "{} produced no video frames",
            path.display()
        )));
    }

    tracing::debug!(
        path = %path.display(),
        width = clip.width,
        height = clip.height,
        fps = clip.fps,
        frames = clip.frames.len(),
        "Video clip decoded"
    );
    Ok(clip)
}

fn pull_frames(appsink: &gst_app::AppSink, max_frames: usize) -> StoryreelResult<VideoClip> {
    let mut clip = VideoClip {
        width: 0,
        height: 0,
        fps: 0.0,
        frames: Vec::new(),
    };

    let mut limit = max_frames;
    while clip.frames.len() < limit {
        // Err means EOS or a pipeline error; the caller checks the bus.
        let Ok(sample) = appsink.pull_sample() else {
            break;
        };
        if clip.width == 0 {
            if let Some(caps) = sample.caps() {
                read_caps(caps, &mut clip);
                limit = frame_budget(clip.width, clip.height, max_frames);
            }
        }
        let Some(buffer) = sample.buffer() else {
            continue;
        };
        let map = buffer
            .map_readable()
            .map_err(|e| StoryreelError::asset(format!("Unreadable video frame: {e}")))?;
        match RasterImage::from_rgba(clip.width, clip.height, map.as_slice().to_vec()) {
            Some(frame) => clip.frames.push(frame),
            None => tracing::debug!(bytes = map.as_slice().len(), "Skipping padded frame"),
        }
    }

    if clip.frames.len() == limit {
        tracing::info!(limit, "Video clip truncated to frame limit");
    }
    Ok(clip)
}

fn read_caps(caps: &gst::CapsRef, clip: &mut VideoClip) {
    let Some(s) = caps.structure(0) else {
        return;
    };
    clip.width = s.get::<i32>("width").unwrap_or(0).max(0) as u32;
    clip.height = s.get::<i32>("height").unwrap_or(0).max(0) as u32;
    clip.fps = s
        .get::<gst::Fraction>("framerate")
        .ok()
        .filter(|f| f.numer() > 0 && f.denom() > 0)
        .map(|f| f.numer() as f64 / f.denom() as f64)
        .unwrap_or(FALLBACK_FPS);
}

/// Frames of `width` x `height` RGBA that fit in [`MAX_CLIP_BYTES`], capped
/// at `max_frames`. At least one frame is always allowed.
pub fn frame_budget(width: u32, height: u32, max_frames: usize) -> usize {
    let frame_bytes = (width as usize * height as usize * 4).max(1);
    (MAX_CLIP_BYTES / frame_bytes).min(max_frames).max(1)
}

fn decode_launch(path: &Path) -> String {
    format!(
        "filesrc location=\"{}\" ! decodebin ! videoconvert ! videoscale \
         ! video/x-raw,format=RGBA,pixel-aspect-ratio=1/1,\
         width=[1,{MAX_CLIP_WIDTH}],height=[1,{MAX_CLIP_HEIGHT}] \
         ! appsink name=frames sync=false max-buffers=4",
        escape_path(path)
    )
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}

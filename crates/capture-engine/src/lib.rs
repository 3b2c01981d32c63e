//! Storyreel Capture Engine
//!
//! Turns a live playback pass into a single video file. The export
//! controller owns one capture sink and at most one session; the engine
//! feeds it composed frames and the duplicated narration mix on every
//! render tick.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │               ExportController                 │
//! │   settle ─▶ record ─▶ finalize / cancel        │
//! │        │                                       │
//! │        ▼                                       │
//! │  ┌──────────────────────────────────────────┐  │
//! │  │ CaptureSink                              │  │
//! │  │  frames ─▶ video encoder ─┐              │  │
//! │  │                           ├─▶ muxer ─▶ chunks
//! │  │  mix    ─▶ audio encoder ─┘              │  │
//! │  └──────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod export;
pub mod pipeline;
pub mod sink;

pub use codec::*;
pub use export::*;
pub use pipeline::{init_gstreamer, GstCaptureSink};
pub use sink::*;

//! Storyreel Playback
//!
//! Walks a [`SceneStore`](storyreel_scene_model::SceneStore) one scene at a
//! time. The [`Sequencer`] is an explicit state machine with a single
//! [`Sequencer::dispatch`] entry point; "what happens next" is data (cursor,
//! active source id, hold token), never a scheduled closure.
//!
//! Audio goes through the [`AudioOutput`] trait. [`ClockedOutput`] is the
//! authoritative clock-driven device used for timing (and in tests);
//! `SpeakerOutput` (feature `speaker`) mirrors it to the default output
//! device. During export a [`CaptureMix`] tap receives a duplicate of every
//! source.

pub mod output;
pub mod sequencer;
#[cfg(feature = "speaker")]
pub mod speaker;
pub mod tap;
pub mod video;

pub use output::*;
pub use sequencer::*;
#[cfg(feature = "speaker")]
pub use speaker::SpeakerOutput;
pub use tap::CaptureMix;
pub use video::VideoPlayhead;

/// Nanoseconds per second.
pub(crate) const NS_PER_SEC: f64 = 1_000_000_000.0;

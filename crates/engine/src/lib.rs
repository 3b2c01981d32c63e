//! Storyreel Engine
//!
//! One cooperative, single-threaded loop. Two kinds of input reach it: the
//! fixed-rate render tick and user commands. Device completions and due
//! holds are resolved on each tick, so every state change happens inside
//! [`Engine::step`] or [`Engine::handle`].
//!
//! ```text
//!  tick ──▶ step ─┬─▶ Sequencer::poll ──▶ scene events
//!                 ├─▶ ExportController::poll ──▶ start recording
//!                 ├─▶ Compositor::compose ──▶ Surface::present
//!                 └─▶ capture frame + audio mix (while recording)
//! ```

pub mod config;
pub mod engine;
pub mod surface;

pub use config::*;
pub use engine::*;
pub use surface::*;

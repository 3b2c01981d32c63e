//! Storyreel Common Utilities
//!
//! Shared infrastructure for all Storyreel crates:
//! - Error types and result aliases
//! - Clocks for the real-time playback loop and deterministic tests
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;

//! Storyreel Render Engine
//!
//! Draws one frame per render tick into an RGBA frame buffer. The same
//! [`Compositor`] serves the on-screen surface and the capture sink, so an
//! export records exactly what the live preview shows.
//!
//! # Layer Order
//!
//! ```text
//! solid black ──┐
//!               ├── Visual (cover-fit image or video frame, skipped if not ready)
//!               │         │
//!               │         ├── Bottom gradient (35%, alpha 0 → 0.9)
//!               │         │         │
//!               │         │         ├── Subtitle shadow
//!               │         │         │         │
//!               │         │         │         ├── Subtitle text
//!               │         │         │         ▼
//!               └─────────┴─────────┴──── frame buffer
//! ```

pub mod compositor;
pub mod frame;
pub mod text;

pub use compositor::*;
pub use frame::*;
pub use text::*;

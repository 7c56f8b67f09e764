//! Data model for Tracelens trace views.
//!
//! Spans arrive from a telemetry backend as a JSON tree; everything in the
//! `tracelens` crate is derived from these types without mutating them.

pub mod conventions;
pub mod events;
pub mod ids;
pub mod span;

pub use conventions::SpanCategory;
pub use events::*;
pub use ids::*;
pub use span::*;

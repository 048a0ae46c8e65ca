//! Telemetry domain model
//!
//! The parsed session document, the metadata and summary derived from it,
//! and the canonical session-type classification.

mod document;
mod session_type;

pub use document::{Lap, SessionMeta, SessionSummary, TelemetryDocument};
pub use session_type::SessionType;

//! Chunked Upload Module
//!
//! Reliable, deduplicated persistence of large telemetry captures:
//! - SHA-256 content hashing with an atomic per-user duplicate claim
//! - Payloads split into size-bounded chunk documents
//! - Two-phase pending/committed visibility per session
//!
//! Per-file flow:
//! 1. Validate the file as a telemetry JSON export
//! 2. Hash the raw bytes and claim the digest for a fresh session id
//! 3. Duplicate claim: return the existing session, done
//! 4. Otherwise chunk the payload, write record + chunks, commit
//!
//! Every file produces a structured outcome; a batch returns one outcome
//! per file plus aggregate counts.

pub mod orchestrator;
pub mod types;

pub use orchestrator::UploadOrchestrator;
pub use types::*;

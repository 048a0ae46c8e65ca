//! Paddock Server Library
//!
//! A self-hosted racing telemetry server. Large per-user session
//! captures are persisted through a chunked, content-addressed store:
//! uploads are hashed, deduplicated per user, split into size-bounded
//! chunk documents, and reassembled on read.
//!
//! # Modules
//!
//! - `store`: chunking, content digests, the duplicate index and the
//!   session record store
//! - `upload`: per-file upload orchestration and batch outcomes
//! - `telemetry`: the parsed session document and derived metadata
//! - `routes`: the HTTP surface over the store

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod upload;

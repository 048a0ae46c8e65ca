//! Chunked, content-addressed session store
//!
//! Persists one metadata row plus an ordered set of chunk documents per
//! uploaded session, deduplicated per user by content digest. Records
//! become visible to readers only once every chunk is confirmed.

pub mod chunker;
mod dedup;
mod digest;
mod records;

pub use chunker::{join_fragments, split_payload, CHUNK_SIZE_BYTES, DOCUMENT_SIZE_CEILING};
pub use dedup::{ClaimOutcome, DuplicateIndex};
pub use digest::ContentDigest;
pub use records::{SessionRecord, SessionRecordStore};

use thiserror::Error;

/// Errors produced by the session store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),

    #[error("Chunk {index} is {size} bytes, over the {ceiling}-byte document ceiling")]
    ChunkTooLarge {
        index: u32,
        size: usize,
        ceiling: usize,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

//! Upload types and limits

use std::time::Duration;

use serde::Serialize;

use crate::store::{StoreError, CHUNK_SIZE_BYTES};
use crate::telemetry::{SessionMeta, SessionSummary, TelemetryDocument};

// ============================================================================
// Constants
// ============================================================================

/// Maximum accepted upload size: 50MB of serialized telemetry.
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Attempts per chunk write before the upload fails.
pub const CHUNK_WRITE_ATTEMPTS: u32 = 3;

/// Base delay for the exponential chunk-write backoff.
pub const CHUNK_RETRY_BASE: Duration = Duration::from_millis(100);

/// Overall wall-clock budget for one file's write phase.
pub const PER_FILE_DEADLINE: Duration = Duration::from_secs(60);

// ============================================================================
// Limits
// ============================================================================

/// Tunable bounds applied to each upload.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Chunk fragment size in bytes.
    pub chunk_size: usize,

    /// Maximum accepted file size in bytes.
    pub max_file_size: u64,

    /// Attempts per chunk write.
    pub chunk_write_attempts: u32,

    /// Base delay for the exponential backoff between attempts.
    pub chunk_retry_base: Duration,

    /// Per-file deadline covering the whole write phase.
    pub per_file_deadline: Duration,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE_BYTES,
            max_file_size: MAX_FILE_SIZE,
            chunk_write_attempts: CHUNK_WRITE_ATTEMPTS,
            chunk_retry_base: CHUNK_RETRY_BASE,
            per_file_deadline: PER_FILE_DEADLINE,
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid session file: {0}")]
    Validation(String),

    #[error("File is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),

    #[error("File too large: {size} bytes (max: {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UploadError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidEncoding(_) => "INVALID_ENCODING",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::Cancelled => "CANCELLED",
            Self::DeadlineExceeded(_) => "DEADLINE_EXCEEDED",
            Self::Store(StoreError::NotFound(_)) => "NOT_FOUND",
            Self::Store(StoreError::CorruptPayload(_)) => "CORRUPT_PAYLOAD",
            Self::Store(StoreError::ChunkTooLarge { .. }) => "CHUNK_TOO_LARGE",
            Self::Store(_) => "STORE_WRITE_ERROR",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Validation(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::InvalidEncoding(_) => StatusCode::BAD_REQUEST,
            Self::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Structured per-file result of an upload.
///
/// A duplicate is a terminal, non-error outcome: the caller gets the
/// session id that first claimed the content, enabling idempotent
/// re-uploads.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadOutcome {
    #[serde(rename_all = "camelCase")]
    Ok {
        file_name: String,
        session_id: String,
        meta: SessionMeta,
        summary: SessionSummary,
        /// Handed back directly so callers skip an immediate re-read.
        document: TelemetryDocument,
    },

    #[serde(rename_all = "camelCase")]
    Duplicate {
        file_name: String,
        session_id: String,
    },

    #[serde(rename_all = "camelCase")]
    Error {
        file_name: String,
        error: String,
        code: String,
    },
}

impl UploadOutcome {
    pub fn error(file_name: String, err: &UploadError) -> Self {
        Self::Error {
            file_name,
            error: err.to_string(),
            code: err.code().to_string(),
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            Self::Ok { file_name, .. }
            | Self::Duplicate { file_name, .. }
            | Self::Error { file_name, .. } => file_name,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Ok { session_id, .. } | Self::Duplicate { session_id, .. } => Some(session_id),
            Self::Error { .. } => None,
        }
    }
}

/// Aggregate counts over one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    pub ok: usize,
    pub duplicate: usize,
    pub error: usize,
}

/// One result per input file, in caller order, plus aggregate counts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub results: Vec<UploadOutcome>,
    pub counts: BatchCounts,
}

impl BatchOutcome {
    pub fn from_results(results: Vec<UploadOutcome>) -> Self {
        let mut counts = BatchCounts::default();
        for result in &results {
            match result {
                UploadOutcome::Ok { .. } => counts.ok += 1,
                UploadOutcome::Duplicate { .. } => counts.duplicate += 1,
                UploadOutcome::Error { .. } => counts.error += 1,
            }
        }
        Self { results, counts }
    }
}

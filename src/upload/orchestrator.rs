//! Upload orchestrator
//!
//! Sequences validation, hashing, the duplicate claim, chunking and the
//! store writes for one or many incoming files. Every outcome is a
//! structured per-file result; nothing is thrown past this boundary, so
//! one failing file never aborts the rest of a batch.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::metrics::StoreMetrics;
use crate::store::{
    split_payload, ClaimOutcome, ContentDigest, DuplicateIndex, SessionRecord,
    SessionRecordStore, StoreError,
};
use crate::telemetry::TelemetryDocument;

use super::types::{BatchOutcome, UploadError, UploadLimits, UploadOutcome};

// ============================================================================
// Orchestrator
// ============================================================================

/// Coordinates the per-file upload pipeline:
/// validate -> hash -> claim -> chunk -> pending record -> chunks -> commit.
#[derive(Clone)]
pub struct UploadOrchestrator {
    inner: Arc<UploadOrchestratorInner>,
}

struct UploadOrchestratorInner {
    records: SessionRecordStore,
    dedup: DuplicateIndex,
    metrics: StoreMetrics,
    limits: UploadLimits,
}

impl UploadOrchestrator {
    pub fn new(
        records: SessionRecordStore,
        dedup: DuplicateIndex,
        metrics: StoreMetrics,
        limits: UploadLimits,
    ) -> Self {
        Self {
            inner: Arc::new(UploadOrchestratorInner {
                records,
                dedup,
                metrics,
                limits,
            }),
        }
    }

    /// Process a batch of files sequentially, in caller order.
    ///
    /// Sequential processing plus the atomic digest claim means two
    /// identical files in one batch resolve as `ok` then `duplicate`.
    /// Cancellation fails the current and remaining files; sessions
    /// committed earlier in the batch are untouched.
    pub async fn upload_batch(
        &self,
        user_id: &str,
        files: Vec<(String, Vec<u8>)>,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let mut results = Vec::with_capacity(files.len());

        for (file_name, bytes) in files {
            if cancel.is_cancelled() {
                results.push(UploadOutcome::error(file_name, &UploadError::Cancelled));
                continue;
            }
            results.push(self.upload_one(user_id, &file_name, &bytes, cancel).await);
        }

        let batch = BatchOutcome::from_results(results);
        tracing::info!(
            user_id = %user_id,
            ok = batch.counts.ok,
            duplicate = batch.counts.duplicate,
            error = batch.counts.error,
            "Upload batch processed"
        );
        batch
    }

    /// Upload a single file, returning a structured outcome.
    pub async fn upload_one(
        &self,
        user_id: &str,
        file_name: &str,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> UploadOutcome {
        match self.try_upload(user_id, file_name, bytes, cancel).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(
                    user_id = %user_id,
                    file_name = %file_name,
                    code = err.code(),
                    error = %err,
                    "Upload failed"
                );
                UploadOutcome::error(file_name.to_string(), &err)
            }
        }
    }

    async fn try_upload(
        &self,
        user_id: &str,
        file_name: &str,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        let (text, document) = self.validate(file_name, bytes)?;

        // The digest covers the raw upload bytes, independent of the
        // session id, which is generated fresh for every upload.
        let digest = ContentDigest::compute(bytes);
        let session_id = Uuid::now_v7().to_string();

        match self.inner.dedup.claim(user_id, &digest, &session_id).await? {
            ClaimOutcome::Existing(existing) => {
                self.inner.metrics.record_duplicate_hit();
                tracing::info!(
                    user_id = %user_id,
                    file_name = %file_name,
                    digest = %digest,
                    session_id = %existing,
                    "Duplicate content, reusing existing session"
                );
                return Ok(UploadOutcome::Duplicate {
                    file_name: file_name.to_string(),
                    session_id: existing,
                });
            }
            ClaimOutcome::Claimed => {}
        }

        match self
            .write_session(user_id, &session_id, file_name, &digest, &text, &document, cancel)
            .await
        {
            Ok(()) => Ok(UploadOutcome::Ok {
                file_name: file_name.to_string(),
                session_id,
                meta: document.meta(),
                summary: document.summary(),
                document,
            }),
            Err(err) => {
                // Hand the digest back and drop partial rows; anything
                // this misses is reclaimed by the pending-record sweep.
                if let Err(cleanup) = self.inner.dedup.release(user_id, &digest, &session_id).await
                {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %cleanup,
                        "Failed to release digest claim after upload error"
                    );
                }
                if let Err(cleanup) = self
                    .inner
                    .records
                    .discard_pending(user_id, &session_id)
                    .await
                {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %cleanup,
                        "Failed to discard pending session after upload error"
                    );
                }
                Err(err)
            }
        }
    }

    // ========================================================================
    // Pipeline Steps
    // ========================================================================

    /// Fail fast on anything that is not a telemetry JSON export.
    fn validate(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<(String, TelemetryDocument), UploadError> {
        if bytes.len() as u64 > self.inner.limits.max_file_size {
            return Err(UploadError::FileTooLarge {
                size: bytes.len() as u64,
                max: self.inner.limits.max_file_size,
            });
        }

        let mime = mime_guess::from_path(file_name).first_or_octet_stream();
        if mime != mime_guess::mime::APPLICATION_JSON {
            return Err(UploadError::Validation(format!(
                "expected a .json telemetry export, got {file_name}"
            )));
        }

        let text = std::str::from_utf8(bytes)?.to_string();

        let document = TelemetryDocument::parse(&text)
            .map_err(|e| UploadError::Validation(format!("not a telemetry session: {e}")))?;

        Ok((text, document))
    }

    /// Write the pending record, every chunk, and the commit, under the
    /// per-file deadline.
    #[allow(clippy::too_many_arguments)]
    async fn write_session(
        &self,
        user_id: &str,
        session_id: &str,
        file_name: &str,
        digest: &ContentDigest,
        text: &str,
        document: &TelemetryDocument,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        let fragments = split_payload(text, self.inner.limits.chunk_size);
        let record = SessionRecord::new(
            session_id.to_string(),
            digest,
            file_name.to_string(),
            document.meta(),
            document.summary(),
            fragments.len() as u32,
            text.len() as u64,
        );

        tracing::debug!(
            user_id = %user_id,
            session_id = %session_id,
            chunks = fragments.len(),
            bytes = text.len(),
            "Writing session"
        );

        let deadline = self.inner.limits.per_file_deadline;
        let write_all = async {
            self.inner.records.create_pending(user_id, &record).await?;

            // Chunk writes are order-independent; only the index matters,
            // so they can be issued concurrently. The record stays
            // pending (invisible to readers) until every write confirms.
            let writes = fragments.iter().enumerate().map(|(index, fragment)| {
                self.write_chunk_with_retry(user_id, session_id, index as u32, fragment, cancel)
            });
            futures::future::try_join_all(writes).await?;

            self.inner.records.commit(user_id, session_id).await?;
            Ok::<(), UploadError>(())
        };

        match tokio::time::timeout(deadline, write_all).await {
            Ok(result) => result,
            Err(_) => Err(UploadError::DeadlineExceeded(deadline)),
        }
    }

    /// One chunk write with bounded exponential backoff.
    async fn write_chunk_with_retry(
        &self,
        user_id: &str,
        session_id: &str,
        index: u32,
        fragment: &str,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        let attempts = self.inner.limits.chunk_write_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            match self
                .inner
                .records
                .write_chunk(user_id, session_id, index, fragment)
                .await
            {
                Ok(()) => return Ok(()),
                // An oversized fragment can never succeed on retry.
                Err(err @ StoreError::ChunkTooLarge { .. }) => return Err(err.into()),
                Err(err) if attempt >= attempts => return Err(err.into()),
                Err(err) => {
                    let backoff = self.inner.limits.chunk_retry_base * 2u32.pow(attempt - 1);
                    tracing::debug!(
                        session_id = %session_id,
                        chunk_index = index,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Retrying chunk write"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

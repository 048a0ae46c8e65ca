//! Session record store
//!
//! One metadata row plus an ordered collection of chunk documents per
//! session. Records are written in `pending` state and promoted to
//! `committed` only once every chunk is confirmed; every read path sees
//! committed records only, so an interrupted upload can never surface as
//! truncated data.

use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::metrics::StoreMetrics;
use crate::telemetry::{SessionMeta, SessionSummary, SessionType, TelemetryDocument};

use super::{ContentDigest, StoreError, DOCUMENT_SIZE_CEILING};

/// Metadata for one stored session capture. Immutable once committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub content_digest: String,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub meta: SessionMeta,
    pub summary: SessionSummary,
    pub chunk_count: u32,
    pub total_size_bytes: u64,
}

impl SessionRecord {
    /// Build the record for a new upload, stamped with the current time.
    pub fn new(
        session_id: String,
        digest: &ContentDigest,
        file_name: String,
        meta: SessionMeta,
        summary: SessionSummary,
        chunk_count: u32,
        total_size_bytes: u64,
    ) -> Self {
        Self {
            session_id,
            content_digest: digest.as_str().to_string(),
            file_name,
            uploaded_at: Utc::now(),
            meta,
            summary,
            chunk_count,
            total_size_bytes,
        }
    }
}

/// Flat row shape for sqlx; converted to the nested public record.
#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    content_digest: String,
    file_name: String,
    uploaded_at: String,
    track: String,
    date_start: Option<String>,
    car: String,
    session_type: String,
    lap_count: i64,
    best_lap_ms: Option<i64>,
    total_time_ms: i64,
    chunk_count: i64,
    total_size_bytes: i64,
}

const SESSION_COLUMNS: &str = "session_id, content_digest, file_name, uploaded_at, track, \
     date_start, car, session_type, lap_count, best_lap_ms, total_time_ms, \
     chunk_count, total_size_bytes";

impl SessionRow {
    fn into_record(self) -> Result<SessionRecord, StoreError> {
        let uploaded_at = parse_timestamp(&self.uploaded_at)?;
        let date_start = self.date_start.as_deref().map(parse_timestamp).transpose()?;

        Ok(SessionRecord {
            session_id: self.session_id,
            content_digest: self.content_digest,
            file_name: self.file_name,
            uploaded_at,
            meta: SessionMeta {
                track: self.track,
                date_start,
                car: self.car,
                session_type: SessionType::parse(&self.session_type)
                    .unwrap_or(SessionType::Practice),
            },
            summary: SessionSummary {
                lap_count: self.lap_count as u32,
                best_lap_ms: self.best_lap_ms.map(|ms| ms as u64),
                total_time_ms: self.total_time_ms as u64,
            },
            chunk_count: self.chunk_count as u32,
            total_size_bytes: self.total_size_bytes as u64,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidRecord(format!("bad timestamp {s:?}: {e}")))
}

fn fmt_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Store for session metadata and chunk documents.
#[derive(Clone)]
pub struct SessionRecordStore {
    inner: Arc<SessionRecordStoreInner>,
}

struct SessionRecordStoreInner {
    pool: SqlitePool,
    metrics: StoreMetrics,
}

impl SessionRecordStore {
    pub fn new(pool: SqlitePool, metrics: StoreMetrics) -> Self {
        Self {
            inner: Arc::new(SessionRecordStoreInner { pool, metrics }),
        }
    }

    // ========================================================================
    // Write Path
    // ========================================================================

    /// Write the metadata row for a new upload, in `pending` state.
    ///
    /// The payload never travels through this row; it lives in the chunk
    /// documents written afterwards.
    pub async fn create_pending(
        &self,
        user_id: &str,
        record: &SessionRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                user_id, session_id, content_digest, file_name, uploaded_at,
                track, date_start, car, session_type,
                lap_count, best_lap_ms, total_time_ms,
                chunk_count, total_size_bytes, state
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(user_id)
        .bind(&record.session_id)
        .bind(&record.content_digest)
        .bind(&record.file_name)
        .bind(fmt_timestamp(&record.uploaded_at))
        .bind(&record.meta.track)
        .bind(record.meta.date_start.as_ref().map(fmt_timestamp))
        .bind(&record.meta.car)
        .bind(record.meta.session_type.as_str())
        .bind(record.summary.lap_count as i64)
        .bind(record.summary.best_lap_ms.map(|ms| ms as i64))
        .bind(record.summary.total_time_ms as i64)
        .bind(record.chunk_count as i64)
        .bind(record.total_size_bytes as i64)
        .execute(&self.inner.pool)
        .await?;

        self.inner.metrics.record_write(0);

        Ok(())
    }

    /// Write one chunk document.
    ///
    /// Idempotent on retry: rewriting an index replaces the previous
    /// fragment. Rejects any fragment over the backing store's hard
    /// per-document ceiling.
    pub async fn write_chunk(
        &self,
        user_id: &str,
        session_id: &str,
        index: u32,
        fragment: &str,
    ) -> Result<(), StoreError> {
        if fragment.len() > DOCUMENT_SIZE_CEILING {
            return Err(StoreError::ChunkTooLarge {
                index,
                size: fragment.len(),
                ceiling: DOCUMENT_SIZE_CEILING,
            });
        }

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO session_chunks (user_id, session_id, chunk_index, payload)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .bind(index as i64)
        .bind(fragment)
        .execute(&self.inner.pool)
        .await?;

        self.inner.metrics.record_write(fragment.len() as u64);

        Ok(())
    }

    /// Promote a pending record to committed, making it visible to readers.
    pub async fn commit(&self, user_id: &str, session_id: &str) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE sessions SET state = 'committed'
            WHERE user_id = ? AND session_id = ? AND state = 'pending'
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .execute(&self.inner.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::NotFound(session_id.to_string()));
        }

        self.inner.metrics.record_commit();

        tracing::info!(
            user_id = %user_id,
            session_id = %session_id,
            "Session committed"
        );

        Ok(())
    }

    /// Remove a failed upload's partial rows. Committed records are never
    /// touched.
    pub async fn discard_pending(&self, user_id: &str, session_id: &str) -> Result<(), StoreError> {
        let mut tx = self.inner.pool.begin().await?;

        let removed = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE user_id = ? AND session_id = ? AND state = 'pending'
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed > 0 {
            sqlx::query(
                r#"
                DELETE FROM session_chunks WHERE user_id = ? AND session_id = ?
                "#,
            )
            .bind(user_id)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    // ========================================================================
    // Read Path
    // ========================================================================

    /// Read one committed record's metadata.
    pub async fn read_metadata(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE user_id = ? AND session_id = ? AND state = 'committed'
            "#
        ))
        .bind(user_id)
        .bind(session_id)
        .fetch_optional(&self.inner.pool)
        .await?;

        row.map(SessionRow::into_record).transpose()
    }

    /// List a user's committed records, newest first. Metadata only, so
    /// list views never pull multi-megabyte payloads.
    pub async fn list_metadata(&self, user_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE user_id = ? AND state = 'committed'
            ORDER BY uploaded_at DESC, session_id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.inner.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_record).collect()
    }

    /// Reassemble a session's serialized payload.
    ///
    /// Fetches every chunk document, verifies the retrieved count equals
    /// the declared `chunk_count` and that indices are contiguous from 0,
    /// then concatenates in ascending index order. A missing chunk fails
    /// explicitly instead of returning truncated data.
    pub async fn read_payload_text(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<String, StoreError> {
        let record = self
            .read_metadata(user_id, session_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;

        let mut chunks = sqlx::query_as::<_, (i64, String)>(
            r#"
            SELECT chunk_index, payload FROM session_chunks
            WHERE user_id = ? AND session_id = ?
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .fetch_all(&self.inner.pool)
        .await?;

        if chunks.len() as u32 != record.chunk_count {
            return Err(StoreError::CorruptPayload(format!(
                "session {session_id} has {} chunks, expected {}",
                chunks.len(),
                record.chunk_count
            )));
        }

        // Retrieval order is not guaranteed; index order is the only
        // valid reconstruction order.
        chunks.sort_by_key(|(index, _)| *index);

        let mut payload = String::with_capacity(record.total_size_bytes as usize);
        for (position, (index, fragment)) in chunks.iter().enumerate() {
            if *index != position as i64 {
                return Err(StoreError::CorruptPayload(format!(
                    "session {session_id} is missing chunk {position}"
                )));
            }
            self.inner.metrics.record_read(fragment.len() as u64);
            payload.push_str(fragment);
        }

        Ok(payload)
    }

    /// Reassemble and parse a session's payload as a telemetry document.
    pub async fn read_full_payload(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<TelemetryDocument, StoreError> {
        let text = self.read_payload_text(user_id, session_id).await?;

        TelemetryDocument::parse(&text).map_err(|e| {
            StoreError::CorruptPayload(format!("session {session_id} failed to parse: {e}"))
        })
    }

    // ========================================================================
    // Garbage Collection
    // ========================================================================

    /// Remove pending records older than `ttl`, together with their
    /// chunks and any duplicate-index entry still pointing at them.
    ///
    /// Recovery path for uploads that died between claim and commit;
    /// returns the number of sessions reclaimed.
    pub async fn sweep_abandoned(&self, ttl: Duration) -> Result<u64, StoreError> {
        let cutoff = fmt_timestamp(&(Utc::now() - ttl));

        let abandoned = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT user_id, session_id FROM sessions
            WHERE state = 'pending' AND uploaded_at < ?
            "#,
        )
        .bind(&cutoff)
        .fetch_all(&self.inner.pool)
        .await?;

        let mut swept = 0u64;
        for (user_id, session_id) in abandoned {
            let mut tx = self.inner.pool.begin().await?;

            sqlx::query("DELETE FROM session_chunks WHERE user_id = ? AND session_id = ?")
                .bind(&user_id)
                .bind(&session_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM content_index WHERE user_id = ? AND session_id = ?")
                .bind(&user_id)
                .bind(&session_id)
                .execute(&mut *tx)
                .await?;
            let removed = sqlx::query(
                "DELETE FROM sessions WHERE user_id = ? AND session_id = ? AND state = 'pending'",
            )
            .bind(&user_id)
            .bind(&session_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            tx.commit().await?;

            if removed > 0 {
                swept += 1;
                tracing::debug!(
                    user_id = %user_id,
                    session_id = %session_id,
                    "Swept abandoned pending session"
                );
            }
        }

        if swept > 0 {
            self.inner.metrics.record_swept(swept);
            tracing::info!(count = swept, "Swept abandoned pending sessions");
        }

        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;
    use crate::store::{split_payload, ClaimOutcome, ContentDigest, DuplicateIndex};

    async fn store() -> SessionRecordStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        SessionRecordStore::new(pool, StoreMetrics::new())
    }

    fn record_for(payload: &str, session_id: &str) -> (SessionRecord, Vec<String>) {
        let doc = TelemetryDocument::parse(payload).unwrap();
        let digest = ContentDigest::compute(payload.as_bytes());
        let fragments = split_payload(payload, 64);
        let record = SessionRecord::new(
            session_id.to_string(),
            &digest,
            "stint.json".to_string(),
            doc.meta(),
            doc.summary(),
            fragments.len() as u32,
            payload.len() as u64,
        );
        (record, fragments)
    }

    fn sample_payload() -> String {
        r#"{"track": "Monza", "car": "BMW M4 GT3", "sessionType": 1,
            "laps": [{"lapTimeMs": 107320}, {"lapTimeMs": 106910}]}"#
            .to_string()
    }

    async fn store_committed(
        store: &SessionRecordStore,
        user_id: &str,
        session_id: &str,
        payload: &str,
    ) {
        let (record, fragments) = record_for(payload, session_id);
        store.create_pending(user_id, &record).await.unwrap();
        for (i, fragment) in fragments.iter().enumerate() {
            store
                .write_chunk(user_id, session_id, i as u32, fragment)
                .await
                .unwrap();
        }
        store.commit(user_id, session_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_round_trip_through_chunks() {
        let store = store().await;
        let payload = sample_payload();

        store_committed(&store, "maria", "s1", &payload).await;

        let text = store.read_payload_text("maria", "s1").await.unwrap();
        assert_eq!(text, payload);

        let doc = store.read_full_payload("maria", "s1").await.unwrap();
        assert_eq!(doc.track, "Monza");
        assert_eq!(doc.summary().best_lap_ms, Some(106910));
    }

    #[tokio::test]
    async fn test_pending_records_are_invisible() {
        let store = store().await;
        let (record, fragments) = record_for(&sample_payload(), "s1");

        store.create_pending("maria", &record).await.unwrap();
        for (i, fragment) in fragments.iter().enumerate() {
            store
                .write_chunk("maria", "s1", i as u32, fragment)
                .await
                .unwrap();
        }

        // Not committed yet: every read path reports not-found.
        assert!(store.read_metadata("maria", "s1").await.unwrap().is_none());
        assert!(store.list_metadata("maria").await.unwrap().is_empty());
        assert!(matches!(
            store.read_payload_text("maria", "s1").await,
            Err(StoreError::NotFound(_))
        ));

        store.commit("maria", "s1").await.unwrap();
        assert!(store.read_metadata("maria", "s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_commit_of_unknown_session_fails() {
        let store = store().await;
        assert!(matches!(
            store.commit("maria", "ghost").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_scoped_to_user() {
        let store = store().await;
        let mut payload_a = sample_payload();
        payload_a.push(' ');

        store_committed(&store, "maria", "s1", &sample_payload()).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store_committed(&store, "maria", "s2", &payload_a).await;
        store_committed(&store, "jo", "s3", &sample_payload()).await;

        let listed = store.list_metadata("maria").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].session_id, "s2");
        assert_eq!(listed[1].session_id, "s1");
        assert!(listed[0].uploaded_at >= listed[1].uploaded_at);
    }

    #[tokio::test]
    async fn test_missing_chunk_fails_explicitly() {
        let store = store().await;
        let (mut record, fragments) = record_for(&sample_payload(), "s1");
        record.chunk_count = fragments.len() as u32;

        store.create_pending("maria", &record).await.unwrap();
        // Write every chunk except index 1.
        for (i, fragment) in fragments.iter().enumerate() {
            if i == 1 {
                continue;
            }
            store
                .write_chunk("maria", "s1", i as u32, fragment)
                .await
                .unwrap();
        }
        store.commit("maria", "s1").await.unwrap();

        assert!(matches!(
            store.read_payload_text("maria", "s1").await,
            Err(StoreError::CorruptPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_non_contiguous_indices_fail_explicitly() {
        let store = store().await;
        let (record, fragments) = record_for(&sample_payload(), "s1");
        assert!(fragments.len() >= 2);

        store.create_pending("maria", &record).await.unwrap();
        // Right count, but the last index is shifted by one.
        for (i, fragment) in fragments.iter().enumerate() {
            let index = if i == fragments.len() - 1 { i + 1 } else { i };
            store
                .write_chunk("maria", "s1", index as u32, fragment)
                .await
                .unwrap();
        }
        store.commit("maria", "s1").await.unwrap();

        assert!(matches!(
            store.read_payload_text("maria", "s1").await,
            Err(StoreError::CorruptPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_reconstruction_ignores_write_order() {
        let store = store().await;
        let (record, fragments) = record_for(&sample_payload(), "s1");

        store.create_pending("maria", &record).await.unwrap();
        // Chunk writes are order-independent; only the index matters.
        for (i, fragment) in fragments.iter().enumerate().rev() {
            store
                .write_chunk("maria", "s1", i as u32, fragment)
                .await
                .unwrap();
        }
        store.commit("maria", "s1").await.unwrap();

        assert_eq!(
            store.read_payload_text("maria", "s1").await.unwrap(),
            sample_payload()
        );
    }

    #[tokio::test]
    async fn test_empty_payload_stores_as_one_empty_chunk() {
        let store = store().await;
        let digest = ContentDigest::compute(b"");
        let fragments = split_payload("", 64);
        assert_eq!(fragments.len(), 1);

        let doc = TelemetryDocument::parse(r#"{"track": "t", "car": "c"}"#).unwrap();
        let record = SessionRecord::new(
            "s1".to_string(),
            &digest,
            "empty.json".to_string(),
            doc.meta(),
            doc.summary(),
            1,
            0,
        );
        store.create_pending("maria", &record).await.unwrap();
        store.write_chunk("maria", "s1", 0, "").await.unwrap();
        store.commit("maria", "s1").await.unwrap();

        assert_eq!(store.read_payload_text("maria", "s1").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_oversized_chunk_is_rejected() {
        let store = store().await;
        let oversized = "x".repeat(DOCUMENT_SIZE_CEILING + 1);

        assert!(matches!(
            store.write_chunk("maria", "s1", 0, &oversized).await,
            Err(StoreError::ChunkTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_sweep_reclaims_abandoned_pending() {
        let store = store().await;

        let (mut stale, fragments) = record_for(&sample_payload(), "stale");
        stale.uploaded_at = Utc::now() - Duration::hours(2);
        store.create_pending("maria", &stale).await.unwrap();
        store
            .write_chunk("maria", "stale", 0, &fragments[0])
            .await
            .unwrap();

        store_committed(&store, "maria", "kept", &sample_payload()).await;

        let swept = store.sweep_abandoned(Duration::hours(1)).await.unwrap();
        assert_eq!(swept, 1);

        // The committed session survives; the stale pending one is gone
        // entirely, so a fresh upload of the same content can re-claim.
        assert!(store.read_metadata("maria", "kept").await.unwrap().is_some());
        let leftover: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM session_chunks WHERE session_id = 'stale'")
                .fetch_one(&store.inner.pool)
                .await
                .unwrap();
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn test_sweep_releases_digest_claim() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let store = SessionRecordStore::new(pool.clone(), StoreMetrics::new());
        let index = DuplicateIndex::new(pool, Duration::hours(24));

        let payload = sample_payload();
        let digest = ContentDigest::compute(payload.as_bytes());
        let (mut record, _) = record_for(&payload, "stale");
        record.uploaded_at = Utc::now() - Duration::hours(2);

        index.claim("maria", &digest, "stale").await.unwrap();
        store.create_pending("maria", &record).await.unwrap();

        store.sweep_abandoned(Duration::hours(1)).await.unwrap();

        assert_eq!(index.lookup("maria", &digest).await.unwrap(), None);
        assert_eq!(
            index.claim("maria", &digest, "fresh").await.unwrap(),
            ClaimOutcome::Claimed
        );
    }

    #[tokio::test]
    async fn test_chunk_write_is_idempotent() {
        let store = store().await;
        let (record, fragments) = record_for(&sample_payload(), "s1");

        store.create_pending("maria", &record).await.unwrap();
        for (i, fragment) in fragments.iter().enumerate() {
            store
                .write_chunk("maria", "s1", i as u32, fragment)
                .await
                .unwrap();
            // A retried write of the same index must not duplicate rows.
            store
                .write_chunk("maria", "s1", i as u32, fragment)
                .await
                .unwrap();
        }
        store.commit("maria", "s1").await.unwrap();

        assert_eq!(
            store.read_payload_text("maria", "s1").await.unwrap(),
            sample_payload()
        );
    }
}

//! Duplicate index
//!
//! Per-user mapping from content digest to the session that first claimed
//! that content. The claim is a single atomic insert-if-absent on the
//! `content_index` primary key, not a check-then-write, so two concurrent
//! uploads of identical content can never both pass.

use std::sync::Arc;

use chrono::{Duration, SecondsFormat, Utc};
use sqlx::SqlitePool;

use super::{ContentDigest, StoreError};

/// Result of attempting to claim a content digest for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The digest was unclaimed; this session now owns it.
    Claimed,
    /// Another session already owns this digest.
    Existing(String),
}

/// Per-user content-digest index backed by the `content_index` table.
#[derive(Clone)]
pub struct DuplicateIndex {
    inner: Arc<DuplicateIndexInner>,
}

struct DuplicateIndexInner {
    pool: SqlitePool,

    /// Claims older than this whose session row never appeared are
    /// treated as leftovers of a crashed upload and may be taken over.
    stale_claim_ttl: Duration,
}

impl DuplicateIndex {
    pub fn new(pool: SqlitePool, stale_claim_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DuplicateIndexInner {
                pool,
                stale_claim_ttl,
            }),
        }
    }

    /// Atomically claim `(user_id, digest)` for `session_id`.
    ///
    /// Exactly one concurrent caller wins; the rest observe the winner's
    /// session id. A stale entry whose session row does not exist (a
    /// crashed upload that was swept) is taken over instead of reported
    /// as a duplicate.
    pub async fn claim(
        &self,
        user_id: &str,
        digest: &ContentDigest,
        session_id: &str,
    ) -> Result<ClaimOutcome, StoreError> {
        // The insert either wins the primary key or leaves it untouched;
        // the retry loop only covers the narrow window where the owning
        // entry is released between our insert and our read-back.
        for _ in 0..3 {
            let inserted = sqlx::query(
                r#"
                INSERT OR IGNORE INTO content_index (user_id, content_digest, session_id, claimed_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(user_id)
            .bind(digest.as_str())
            .bind(session_id)
            .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
            .execute(&self.inner.pool)
            .await?
            .rows_affected();

            if inserted == 1 {
                tracing::debug!(
                    user_id = %user_id,
                    digest = %digest,
                    session_id = %session_id,
                    "Claimed content digest"
                );
                return Ok(ClaimOutcome::Claimed);
            }

            let owner = sqlx::query_as::<_, (String, String)>(
                r#"
                SELECT session_id, claimed_at FROM content_index
                WHERE user_id = ? AND content_digest = ?
                "#,
            )
            .bind(user_id)
            .bind(digest.as_str())
            .fetch_optional(&self.inner.pool)
            .await?;

            let Some((owner_id, claimed_at)) = owner else {
                // Released in between; try the insert again.
                continue;
            };

            if self.owner_is_stale(user_id, &owner_id, &claimed_at).await? {
                let stolen = sqlx::query(
                    r#"
                    UPDATE content_index SET session_id = ?, claimed_at = ?
                    WHERE user_id = ? AND content_digest = ? AND session_id = ?
                    "#,
                )
                .bind(session_id)
                .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
                .bind(user_id)
                .bind(digest.as_str())
                .bind(&owner_id)
                .execute(&self.inner.pool)
                .await?
                .rows_affected();

                if stolen == 1 {
                    tracing::info!(
                        user_id = %user_id,
                        digest = %digest,
                        orphaned_session = %owner_id,
                        session_id = %session_id,
                        "Took over stale digest claim"
                    );
                    return Ok(ClaimOutcome::Claimed);
                }
                // Someone else changed the entry under us; re-read.
                continue;
            }

            return Ok(ClaimOutcome::Existing(owner_id));
        }

        Err(StoreError::InvalidRecord(format!(
            "digest claim for {digest} kept changing under contention"
        )))
    }

    /// Release a claim, but only if it still points at `session_id`.
    ///
    /// Called when an upload fails after claiming, so the next upload of
    /// the same content is not reported as a duplicate of a session that
    /// never committed.
    pub async fn release(
        &self,
        user_id: &str,
        digest: &ContentDigest,
        session_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM content_index
            WHERE user_id = ? AND content_digest = ? AND session_id = ?
            "#,
        )
        .bind(user_id)
        .bind(digest.as_str())
        .bind(session_id)
        .execute(&self.inner.pool)
        .await?;

        Ok(())
    }

    /// Look up the session currently owning a digest, if any.
    pub async fn lookup(
        &self,
        user_id: &str,
        digest: &ContentDigest,
    ) -> Result<Option<String>, StoreError> {
        let owner = sqlx::query_scalar::<_, String>(
            r#"
            SELECT session_id FROM content_index
            WHERE user_id = ? AND content_digest = ?
            "#,
        )
        .bind(user_id)
        .bind(digest.as_str())
        .fetch_optional(&self.inner.pool)
        .await?;

        Ok(owner)
    }

    /// A claim is stale when its session row does not exist and the claim
    /// is older than the TTL. The age check keeps a freshly-claimed entry
    /// safe during the window before its pending record is written.
    async fn owner_is_stale(
        &self,
        user_id: &str,
        owner_id: &str,
        claimed_at: &str,
    ) -> Result<bool, StoreError> {
        let session_exists = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT 1 FROM sessions WHERE user_id = ? AND session_id = ?
            "#,
        )
        .bind(user_id)
        .bind(owner_id)
        .fetch_optional(&self.inner.pool)
        .await?
        .is_some();

        if session_exists {
            return Ok(false);
        }

        let cutoff = Utc::now() - self.inner.stale_claim_ttl;
        Ok(claimed_at < cutoff.to_rfc3339_opts(SecondsFormat::Millis, true).as_str())
    }
}

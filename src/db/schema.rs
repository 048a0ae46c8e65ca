//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Session metadata, one row per uploaded capture.
-- The payload never lives here; it is chunked into session_chunks.
CREATE TABLE IF NOT EXISTS sessions (
    user_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    content_digest TEXT NOT NULL,
    file_name TEXT NOT NULL,
    uploaded_at TEXT NOT NULL,
    track TEXT NOT NULL,
    date_start TEXT,
    car TEXT NOT NULL,
    session_type TEXT NOT NULL,
    lap_count INTEGER NOT NULL,
    best_lap_ms INTEGER,
    total_time_ms INTEGER NOT NULL,
    chunk_count INTEGER NOT NULL,
    total_size_bytes INTEGER NOT NULL,
    -- 'pending' until every chunk is confirmed, then 'committed'.
    -- Readers never see pending rows.
    state TEXT NOT NULL DEFAULT 'pending',

    PRIMARY KEY (user_id, session_id)
);

CREATE INDEX IF NOT EXISTS idx_sessions_uploaded ON sessions(user_id, state, uploaded_at);
CREATE INDEX IF NOT EXISTS idx_sessions_state ON sessions(state, uploaded_at);

-- Ordered chunk documents, reassembled by ascending chunk_index.
CREATE TABLE IF NOT EXISTS session_chunks (
    user_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    payload TEXT NOT NULL,

    PRIMARY KEY (user_id, session_id, chunk_index)
);

-- Per-user duplicate index: at most one entry per content digest.
-- The primary key makes the dedup claim an atomic insert-if-absent.
CREATE TABLE IF NOT EXISTS content_index (
    user_id TEXT NOT NULL,
    content_digest TEXT NOT NULL,
    session_id TEXT NOT NULL,
    claimed_at TEXT NOT NULL,

    PRIMARY KEY (user_id, content_digest)
);

CREATE INDEX IF NOT EXISTS idx_content_index_session ON content_index(session_id);
"#;

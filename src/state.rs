//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::metrics::StoreMetrics;
use crate::store::{DuplicateIndex, SessionRecordStore};
use crate::upload::UploadOrchestrator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    metrics: StoreMetrics,
    records: SessionRecordStore,
    orchestrator: UploadOrchestrator,
    shutdown: CancellationToken,
}

impl AppState {
    /// Create a new application state wired around one database pool.
    pub fn new(config: Config, db: SqlitePool) -> Self {
        let metrics = StoreMetrics::new();
        let records = SessionRecordStore::new(db.clone(), metrics.clone());
        let dedup = DuplicateIndex::new(db.clone(), config.pending_ttl());
        let orchestrator = UploadOrchestrator::new(
            records.clone(),
            dedup,
            metrics.clone(),
            config.upload_limits(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                metrics,
                records,
                orchestrator,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the store metrics collector
    pub fn metrics(&self) -> &StoreMetrics {
        &self.inner.metrics
    }

    /// Get the session record store
    pub fn records(&self) -> &SessionRecordStore {
        &self.inner.records
    }

    /// Get the upload orchestrator
    pub fn orchestrator(&self) -> &UploadOrchestrator {
        &self.inner.orchestrator
    }

    /// Root cancellation token; cancelled once at shutdown so in-flight
    /// upload batches terminate cooperatively.
    pub fn shutdown(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    /// Start the background sweep reclaiming abandoned pending sessions.
    pub fn start_sweep_task(&self) -> tokio::task::JoinHandle<()> {
        let records = self.inner.records.clone();
        let ttl = self.inner.config.pending_ttl();
        let period = self.inner.config.sweep_interval();
        let shutdown = self.inner.shutdown.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; skip it so boot stays quiet.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = records.sweep_abandoned(ttl).await {
                            tracing::warn!(error = %e, "Pending-session sweep failed");
                        }
                    }
                }
            }
        })
    }
}

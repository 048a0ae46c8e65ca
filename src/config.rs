//! Configuration management for Paddock Server

use serde::Deserialize;
use std::env;

use crate::store::CHUNK_SIZE_BYTES;
use crate::upload::{UploadLimits, CHUNK_RETRY_BASE, CHUNK_WRITE_ATTEMPTS, MAX_FILE_SIZE};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Chunk fragment size in bytes.
    pub chunk_size_bytes: usize,
    /// Maximum accepted upload size in bytes.
    pub max_file_size_bytes: u64,
    /// Attempts per chunk write.
    pub chunk_write_attempts: u32,
    /// Base backoff between chunk-write attempts, in milliseconds.
    pub chunk_retry_base_ms: u64,
    /// Per-file wall-clock budget for the write phase, in seconds.
    pub per_file_deadline_secs: u64,
    /// Age after which an uncommitted pending record is garbage.
    pub pending_ttl_minutes: i64,
    /// How often the background sweep runs, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:./paddock.db".to_string(),
            },
            store: StoreConfig {
                chunk_size_bytes: CHUNK_SIZE_BYTES,
                max_file_size_bytes: MAX_FILE_SIZE,
                chunk_write_attempts: CHUNK_WRITE_ATTEMPTS,
                chunk_retry_base_ms: CHUNK_RETRY_BASE.as_millis() as u64,
                per_file_deadline_secs: 60,
                pending_ttl_minutes: 60,
                sweep_interval_secs: 300,
            },
        }
    }
}

impl Config {
    /// Load from the environment; every variable falls back to its
    /// default when unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parsed_var("SERVER_PORT", defaults.server.port),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            store: StoreConfig {
                chunk_size_bytes: parsed_var("CHUNK_SIZE_BYTES", defaults.store.chunk_size_bytes),
                max_file_size_bytes: parsed_var(
                    "MAX_FILE_SIZE_BYTES",
                    defaults.store.max_file_size_bytes,
                ),
                chunk_write_attempts: parsed_var(
                    "CHUNK_WRITE_ATTEMPTS",
                    defaults.store.chunk_write_attempts,
                ),
                chunk_retry_base_ms: parsed_var(
                    "CHUNK_RETRY_BASE_MS",
                    defaults.store.chunk_retry_base_ms,
                ),
                per_file_deadline_secs: parsed_var(
                    "PER_FILE_DEADLINE_SECS",
                    defaults.store.per_file_deadline_secs,
                ),
                pending_ttl_minutes: parsed_var(
                    "PENDING_TTL_MINUTES",
                    defaults.store.pending_ttl_minutes,
                ),
                sweep_interval_secs: parsed_var(
                    "SWEEP_INTERVAL_SECS",
                    defaults.store.sweep_interval_secs,
                ),
            },
        }
    }

    /// The upload bounds derived from this configuration.
    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            chunk_size: self.store.chunk_size_bytes,
            max_file_size: self.store.max_file_size_bytes,
            chunk_write_attempts: self.store.chunk_write_attempts,
            chunk_retry_base: std::time::Duration::from_millis(self.store.chunk_retry_base_ms),
            per_file_deadline: std::time::Duration::from_secs(self.store.per_file_deadline_secs),
        }
    }

    /// TTL for uncommitted pending records and stale digest claims.
    pub fn pending_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.store.pending_ttl_minutes)
    }

    /// Interval between background sweep runs.
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.store.sweep_interval_secs)
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_respect_document_ceiling() {
        let config = Config::default();
        assert!(config.store.chunk_size_bytes < crate::store::DOCUMENT_SIZE_CEILING);
    }

    #[test]
    fn test_upload_limits_conversion() {
        let config = Config::default();
        let limits = config.upload_limits();
        assert_eq!(limits.chunk_size, CHUNK_SIZE_BYTES);
        assert_eq!(limits.per_file_deadline.as_secs(), 60);
    }
}

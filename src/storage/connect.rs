//! Startup connection to the analytics store with bounded retry

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{DatabaseBackend, DatabaseConfig};
use crate::storage::{AnalyticsStore, PostgresStore, SqliteStore};

/// Run `op` up to `attempts` times, sleeping `delay` between failures.
/// The last error is returned once attempts are exhausted.
pub async fn retry_with_delay<T, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!(attempt, error = %e, "Waiting for analytics store...");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(e.context(format!("gave up after {} attempts", attempts)));
            }
        }
    }
}

async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn AnalyticsStore>> {
    let store: Arc<dyn AnalyticsStore> = match config.backend {
        DatabaseBackend::Sqlite => {
            Arc::new(SqliteStore::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            Arc::new(PostgresStore::new(&config.url, config.max_connections).await?)
        }
    };
    store.ping().await?;
    Ok(store)
}

/// Connect to the configured backend, retrying with a fixed delay
pub async fn connect_store(config: &DatabaseConfig) -> Result<Arc<dyn AnalyticsStore>> {
    let store = retry_with_delay(
        config.connect_attempts,
        config.connect_retry_delay(),
        |_| open_store(config),
    )
    .await
    .context("Failed to connect to analytics store")?;

    info!("Connected to {:?} analytics store", config.backend);
    Ok(store)
}

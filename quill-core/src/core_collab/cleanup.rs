//! Periodic deletion of expired generated artifacts

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::CleanupConfig;
use crate::core_access::{CollabError, CollabResult, DocumentMedia, Timestamp};
use crate::core_store::{AccessStore, StoreError};
use crate::ports::ObjectStore;
use crate::shutdown::ShutdownCoordinator;

/// Outcome of one cleanup batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Rows older than the retention window
    pub expired: usize,
    /// Units actually started
    pub dispatched: usize,
    /// Units that removed both the object and the row
    pub deleted: usize,
    pub failures: usize,
    /// Shutdown stopped dispatch before every expired row was handled
    pub interrupted: bool,
}

/// Deletes expired artifacts with bounded parallelism until shutdown
pub struct CleanupScheduler {
    store: Arc<dyn AccessStore>,
    objects: Arc<dyn ObjectStore>,
    shutdown: Arc<ShutdownCoordinator>,
    interval: Duration,
    retention: Duration,
    max_concurrency: usize,
}

impl CleanupScheduler {
    pub fn new(
        store: Arc<dyn AccessStore>,
        objects: Arc<dyn ObjectStore>,
        shutdown: Arc<ShutdownCoordinator>,
        config: &CleanupConfig,
    ) -> Self {
        Self {
            store,
            objects,
            shutdown,
            interval: config.interval,
            retention: config.retention,
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// Run batches every `interval` until shutdown is signalled
    pub async fn run(&self) {
        info!(
            interval = ?self.interval,
            retention = ?self.retention,
            max_concurrency = self.max_concurrency,
            "Cleanup scheduler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.wait_for_shutdown() => break,
            }
            if self.shutdown.is_shutting_down().await {
                break;
            }

            if let Err(e) = self.run_batch().await {
                warn!(error = %e, "Cleanup batch failed");
            }
        }

        info!("Cleanup scheduler stopped");
    }

    /// Delete every artifact older than the retention window.
    ///
    /// Units run concurrently, at most `max_concurrency` at a time. A failed
    /// unit is counted and logged and does not stop the others. No unit is
    /// dispatched once shutdown is signalled, even one that was waiting for a
    /// free slot; units already started run to completion.
    pub async fn run_batch(&self) -> CollabResult<BatchReport> {
        let cutoff = Timestamp::now().saturating_sub(self.retention);
        let expired = self.store.list_media_created_before(cutoff).await?;

        let mut report = BatchReport {
            expired: expired.len(),
            ..Default::default()
        };

        if expired.is_empty() {
            debug!("Nothing to clean up");
            return Ok(report);
        }

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut units = JoinSet::new();

        for media in expired {
            // Waiting for a slot can outlast the signal
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.wait_for_shutdown() => None,
                permit = permits.clone().acquire_owned() => Some(
                    permit.map_err(|e| CollabError::Internal(format!("cleanup semaphore: {}", e)))?,
                ),
            };
            let stopping = permit.is_none() || self.shutdown.is_shutting_down().await;
            let permit = match permit {
                Some(permit) if !stopping => permit,
                _ => {
                    info!(
                        remaining = report.expired - report.dispatched,
                        "Stopping cleanup dispatch for shutdown"
                    );
                    report.interrupted = true;
                    break;
                }
            };

            let store = self.store.clone();
            let objects = self.objects.clone();
            units.spawn(async move {
                let _permit = permit;
                let id = media.id;
                (id, delete_media(store.as_ref(), objects.as_ref(), &media).await)
            });
            report.dispatched += 1;
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.deleted += 1,
                Ok((id, Err(e))) => {
                    report.failures += 1;
                    warn!(media = %id, error = %e, "Failed to delete expired media");
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(error = %e, "Cleanup unit panicked");
                }
            }
        }

        info!(
            expired = report.expired,
            deleted = report.deleted,
            failures = report.failures,
            interrupted = report.interrupted,
            "Cleanup batch finished"
        );
        Ok(report)
    }
}

/// Remove the external object, then its row.
///
/// If the object cannot be deleted the row is kept so the next batch retries.
async fn delete_media(
    store: &dyn AccessStore,
    objects: &dyn ObjectStore,
    media: &DocumentMedia,
) -> CollabResult<()> {
    objects.delete(&media.locator).await?;

    match store.delete_media(&media.id).await {
        // Removed with its document in the meantime
        Ok(()) | Err(StoreError::NotFound(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

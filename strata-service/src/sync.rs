//! Background reconciliation sweep.
//!
//! A periodic task pulls due keys out of the sync queue and writes them
//! back to blob storage (or deletes their blob twin for tombstones). Every
//! per-key failure is logged and swallowed so the queue entry survives for
//! the next tick; contended keys are skipped, since whoever holds the lock
//! is already mutating them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use strata_core::{blob_key_from_cache_key, now_millis};

use crate::service::{ResourceService, SYNC_QUEUE};

// ============================================================================
// METRICS
// ============================================================================

/// Counters for sweep activity.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    /// Sweep ticks completed since startup.
    pub cycles: AtomicU64,

    /// Keys reconciled to blob storage.
    pub synced: AtomicU64,

    /// Keys skipped because another actor held their lock.
    pub skipped: AtomicU64,

    /// Per-key or per-tick failures left for retry.
    pub failures: AtomicU64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot of all counters.
    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            synced: self.synced.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`SyncMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub cycles: u64,
    pub synced: u64,
    pub skipped: u64,
    pub failures: u64,
}

// ============================================================================
// SWEEP LOOP
// ============================================================================

/// Drive the periodic sweep until shutdown is signalled. The tick body runs
/// outside the select arms, so a signalled shutdown lets in-flight work
/// finish before the loop exits.
pub(crate) async fn run_sync_loop(
    service: Arc<ResourceService>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut tick = interval(service.config.sync_period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(
        period_ms = service.config.sync_period.as_millis() as u64,
        batch = service.config.sync_batch,
        "resource sync loop started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("resource sync loop shutting down");
                    break;
                }
            }
            _ = tick.tick() => {
                service.sweep().await;
            }
        }
    }
}

impl ResourceService {
    /// One sweep tick: reconcile up to `sync_batch` due keys.
    pub(crate) async fn sweep(&self) {
        self.metrics.cycles.fetch_add(1, Ordering::Relaxed);

        let due = match self
            .cache
            .sorted_range_by_score(SYNC_QUEUE, now_millis(), self.config.sync_batch)
            .await
        {
            Ok(due) => due,
            Err(error) => {
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %error, "failed to read sync queue");
                return;
            }
        };

        for key in due {
            self.sync_key(&key).await;
        }
    }

    async fn sync_key(&self, key: &str) {
        debug!(key, "syncing resource");
        if let Err(error) = self.try_sync_key(key).await {
            self.metrics.failures.fetch_add(1, Ordering::Relaxed);
            warn!(key, error = %error, "failed to sync resource");
        }
    }

    async fn try_sync_key(&self, key: &str) -> strata_core::StrataResult<()> {
        let Some(_guard) = self.locks.try_lock(key).await? else {
            self.metrics.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        let state = match self.cache_get(key, false).await? {
            None => {
                // Queued but gone (or queued and never written): nothing to
                // push, just dequeue.
                self.cache
                    .expire_if_not_set(key, self.config.cache_expiration)
                    .await?;
                self.cache.sorted_remove(SYNC_QUEUE, key).await?;
                return Ok(());
            }
            Some(state) if state.synced => {
                self.cache
                    .expire_if_not_set(key, self.config.cache_expiration)
                    .await?;
                self.cache.sorted_remove(SYNC_QUEUE, key).await?;
                return Ok(());
            }
            Some(state) => state,
        };

        let blob_key = blob_key_from_cache_key(key);
        if state.exists {
            debug!(key, "sync: updating blob");
            let Some(full) = self.cache_get(key, true).await? else {
                return Ok(());
            };
            self.blob_put(&blob_key, &full.body, full.created_at, full.updated_at)
                .await?;
        } else {
            debug!(key, "sync: deleting blob");
            self.blob.delete(&blob_key).await?;
        }

        self.cache_mark_synced(key).await?;
        self.metrics.synced.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = SyncMetrics::new();
        metrics.cycles.store(10, Ordering::Relaxed);
        metrics.synced.store(7, Ordering::Relaxed);
        metrics.skipped.store(2, Ordering::Relaxed);
        metrics.failures.store(1, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cycles, 10);
        assert_eq!(snapshot.synced, 7);
        assert_eq!(snapshot.skipped, 2);
        assert_eq!(snapshot.failures, 1);
    }
}

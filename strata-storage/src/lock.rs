//! Per-key lock discipline.
//!
//! Every mutation of a resource key - foreground reads that populate the
//! cache, writes, deletes and the background reconciler - contends for the
//! same per-key lock. Guards release on drop so the lock is returned on
//! every exit path, including failures.

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use strata_core::StrataResult;
use tokio::sync::Mutex as AsyncMutex;

/// A held per-key lock. Dropping the guard releases the lock.
pub struct LockGuard {
    _held: Box<dyn Any + Send>,
}

impl LockGuard {
    pub(crate) fn new(held: impl Any + Send) -> Self {
        Self {
            _held: Box::new(held),
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").finish_non_exhaustive()
    }
}

/// Per-key mutual exclusion.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Acquire the lock for `key`, waiting as long as it takes.
    async fn lock(&self, key: &str) -> StrataResult<LockGuard>;

    /// Acquire the lock for `key` without waiting; `None` when another
    /// holder owns it.
    async fn try_lock(&self, key: &str) -> StrataResult<Option<LockGuard>>;
}

/// In-process lock service keyed by weakly-held per-key mutexes, so entries
/// for idle keys are reclaimed instead of accumulating forever.
#[derive(Debug, Default)]
pub struct KeyLockService {
    table: StdMutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl KeyLockService {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = table.get(key).and_then(Weak::upgrade) {
            return existing;
        }
        table.retain(|_, weak| weak.strong_count() > 0);
        let fresh = Arc::new(AsyncMutex::new(()));
        table.insert(key.to_string(), Arc::downgrade(&fresh));
        fresh
    }

    /// Number of keys currently tracked (held or not yet reclaimed).
    pub fn tracked_keys(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LockService for KeyLockService {
    async fn lock(&self, key: &str) -> StrataResult<LockGuard> {
        let guard = self.entry(key).lock_owned().await;
        Ok(LockGuard::new(guard))
    }

    async fn try_lock(&self, key: &str) -> StrataResult<Option<LockGuard>> {
        match self.entry(key).try_lock_owned() {
            Ok(guard) => Ok(Some(LockGuard::new(guard))),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn try_lock_fails_while_held() {
        let locks = KeyLockService::new();
        let guard = locks.lock("k").await.unwrap();
        assert!(locks.try_lock("k").await.unwrap().is_none());
        drop(guard);
        assert!(locks.try_lock("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let locks = KeyLockService::new();
        let _a = locks.lock("a").await.unwrap();
        assert!(locks.try_lock("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn lock_waits_for_release() {
        let locks = Arc::new(KeyLockService::new());
        let guard = locks.lock("k").await.unwrap();

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.lock("k").await.unwrap() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn idle_entries_are_reclaimed() {
        let locks = KeyLockService::new();
        for i in 0..32 {
            let guard = locks.lock(&format!("k{i}")).await.unwrap();
            drop(guard);
        }
        // The next acquisition prunes dead entries.
        let _guard = locks.lock("fresh").await.unwrap();
        assert!(locks.tracked_keys() <= 2);
    }

    #[tokio::test]
    async fn serializes_critical_sections() {
        let locks = Arc::new(KeyLockService::new());
        let counter = Arc::new(StdMutex::new(0u32));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("shared").await.unwrap();
                let value = *counter.lock().unwrap();
                tokio::time::sleep(Duration::from_millis(2)).await;
                *counter.lock().unwrap() = value + 1;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), 8);
    }
}

//! In-memory shared cache.
//!
//! Complete single-process implementation of the cache tier: hashes with
//! lazily-enforced deadlines and scored sorted sets. Doubles as the
//! workspace's test cache.

use super::SharedCache;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use strata_core::StrataResult;

#[derive(Debug, Default)]
struct HashEntry {
    fields: HashMap<String, String>,
    expires_at: Option<Instant>,
}

impl HashEntry {
    fn expired(&self) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= Instant::now())
    }
}

#[derive(Debug, Default)]
struct Inner {
    hashes: HashMap<String, HashEntry>,
    sets: HashMap<String, BTreeMap<String, i64>>,
}

impl Inner {
    /// Drop the entry when its deadline has passed, then hand it back.
    fn live_entry(&mut self, key: &str) -> Option<&mut HashEntry> {
        if self.hashes.get(key).is_some_and(HashEntry::expired) {
            self.hashes.remove(key);
        }
        self.hashes.get_mut(key)
    }
}

/// Cache backed by process-local maps.
#[derive(Debug, Default)]
pub struct MemoryCache {
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live hash currently carries a TTL. Introspection hook for
    /// invariant checks.
    pub fn has_expiry(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .live_entry(key)
            .is_some_and(|entry| entry.expires_at.is_some())
    }

    /// Whether a live hash exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.live_entry(key).is_some()
    }
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn hash_get(
        &self,
        key: &str,
        fields: &[&str],
    ) -> StrataResult<HashMap<String, String>> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = inner.live_entry(key) else {
            return Ok(HashMap::new());
        };
        Ok(fields
            .iter()
            .filter_map(|&field| {
                entry
                    .fields
                    .get(field)
                    .map(|value| (field.to_string(), value.clone()))
            })
            .collect())
    }

    async fn hash_put(&self, key: &str, fields: &[(&str, String)]) -> StrataResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.hashes.get(key).is_some_and(HashEntry::expired) {
            inner.hashes.remove(key);
        }
        let entry = inner.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.fields.insert(field.to_string(), value.clone());
        }
        Ok(())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StrataResult<()> {
        self.hash_put(key, &[(field, value.to_string())]).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StrataResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = inner.live_entry(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn expire_if_not_set(&self, key: &str, ttl: Duration) -> StrataResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = inner.live_entry(key) {
            if entry.expires_at.is_none() {
                entry.expires_at = Some(Instant::now() + ttl);
            }
        }
        Ok(())
    }

    async fn clear_expire(&self, key: &str) -> StrataResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = inner.live_entry(key) {
            entry.expires_at = None;
        }
        Ok(())
    }

    async fn sorted_add(&self, set: &str, member: &str, score: i64) -> StrataResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn sorted_remove(&self, set: &str, member: &str) -> StrataResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(members) = inner.sets.get_mut(set) {
            members.remove(member);
        }
        Ok(())
    }

    async fn sorted_range_by_score(
        &self,
        set: &str,
        max_score: i64,
        limit: usize,
    ) -> StrataResult<Vec<String>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(members) = inner.sets.get(set) else {
            return Ok(Vec::new());
        };
        let mut due: Vec<(&i64, &String)> = members
            .iter()
            .filter(|(_, &score)| score <= max_score)
            .map(|(member, score)| (score, member))
            .collect();
        due.sort();
        if limit > 0 {
            due.truncate(limit);
        }
        Ok(due.into_iter().map(|(_, member)| member.clone()).collect())
    }
}

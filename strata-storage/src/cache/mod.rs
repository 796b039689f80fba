//! Shared cache tier.
//!
//! The cache tier is a networked key-value store offering per-key hash maps
//! with field-level access and TTLs, plus named scored sorted sets (the sync
//! queue). The trait mirrors that surface directly so the service's
//! cache protocol - queue-before-write ordering, TTL discipline - is spelled
//! out in one place and every backend behaves identically.

mod memory;

pub use memory::MemoryCache;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use strata_core::StrataResult;

/// Shared key-value store interface.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Read the given fields of a hash. Only fields that are present appear
    /// in the result; an empty map means the hash does not exist.
    async fn hash_get(&self, key: &str, fields: &[&str])
        -> StrataResult<HashMap<String, String>>;

    /// Write fields into a hash, creating it when absent.
    async fn hash_put(&self, key: &str, fields: &[(&str, String)]) -> StrataResult<()>;

    /// Write a single hash field.
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StrataResult<()>;

    /// Set the TTL of a key, replacing any existing TTL.
    async fn expire(&self, key: &str, ttl: Duration) -> StrataResult<()>;

    /// Set the TTL of a key only when it has none yet.
    async fn expire_if_not_set(&self, key: &str, ttl: Duration) -> StrataResult<()>;

    /// Remove any TTL from a key.
    async fn clear_expire(&self, key: &str) -> StrataResult<()>;

    /// Add a member to a scored sorted set (or update its score).
    async fn sorted_add(&self, set: &str, member: &str, score: i64) -> StrataResult<()>;

    /// Remove a member from a scored sorted set.
    async fn sorted_remove(&self, set: &str, member: &str) -> StrataResult<()>;

    /// Members with score ≤ `max_score`, ascending by score. `limit` caps
    /// the result, with `0` meaning unlimited.
    async fn sorted_range_by_score(
        &self,
        set: &str,
        max_score: i64,
        limit: usize,
    ) -> StrataResult<Vec<String>>;
}

#![cfg(feature = "redis")]

//! Redis-backed cache and lock tiers.
//!
//! Maps the [`SharedCache`] surface onto Redis hashes, PEXPIRE/PERSIST and
//! scored sorted sets, and backs [`LockService`] with SET-NX-PX leases plus
//! compare-and-delete release. The lease bounds how long a crashed holder
//! can wedge a key.

use crate::cache::SharedCache;
use crate::lock::{LockGuard, LockService};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use strata_core::{CacheError, LockError, StrataError, StrataResult};
use uuid::Uuid;

fn cache_error(error: redis::RedisError) -> StrataError {
    CacheError::Backend {
        reason: error.to_string(),
    }
    .into()
}

fn lock_error(error: redis::RedisError) -> StrataError {
    LockError::Backend {
        reason: error.to_string(),
    }
    .into()
}

/// Shared cache on a Redis server.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    /// Connect using a `redis://` URL.
    pub async fn connect(url: &str) -> StrataResult<Self> {
        let client = redis::Client::open(url).map_err(cache_error)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(cache_error)?;
        Ok(Self { conn })
    }

    /// Wrap an existing multiplexed connection.
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn hash_get(
        &self,
        key: &str,
        fields: &[&str],
    ) -> StrataResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> =
            conn.hget(key, fields).await.map_err(cache_error)?;
        Ok(fields
            .iter()
            .zip(values)
            .filter_map(|(&field, value)| value.map(|value| (field.to_string(), value)))
            .collect())
    }

    async fn hash_put(&self, key: &str, fields: &[(&str, String)]) -> StrataResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .hset_multiple(key, fields)
            .await
            .map_err(cache_error)?;
        Ok(())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StrataResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await.map_err(cache_error)?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StrataResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .pexpire(key, ttl.as_millis() as i64)
            .await
            .map_err(cache_error)?;
        Ok(())
    }

    async fn expire_if_not_set(&self, key: &str, ttl: Duration) -> StrataResult<()> {
        let mut conn = self.conn.clone();
        let remaining: i64 = conn.pttl(key).await.map_err(cache_error)?;
        // -1 is "exists without TTL"; -2 is "no such key", which needs none.
        if remaining == -1 {
            let _: () = conn
                .pexpire(key, ttl.as_millis() as i64)
                .await
                .map_err(cache_error)?;
        }
        Ok(())
    }

    async fn clear_expire(&self, key: &str) -> StrataResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.persist(key).await.map_err(cache_error)?;
        Ok(())
    }

    async fn sorted_add(&self, set: &str, member: &str, score: i64) -> StrataResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.zadd(set, member, score).await.map_err(cache_error)?;
        Ok(())
    }

    async fn sorted_remove(&self, set: &str, member: &str) -> StrataResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.zrem(set, member).await.map_err(cache_error)?;
        Ok(())
    }

    async fn sorted_range_by_score(
        &self,
        set: &str,
        max_score: i64,
        limit: usize,
    ) -> StrataResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = if limit == 0 {
            conn.zrangebyscore(set, "-inf", max_score)
                .await
                .map_err(cache_error)?
        } else {
            conn.zrangebyscore_limit(set, "-inf", max_score, 0, limit as isize)
                .await
                .map_err(cache_error)?
        };
        Ok(members)
    }
}

const UNLOCK_SCRIPT: &str =
    "if redis.call('get', KEYS[1]) == ARGV[1] then return redis.call('del', KEYS[1]) else return 0 end";

fn lease_key(key: &str) -> String {
    format!("lock:{key}")
}

/// Distributed per-key locks on Redis: SET-NX-PX with a random token and
/// compare-and-delete release.
#[derive(Clone)]
pub struct RedisLockService {
    conn: MultiplexedConnection,
    lease: Duration,
    retry_interval: Duration,
}

impl RedisLockService {
    pub fn new(conn: MultiplexedConnection, lease: Duration, retry_interval: Duration) -> Self {
        Self {
            conn,
            lease,
            retry_interval,
        }
    }

    /// Connect using a `redis://` URL.
    pub async fn connect(
        url: &str,
        lease: Duration,
        retry_interval: Duration,
    ) -> StrataResult<Self> {
        let client = redis::Client::open(url).map_err(lock_error)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(lock_error)?;
        Ok(Self::new(conn, lease, retry_interval))
    }

    async fn acquire(&self, key: &str) -> StrataResult<Option<LockGuard>> {
        let lease_key = lease_key(key);
        let token = Uuid::new_v4().to_string();
        let mut conn = self.conn.clone();
        let response: Option<String> = redis::cmd("SET")
            .arg(&lease_key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.lease.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(lock_error)?;

        Ok(response.map(|_| {
            LockGuard::new(RedisLease {
                conn: self.conn.clone(),
                key: lease_key,
                token,
            })
        }))
    }
}

#[async_trait]
impl LockService for RedisLockService {
    async fn lock(&self, key: &str) -> StrataResult<LockGuard> {
        loop {
            if let Some(guard) = self.acquire(key).await? {
                return Ok(guard);
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    async fn try_lock(&self, key: &str) -> StrataResult<Option<LockGuard>> {
        self.acquire(key).await
    }
}

struct RedisLease {
    conn: MultiplexedConnection,
    key: String,
    token: String,
}

impl Drop for RedisLease {
    fn drop(&mut self) {
        let mut conn = self.conn.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        // Release happens on the runtime; if none is left (shutdown), the
        // lease expiry reclaims the key.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _: Result<i64, _> = redis::cmd("EVAL")
                    .arg(UNLOCK_SCRIPT)
                    .arg(1)
                    .arg(&key)
                    .arg(&token)
                    .query_async(&mut conn)
                    .await;
            });
        }
    }
}

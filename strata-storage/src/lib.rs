//! STRATA Storage - Tier Abstractions and Implementations
//!
//! Defines the three collaborator abstractions the resource service is built
//! on - the durable blob tier, the shared cache tier and the per-key lock
//! service - together with in-memory and filesystem implementations and the
//! body compression codec. Redis-backed implementations of the cache and
//! lock tiers live behind the `redis` feature.

pub mod blob;
pub mod cache;
pub mod codec;
pub mod lock;

#[cfg(feature = "redis")]
pub mod redis;

pub use blob::{BlobKind, BlobMeta, BlobObject, BlobPage, BlobStore, FsBlobStore, MemoryBlobStore};
pub use cache::{MemoryCache, SharedCache};
pub use codec::ContentCoding;
pub use lock::{KeyLockService, LockGuard, LockService};

#[cfg(feature = "redis")]
pub use redis::{RedisCache, RedisLockService};

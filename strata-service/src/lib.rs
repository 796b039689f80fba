//! STRATA Service - Write-back Resource Cache
//!
//! The public resource API over two storage tiers: a shared cache that
//! absorbs reads and writes, and a durable blob store reconciled in the
//! background. Per-key locks serialize readers, writers and the
//! reconciler; a deferred queue held in the cache drives the sweep.

mod service;
mod sync;

pub use service::ResourceService;
pub use sync::{SyncMetrics, SyncSnapshot};

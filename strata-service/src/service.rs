//! Resource service: the cache ↔ blob protocol.
//!
//! Reads and writes go to the shared cache first; a time-scored queue held
//! in the cache schedules write-back to blob storage. Within `cache_put`
//! the queue insertion strictly precedes the hash mutation: a crash after
//! queueing but before the write is a no-op on the next sweep, a crash
//! after the write is repaired by it. Do not reorder.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use strata_core::{
    blob_key, cache_key, now_millis, BlobError, CacheError, ResourceConfig, ResourceDescriptor,
    ResourceFolderMetadata, ResourceItemMetadata, ResourceMetadata, ResourceState, StrataError,
    StrataResult,
};
use strata_storage::{
    BlobKind, BlobMeta, BlobStore, ContentCoding, LockService, SharedCache,
};

use crate::sync::SyncMetrics;

/// Sorted set of cache keys pending reconciliation, scored by due time.
pub(crate) const SYNC_QUEUE: &str = "resource:queue";

const CONTENT_TYPE: &str = "application/json";

const FIELD_BODY: &str = "body";
const FIELD_CREATED_AT: &str = "created_at";
const FIELD_UPDATED_AT: &str = "updated_at";
const FIELD_SYNCED: &str = "synced";
const FIELD_EXISTS: &str = "exists";

const FIELDS: [&str; 5] = [
    FIELD_BODY,
    FIELD_CREATED_AT,
    FIELD_UPDATED_AT,
    FIELD_SYNCED,
    FIELD_EXISTS,
];
const FIELDS_NO_BODY: [&str; 4] = [
    FIELD_CREATED_AT,
    FIELD_UPDATED_AT,
    FIELD_SYNCED,
    FIELD_EXISTS,
];

/// Write-back resource cache over a shared cache tier and a blob tier.
pub struct ResourceService {
    pub(crate) cache: Arc<dyn SharedCache>,
    pub(crate) blob: Arc<dyn BlobStore>,
    pub(crate) locks: Arc<dyn LockService>,
    pub(crate) config: ResourceConfig,
    pub(crate) metrics: Arc<SyncMetrics>,
    shutdown: watch::Sender<bool>,
}

impl ResourceService {
    /// Create the service and spawn its background sweeper. Must be called
    /// from within a tokio runtime.
    pub fn new(
        cache: Arc<dyn SharedCache>,
        blob: Arc<dyn BlobStore>,
        locks: Arc<dyn LockService>,
        config: ResourceConfig,
    ) -> StrataResult<Arc<Self>> {
        config.validate()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let service = Arc::new(Self {
            cache,
            blob,
            locks,
            config,
            metrics: Arc::new(SyncMetrics::new()),
            shutdown,
        });
        tokio::spawn(crate::sync::run_sync_loop(
            Arc::clone(&service),
            shutdown_rx,
        ));
        Ok(service)
    }

    /// Maximum allowed resource body size in bytes.
    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    /// Sweeper metrics.
    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    /// Stop the background sweeper. In-flight work completes; resource
    /// operations stay usable but nothing reconciles afterwards.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }

    // ========================================================================
    // PUBLIC RESOURCE API
    // ========================================================================

    /// Metadata for an item or a folder listing. Folder listings read the
    /// blob tier directly; a non-root folder with no children is `None`.
    pub async fn get_metadata(
        &self,
        descriptor: &ResourceDescriptor,
        token: Option<&str>,
        limit: usize,
    ) -> StrataResult<Option<ResourceMetadata>> {
        if descriptor.is_folder() {
            Ok(self
                .get_folder_metadata(descriptor, token, limit)
                .await?
                .map(ResourceMetadata::Folder))
        } else {
            Ok(self
                .get_item_metadata(descriptor)
                .await?
                .map(ResourceMetadata::Item))
        }
    }

    async fn get_folder_metadata(
        &self,
        descriptor: &ResourceDescriptor,
        token: Option<&str>,
        limit: usize,
    ) -> StrataResult<Option<ResourceFolderMetadata>> {
        let page = self
            .blob
            .list(&blob_key(descriptor), token, limit)
            .await?;

        if page.entries.is_empty() && !descriptor.is_root_folder() {
            return Ok(None);
        }

        let mut items = Vec::with_capacity(page.entries.len());
        for entry in &page.entries {
            let path = strata_core::path_from_blob_key(&entry.key);
            let child = ResourceDescriptor::child_of(descriptor, path);

            if entry.kind == BlobKind::Folder {
                items.push(ResourceMetadata::Folder(ResourceFolderMetadata::new(child)));
                continue;
            }

            // User metadata is authoritative; object times are the fallback
            // for objects written by other tools.
            let created_at = listed_time(entry, FIELD_CREATED_AT).or(entry.created);
            let updated_at = listed_time(entry, FIELD_UPDATED_AT).or(entry.modified);
            items.push(ResourceMetadata::Item(ResourceItemMetadata {
                descriptor: child,
                created_at,
                updated_at,
            }));
        }

        let mut folder = ResourceFolderMetadata::with_items(descriptor.clone(), items);
        folder.next_token = page.next_token;
        Ok(Some(folder))
    }

    async fn get_item_metadata(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> StrataResult<Option<ResourceItemMetadata>> {
        let cache_key = cache_key(descriptor);
        let state = match self.cache_get(&cache_key, false).await? {
            Some(state) => state,
            None => self.blob_get(&blob_key(descriptor), false).await?,
        };

        if !state.exists {
            return Ok(None);
        }

        Ok(Some(ResourceItemMetadata::with_times(
            descriptor.clone(),
            state.created_at,
            state.updated_at,
        )))
    }

    /// Resource body, or `None` when it does not exist. Misses populate the
    /// cache from blob under the per-key lock, double-checked.
    pub async fn get_resource(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> StrataResult<Option<String>> {
        let cache_key = cache_key(descriptor);

        let state = match self.cache_get(&cache_key, true).await? {
            Some(state) => state,
            None => {
                let _guard = self.locks.lock(&cache_key).await?;
                match self.cache_get(&cache_key, true).await? {
                    Some(state) => state,
                    None => {
                        let state = self.blob_get(&blob_key(descriptor), true).await?;
                        self.cache_put(&cache_key, &state).await?;
                        state
                    }
                }
            }
        };

        Ok(state.exists.then_some(state.body))
    }

    /// Absorb a write into the cache and schedule it for reconciliation.
    /// A brand-new resource also gets a zero-byte blob placeholder so
    /// folder listings see it before the first sync.
    pub async fn put_resource(
        &self,
        descriptor: &ResourceDescriptor,
        body: impl Into<String>,
    ) -> StrataResult<ResourceItemMetadata> {
        let body = body.into();
        if body.len() > self.config.max_size {
            return Err(StrataError::TooLarge {
                size: body.len(),
                limit: self.config.max_size,
            });
        }

        let cache_key = cache_key(descriptor);
        let blob_key = blob_key(descriptor);

        let _guard = self.locks.lock(&cache_key).await?;
        let current = match self.cache_get(&cache_key, false).await? {
            Some(state) => state,
            None => self.blob_get(&blob_key, false).await?,
        };

        let updated_at = now_millis();
        let created_at = if current.exists {
            current.created_at
        } else {
            updated_at
        };

        self.cache_put(
            &cache_key,
            &ResourceState::present(body, created_at, updated_at, false),
        )
        .await?;

        if !current.exists {
            self.blob_put(&blob_key, "", created_at, updated_at).await?;
        }

        Ok(ResourceItemMetadata::with_times(
            descriptor.clone(),
            created_at,
            updated_at,
        ))
    }

    /// Write-through delete. Returns `false` when the resource never
    /// existed, without touching the blob tier.
    ///
    /// The tombstone is queued before the blob delete, so a failure of
    /// either the delete or the final mark-synced leaves the queue entry in
    /// place and the sweeper retries the delete.
    pub async fn delete_resource(&self, descriptor: &ResourceDescriptor) -> StrataResult<bool> {
        let cache_key = cache_key(descriptor);
        let blob_key = blob_key(descriptor);

        let _guard = self.locks.lock(&cache_key).await?;
        let existed = match self.cache_get(&cache_key, false).await? {
            Some(state) => state.exists,
            None => self.blob.exists(&blob_key).await?,
        };

        if !existed {
            return Ok(false);
        }

        self.cache_put(&cache_key, &ResourceState::tombstone())
            .await?;
        self.blob.delete(&blob_key).await?;
        self.cache_mark_synced(&cache_key).await?;

        Ok(true)
    }

    // ========================================================================
    // CACHE TIER ADAPTER
    // ========================================================================

    pub(crate) async fn cache_get(
        &self,
        key: &str,
        with_body: bool,
    ) -> StrataResult<Option<ResourceState>> {
        let fields: &[&str] = if with_body { &FIELDS } else { &FIELDS_NO_BODY };
        let map = self.cache.hash_get(key, fields).await?;
        if map.is_empty() {
            return Ok(None);
        }
        Ok(Some(state_from_fields(key, &map, with_body)?))
    }

    pub(crate) async fn cache_put(&self, key: &str, state: &ResourceState) -> StrataResult<()> {
        let due_at = now_millis() + self.config.sync_delay.as_millis() as i64;
        // Queue membership must exist before the hash changes; the writes
        // below can fail.
        self.cache.sorted_add(SYNC_QUEUE, key, due_at).await?;

        if !state.synced {
            self.cache.clear_expire(key).await?;
        }

        let fields = state_to_fields(state);
        self.cache.hash_put(key, &fields).await?;

        if state.synced {
            // Only the populate and sync paths write synced records; they
            // are already durable, so expire and dequeue.
            self.cache
                .expire(key, self.config.cache_expiration)
                .await?;
            self.cache.sorted_remove(SYNC_QUEUE, key).await?;
        }

        Ok(())
    }

    pub(crate) async fn cache_mark_synced(&self, key: &str) -> StrataResult<()> {
        self.cache.hash_set(key, FIELD_SYNCED, "true").await?;
        self.cache
            .expire(key, self.config.cache_expiration)
            .await?;
        self.cache.sorted_remove(SYNC_QUEUE, key).await?;
        Ok(())
    }

    // ========================================================================
    // BLOB TIER ADAPTER
    // ========================================================================

    /// Read a blob as a [`ResourceState`]. A missing object yields the
    /// synthetic negative: absent but synced, since there is nothing to
    /// reconcile.
    pub(crate) async fn blob_get(&self, key: &str, with_body: bool) -> StrataResult<ResourceState> {
        let (meta, data) = if with_body {
            match self.blob.load(key).await? {
                Some(object) => (object.meta, Some(object.data)),
                None => return Ok(ResourceState::absent()),
            }
        } else {
            match self.blob.meta(key).await? {
                Some(meta) => (meta, None),
                None => return Ok(ResourceState::absent()),
            }
        };

        let created_at = stored_time(key, &meta, FIELD_CREATED_AT)?;
        let updated_at = stored_time(key, &meta, FIELD_UPDATED_AT)?;

        let body = match data {
            Some(bytes) => {
                let coding = ContentCoding::from_tag(meta.content_encoding.as_deref())?;
                let decoded = coding.decode(&bytes)?;
                String::from_utf8(decoded).map_err(|_| BlobError::Backend {
                    reason: format!("object {key} body is not valid UTF-8"),
                })?
            }
            None => String::new(),
        };

        Ok(ResourceState::present(body, created_at, updated_at, true))
    }

    pub(crate) async fn blob_put(
        &self,
        key: &str,
        body: &str,
        created_at: i64,
        updated_at: i64,
    ) -> StrataResult<()> {
        let coding = ContentCoding::for_size(body.len(), self.config.compression_min_size);
        let data = coding.encode(body.as_bytes())?;

        let user_metadata = HashMap::from([
            (FIELD_CREATED_AT.to_string(), created_at.to_string()),
            (FIELD_UPDATED_AT.to_string(), updated_at.to_string()),
        ]);

        debug!(key, encoding = ?coding.tag(), "storing blob");
        self.blob
            .store(key, CONTENT_TYPE, coding.tag(), user_metadata, data)
            .await
    }
}

// ============================================================================
// FIELD CODECS
// ============================================================================

fn state_to_fields(state: &ResourceState) -> [(&'static str, String); 5] {
    [
        (FIELD_BODY, state.body.clone()),
        (FIELD_CREATED_AT, state.created_at.to_string()),
        (FIELD_UPDATED_AT, state.updated_at.to_string()),
        (FIELD_SYNCED, state.synced.to_string()),
        (FIELD_EXISTS, state.exists.to_string()),
    ]
}

fn state_from_fields(
    key: &str,
    map: &HashMap<String, String>,
    with_body: bool,
) -> Result<ResourceState, CacheError> {
    let body = if with_body {
        required(key, map, FIELD_BODY)?.clone()
    } else {
        String::new()
    };
    Ok(ResourceState {
        body,
        created_at: parse_i64(key, map, FIELD_CREATED_AT)?,
        updated_at: parse_i64(key, map, FIELD_UPDATED_AT)?,
        synced: parse_bool(key, map, FIELD_SYNCED)?,
        exists: parse_bool(key, map, FIELD_EXISTS)?,
    })
}

fn required<'a>(
    key: &str,
    map: &'a HashMap<String, String>,
    field: &str,
) -> Result<&'a String, CacheError> {
    map.get(field).ok_or_else(|| CacheError::MissingField {
        key: key.to_string(),
        field: field.to_string(),
    })
}

fn parse_i64(key: &str, map: &HashMap<String, String>, field: &str) -> Result<i64, CacheError> {
    let value = required(key, map, field)?;
    value.parse().map_err(|_| CacheError::MalformedField {
        key: key.to_string(),
        field: field.to_string(),
        value: value.clone(),
    })
}

fn parse_bool(key: &str, map: &HashMap<String, String>, field: &str) -> Result<bool, CacheError> {
    let value = required(key, map, field)?;
    match value.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(CacheError::MalformedField {
            key: key.to_string(),
            field: field.to_string(),
            value: value.clone(),
        }),
    }
}

/// Strict timestamp read from stored user metadata; objects our writer
/// produced always carry both fields.
fn stored_time(key: &str, meta: &BlobMeta, field: &str) -> Result<i64, BlobError> {
    let value = meta
        .user_metadata
        .get(field)
        .ok_or_else(|| BlobError::MissingMetadata {
            key: key.to_string(),
            field: field.to_string(),
        })?;
    value.parse().map_err(|_| BlobError::MalformedMetadata {
        key: key.to_string(),
        field: field.to_string(),
        value: value.clone(),
    })
}

/// Lenient timestamp read for listings, where foreign objects are tolerated.
fn listed_time(meta: &BlobMeta, field: &str) -> Option<i64> {
    meta.user_metadata.get(field).and_then(|v| v.parse().ok())
}

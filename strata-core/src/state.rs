//! The materialized view of one resource across both storage tiers.

/// Sentinel for "no timestamp". Never present on a record with
/// `exists = true`.
pub const TIME_NONE: i64 = i64::MIN;

/// Snapshot of one resource as seen through the cache ↔ blob protocol.
///
/// The two booleans make this a four-state tag: present/absent crossed with
/// clean/dirty. `synced = true` means the cache tier believes the blob tier
/// matches (or that both are known absent), `exists = false` with
/// `synced = false` is a tombstone awaiting a blob delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceState {
    /// UTF-8 contents; empty on metadata-only reads and absent records.
    pub body: String,
    /// Original creation time, epoch millis, or [`TIME_NONE`].
    pub created_at: i64,
    /// Last mutation time, epoch millis, or [`TIME_NONE`].
    pub updated_at: i64,
    pub synced: bool,
    pub exists: bool,
}

impl ResourceState {
    /// The synthetic negative returned when neither tier holds the
    /// resource. `synced = true` signals there is nothing to reconcile.
    pub fn absent() -> Self {
        Self {
            body: String::new(),
            created_at: TIME_NONE,
            updated_at: TIME_NONE,
            synced: true,
            exists: false,
        }
    }

    /// Tombstone written ahead of a blob delete.
    pub fn tombstone() -> Self {
        Self {
            body: String::new(),
            created_at: TIME_NONE,
            updated_at: TIME_NONE,
            synced: false,
            exists: false,
        }
    }

    /// A live resource value.
    pub fn present(body: impl Into<String>, created_at: i64, updated_at: i64, synced: bool) -> Self {
        Self {
            body: body.into(),
            created_at,
            updated_at,
            synced,
            exists: true,
        }
    }
}

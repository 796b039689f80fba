//! Durable blob tier.
//!
//! The blob store is the object repository the cache reconciles into:
//! named byte objects with a content type, an optional content encoding,
//! free-form user metadata and creation/modification times. Listings use
//! `/`-delimiter semantics: they return the immediate children of a prefix,
//! with deeper structure collapsed into folder pseudo-entries, ordered
//! lexicographically and paginated by an opaque continuation token.

mod fs;
mod memory;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

use async_trait::async_trait;
use std::collections::HashMap;
use strata_core::StrataResult;

/// Whether a listing entry is an object or a folder pseudo-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BlobKind {
    Blob,
    Folder,
}

/// Metadata of one object (or folder pseudo-entry) in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub key: String,
    pub kind: BlobKind,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub user_metadata: HashMap<String, String>,
    /// Object creation time, epoch millis.
    pub created: Option<i64>,
    /// Object last-modified time, epoch millis.
    pub modified: Option<i64>,
}

impl BlobMeta {
    /// A folder pseudo-entry carries nothing but its key.
    pub fn folder(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: BlobKind::Folder,
            content_type: None,
            content_encoding: None,
            user_metadata: HashMap::new(),
            created: None,
            modified: None,
        }
    }
}

/// A loaded object: its metadata plus the raw (possibly encoded) bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobObject {
    pub meta: BlobMeta,
    pub data: Vec<u8>,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPage {
    pub entries: Vec<BlobMeta>,
    /// Token for the next page; absent when this page is the last.
    pub next_token: Option<String>,
}

/// Durable object store interface.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, key: &str) -> StrataResult<bool>;

    /// Metadata without the body; `None` when the object is absent.
    async fn meta(&self, key: &str) -> StrataResult<Option<BlobMeta>>;

    /// Full object including the body; `None` when the object is absent.
    async fn load(&self, key: &str) -> StrataResult<Option<BlobObject>>;

    /// Create or overwrite an object.
    async fn store(
        &self,
        key: &str,
        content_type: &str,
        content_encoding: Option<&str>,
        user_metadata: HashMap<String, String>,
        data: Vec<u8>,
    ) -> StrataResult<()>;

    /// Delete an object. Deleting an absent key succeeds: both the
    /// write-through delete and the background reconciler retry deletes.
    async fn delete(&self, key: &str) -> StrataResult<()>;

    /// List the immediate children of `prefix`. `token` is the last key of
    /// the previous page; `limit` caps the page size, with `0` meaning
    /// unlimited.
    async fn list(&self, prefix: &str, token: Option<&str>, limit: usize)
        -> StrataResult<BlobPage>;
}

/// Immediate child key of `prefix` for an object key underneath it: the
/// object key itself for direct children, a `…/` folder key otherwise.
pub(crate) fn immediate_child(prefix: &str, key: &str) -> Option<(String, BlobKind)> {
    let rest = key.strip_prefix(prefix)?;
    if rest.is_empty() {
        return None;
    }
    match rest.find('/') {
        Some(slash) => Some((
            format!("{prefix}{}", &rest[..=slash]),
            BlobKind::Folder,
        )),
        None => Some((key.to_string(), BlobKind::Blob)),
    }
}

/// Apply continuation-token and page-size windowing to a sorted, deduplicated
/// child list. Returns the page plus the next token when truncated.
pub(crate) fn paginate(
    children: Vec<(String, BlobKind)>,
    token: Option<&str>,
    limit: usize,
) -> (Vec<(String, BlobKind)>, Option<String>) {
    let mut remaining: Vec<(String, BlobKind)> = match token {
        Some(token) => children
            .into_iter()
            .filter(|(key, _)| key.as_str() > token)
            .collect(),
        None => children,
    };

    if limit == 0 || remaining.len() <= limit {
        return (remaining, None);
    }

    remaining.truncate(limit);
    let next_token = remaining.last().map(|(key, _)| key.clone());
    (remaining, next_token)
}

//! Filesystem blob store.
//!
//! Objects live as plain files under a root directory, keyed by their
//! forward-slash object key. Object attributes (content type, encoding,
//! user metadata, creation time) live in a JSON sidecar tree under
//! `.attrs/`, and writes go through a staging directory with a rename so a
//! crash never leaves a half-written object behind.

use super::{immediate_child, paginate, BlobKind, BlobMeta, BlobObject, BlobPage, BlobStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use strata_core::{now_millis, BlobError, StrataError, StrataResult};
use uuid::Uuid;

const ATTRS_DIR: &str = ".attrs";
const STAGING_DIR: &str = ".staging";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectAttrs {
    content_type: String,
    content_encoding: Option<String>,
    user_metadata: HashMap<String, String>,
    created: i64,
}

/// Blob store rooted at a local directory.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at `root`, creating the directory tree as
    /// needed.
    pub async fn open(root: impl Into<PathBuf>) -> StrataResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(STAGING_DIR))
            .await
            .map_err(io_error)?;
        Ok(Self { root })
    }

    fn object_path(&self, key: &str) -> StrataResult<PathBuf> {
        Ok(self.root.join(validated(key)?))
    }

    fn attrs_path(&self, key: &str) -> StrataResult<PathBuf> {
        Ok(self.root.join(ATTRS_DIR).join(validated(key)?))
    }

    async fn read_attrs(&self, key: &str) -> StrataResult<Option<ObjectAttrs>> {
        match tokio::fs::read(self.attrs_path(key)?).await {
            Ok(bytes) => {
                let attrs = serde_json::from_slice(&bytes).map_err(|error| {
                    BlobError::Backend {
                        reason: format!("malformed attributes for object {key}: {error}"),
                    }
                })?;
                Ok(Some(attrs))
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(io_error(error)),
        }
    }

    async fn meta_for(&self, key: &str, path: &Path) -> StrataResult<Option<BlobMeta>> {
        let file_meta = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(io_error(error)),
        };

        let modified = file_meta
            .modified()
            .ok()
            .map(|time| DateTime::<Utc>::from(time).timestamp_millis());

        let meta = match self.read_attrs(key).await? {
            Some(attrs) => BlobMeta {
                key: key.to_string(),
                kind: BlobKind::Blob,
                content_type: Some(attrs.content_type),
                content_encoding: attrs.content_encoding,
                user_metadata: attrs.user_metadata,
                created: Some(attrs.created),
                modified,
            },
            // An object without a sidecar (written by someone else) still
            // lists and loads, with filesystem times only.
            None => BlobMeta {
                key: key.to_string(),
                kind: BlobKind::Blob,
                content_type: Some(FALLBACK_CONTENT_TYPE.to_string()),
                content_encoding: None,
                user_metadata: HashMap::new(),
                created: modified,
                modified,
            },
        };
        Ok(Some(meta))
    }

    async fn write_via_staging(&self, target: &Path, data: &[u8]) -> StrataResult<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let staged = self
            .root
            .join(STAGING_DIR)
            .join(Uuid::new_v4().to_string());
        tokio::fs::write(&staged, data).await.map_err(io_error)?;
        tokio::fs::rename(&staged, target).await.map_err(io_error)?;
        Ok(())
    }

    async fn sorted_children(&self, prefix: &str) -> StrataResult<Vec<(String, BlobKind)>> {
        let dir = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.root.join(validated(prefix)?)
        };

        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(io_error(error)),
        };

        let mut children = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(io_error)? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await.map_err(io_error)?;
            let key = if file_type.is_dir() {
                format!("{prefix}{name}/")
            } else {
                format!("{prefix}{name}")
            };
            if let Some(child) = immediate_child(prefix, &key) {
                children.push(child);
            }
        }
        children.sort();
        children.dedup();
        Ok(children)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn exists(&self, key: &str) -> StrataResult<bool> {
        let path = self.object_path(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(io_error(error)),
        }
    }

    async fn meta(&self, key: &str) -> StrataResult<Option<BlobMeta>> {
        let path = self.object_path(key)?;
        self.meta_for(key, &path).await
    }

    async fn load(&self, key: &str) -> StrataResult<Option<BlobObject>> {
        let path = self.object_path(key)?;
        let Some(meta) = self.meta_for(key, &path).await? else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(BlobObject { meta, data })),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(io_error(error)),
        }
    }

    async fn store(
        &self,
        key: &str,
        content_type: &str,
        content_encoding: Option<&str>,
        user_metadata: HashMap<String, String>,
        data: Vec<u8>,
    ) -> StrataResult<()> {
        // Keep the original creation time across overwrites.
        let created = match self.read_attrs(key).await? {
            Some(existing) => existing.created,
            None => now_millis(),
        };
        let attrs = ObjectAttrs {
            content_type: content_type.to_string(),
            content_encoding: content_encoding.map(str::to_string),
            user_metadata,
            created,
        };
        let encoded_attrs = serde_json::to_vec(&attrs).map_err(|error| BlobError::Backend {
            reason: format!("failed to encode attributes for object {key}: {error}"),
        })?;

        let object_path = self.object_path(key)?;
        let attrs_path = self.attrs_path(key)?;
        self.write_via_staging(&object_path, &data).await?;
        self.write_via_staging(&attrs_path, &encoded_attrs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StrataResult<()> {
        for path in [self.object_path(key)?, self.attrs_path(key)?] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => return Err(io_error(error)),
            }
        }
        Ok(())
    }

    async fn list(
        &self,
        prefix: &str,
        token: Option<&str>,
        limit: usize,
    ) -> StrataResult<BlobPage> {
        let children = self.sorted_children(prefix).await?;
        let (children, next_token) = paginate(children, token, limit);

        let mut entries = Vec::with_capacity(children.len());
        for (key, kind) in children {
            match kind {
                BlobKind::Folder => entries.push(BlobMeta::folder(key)),
                BlobKind::Blob => {
                    if let Some(meta) = self.meta(&key).await? {
                        entries.push(meta);
                    }
                }
            }
        }

        Ok(BlobPage {
            entries,
            next_token,
        })
    }
}

fn validated(key: &str) -> StrataResult<&Path> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path.components().all(|component| matches!(component, Component::Normal(_)));
    if safe {
        Ok(path)
    } else {
        Err(BlobError::Backend {
            reason: format!("invalid object key: {key:?}"),
        }
        .into())
    }
}

fn io_error(error: std::io::Error) -> StrataError {
    BlobError::Io {
        reason: error.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_in(dir: &tempfile::TempDir) -> FsBlobStore {
        FsBlobStore::open(dir.path()).await.unwrap()
    }

    fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn store_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        store
            .store(
                "alice/chat.json",
                "application/json",
                Some("gzip"),
                metadata(&[("created_at", "42"), ("updated_at", "43")]),
                b"payload".to_vec(),
            )
            .await
            .unwrap();

        assert!(store.exists("alice/chat.json").await.unwrap());
        let object = store.load("alice/chat.json").await.unwrap().unwrap();
        assert_eq!(object.data, b"payload");
        assert_eq!(object.meta.content_type.as_deref(), Some("application/json"));
        assert_eq!(object.meta.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(object.meta.user_metadata["created_at"], "42");
        assert!(object.meta.created.is_some());
        assert!(object.meta.modified.is_some());
    }

    #[tokio::test]
    async fn missing_objects_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        assert!(!store.exists("nope.json").await.unwrap());
        assert!(store.meta("nope.json").await.unwrap().is_none());
        assert!(store.load("nope.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        store
            .store("a.json", "application/json", None, HashMap::new(), vec![])
            .await
            .unwrap();
        store.delete("a.json").await.unwrap();
        store.delete("a.json").await.unwrap();
        assert!(!store.exists("a.json").await.unwrap());
    }

    #[tokio::test]
    async fn overwrite_preserves_creation_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        store
            .store("a.json", "application/json", None, HashMap::new(), b"v1".to_vec())
            .await
            .unwrap();
        let created = store.meta("a.json").await.unwrap().unwrap().created;
        store
            .store("a.json", "application/json", None, HashMap::new(), b"v2".to_vec())
            .await
            .unwrap();
        let meta = store.meta("a.json").await.unwrap().unwrap();
        assert_eq!(meta.created, created);
    }

    #[tokio::test]
    async fn listing_hides_internal_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        for key in ["alice/chat1.json", "alice/work/notes.json", "bob/chat.json"] {
            store
                .store(key, "application/json", None, HashMap::new(), vec![])
                .await
                .unwrap();
        }

        let page = store.list("", None, 0).await.unwrap();
        let keys: Vec<_> = page.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["alice/", "bob/"]);

        let page = store.list("alice/", None, 0).await.unwrap();
        let keys: Vec<_> = page.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["alice/chat1.json", "alice/work/"]);
    }

    #[tokio::test]
    async fn listing_paginates_with_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        for key in ["p/a.json", "p/b.json", "p/c.json"] {
            store
                .store(key, "application/json", None, HashMap::new(), vec![])
                .await
                .unwrap();
        }

        let first = store.list("p/", None, 2).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        let token = first.next_token.clone().unwrap();
        let second = store.list("p/", Some(&token), 2).await.unwrap();
        assert_eq!(second.entries.len(), 1);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        assert!(store.exists("../escape.json").await.is_err());
        assert!(store
            .store("/abs.json", "application/json", None, HashMap::new(), vec![])
            .await
            .is_err());
    }
}

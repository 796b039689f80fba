//! In-memory blob store.
//!
//! Complete implementation of the blob tier over a sorted map. Serves as the
//! workspace's test double and as a single-process store for embedded use.

use super::{immediate_child, paginate, BlobKind, BlobMeta, BlobObject, BlobPage, BlobStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use strata_core::{now_millis, StrataResult};

#[derive(Debug, Clone)]
struct StoredObject {
    content_type: String,
    content_encoding: Option<String>,
    user_metadata: HashMap<String, String>,
    data: Vec<u8>,
    created: i64,
    modified: i64,
}

impl StoredObject {
    fn meta(&self, key: &str) -> BlobMeta {
        BlobMeta {
            key: key.to_string(),
            kind: BlobKind::Blob,
            content_type: Some(self.content_type.clone()),
            content_encoding: self.content_encoding.clone(),
            user_metadata: self.user_metadata.clone(),
            created: Some(self.created),
            modified: Some(self.modified),
        }
    }
}

/// Blob store backed by a `BTreeMap`, so prefix listings come straight from
/// the key order.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sorted_children(&self, prefix: &str) -> Vec<(String, BlobKind)> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        let mut children: Vec<(String, BlobKind)> = Vec::new();
        for key in objects.range(prefix.to_string()..).map(|(k, _)| k) {
            if !key.starts_with(prefix) {
                break;
            }
            if let Some(child) = immediate_child(prefix, key) {
                if children.last() != Some(&child) {
                    children.push(child);
                }
            }
        }
        children
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, key: &str) -> StrataResult<bool> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        Ok(objects.contains_key(key))
    }

    async fn meta(&self, key: &str) -> StrataResult<Option<BlobMeta>> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        Ok(objects.get(key).map(|object| object.meta(key)))
    }

    async fn load(&self, key: &str) -> StrataResult<Option<BlobObject>> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        Ok(objects.get(key).map(|object| BlobObject {
            meta: object.meta(key),
            data: object.data.clone(),
        }))
    }

    async fn store(
        &self,
        key: &str,
        content_type: &str,
        content_encoding: Option<&str>,
        user_metadata: HashMap<String, String>,
        data: Vec<u8>,
    ) -> StrataResult<()> {
        let now = now_millis();
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        let created = objects.get(key).map(|existing| existing.created).unwrap_or(now);
        objects.insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                content_encoding: content_encoding.map(str::to_string),
                user_metadata,
                data,
                created,
                modified: now,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StrataResult<()> {
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        objects.remove(key);
        Ok(())
    }

    async fn list(
        &self,
        prefix: &str,
        token: Option<&str>,
        limit: usize,
    ) -> StrataResult<BlobPage> {
        let (children, next_token) = paginate(self.sorted_children(prefix), token, limit);

        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        let entries = children
            .into_iter()
            .map(|(key, kind)| match kind {
                BlobKind::Folder => BlobMeta::folder(key),
                BlobKind::Blob => objects
                    .get(&key)
                    .map(|object| object.meta(&key))
                    .unwrap_or_else(|| BlobMeta::folder(key)),
            })
            .collect();

        Ok(BlobPage {
            entries,
            next_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn store_and_load_round_trip() {
        let store = MemoryBlobStore::new();
        store
            .store(
                "alice/chat.json",
                "application/json",
                Some("gzip"),
                metadata(&[("created_at", "1")]),
                b"payload".to_vec(),
            )
            .await
            .unwrap();

        assert!(store.exists("alice/chat.json").await.unwrap());
        let object = store.load("alice/chat.json").await.unwrap().unwrap();
        assert_eq!(object.data, b"payload");
        assert_eq!(object.meta.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(object.meta.user_metadata["created_at"], "1");
        assert!(object.meta.created.is_some());
    }

    #[tokio::test]
    async fn missing_objects_are_none() {
        let store = MemoryBlobStore::new();
        assert!(!store.exists("nope.json").await.unwrap());
        assert!(store.meta("nope.json").await.unwrap().is_none());
        assert!(store.load("nope.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryBlobStore::new();
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
        let store = MemoryBlobStore::new();
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
        assert_eq!(store.load("a.json").await.unwrap().unwrap().data, b"v2");
    }

    #[tokio::test]
    async fn listing_collapses_nested_keys_into_folders() {
        let store = MemoryBlobStore::new();
        for key in [
            "alice/chat1.json",
            "alice/chat2.json",
            "alice/work/notes.json",
            "bob/chat.json",
        ] {
            store
                .store(key, "application/json", None, HashMap::new(), vec![])
                .await
                .unwrap();
        }

        let page = store.list("", None, 0).await.unwrap();
        let keys: Vec<_> = page.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["alice/", "bob/"]);
        assert!(page.entries.iter().all(|e| e.kind == BlobKind::Folder));

        let page = store.list("alice/", None, 0).await.unwrap();
        let keys: Vec<_> = page.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["alice/chat1.json", "alice/chat2.json", "alice/work/"]);
    }

    #[tokio::test]
    async fn listing_paginates_with_tokens() {
        let store = MemoryBlobStore::new();
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
        assert_eq!(second.entries[0].key, "p/c.json");
        assert!(second.next_token.is_none());
    }
}

//! Externally visible metadata views.

use crate::descriptor::ResourceDescriptor;
use serde::{Deserialize, Serialize};

/// Metadata for a single resource item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceItemMetadata {
    pub descriptor: ResourceDescriptor,
    /// Creation time, epoch millis. Absent when the backing object carries
    /// no timestamps at all.
    pub created_at: Option<i64>,
    /// Last mutation time, epoch millis.
    pub updated_at: Option<i64>,
}

impl ResourceItemMetadata {
    pub fn new(descriptor: ResourceDescriptor) -> Self {
        Self {
            descriptor,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_times(descriptor: ResourceDescriptor, created_at: i64, updated_at: i64) -> Self {
        Self {
            descriptor,
            created_at: Some(created_at),
            updated_at: Some(updated_at),
        }
    }
}

/// Metadata for a folder: its immediate children plus a continuation token
/// when the listing was truncated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFolderMetadata {
    pub descriptor: ResourceDescriptor,
    pub items: Vec<ResourceMetadata>,
    pub next_token: Option<String>,
}

impl ResourceFolderMetadata {
    /// A folder entry inside another listing; children are not expanded.
    pub fn new(descriptor: ResourceDescriptor) -> Self {
        Self {
            descriptor,
            items: Vec::new(),
            next_token: None,
        }
    }

    pub fn with_items(descriptor: ResourceDescriptor, items: Vec<ResourceMetadata>) -> Self {
        Self {
            descriptor,
            items,
            next_token: None,
        }
    }
}

/// Either view, as returned by the metadata operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceMetadata {
    Item(ResourceItemMetadata),
    Folder(ResourceFolderMetadata),
}

impl ResourceMetadata {
    pub fn descriptor(&self) -> &ResourceDescriptor {
        match self {
            ResourceMetadata::Item(item) => &item.descriptor,
            ResourceMetadata::Folder(folder) => &folder.descriptor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ResourceType;

    #[test]
    fn metadata_serializes_with_kind_tag() {
        let item = ResourceMetadata::Item(ResourceItemMetadata::with_times(
            ResourceDescriptor::item(ResourceType::Prompt, "alice/greeting"),
            1,
            2,
        ));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "item");
        assert_eq!(json["created_at"], 1);

        let folder = ResourceMetadata::Folder(ResourceFolderMetadata::new(
            ResourceDescriptor::folder(ResourceType::Prompt, "alice"),
        ));
        let json = serde_json::to_value(&folder).unwrap();
        assert_eq!(json["kind"], "folder");
    }
}

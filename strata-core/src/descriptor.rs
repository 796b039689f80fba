//! Typed resource handles.
//!
//! A descriptor identifies one resource by kind and absolute path. Folder
//! descriptors are structural: the root folder has an empty path and every
//! other folder path ends with `/`, which is also how listing entries are
//! classified when they come back from the blob tier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of resource held by the cache.
///
/// The lowercase name namespaces shared-cache keys so resources of
/// different kinds never collide even when their paths do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Conversation,
    Prompt,
    File,
}

impl ResourceType {
    /// Lowercase name used as the cache-key namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Conversation => "conversation",
            ResourceType::Prompt => "prompt",
            ResourceType::File => "file",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle for one resource: a type tag plus an absolute forward-slash path
/// (no leading slash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    resource_type: ResourceType,
    path: String,
}

impl ResourceDescriptor {
    /// Descriptor for a single resource item.
    pub fn item(resource_type: ResourceType, path: impl Into<String>) -> Self {
        Self {
            resource_type,
            path: path.into(),
        }
    }

    /// Descriptor for a folder. A trailing `/` is appended when missing so
    /// the path doubles as a listing prefix.
    pub fn folder(resource_type: ResourceType, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.is_empty() && !path.ends_with('/') {
            path.push('/');
        }
        Self {
            resource_type,
            path,
        }
    }

    /// Descriptor for the root folder of a resource type.
    pub fn root(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            path: String::new(),
        }
    }

    /// Build a child descriptor from a decoded path found under `parent`,
    /// classifying it as folder or item by its trailing slash.
    pub fn child_of(parent: &ResourceDescriptor, decoded_path: &str) -> Self {
        Self {
            resource_type: parent.resource_type,
            path: decoded_path.to_string(),
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// The absolute forward-slash path of this resource.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_folder(&self) -> bool {
        self.path.is_empty() || self.path.ends_with('/')
    }

    pub fn is_root_folder(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_constructor_normalizes_trailing_slash() {
        let folder = ResourceDescriptor::folder(ResourceType::Conversation, "alice/work");
        assert_eq!(folder.path(), "alice/work/");
        assert!(folder.is_folder());
        assert!(!folder.is_root_folder());
    }

    #[test]
    fn root_is_folder_with_empty_path() {
        let root = ResourceDescriptor::root(ResourceType::File);
        assert!(root.is_folder());
        assert!(root.is_root_folder());
        assert_eq!(root.path(), "");
    }

    #[test]
    fn item_is_not_a_folder() {
        let item = ResourceDescriptor::item(ResourceType::Prompt, "alice/greeting");
        assert!(!item.is_folder());
        assert!(!item.is_root_folder());
    }

    #[test]
    fn child_classification_follows_trailing_slash() {
        let parent = ResourceDescriptor::root(ResourceType::Conversation);
        let folder = ResourceDescriptor::child_of(&parent, "alice/");
        let item = ResourceDescriptor::child_of(&parent, "alice/chat");
        assert!(folder.is_folder());
        assert!(!item.is_folder());
        assert_eq!(folder.resource_type(), ResourceType::Conversation);
    }
}

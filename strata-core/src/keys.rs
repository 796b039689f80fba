//! Key derivation between descriptors, cache keys and blob object keys.
//!
//! The mapping is deterministic and invertible enough for the background
//! reconciler, which only ever holds a cache key and must recover the blob
//! key from it.

use crate::descriptor::ResourceDescriptor;

/// Extension appended to item paths in the blob tier.
pub const BLOB_EXTENSION: &str = ".json";

/// Blob object key for a descriptor. Folders use the bare path so it can
/// serve as a listing prefix.
pub fn blob_key(descriptor: &ResourceDescriptor) -> String {
    if descriptor.is_folder() {
        descriptor.path().to_string()
    } else {
        format!("{}{}", descriptor.path(), BLOB_EXTENSION)
    }
}

/// Shared-cache key for a descriptor, namespaced by resource type.
pub fn cache_key(descriptor: &ResourceDescriptor) -> String {
    format!("{}:{}", descriptor.resource_type().as_str(), descriptor.path())
}

/// Recover the blob object key from a cache key by stripping the namespace
/// up to the first `:` and appending the item extension.
pub fn blob_key_from_cache_key(cache_key: &str) -> String {
    let path = match cache_key.split_once(':') {
        Some((_, path)) => path,
        None => cache_key,
    };
    format!("{path}{BLOB_EXTENSION}")
}

/// Resource path for a blob object key; folder keys pass through unchanged.
pub fn path_from_blob_key(blob_key: &str) -> &str {
    blob_key.strip_suffix(BLOB_EXTENSION).unwrap_or(blob_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ResourceType;

    #[test]
    fn item_keys_carry_the_extension() {
        let item = ResourceDescriptor::item(ResourceType::Conversation, "alice/chat");
        assert_eq!(blob_key(&item), "alice/chat.json");
        assert_eq!(cache_key(&item), "conversation:alice/chat");
    }

    #[test]
    fn folder_keys_are_bare_prefixes() {
        let folder = ResourceDescriptor::folder(ResourceType::Conversation, "alice");
        assert_eq!(blob_key(&folder), "alice/");
        let root = ResourceDescriptor::root(ResourceType::Conversation);
        assert_eq!(blob_key(&root), "");
    }

    #[test]
    fn cache_key_round_trips_to_blob_key() {
        let item = ResourceDescriptor::item(ResourceType::Prompt, "alice/greeting");
        assert_eq!(blob_key_from_cache_key(&cache_key(&item)), blob_key(&item));
    }

    #[test]
    fn blob_key_strips_back_to_path() {
        assert_eq!(path_from_blob_key("alice/chat.json"), "alice/chat");
        assert_eq!(path_from_blob_key("alice/"), "alice/");
    }

    #[test]
    fn paths_may_contain_colons() {
        // Only the first colon separates the namespace.
        assert_eq!(blob_key_from_cache_key("file:a:b"), "a:b.json");
    }
}

//! ContentStore trait definition.

use super::models::{ContentFilter, ContentItem, ItemId, NewContentItem};
use anyhow::Result;
use std::time::Duration;

/// Trait for content repository backends.
///
/// Metadata is an arbitrary string value per `(item, key)` pair; writing a key
/// replaces its previous value.
pub trait ContentStore: Send + Sync {
    // =========================================================================
    // Items
    // =========================================================================

    /// Get an item by ID.
    fn get_item(&self, id: ItemId) -> Result<Option<ContentItem>>;

    /// Overwrite the stored body of an item. Returns false if the item does not exist.
    fn set_body(&self, id: ItemId, body: &str) -> Result<bool>;

    /// Insert a new item, returning its ID.
    fn insert_item(&self, item: NewContentItem) -> Result<ItemId>;

    /// List items matching `filter`, ordered by ID.
    fn find_items(&self, filter: &ContentFilter) -> Result<Vec<ContentItem>>;

    // =========================================================================
    // Metadata
    // =========================================================================

    fn get_meta(&self, id: ItemId, key: &str) -> Result<Option<String>>;

    fn set_meta(&self, id: ItemId, key: &str, value: &str) -> Result<()>;

    /// Replace the value under `key` only if it still equals `expected`.
    /// Returns false, writing nothing, when it does not.
    fn compare_and_set_meta(&self, id: ItemId, key: &str, expected: &str, value: &str)
        -> Result<bool>;

    fn delete_meta(&self, id: ItemId, key: &str) -> Result<()>;

    /// All `(item, value)` pairs stored under `key`, ordered by item ID.
    fn list_meta(&self, key: &str) -> Result<Vec<(ItemId, String)>>;

    // =========================================================================
    // Leases
    // =========================================================================

    /// Take or extend the lease `name` for `owner` until `ttl` from now.
    ///
    /// Succeeds when the lease is free, expired, or already held by `owner`.
    /// The lease is visible to every process sharing the store.
    fn try_acquire_lease(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Give up the lease if `owner` holds it.
    fn release_lease(&self, name: &str, owner: &str) -> Result<()>;
}

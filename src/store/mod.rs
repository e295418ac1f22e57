//! Token store contract.
//!
//! The token service keeps all of its state in a networked key-value store
//! with per-key TTL, hash-map values, lists and sets. [`TokenStore`] is the
//! slice of that store the service relies on. Every method is a single
//! atomic operation; multi-step sequences are built by the callers and are
//! written to tolerate interleaving.
//!
//! [`MemoryStore`] is the in-process implementation.

mod memory;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory::{MemoryStore, Reaper};

/// Field map of a hash value
pub type Fields = HashMap<String, String>;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Returns all fields of a hash, or `None` if the key is absent or expired.
    async fn get_hash(&self, key: &str) -> StoreResult<Option<Fields>>;

    /// Replaces a hash and sets its time-to-live in one step.
    async fn set_hash(&self, key: &str, fields: Fields, ttl_seconds: u64) -> StoreResult<()>;

    /// Updates one field of an existing hash, keeping its TTL.
    ///
    /// Returns `false` without writing when the key is absent, so a late
    /// write never recreates an expired record.
    async fn set_field(&self, key: &str, field: &str, value: &str) -> StoreResult<bool>;

    /// Prepends a value to a list, creating the list if needed.
    async fn list_push_front(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Keeps only the elements in `start..=stop` and returns the removed
    /// ones, in list order. Negative indices count from the end, as in
    /// `list_range`.
    ///
    /// Reading and trimming happen in one step, so elements pushed by a
    /// concurrent writer are either kept or returned, never dropped unseen.
    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;

    /// Returns the elements in `start..=stop`; `(0, -1)` is the whole list.
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;

    async fn set_add(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Removes the given members only; members added concurrently survive.
    async fn set_remove(&self, key: &str, values: &[String]) -> StoreResult<()>;

    async fn set_clear(&self, key: &str) -> StoreResult<()>;

    /// Deletes keys of any kind. Missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> StoreResult<()>;

    /// Health probe.
    async fn ping(&self) -> StoreResult<()>;
}

/// Resolves inclusive list bounds the way the store does: negative indices
/// count from the end, out-of-range bounds are clamped.
pub(crate) fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_whole_range() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
    }

    #[test]
    fn test_resolve_clamps_stop() {
        assert_eq!(resolve_range(3, 0, 19), Some((0, 2)));
    }

    #[test]
    fn test_resolve_empty() {
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(3, 5, 10), None);
        assert_eq!(resolve_range(3, 2, 1), None);
    }
}

//! Storage for cached user profiles.
//!
//! The [`ProfileStore`] trait is the seam between the profile cache and where
//! entries actually live. [`InMemoryProfileStore`] is the default.

use std::time::Duration;

use crate::UserProfile;

pub mod memory;

pub use memory::InMemoryProfileStore;

/// Trait for storing user profiles with an expiry.
///
/// Implementations must be safe to share between tasks; a lookup that is
/// waiting on the directory may race with a sweep or a `clear`.
pub trait ProfileStore: Send + Sync {
    /// Retrieves a cached profile by user id.
    /// Returns `None` if the id is unknown or its entry has expired.
    fn get(&self, user_id: &str) -> Option<UserProfile>;

    /// Stores a profile with the specified TTL, replacing any previous entry.
    fn set(&self, user_id: &str, profile: UserProfile, ttl: Duration);

    /// Removes every entry whose expiry has passed and returns how many were removed.
    fn remove_expired(&self) -> usize;

    /// Removes all entries.
    fn clear(&self);

    /// Returns the user ids currently held, expired or not.
    fn keys(&self) -> Vec<String>;

    /// Returns the number of entries currently held, expired or not.
    fn len(&self) -> usize {
        self.keys().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Introspection snapshot of the cache.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub entries: Vec<String>,
}

impl CacheStats {
    /// Builds a snapshot from a store. Keys are sorted.
    #[must_use]
    pub fn from_store(store: &dyn ProfileStore) -> Self {
        let mut entries = store.keys();
        entries.sort_unstable();
        Self {
            size: entries.len(),
            entries,
        }
    }
}

//! In-memory profile store.

use std::{
    collections::HashMap,
    sync::RwLock,
    time::Duration,
};

use tokio::time::Instant;

use super::ProfileStore;
use crate::UserProfile;

/// Default in-memory implementation of `ProfileStore`.
///
/// Expired entries stay in the map until [`ProfileStore::remove_expired`]
/// runs, but are never returned by `get`. Lock poisoning turns reads into
/// misses and writes into no-ops.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    storage: RwLock<HashMap<String, CacheEntry>>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    profile: UserProfile,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

impl InMemoryProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn get(&self, user_id: &str) -> Option<UserProfile> {
        let storage = self.storage.read().ok()?;
        storage
            .get(user_id)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.profile.clone())
    }

    fn set(&self, user_id: &str, profile: UserProfile, ttl: Duration) {
        if let Ok(mut storage) = self.storage.write() {
            let entry = CacheEntry {
                profile,
                expires_at: Instant::now() + ttl,
            };
            storage.insert(user_id.to_string(), entry);
        }
    }

    fn remove_expired(&self) -> usize {
        let Ok(mut storage) = self.storage.write() else {
            return 0;
        };
        let now = Instant::now();
        let before = storage.len();
        storage.retain(|_, entry| entry.is_live(now));
        before - storage.len()
    }

    fn clear(&self) {
        if let Ok(mut storage) = self.storage.write() {
            storage.clear();
        }
    }

    fn keys(&self) -> Vec<String> {
        self.storage
            .read()
            .map(|storage| storage.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.storage.read().map(|storage| storage.len()).unwrap_or(0)
    }
}

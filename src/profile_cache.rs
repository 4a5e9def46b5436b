//! Time-expiring user profile cache with directory fallback.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{
    cache::{CacheStats, InMemoryProfileStore, ProfileStore},
    config::{
        ProfileCacheConfigProvider, DEFAULT_FALLBACK_TTL, DEFAULT_PROFILE_TTL,
        DEFAULT_SWEEP_INTERVAL,
    },
    directory::UserDirectory,
    sweep::SweepHandle,
    UserProfile,
};

type LookupGates = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Removes a lookup gate from the map when dropped, including when the
/// lookup future is cancelled mid-flight.
struct GateRelease<'a> {
    cache: &'a UserProfileCache,
    user_id: &'a str,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for GateRelease<'_> {
    fn drop(&mut self) {
        self.cache.release_gate(self.user_id, &self.gate);
    }
}

/// Cache in front of a [`UserDirectory`].
///
/// Lookups never fail: when the directory cannot resolve an id, the id itself
/// is returned as the display name and cached for the (shorter) fallback TTL,
/// so a failing directory sees at most one attempt per id per fallback period.
///
/// Cloning is cheap and clones share the same entries.
#[derive(Clone)]
pub struct UserProfileCache {
    store: Arc<dyn ProfileStore>,
    directory: Arc<dyn UserDirectory>,
    gates: Arc<LookupGates>,
    profile_ttl: Duration,
    fallback_ttl: Duration,
    sweep_interval: Duration,
}

impl std::fmt::Debug for UserProfileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserProfileCache")
            .field("size", &self.store.len())
            .field("profile_ttl", &self.profile_ttl)
            .field("fallback_ttl", &self.fallback_ttl)
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

impl UserProfileCache {
    /// Creates a cache with default TTLs and an in-memory store.
    #[must_use]
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            store: Arc::new(InMemoryProfileStore::new()),
            directory,
            gates: Arc::default(),
            profile_ttl: DEFAULT_PROFILE_TTL,
            fallback_ttl: DEFAULT_FALLBACK_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Creates a cache whose TTLs and sweep interval come from `config`.
    #[must_use]
    pub fn with_config(
        config: &impl ProfileCacheConfigProvider,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            profile_ttl: config.get_profile_ttl(),
            fallback_ttl: config.get_fallback_ttl(),
            sweep_interval: config.get_sweep_interval(),
            ..Self::new(directory)
        }
    }

    /// Replaces the backing store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ProfileStore>) -> Self {
        self.store = store;
        self
    }

    /// Returns the profile for `user_id`, consulting the directory on a miss.
    ///
    /// Concurrent misses for the same id share a single directory lookup.
    pub async fn get_user_profile(&self, user_id: &str) -> UserProfile {
        if let Some(profile) = self.store.get(user_id) {
            tracing::trace!(user_id, "Profile cache hit");
            return profile;
        }

        let gate = GateRelease {
            cache: self,
            user_id,
            gate: self.gate(user_id),
        };
        let _guard = gate.gate.lock().await;
        // another caller may have resolved it while we waited
        match self.store.get(user_id) {
            Some(profile) => profile,
            None => self.resolve(user_id).await,
        }
    }

    async fn resolve(&self, user_id: &str) -> UserProfile {
        match self.directory.fetch_profile(user_id).await {
            Ok(profile) => {
                tracing::debug!(user_id, "Resolved user profile");
                self.store.set(user_id, profile.clone(), self.profile_ttl);
                profile
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "User directory lookup failed, using fallback profile");
                let fallback = UserProfile::fallback(user_id);
                self.store.set(user_id, fallback.clone(), self.fallback_ttl);
                fallback
            }
        }
    }

    fn gate(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        match self.gates.lock() {
            Ok(mut gates) => Arc::clone(gates.entry(user_id.to_string()).or_default()),
            // without the gate map, lookups are simply not deduplicated
            Err(_) => Arc::default(),
        }
    }

    fn release_gate(&self, user_id: &str, gate: &Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut gates) = self.gates.lock() {
            if gates.get(user_id).is_some_and(|current| Arc::ptr_eq(current, gate)) {
                gates.remove(user_id);
            }
        }
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        self.store.remove_expired()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Returns a snapshot of the cached user ids.
    #[must_use]
    pub fn get_stats(&self) -> CacheStats {
        CacheStats::from_store(self.store.as_ref())
    }

    /// Starts the periodic sweep of expired entries.
    ///
    /// Must be called from within a tokio runtime. Keep the returned handle
    /// alive for as long as the sweep should run.
    #[must_use = "dropping the handle stops the sweeper"]
    pub fn spawn_sweeper(&self) -> SweepHandle {
        SweepHandle::spawn(Arc::clone(&self.store), self.sweep_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ProfileCacheConfig, error::DirectoryError};
    use async_trait::async_trait;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{advance, sleep};

    /// Directory that answers from a fixed table and counts lookups.
    #[derive(Default)]
    struct ScriptedDirectory {
        names: Mutex<HashMap<String, String>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedDirectory {
        fn with(entries: &[(&str, &str)]) -> Self {
            let directory = Self::default();
            for (id, name) in entries {
                directory.insert(id, name);
            }
            directory
        }

        fn insert(&self, id: &str, name: &str) {
            self.names
                .lock()
                .unwrap()
                .insert(id.to_string(), name.to_string());
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UserDirectory for ScriptedDirectory {
        async fn fetch_profile(&self, user_id: &str) -> Result<UserProfile, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                sleep(delay).await;
            }
            let name = self.names.lock().unwrap().get(user_id).cloned();
            name.map(UserProfile::new)
                .ok_or(DirectoryError::Status(StatusCode::NOT_FOUND))
        }
    }

    fn cache_over(directory: &Arc<ScriptedDirectory>) -> UserProfileCache {
        UserProfileCache::new(Arc::clone(directory) as Arc<dyn UserDirectory>)
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_lookup_is_cached_for_full_ttl() {
        let directory = Arc::new(ScriptedDirectory::with(&[("u1", "Alice")]));
        let cache = cache_over(&directory);

        assert_eq!(cache.get_user_profile("u1").await, UserProfile::new("Alice"));
        assert_eq!(
            cache.get_stats(),
            CacheStats {
                size: 1,
                entries: vec!["u1".to_string()]
            }
        );

        advance(Duration::from_secs(5 * 60)).await;
        assert_eq!(cache.get_user_profile("u1").await, UserProfile::new("Alice"));
        assert_eq!(directory.calls(), 1);

        advance(Duration::from_secs(6 * 60)).await;
        assert_eq!(cache.get_user_profile("u1").await, UserProfile::new("Alice"));
        assert_eq!(directory.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_exactly_at_full_ttl() {
        let directory = Arc::new(ScriptedDirectory::with(&[("u1", "Alice")]));
        let cache = cache_over(&directory);

        cache.get_user_profile("u1").await;
        advance(DEFAULT_PROFILE_TTL).await;
        cache.get_user_profile("u1").await;
        assert_eq!(directory.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_lookup_falls_back_to_user_id() {
        let directory = Arc::new(ScriptedDirectory::default());
        let cache = cache_over(&directory);

        assert_eq!(cache.get_user_profile("u2").await, UserProfile::new("u2"));

        advance(Duration::from_secs(30)).await;
        assert_eq!(cache.get_user_profile("u2").await, UserProfile::new("u2"));
        assert_eq!(directory.calls(), 1);

        advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get_user_profile("u2").await, UserProfile::new("u2"));
        assert_eq!(directory.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_retry_replaces_fallback() {
        let directory = Arc::new(ScriptedDirectory::default());
        let cache = cache_over(&directory);

        assert_eq!(cache.get_user_profile("u3").await.name, "u3");

        directory.insert("u3", "Carol");
        advance(DEFAULT_FALLBACK_TTL).await;
        assert_eq!(cache.get_user_profile("u3").await.name, "Carol");

        // now held for the full TTL
        advance(Duration::from_secs(5 * 60)).await;
        assert_eq!(cache.get_user_profile("u3").await.name, "Carol");
        assert_eq!(directory.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_overrides_ttls() {
        let directory = Arc::new(ScriptedDirectory::default());
        let mut config = ProfileCacheConfig::new("http://localhost");
        config.fallback_ttl = Duration::from_secs(5);
        let cache = UserProfileCache::with_config(&config, Arc::clone(&directory) as Arc<dyn UserDirectory>);

        cache.get_user_profile("u1").await;
        advance(Duration::from_secs(5)).await;
        cache.get_user_profile("u1").await;
        assert_eq!(directory.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_only_expired() {
        let directory = Arc::new(ScriptedDirectory::with(&[("ok", "Olivia")]));
        let cache = cache_over(&directory);

        cache.get_user_profile("ok").await;
        cache.get_user_profile("missing").await;
        assert_eq!(cache.get_stats().size, 2);

        advance(DEFAULT_FALLBACK_TTL).await;
        assert_eq!(cache.cleanup_expired(), 1);
        for _ in 0..3 {
            assert_eq!(cache.cleanup_expired(), 0);
        }
        assert_eq!(cache.get_stats().entries, vec!["ok".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_empties_cache() {
        let directory = Arc::new(ScriptedDirectory::with(&[("u1", "Alice")]));
        let cache = cache_over(&directory);

        cache.get_user_profile("u1").await;
        cache.get_user_profile("u2").await;
        cache.clear();

        assert_eq!(cache.get_stats().size, 0);
        cache.get_user_profile("u1").await;
        assert_eq!(directory.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_lookup() {
        let directory = Arc::new(ScriptedDirectory {
            delay: Some(Duration::from_millis(100)),
            ..ScriptedDirectory::with(&[("u1", "Alice")])
        });
        let cache = cache_over(&directory);

        let lookups = (0..8).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_user_profile("u1").await })
        });
        for lookup in lookups.collect::<Vec<_>>() {
            assert_eq!(lookup.await.unwrap(), UserProfile::new("Alice"));
        }

        assert_eq!(directory.calls(), 1);
        assert!(cache.gates.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_ids_are_looked_up_independently() {
        let directory = Arc::new(ScriptedDirectory {
            delay: Some(Duration::from_millis(100)),
            ..ScriptedDirectory::with(&[("u1", "Alice"), ("u2", "Bob")])
        });
        let cache = cache_over(&directory);

        let (a, b) = tokio::join!(cache.get_user_profile("u1"), cache.get_user_profile("u2"));
        assert_eq!(a.name, "Alice");
        assert_eq!(b.name, "Bob");
        assert_eq!(directory.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_in_background() {
        let directory = Arc::new(ScriptedDirectory::with(&[("ok", "Olivia")]));
        let cache = cache_over(&directory);
        let sweeper = cache.spawn_sweeper();

        cache.get_user_profile("ok").await;
        cache.get_user_profile("missing").await;

        sleep(Duration::from_secs(121)).await;
        tokio::task::yield_now().await;
        assert_eq!(cache.get_stats().entries, vec!["ok".to_string()]);

        sweeper.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_shutdown() {
        let directory = Arc::new(ScriptedDirectory::default());
        let cache = cache_over(&directory);
        let sweeper = cache.spawn_sweeper();
        sweeper.shutdown().await;

        cache.get_user_profile("missing").await;
        sleep(Duration::from_secs(600)).await;

        // nothing swept it; the expired entry is still held
        assert_eq!(cache.get_stats().size, 1);
        assert_eq!(cache.get_user_profile("missing").await.name, "missing");
        assert_eq!(directory.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_lookups_release_their_gates() {
        let directory = Arc::new(ScriptedDirectory {
            delay: Some(Duration::from_secs(5)),
            ..ScriptedDirectory::default()
        });
        let cache = cache_over(&directory);

        let lookups: Vec<_> = (0..20)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_user_profile(&format!("user-{i}")).await })
            })
            .collect();
        tokio::task::yield_now().await;
        assert_eq!(directory.calls(), 20);
        assert_eq!(cache.gates.lock().unwrap().len(), 20);

        for lookup in lookups {
            lookup.abort();
            assert!(lookup.await.unwrap_err().is_cancelled());
        }

        assert!(cache.gates.lock().unwrap().is_empty());
        assert_eq!(cache.get_stats().size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_leader_does_not_block_waiters() {
        let directory = Arc::new(ScriptedDirectory {
            delay: Some(Duration::from_secs(5)),
            ..ScriptedDirectory::with(&[("u1", "Alice")])
        });
        let cache = cache_over(&directory);

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_user_profile("u1").await })
        };
        tokio::task::yield_now().await;
        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_user_profile("u1").await })
        };
        tokio::task::yield_now().await;

        leader.abort();
        assert!(leader.await.unwrap_err().is_cancelled());
        assert_eq!(waiter.await.unwrap(), UserProfile::new("Alice"));
        assert_eq!(directory.calls(), 2);
        assert!(cache.gates.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_sweep_interval_uses_default() {
        let directory = Arc::new(ScriptedDirectory::default());
        let mut config = ProfileCacheConfig::new("http://localhost");
        config.sweep_interval = Duration::ZERO;
        let cache = UserProfileCache::with_config(&config, Arc::clone(&directory) as Arc<dyn UserDirectory>);

        let sweeper = cache.spawn_sweeper();
        cache.get_user_profile("missing").await;
        tokio::task::yield_now().await;
        assert!(!sweeper.is_finished());

        sleep(DEFAULT_SWEEP_INTERVAL * 2 + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(cache.get_stats().size, 0);
        assert!(!sweeper.is_finished());

        sweeper.shutdown().await;
    }
}

//! User profile cache for the Warren incident-management product.
//!
//! [`UserProfileCache`] resolves user ids into display profiles through a
//! [`UserDirectory`], caching successes for ten minutes and failures (as the
//! raw id) for one minute. [`UserProfileLayer`] attaches the caller's profile
//! to incoming requests.

use axum_core::extract::FromRequestParts;
use http::request::Parts;

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod identity;
pub mod layer;
pub mod profile_cache;
pub mod sweep;

pub use cache::{CacheStats, InMemoryProfileStore, ProfileStore};
pub use config::{ProfileCacheConfig, ProfileCacheConfigProvider};
pub use directory::{HttpUserDirectory, UserDirectory};
pub use error::{ConfigError, DirectoryError, ProfileError};
pub use layer::{UserProfileLayer, UserProfileService};
pub use profile_cache::UserProfileCache;
pub use sweep::SweepHandle;

/// Display profile of a Warren user.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct UserProfile {
    pub name: String,
}

impl UserProfile {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Profile shown when the directory cannot resolve `user_id`.
    #[must_use]
    pub fn fallback(user_id: &str) -> Self {
        Self::new(user_id)
    }
}

impl<S: Sync> FromRequestParts<S> for UserProfile {
    type Rejection = ProfileError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserProfile>()
            .cloned()
            .ok_or(ProfileError::MissingProfile)
    }
}

//! User directory lookups.
//!
//! The cache only needs [`UserDirectory::fetch_profile`]; [`HttpUserDirectory`]
//! implements it against Warren's `/api/users/{id}` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::COOKIE, Client, Url};

use crate::{
    config::ProfileCacheConfigProvider,
    error::{ConfigError, DirectoryError},
    UserProfile,
};

/// Source of authoritative user profiles.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Looks up the profile of `user_id`.
    ///
    /// Any failure (non-success status, transport error, malformed body) is
    /// reported as a [`DirectoryError`].
    async fn fetch_profile(&self, user_id: &str) -> Result<UserProfile, DirectoryError>;
}

/// `UserDirectory` backed by the Warren HTTP API.
#[derive(Debug, Clone)]
pub struct HttpUserDirectory {
    client: Client,
    base_url: Url,
    session_cookie: Option<String>,
}

impl HttpUserDirectory {
    /// Creates a directory client for the given base URL.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::Invalid {
            var: "directory_url",
            value: base_url.to_string(),
        };
        let parsed = Url::parse(base_url).map_err(|_| invalid())?;
        if parsed.cannot_be_a_base() {
            return Err(invalid());
        }

        Ok(Self {
            client: Client::new(),
            base_url: parsed,
            session_cookie: None,
        })
    }

    /// Creates a directory client from a configuration provider.
    pub fn from_config(config: &impl ProfileCacheConfigProvider) -> Result<Self, ConfigError> {
        Self::new(&config.get_directory_url())
    }

    /// Uses a caller-supplied `reqwest::Client`.
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Replaces the client with one that gives up on requests after `timeout`.
    pub fn with_timeout(self, timeout: Duration) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(self.with_client(client))
    }

    /// Sends the given session cookie with every lookup.
    #[must_use]
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    /// Builds `{base}/api/users/{user_id}` with the id encoded as one path segment.
    pub fn profile_url(&self, user_id: &str) -> Result<Url, DirectoryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| DirectoryError::Transport(format!("Directory URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "users", user_id]);
        Ok(url)
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn fetch_profile(&self, user_id: &str) -> Result<UserProfile, DirectoryError> {
        let url = self.profile_url(user_id)?;

        let mut request = self.client.get(url);
        if let Some(cookie) = &self.session_cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(format!("Failed to fetch profile: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status(status));
        }

        response
            .json::<UserProfile>()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))
    }
}

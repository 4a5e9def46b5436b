//! Configuration types and traits for the profile cache.

use std::{env, time::Duration};

use crate::error::ConfigError;

/// Default TTL for profiles resolved by the directory (10 minutes)
pub const DEFAULT_PROFILE_TTL: Duration = Duration::from_secs(600);
/// Default TTL for fallback profiles after a failed lookup (1 minute)
pub const DEFAULT_FALLBACK_TTL: Duration = Duration::from_secs(60);
/// Default interval between expiry sweeps (1 minute)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Default request header carrying the caller's user id
pub const DEFAULT_USER_ID_HEADER: &str = "x-warren-user-id";

/// Trait for providing profile cache configuration.
pub trait ProfileCacheConfigProvider {
    /// Returns the base URL of the user directory, such as `https://warren.example.com`.
    fn get_directory_url(&self) -> String;

    /// Returns the TTL for successfully resolved profiles.
    /// Defaults to 10 minutes if not implemented.
    fn get_profile_ttl(&self) -> Duration {
        DEFAULT_PROFILE_TTL
    }

    /// Returns the TTL for fallback profiles.
    /// Defaults to 1 minute if not implemented.
    fn get_fallback_ttl(&self) -> Duration {
        DEFAULT_FALLBACK_TTL
    }

    /// Returns how often expired entries are swept.
    /// Defaults to 1 minute if not implemented.
    fn get_sweep_interval(&self) -> Duration {
        DEFAULT_SWEEP_INTERVAL
    }

    /// Returns the header the profile layer reads the user id from.
    fn get_user_id_header(&self) -> String {
        DEFAULT_USER_ID_HEADER.to_string()
    }
}

/// Concrete configuration, usually loaded with [`ProfileCacheConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileCacheConfig {
    pub directory_url: String,
    pub profile_ttl: Duration,
    pub fallback_ttl: Duration,
    pub sweep_interval: Duration,
    pub user_id_header: String,
}

impl ProfileCacheConfig {
    /// Creates a configuration with default TTLs for the given directory.
    #[must_use]
    pub fn new(directory_url: impl Into<String>) -> Self {
        Self {
            directory_url: directory_url.into(),
            profile_ttl: DEFAULT_PROFILE_TTL,
            fallback_ttl: DEFAULT_FALLBACK_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            user_id_header: DEFAULT_USER_ID_HEADER.to_string(),
        }
    }

    /// Loads the configuration from the process environment (and `.env` if present).
    ///
    /// `WARREN_DIRECTORY_URL` is required. `WARREN_PROFILE_TTL_SECS`,
    /// `WARREN_PROFILE_FALLBACK_TTL_SECS`, `WARREN_PROFILE_SWEEP_SECS` and
    /// `WARREN_USER_ID_HEADER` override the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let directory_url = env::var("WARREN_DIRECTORY_URL")
            .map_err(|_| ConfigError::Missing("WARREN_DIRECTORY_URL"))?;

        let mut config = Self::new(directory_url);
        if let Some(ttl) = secs_var("WARREN_PROFILE_TTL_SECS")? {
            config.profile_ttl = ttl;
        }
        if let Some(ttl) = secs_var("WARREN_PROFILE_FALLBACK_TTL_SECS")? {
            config.fallback_ttl = ttl;
        }
        if let Some(interval) = secs_var("WARREN_PROFILE_SWEEP_SECS")? {
            config.sweep_interval = interval;
        }
        if let Ok(header) = env::var("WARREN_USER_ID_HEADER") {
            config.user_id_header = header;
        }
        Ok(config)
    }
}

impl ProfileCacheConfigProvider for ProfileCacheConfig {
    fn get_directory_url(&self) -> String {
        self.directory_url.clone()
    }

    fn get_profile_ttl(&self) -> Duration {
        self.profile_ttl
    }

    fn get_fallback_ttl(&self) -> Duration {
        self.fallback_ttl
    }

    fn get_sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    fn get_user_id_header(&self) -> String {
        self.user_id_header.clone()
    }
}

fn secs_var(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(var) {
        Ok(value) => parse_secs(var, &value).map(Some),
        Err(_) => Ok(None),
    }
}

/// Parses a positive whole number of seconds.
fn parse_secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        }),
    }
}

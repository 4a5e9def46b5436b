//! Error types for profile lookups and the profile layer.

use axum_core::{body::Body, response::{IntoResponse, Response}};
use http::StatusCode;

/// Errors from the user directory. The cache absorbs all of them into a fallback profile.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Directory responded with status {0}")]
    Status(StatusCode),
    #[error("Directory request failed: {0}")]
    Transport(String),
    #[error("Failed to decode directory profile: {0}")]
    Decode(String),
}

/// Errors surfaced by the profile layer and extractor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("Missing user id header")]
    MissingUserId,
    #[error("No user profile attached to request")]
    MissingProfile,
}

/// Errors while loading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

impl IntoResponse for ProfileError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::MissingUserId => (StatusCode::UNAUTHORIZED, "Missing user identity"),
            Self::MissingProfile => (StatusCode::INTERNAL_SERVER_ERROR, "User profile unavailable"),
        };

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = status;
        response
    }
}

//! Caller identity extraction.

use axum_core::extract::Request;
use http::HeaderName;

use crate::error::ProfileError;

/// Extracts the caller's user id from the given request header.
///
/// The value is trimmed; a missing, non-UTF-8 or blank header is rejected.
pub fn extract_user_id(req: &Request, header: &HeaderName) -> Result<String, ProfileError> {
    req.headers()
        .get(header)
        .and_then(|val| val.to_str().ok())
        .map(str::trim)
        .filter(|val| !val.is_empty())
        .map(ToString::to_string)
        .ok_or(ProfileError::MissingUserId)
}

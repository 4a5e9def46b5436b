//! Tower layer and service that attach the caller's profile to requests.

use std::{future::Future, pin::Pin};

use axum_core::{extract::Request, response::{IntoResponse, Response}};
use http::HeaderName;
use tower::{BoxError, Layer, Service};

use crate::{
    config::{ProfileCacheConfigProvider, DEFAULT_USER_ID_HEADER},
    error::ConfigError,
    identity::extract_user_id,
    profile_cache::UserProfileCache,
};

/// A layer that resolves the caller's [`UserProfile`](crate::UserProfile).
///
/// It reads the user id from a request header (`x-warren-user-id` unless
/// configured otherwise), resolves it through the [`UserProfileCache`] and
/// inserts the profile into the request extensions. Requests without a user
/// id are answered with `401 Unauthorized`. Directory failures are not
/// errors here: the cache degrades to the raw id.
#[derive(Debug, Clone)]
pub struct UserProfileLayer {
    cache: UserProfileCache,
    header: HeaderName,
}

impl UserProfileLayer {
    /// Creates a layer reading the default user id header.
    #[must_use]
    pub fn new(cache: UserProfileCache) -> Self {
        Self {
            cache,
            header: HeaderName::from_static(DEFAULT_USER_ID_HEADER),
        }
    }

    /// Creates a layer reading the header named by `config`.
    pub fn from_config(
        config: &impl ProfileCacheConfigProvider,
        cache: UserProfileCache,
    ) -> Result<Self, ConfigError> {
        Self::new(cache).with_header(&config.get_user_id_header())
    }

    /// Reads the user id from `header` instead.
    pub fn with_header(mut self, header: &str) -> Result<Self, ConfigError> {
        self.header = HeaderName::from_bytes(header.as_bytes()).map_err(|_| ConfigError::Invalid {
            var: "user_id_header",
            value: header.to_string(),
        })?;
        Ok(self)
    }
}

impl<S> Layer<S> for UserProfileLayer {
    type Service = UserProfileService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserProfileService {
            inner,
            cache: self.cache.clone(),
            header: self.header.clone(),
        }
    }
}

/// Service produced by [`UserProfileLayer`].
#[derive(Debug, Clone)]
pub struct UserProfileService<S> {
    inner: S,
    cache: UserProfileCache,
    header: HeaderName,
}

impl<S> Service<Request> for UserProfileService<S>
where
    S: Service<Request, Response = Response> + Send + 'static + Clone,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let user_id = match extract_user_id(&req, &self.header) {
            Ok(user_id) => user_id,
            Err(err) => {
                return Box::pin(async move { Ok(err.into_response()) });
            }
        };

        let cache = self.cache.clone();
        // the clone may not be ready; drive the one poll_ready was called on
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let profile = cache.get_user_profile(&user_id).await;
            req.extensions_mut().insert(profile);
            inner.call(req).await
        })
    }
}

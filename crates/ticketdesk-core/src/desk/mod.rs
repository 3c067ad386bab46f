//! Typed reads and writes against tenant-scoped resources.
//!
//! Reads go through the [`QueryCache`]: a fresh entry is returned as is,
//! otherwise the resource is fetched with the session's credential, checked
//! against its declared type and cached. Writes are never cached; on success
//! they invalidate the keys listed for them in [`Mutation::invalidates`], on
//! failure they report one normalized, human-readable message.

mod attachments;
mod incidents;
mod tickets;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, ApiRequest, Upload};
use crate::auth::{SessionController, SessionError};
use crate::cache::{CacheKey, Mutation, QueryCache};

#[derive(Error, Debug)]
pub enum DeskError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// A write failed. `message` is safe to show to the user.
    #[error("{message}")]
    Mutation {
        operation: Mutation,
        message: String,
        #[source]
        source: Box<DeskError>,
    },
}

impl DeskError {
    fn api_error(&self) -> Option<&ApiError> {
        match self {
            DeskError::Api(e) | DeskError::Session(SessionError::Api(e)) => Some(e),
            DeskError::Mutation { source, .. } => source.api_error(),
            _ => None,
        }
    }

    /// The response did not match the declared type
    pub fn is_shape_error(&self) -> bool {
        matches!(self.api_error(), Some(ApiError::ShapeValidation(_)))
    }

    /// The session ended (or never started) while serving the request
    pub fn is_signed_out(&self) -> bool {
        let session = match self {
            DeskError::Session(e) => Some(e),
            DeskError::Mutation { source, .. } => match source.as_ref() {
                DeskError::Session(e) => Some(e),
                _ => None,
            },
            _ => None,
        };
        matches!(
            session,
            Some(SessionError::NotAuthenticated | SessionError::SessionExpired(_))
        )
    }
}

/// Message for a failed write: the server's own message when the error
/// payload carries one, else the operation's default.
pub fn failure_message(mutation: Mutation, error: &DeskError) -> String {
    error
        .api_error()
        .and_then(ApiError::server_message)
        .unwrap_or_else(|| mutation.default_error_message().to_string())
}

/// Resource layer handle. Clone is cheap; clones share the session and cache.
#[derive(Clone)]
pub struct Desk {
    session: SessionController,
    cache: Arc<QueryCache>,
}

impl Desk {
    /// Ties the cache to the session: it is cleared whenever the session
    /// ends or changes hands.
    pub fn new(session: SessionController, cache: Arc<QueryCache>) -> Self {
        let hook_cache = Arc::clone(&cache);
        session.on_sign_out(move || hook_cache.clear());
        Self { session, cache }
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Sign out. The sign-out hook drops every cached query.
    pub fn sign_out(&self) {
        self.session.logout();
    }

    async fn fetch(&self, request: &ApiRequest) -> Result<Value, DeskError> {
        let api = self.session.api();
        let data = self
            .session
            .authorized(|token| async move { api.execute(request, &token).await })
            .await?;
        Ok(data)
    }

    /// Cached read
    async fn query<T: DeserializeOwned>(&self, key: CacheKey, request: ApiRequest) -> Result<T, DeskError> {
        if let Some(value) = self.cache.fresh(&key) {
            match ApiClient::parse_data(value) {
                Ok(parsed) => {
                    debug!(key = %key, "Cache hit");
                    return Ok(parsed);
                }
                Err(e) => warn!(key = %key, error = %e, "Discarding cached value of unexpected shape"),
            }
        }

        debug!(key = %key, "Cache miss, fetching");
        let since = self.cache.generation();
        let data = self.fetch(&request).await?;
        let parsed = ApiClient::parse_data(data.clone())?;
        self.cache.insert_fetched(key, data, since);
        Ok(parsed)
    }

    fn fail(&self, mutation: Mutation, error: DeskError) -> DeskError {
        let message = failure_message(mutation, &error);
        warn!(operation = %mutation, error = %error, "Mutation failed");
        DeskError::Mutation {
            operation: mutation,
            message,
            source: Box::new(error),
        }
    }

    fn settle(&self, mutation: Mutation, tenant: &str, id: Option<&str>) {
        let keys = mutation.invalidates(tenant, id);
        let marked = self.cache.invalidate_all(&keys);
        info!(operation = %mutation, tenant, keys = keys.len(), marked, "Mutation succeeded");
    }

    /// Uncached write. The server has accepted the change once a response
    /// arrives, so invalidation happens before the response is checked.
    async fn mutate<T: DeserializeOwned>(
        &self,
        mutation: Mutation,
        tenant: &str,
        id: Option<&str>,
        request: ApiRequest,
    ) -> Result<T, DeskError> {
        let data = match self.fetch(&request).await {
            Ok(data) => data,
            Err(e) => return Err(self.fail(mutation, e)),
        };
        self.settle(mutation, tenant, id);
        ApiClient::parse_data(data).map_err(|e| self.fail(mutation, e.into()))
    }

    async fn mutate_upload<T: DeserializeOwned>(
        &self,
        mutation: Mutation,
        tenant: &str,
        id: Option<&str>,
        path: &str,
        upload: &Upload,
    ) -> Result<T, DeskError> {
        let api = self.session.api();
        let data = match self
            .session
            .authorized(|token| async move { api.upload(path, upload, &token).await })
            .await
        {
            Ok(data) => data,
            Err(e) => return Err(self.fail(mutation, e.into())),
        };
        self.settle(mutation, tenant, id);
        ApiClient::parse_data(data).map_err(|e| self.fail(mutation, e.into()))
    }
}

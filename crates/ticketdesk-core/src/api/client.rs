//! HTTP client for the ticketdesk REST backend.
//!
//! Every response is wrapped as `{ "success": bool, "data": T }`. This module
//! unwraps the envelope, maps failures to [`ApiError`], and checks `data`
//! against the caller's declared type. Credentials are passed in per call;
//! deciding which credential to use is the session controller's job.

use std::time::Duration;

use reqwest::{multipart, Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::User;

use super::error::ErrorBody;
use super::ApiError;

/// HTTP request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Payload of a successful login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshData {
    access_token: String,
}

/// A replayable request against a resource endpoint
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }
}

/// File upload for a multipart endpoint. Rebuilt on every attempt since
/// multipart forms are single-use.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    fn form(&self) -> Result<multipart::Form, ApiError> {
        let part = multipart::Part::bytes(self.bytes.clone())
            .file_name(self.filename.clone())
            .mime_str(&self.content_type)?;
        Ok(multipart::Form::new().part("file", part))
    }
}

/// API client for the ticketdesk backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Unwrap `{success, data}`. `success: false` is a rejection even on 2xx.
    async fn unwrap_envelope(response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status().as_u16();
        let text = response.text().await?;
        let envelope: Envelope = serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Missing response envelope: {}", e)))?;

        if !envelope.success {
            return Err(ApiError::Rejected {
                status,
                body: ErrorBody::new(&text),
            });
        }
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    /// Validate `data` against the declared type
    pub fn parse_data<T: DeserializeOwned>(data: Value) -> Result<T, ApiError> {
        serde_json::from_value(data).map_err(|e| ApiError::ShapeValidation(e.to_string()))
    }

    /// Send a request, backing off on 429. Returns the unwrapped `data`.
    async fn send<F>(&self, url: &str, build: F) -> Result<Value, ApiError>
    where
        F: Fn() -> Result<reqwest::RequestBuilder, ApiError>,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build()?.send().await?;

            if response.status().as_u16() == 429 {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            let response = Self::check_response(response).await?;
            return Self::unwrap_envelope(response).await;
        }
    }

    // ===== Authentication =====

    /// Exchange email/password for a credential pair and user record
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginData, ApiError> {
        let url = self.url("/auth/login");
        let body = LoginRequest { email, password };
        let data = self
            .send(&url, || Ok(self.client.post(&url).json(&body)))
            .await?;
        Self::parse_data(data)
    }

    /// Exchange a refresh credential for a new access credential
    pub async fn refresh_access(&self, refresh_token: &str) -> Result<String, ApiError> {
        let url = self.url("/auth/refresh");
        let body = RefreshRequest { refresh_token };
        let data = self
            .send(&url, || Ok(self.client.post(&url).json(&body)))
            .await?;
        let refreshed: RefreshData = Self::parse_data(data)?;
        Ok(refreshed.access_token)
    }

    /// Fetch the user record for an access credential
    pub async fn me(&self, access_token: &str) -> Result<User, ApiError> {
        let url = self.url("/auth/me");
        let data = self
            .send(&url, || Ok(self.client.get(&url).bearer_auth(access_token)))
            .await?;
        Self::parse_data(data)
    }

    // ===== Resources =====

    /// Execute a resource request with the given access credential
    pub async fn execute(&self, request: &ApiRequest, access_token: &str) -> Result<Value, ApiError> {
        let url = self.url(&request.path);
        debug!(method = %request.method, path = %request.path, "API request");

        self.send(&url, || {
            let mut builder = self
                .client
                .request(request.method.clone(), &url)
                .bearer_auth(access_token);
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if let Some(ref body) = request.body {
                builder = builder.json(body);
            }
            Ok(builder)
        })
        .await
    }

    /// Upload a file as multipart form data
    pub async fn upload(&self, path: &str, upload: &Upload, access_token: &str) -> Result<Value, ApiError> {
        let url = self.url(path);
        debug!(path = %path, filename = %upload.filename, size = upload.bytes.len(), "API upload");

        self.send(&url, || {
            Ok(self
                .client
                .post(&url)
                .bearer_auth(access_token)
                .multipart(upload.form()?))
        })
        .await
    }
}

//! Credential persistence across two storage surfaces.
//!
//! The access/refresh pair is written to a request-visible surface (the
//! cookie jar, readable by the route guard) and mirrored to a client-only
//! surface (the OS keychain). Reads prefer the request-visible copy. The
//! store never inspects claims; validity is the codec's job.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::User;

/// Keychain service name
pub const SERVICE_NAME: &str = "ticketdesk";

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";

/// A key/value location credentials can be persisted to.
pub trait StorageSurface: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &'static str;

    /// Store `value` under `key`. `ttl` is advisory; surfaces without
    /// expiry support ignore it.
    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Whether credentials are mirrored to the client-only surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// Write credentials to both surfaces
    #[default]
    Dual,
    /// Credentials only live in http-only cookies; nothing is mirrored
    RequestVisibleOnly,
}

const DEFAULT_ACCESS_TTL_HOURS: i64 = 24;
const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialPolicy {
    pub mode: PersistenceMode,
    pub secure_cookies: bool,
    pub access_ttl_hours: i64,
    pub refresh_ttl_days: i64,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            mode: PersistenceMode::Dual,
            secure_cookies: false,
            access_ttl_hours: DEFAULT_ACCESS_TTL_HOURS,
            refresh_ttl_days: DEFAULT_REFRESH_TTL_DAYS,
        }
    }
}

impl CredentialPolicy {
    /// Cookie lifetime of the access credential. Out-of-range settings fall
    /// back to the default rather than failing.
    pub fn access_ttl(&self) -> Duration {
        Duration::try_hours(self.access_ttl_hours)
            .unwrap_or_else(|| Duration::hours(DEFAULT_ACCESS_TTL_HOURS))
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::try_days(self.refresh_ttl_days)
            .unwrap_or_else(|| Duration::days(DEFAULT_REFRESH_TTL_DAYS))
    }

    pub fn cookie_flags(&self) -> super::cookies::CookieFlags {
        super::cookies::CookieFlags {
            secure: self.secure_cookies,
            http_only: self.mode == PersistenceMode::RequestVisibleOnly,
        }
    }
}

/// Client-only surface backed by the OS keychain
pub struct KeyringSurface {
    service: String,
}

impl KeyringSurface {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl Default for KeyringSurface {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl StorageSurface for KeyringSurface {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn put(&self, key: &str, value: &str, _ttl: Option<Duration>) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store value in keychain")
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve value from keychain"),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete value from keychain"),
        }
    }
}

/// Process-local surface, for tests and throwaway sessions
#[derive(Default)]
pub struct MemorySurface {
    entries: RwLock<HashMap<String, (String, Option<DateTime<Utc>>)>>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageSurface for MemorySurface {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.and_then(|ttl| Utc::now().checked_add_signed(ttl));
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Utc::now();
        let entries = self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries
            .get(key)
            .filter(|(_, exp)| exp.map_or(true, |exp| exp > now))
            .map(|(value, _)| value.clone()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
        Ok(())
    }
}

/// One logical credential store over two physical surfaces.
///
/// Every `set_*` is best-effort: a failing surface is logged and skipped,
/// never reported to the caller.
pub struct CredentialStore {
    request_visible: Arc<dyn StorageSurface>,
    client_only: Arc<dyn StorageSurface>,
    policy: CredentialPolicy,
}

impl CredentialStore {
    pub fn new(
        request_visible: Arc<dyn StorageSurface>,
        client_only: Arc<dyn StorageSurface>,
        policy: CredentialPolicy,
    ) -> Self {
        Self {
            request_visible,
            client_only,
            policy,
        }
    }

    /// Store backed by two in-memory surfaces
    pub fn in_memory(policy: CredentialPolicy) -> Self {
        Self::new(
            Arc::new(MemorySurface::new()),
            Arc::new(MemorySurface::new()),
            policy,
        )
    }

    pub fn policy(&self) -> &CredentialPolicy {
        &self.policy
    }

    fn mirrors(&self) -> bool {
        self.policy.mode == PersistenceMode::Dual
    }

    fn write(&self, key: &str, value: &str, ttl: Duration) {
        let mut persisted = false;

        match self.request_visible.put(key, value, Some(ttl)) {
            Ok(()) => persisted = true,
            Err(e) => warn!(surface = self.request_visible.name(), key, error = %e, "Failed to persist credential"),
        }

        if self.mirrors() {
            match self.client_only.put(key, value, None) {
                Ok(()) => persisted = true,
                Err(e) => warn!(surface = self.client_only.name(), key, error = %e, "Client-only surface unavailable, continuing without it"),
            }
        }

        if !persisted {
            warn!(key, "Credential was not persisted to any surface");
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.request_visible.get(key) {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(e) => warn!(surface = self.request_visible.name(), key, error = %e, "Failed to read credential"),
        }

        if !self.mirrors() {
            return None;
        }

        match self.client_only.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(surface = self.client_only.name(), key, error = %e, "Failed to read credential");
                None
            }
        }
    }

    pub fn set_access(&self, token: &str) {
        self.write(ACCESS_TOKEN_KEY, token, self.policy.access_ttl());
    }

    pub fn access(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY)
    }

    /// Presence of an access credential on the request-visible surface only
    pub fn has_request_visible_access(&self) -> bool {
        matches!(self.request_visible.get(ACCESS_TOKEN_KEY), Ok(Some(ref v)) if !v.is_empty())
    }

    pub fn set_refresh(&self, token: &str) {
        self.write(REFRESH_TOKEN_KEY, token, self.policy.refresh_ttl());
    }

    pub fn refresh(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    /// Cache the user record on the client-only surface, falling back to the
    /// request-visible one (base64url-wrapped to stay cookie-safe).
    pub fn set_user(&self, user: &User) {
        let json = match serde_json::to_string(user) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize user record");
                return;
            }
        };

        match self.client_only.put(USER_KEY, &json, None) {
            Ok(()) => {}
            Err(e) => {
                warn!(surface = self.client_only.name(), error = %e, "Falling back to request-visible surface for user record");
                let wrapped = URL_SAFE_NO_PAD.encode(json.as_bytes());
                if let Err(e) = self.request_visible.put(USER_KEY, &wrapped, Some(self.policy.access_ttl())) {
                    warn!(surface = self.request_visible.name(), error = %e, "User record was not persisted");
                }
            }
        }
    }

    pub fn user(&self) -> Option<User> {
        let json = match self.client_only.get(USER_KEY) {
            Ok(Some(json)) => Some(json),
            Ok(None) => None,
            Err(e) => {
                debug!(surface = self.client_only.name(), error = %e, "Failed to read user record");
                None
            }
        }
        .or_else(|| {
            let wrapped = self.request_visible.get(USER_KEY).ok().flatten()?;
            let bytes = URL_SAFE_NO_PAD.decode(wrapped).ok()?;
            String::from_utf8(bytes).ok()
        })?;

        match serde_json::from_str(&json) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable user record");
                None
            }
        }
    }

    /// Remove the credential pair and user record from both surfaces
    pub fn clear(&self) {
        for surface in [&self.request_visible, &self.client_only] {
            for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY] {
                if let Err(e) = surface.remove(key) {
                    warn!(surface = surface.name(), key, error = %e, "Failed to clear stored value");
                }
            }
        }
        debug!("Credential store cleared");
    }
}

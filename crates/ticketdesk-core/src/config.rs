//! Application configuration management.
//!
//! Holds the backend URL, credential persistence policy, route guard paths
//! and timing knobs, plus the last used email and tenant.
//!
//! Configuration is stored at `~/.config/ticketdesk/config.json`. Environment
//! variables (`TICKETDESK_API_URL`, `TICKETDESK_TENANT`) override the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::ApiClient;
use crate::auth::cookies::{CookieJar, COOKIE_FILE};
use crate::auth::{CredentialPolicy, CredentialStore, KeyringSurface, RouteGuard, SessionController};
use crate::cache::QueryCache;
use crate::desk::Desk;

/// Application name used for config/data directory paths
const APP_NAME: &str = "ticketdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_URL: &str = "http://localhost:8000/api";

pub const ENV_API_URL: &str = "TICKETDESK_API_URL";
pub const ENV_TENANT: &str = "TICKETDESK_TENANT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    /// Refresh the access credential this many seconds before it expires
    pub refresh_buffer_secs: i64,
    /// Cached queries go stale after this many seconds
    pub query_stale_secs: i64,
    pub credentials: CredentialPolicy,
    pub guard: RouteGuard,
    pub last_email: Option<String>,
    pub default_tenant: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: crate::api::client::DEFAULT_TIMEOUT_SECS,
            refresh_buffer_secs: crate::auth::token::DEFAULT_REFRESH_BUFFER_SECS,
            query_stale_secs: crate::cache::manager::DEFAULT_STALE_SECS,
            credentials: CredentialPolicy::default(),
            guard: RouteGuard::default(),
            last_email: None,
            default_tenant: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in practice)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(tenant) = lookup(ENV_TENANT).filter(|v| !v.trim().is_empty()) {
            self.default_tenant = Some(tenant);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.api_base_url, self.request_timeout()).context("Failed to build HTTP client")
    }

    /// Credential store over the on-disk cookie jar and the OS keychain
    pub fn credential_store(&self) -> Result<CredentialStore> {
        let jar_path = self.data_dir()?.join(COOKIE_FILE);
        let jar = match CookieJar::open(&jar_path, self.credentials.cookie_flags()) {
            Ok(jar) => jar,
            Err(e) => {
                // An unreadable jar means no credentials, not a dead app
                warn!(error = %e, "Starting with an empty cookie jar");
                std::fs::remove_file(&jar_path).ok();
                CookieJar::open(&jar_path, self.credentials.cookie_flags())?
            }
        };
        Ok(CredentialStore::new(
            Arc::new(jar),
            Arc::new(KeyringSurface::default()),
            self.credentials.clone(),
        ))
    }

    pub fn query_cache(&self) -> QueryCache {
        let stale_after = chrono::Duration::try_seconds(self.query_stale_secs)
            .unwrap_or_else(|| chrono::Duration::seconds(crate::cache::manager::DEFAULT_STALE_SECS));
        QueryCache::new(stale_after)
    }

    /// Wire up a session controller and resource layer from this configuration
    pub fn desk(&self, store: Arc<CredentialStore>) -> Result<Desk> {
        let session = SessionController::new(self.api_client()?, store, self.refresh_buffer_secs);
        Ok(Desk::new(session, Arc::new(self.query_cache())))
    }
}

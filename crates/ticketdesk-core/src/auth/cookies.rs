//! Request-visible credential surface.
//!
//! A small cookie jar persisted as JSON. Entries carry their own expiry and
//! the `secure`/`http_only` flags they would be delivered with, and the jar
//! renders itself as a `Cookie:` header so a request-time guard can inspect
//! it before anything else has loaded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::credentials::StorageSurface;

/// Cookie jar file name in the data directory
pub const COOKIE_FILE: &str = "cookies.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CookieFlags {
    pub secure: bool,
    pub http_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl Cookie {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |exp| exp <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

pub struct CookieJar {
    path: Option<PathBuf>,
    flags: CookieFlags,
    cookies: RwLock<BTreeMap<String, Cookie>>,
}

impl CookieJar {
    /// Jar that lives only as long as the process
    pub fn in_memory(flags: CookieFlags) -> Self {
        Self {
            path: None,
            flags,
            cookies: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open (or start) a jar persisted at `path`. Expired entries are dropped on load.
    pub fn open(path: impl Into<PathBuf>, flags: CookieFlags) -> Result<Self> {
        let path = path.into();
        let mut cookies: BTreeMap<String, Cookie> = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read cookie jar: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse cookie jar: {}", path.display()))?
        } else {
            BTreeMap::new()
        };

        let now = Utc::now();
        cookies.retain(|_, c| !c.is_expired_at(now));
        debug!(path = %path.display(), count = cookies.len(), "Cookie jar loaded");

        Ok(Self {
            path: Some(path),
            flags,
            cookies: RwLock::new(cookies),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Cookie>> {
        self.cookies.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Cookie>> {
        self.cookies.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, cookies: &BTreeMap<String, Cookie>) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(cookies)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write cookie jar: {}", path.display()))?;
        Ok(())
    }

    /// Live cookie by name
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        self.read().get(name).filter(|c| !c.is_expired()).cloned()
    }

    /// Render the live cookies as a `Cookie:` header value
    pub fn header_value(&self) -> String {
        let now = Utc::now();
        self.read()
            .values()
            .filter(|c| !c.is_expired_at(now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl StorageSurface for CookieJar {
    fn name(&self) -> &'static str {
        "cookie"
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let cookie = Cookie {
            name: key.to_string(),
            value: value.to_string(),
            expires_at: ttl.and_then(|ttl| Utc::now().checked_add_signed(ttl)),
            secure: self.flags.secure,
            http_only: self.flags.http_only,
        };
        let mut cookies = self.write();
        cookies.insert(key.to_string(), cookie);
        self.persist(&cookies)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cookie(key).map(|c| c.value))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut cookies = self.write();
        if cookies.remove(key).is_some() {
            self.persist(&cookies)?;
        }
        Ok(())
    }
}

/// Split a `Cookie:` header into `(name, value)` pairs
pub fn parse_cookie_header(header: &str) -> impl Iterator<Item = (&str, &str)> {
    header.split(';').filter_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        Some((name.trim(), value.trim()))
    })
}

//! Request-time route guard.
//!
//! Runs before anything has hydrated, so it only looks at whether an access
//! credential is present. It never decodes the credential and never touches
//! the network.

use serde::{Deserialize, Serialize};

use super::cookies::parse_cookie_header;
use super::credentials::ACCESS_TOKEN_KEY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardAction {
    Allow,
    Redirect(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteGuard {
    /// Paths under these prefixes require an access credential
    pub protected_prefixes: Vec<String>,
    /// Unauthenticated entry point
    pub login_path: String,
    /// Where a signed-in user visiting the login page is sent
    pub landing_path: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self {
            protected_prefixes: vec!["/dashboard".to_string()],
            login_path: "/login".to_string(),
            landing_path: "/dashboard".to_string(),
        }
    }
}

impl RouteGuard {
    /// Matches on segment boundaries: `/dashboard` covers `/dashboard` and
    /// `/dashboard/x` but not `/dashboards`.
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_prefixes.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            match path.strip_prefix(prefix) {
                Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.is_empty(),
                None => false,
            }
        })
    }

    pub fn decide(&self, path: &str, has_access_credential: bool) -> GuardAction {
        if !has_access_credential && self.is_protected(path) {
            return GuardAction::Redirect(self.login_path.clone());
        }
        if has_access_credential && path == self.login_path {
            return GuardAction::Redirect(self.landing_path.clone());
        }
        GuardAction::Allow
    }

    /// Decide from a raw `Cookie:` header
    pub fn decide_request(&self, path: &str, cookie_header: Option<&str>) -> GuardAction {
        let has_access = cookie_header.map_or(false, has_access_cookie);
        self.decide(path, has_access)
    }
}

/// True when the header carries a non-empty `access_token` cookie
pub fn has_access_cookie(cookie_header: &str) -> bool {
    parse_cookie_header(cookie_header).any(|(name, value)| name == ACCESS_TOKEN_KEY && !value.is_empty())
}

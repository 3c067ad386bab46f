//! Authentication module for credentials and session lifecycle.
//!
//! This module provides:
//! - `token`: Credential decoding and expiry checks (no signature verification)
//! - `CredentialStore`: Access/refresh credentials over a request-visible
//!   cookie jar and a client-only keychain surface
//! - `RouteGuard`: Request-time redirect decision from credential presence
//! - `SessionController`: Boot, login, logout and single-flight refresh
//!
//! Access credentials are refreshed five minutes before they expire.

pub mod cookies;
pub mod credentials;
pub mod guard;
pub mod session;
pub mod token;

pub use cookies::{Cookie, CookieFlags, CookieJar};
pub use credentials::{
    CredentialPolicy, CredentialStore, KeyringSurface, MemorySurface, PersistenceMode, StorageSurface,
};
pub use guard::{GuardAction, RouteGuard};
pub use session::{Session, SessionController, SessionError, SessionState};
pub use token::Claims;

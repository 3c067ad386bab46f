//! Core library for ticketdesk, a multi-tenant support ticketing console.
//!
//! - [`auth`]: credential codec, dual-surface credential store, route guard
//!   and the session controller
//! - [`api`]: REST client for the authentication and resource endpoints
//! - [`cache`]: query cache and the write → invalidation table
//! - [`desk`]: typed ticket, attachment and incident operations
//! - [`models`]: records exchanged with the backend
//! - [`config`]: persisted configuration and wiring

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod desk;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{CredentialStore, GuardAction, RouteGuard, Session, SessionController, SessionError, SessionState};
pub use cache::{CacheKey, Mutation, QueryCache, ResourceKind};
pub use config::Config;
pub use desk::{Desk, DeskError};

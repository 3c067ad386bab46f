//! REST API client module for the ticketdesk backend.
//!
//! This module provides the `ApiClient` for the authentication endpoints
//! (`/auth/login`, `/auth/refresh`, `/auth/me`) and for tenant-scoped
//! resource endpoints of the shape `/{tenant}/{kind}[/{id}][/{action}]`.
//!
//! Requests carry a bearer access credential supplied by the caller.

pub mod client;
pub mod error;

pub use client::{ApiClient, ApiRequest, LoginData, Upload};
pub use error::{ApiError, ErrorBody};

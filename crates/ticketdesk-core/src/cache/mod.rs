//! Query cache for server state.
//!
//! This module provides the `QueryCache` holding validated read results and
//! the `Mutation` table that says which entries each write makes stale.
//! Entries are considered stale after 5 minutes or once invalidated.
//!
//! Cached resource kinds:
//! - Ticket lists and ticket details
//! - Attachment lists per ticket
//! - Engineers available for assignment
//! - Incident report lists and details

pub mod invalidation;
pub mod manager;

pub use invalidation::Mutation;
pub use manager::{CacheKey, CachedData, Generation, QueryCache, ResourceKind};

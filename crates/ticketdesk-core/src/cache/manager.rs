use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Consider a cached query stale after 5 minutes
pub const DEFAULT_STALE_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Tickets,
    Ticket,
    Attachments,
    Engineers,
    Incidents,
    Incident,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Tickets => "tickets",
            ResourceKind::Ticket => "ticket",
            ResourceKind::Attachments => "attachments",
            ResourceKind::Engineers => "engineers",
            ResourceKind::Incidents => "incidents",
            ResourceKind::Incident => "incident",
        }
    }
}

/// Identifies one cached fragment of server state.
///
/// `id` is the resource id for detail kinds, the owning ticket for
/// attachments, and the filter for list kinds. A key without `id` used as an
/// invalidation target covers every id of that kind and tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub kind: ResourceKind,
    pub tenant: String,
    pub id: Option<String>,
}

impl CacheKey {
    pub fn new(kind: ResourceKind, tenant: impl Into<String>) -> Self {
        Self {
            kind,
            tenant: tenant.into(),
            id: None,
        }
    }

    pub fn with_id(kind: ResourceKind, tenant: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind,
            tenant: tenant.into(),
            id: Some(id.into()),
        }
    }

    /// Whether invalidating `self` must also invalidate `other`
    pub fn covers(&self, other: &CacheKey) -> bool {
        self.kind == other.kind
            && self.tenant == other.tenant
            && (self.id.is_none() || self.id == other.id)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(ref id) => write!(f, "{}/{}/{}", self.kind.as_str(), self.tenant, id),
            None => write!(f, "{}/{}", self.kind.as_str(), self.tenant),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    /// Set by invalidation; the entry is kept for display until refetched
    #[serde(default)]
    pub invalidated: bool,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
            invalidated: false,
        }
    }

    pub fn is_stale(&self, stale_after: Duration) -> bool {
        self.invalidated || Utc::now() - self.cached_at > stale_after
    }
}

/// Position in the cache's invalidation history. Taken before a fetch
/// starts so the result can be checked against writes that landed meanwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

#[derive(Default)]
struct State {
    entries: HashMap<CacheKey, CachedData<Value>>,
    generation: u64,
    /// Generation at which each invalidation target was last applied
    invalidated_at: HashMap<CacheKey, u64>,
    cleared_at: u64,
}

/// In-memory cache of validated query results, keyed by [`CacheKey`].
///
/// Values are stored as JSON so one cache can hold every resource type;
/// they were checked against their declared type before being inserted.
pub struct QueryCache {
    stale_after: Duration,
    state: RwLock<State>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_STALE_SECS))
    }
}

impl QueryCache {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            state: RwLock::new(State::default()),
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached value if present and not stale
    pub fn fresh(&self, key: &CacheKey) -> Option<Value> {
        self.read()
            .entries
            .get(key)
            .filter(|cached| !cached.is_stale(self.stale_after))
            .map(|cached| cached.data.clone())
    }

    /// Cached entry regardless of staleness, e.g. to show while refetching
    pub fn entry(&self, key: &CacheKey) -> Option<CachedData<Value>> {
        self.read().entries.get(key).cloned()
    }

    pub fn is_fresh(&self, key: &CacheKey) -> bool {
        self.read()
            .entries
            .get(key)
            .map_or(false, |cached| !cached.is_stale(self.stale_after))
    }

    pub fn generation(&self) -> Generation {
        Generation(self.read().generation)
    }

    pub fn insert(&self, key: CacheKey, data: Value) {
        debug!(key = %key, "Caching query result");
        self.write().entries.insert(key, CachedData::new(data));
    }

    /// Cache the result of a fetch that started at `since`.
    ///
    /// If an invalidation covering `key` ran while the fetch was in flight,
    /// the result predates that write and is stored already stale. If the
    /// cache was cleared meanwhile it is dropped. Returns whether the entry
    /// was stored fresh.
    pub fn insert_fetched(&self, key: CacheKey, data: Value, since: Generation) -> bool {
        let mut guard = self.write();
        let state = &mut *guard;

        if state.cleared_at > since.0 {
            debug!(key = %key, "Cache cleared during fetch, dropping result");
            return false;
        }

        let superseded = state
            .invalidated_at
            .iter()
            .any(|(target, at)| *at > since.0 && target.covers(&key));

        let mut cached = CachedData::new(data);
        cached.invalidated = superseded;
        if superseded {
            debug!(key = %key, "Write landed during fetch, caching result as stale");
        } else {
            debug!(key = %key, "Caching query result");
        }
        state.entries.insert(key, cached);
        !superseded
    }

    /// Mark every entry covered by `target` stale. Returns how many were marked.
    pub fn invalidate(&self, target: &CacheKey) -> usize {
        let mut guard = self.write();
        let state = &mut *guard;

        state.generation += 1;
        state.invalidated_at.insert(target.clone(), state.generation);

        let mut marked = 0;
        for (key, cached) in state.entries.iter_mut() {
            if target.covers(key) {
                cached.invalidated = true;
                marked += 1;
            }
        }
        debug!(target = %target, marked, "Invalidated cache entries");
        marked
    }

    pub fn invalidate_all<'a>(&self, targets: impl IntoIterator<Item = &'a CacheKey>) -> usize {
        targets.into_iter().map(|target| self.invalidate(target)).sum()
    }

    /// Drop everything, e.g. when the signed-in user changes. Fetches still
    /// in flight will not repopulate the cache.
    pub fn clear(&self) {
        let mut guard = self.write();
        let state = &mut *guard;

        state.generation += 1;
        state.cleared_at = state.generation;
        state.entries.clear();
        state.invalidated_at.clear();
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }
}

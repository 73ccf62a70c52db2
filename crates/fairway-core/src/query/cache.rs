//! Read-through query cache with single-flight fetches.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::Result;

/// Entries older than this are refetched.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Family of query keys invalidated together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheScope {
    Courses,
    CourseDetail,
    Visits,
    VisitedCourses,
    Wishlist,
    Stats,
    PublicProfile,
    Suggestions,
}

impl CacheScope {
    pub const ALL: [Self; 8] = [
        Self::Courses,
        Self::CourseDetail,
        Self::Visits,
        Self::VisitedCourses,
        Self::Wishlist,
        Self::Stats,
        Self::PublicProfile,
        Self::Suggestions,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Courses => "courses",
            Self::CourseDetail => "course-detail",
            Self::Visits => "visits",
            Self::VisitedCourses => "visited-courses",
            Self::Wishlist => "wishlist",
            Self::Stats => "stats",
            Self::PublicProfile => "public-profile",
            Self::Suggestions => "suggestions",
        }
    }
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scope plus the rendered request parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub scope: CacheScope,
    pub params: String,
}

impl QueryKey {
    pub fn new(scope: CacheScope, params: impl Into<String>) -> Self {
        Self {
            scope,
            params: params.into(),
        }
    }

    /// Key whose parameters are the JSON encoding of `params`.
    pub fn with_params<P: serde::Serialize>(scope: CacheScope, params: &P) -> Result<Self> {
        Ok(Self::new(scope, serde_json::to_string(params)?))
    }
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    fetched_at: Instant,
}

#[derive(Default)]
struct Entries {
    values: HashMap<QueryKey, CacheEntry>,
    /// Bumped on every invalidation of a scope
    generations: HashMap<CacheScope, u64>,
}

impl Entries {
    fn generation(&self, scope: CacheScope) -> u64 {
        self.generations.get(&scope).copied().unwrap_or_default()
    }

    fn invalidate(&mut self, scopes: &[CacheScope]) {
        self.values.retain(|key, _| !scopes.contains(&key.scope));
        for scope in scopes {
            *self.generations.entry(*scope).or_default() += 1;
        }
    }
}

type Gate = Arc<tokio::sync::Mutex<()>>;

/// A gate borrowed for one fetch; the last holder removes it from the map.
struct GateLease<'a> {
    cache: &'a QueryCache,
    key: QueryKey,
    gate: Gate,
}

impl Drop for GateLease<'_> {
    fn drop(&mut self) {
        let mut gates = self.cache.gates();
        // One reference in the map plus ours
        if Arc::strong_count(&self.gate) <= 2 {
            gates.remove(&self.key);
        }
    }
}

/// Values keyed by [`QueryKey`], each shared until stale or invalidated.
///
/// Concurrent misses for the same key wait on one gate so only the first
/// caller runs the fetch. A fetch that overlaps an invalidation of its scope
/// returns its value but does not cache it.
pub struct QueryCache {
    entries: Mutex<Entries>,
    gates: Mutex<HashMap<QueryKey, Gate>>,
    stale_after: Duration,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}

impl QueryCache {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            gates: Mutex::new(HashMap::new()),
            stale_after,
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gates(&self) -> MutexGuard<'_, HashMap<QueryKey, Gate>> {
        self.gates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lease(&self, key: &QueryKey) -> GateLease<'_> {
        let gate = self.gates().entry(key.clone()).or_default().clone();
        GateLease {
            cache: self,
            key: key.clone(),
            gate,
        }
    }

    /// Fresh cached value for `key`, if any.
    pub fn get<T>(&self, key: &QueryKey) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entries = self.entries();
        let entry = entries.values.get(key)?;
        if entry.fetched_at.elapsed() >= self.stale_after {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    pub fn insert<T>(&self, key: QueryKey, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.entries().values.insert(
            key,
            CacheEntry {
                value: Arc::new(value),
                fetched_at: Instant::now(),
            },
        );
    }

    /// Store `value` unless its scope was invalidated after `generation`.
    fn insert_if_current<T>(&self, key: QueryKey, generation: u64, value: T) -> bool
    where
        T: Send + Sync + 'static,
    {
        let mut entries = self.entries();
        if entries.generation(key.scope) != generation {
            return false;
        }
        entries.values.insert(
            key,
            CacheEntry {
                value: Arc::new(value),
                fetched_at: Instant::now(),
            },
        );
        true
    }

    /// Return the cached value or run `fetch` once for all concurrent callers.
    ///
    /// Failed fetches are not cached.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: QueryKey, fetch: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get::<T>(&key) {
            return Ok(value);
        }

        let lease = self.lease(&key);
        let _guard = lease.gate.lock().await;
        if let Some(value) = self.get::<T>(&key) {
            tracing::debug!("Query {}:{} served by a concurrent fetch", key.scope, key.params);
            return Ok(value);
        }

        let generation = self.entries().generation(key.scope);
        let value = fetch().await?;
        if !self.insert_if_current(key.clone(), generation, value.clone()) {
            tracing::debug!("Query {}:{} invalidated mid-fetch; not cached", key.scope, key.params);
        }
        Ok(value)
    }

    /// Drop every entry in `scope`.
    pub fn invalidate(&self, scope: CacheScope) {
        self.entries().invalidate(&[scope]);
    }

    pub fn invalidate_scopes(&self, scopes: &[CacheScope]) {
        self.entries().invalidate(scopes);
    }

    pub fn invalidate_all(&self) {
        self.entries().invalidate(&CacheScope::ALL);
    }

    pub fn len(&self) -> usize {
        self.entries().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().values.is_empty()
    }

    /// Keys with a fetch in flight or waiting to start
    pub fn pending_fetches(&self) -> usize {
        self.gates().len()
    }
}

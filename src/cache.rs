//! Keyed, per-domain cache with freshness rules and single-flight loading.
//!
//! Each key owns a slot holding at most one [`CacheEntry`]. Reading a slot,
//! deciding whether it is fresh, fetching and writing the replacement all
//! happen under the slot's async mutex, so concurrent callers for one key
//! share a single upstream fetch while distinct keys load independently.
//!
//! Entries are replaced wholesale: readers hold an `Arc` to the value they
//! were given and never observe a partially written one.
//!
//! # Invalidation and in-flight fetches
//!
//! [`KeyedCache::invalidate_all`] drops every slot from the index without
//! fetching anything. A fetch already running keeps its (now detached) slot:
//! its own caller and any callers queued on that slot still receive the
//! result, but the write lands in the detached slot and is discarded. The
//! next lookup for the key creates a fresh slot and fetches again.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::entities::{AvailabilityKey, TermKey};
use crate::error::{FetchError, FetchResult, RegistrarError, Result};
use crate::metrics::{get_metrics, Metrics};

/// Data domains held by the records service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheDomain {
    /// Grade records together with the GPA summary derived with them.
    Grades,
    Terms,
    CurrentTerm,
    Buildings,
    TermFirstDay,
    ClassroomAvailability,
}

impl CacheDomain {
    pub const ALL: [CacheDomain; 6] = [
        CacheDomain::Grades,
        CacheDomain::Terms,
        CacheDomain::CurrentTerm,
        CacheDomain::Buildings,
        CacheDomain::TermFirstDay,
        CacheDomain::ClassroomAvailability,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grades => "grades",
            Self::Terms => "terms",
            Self::CurrentTerm => "current_term",
            Self::Buildings => "buildings",
            Self::TermFirstDay => "term_first_day",
            Self::ClassroomAvailability => "classroom_availability",
        }
    }
}

impl fmt::Display for CacheDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a stored entry stops being usable without a refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Fresh until forced reload or invalidation.
    Forever,
    /// Fresh for the given duration after the fetch completed.
    Ttl(Duration),
}

impl Freshness {
    pub fn is_fresh(self, fetched_at: Instant, now: Instant) -> bool {
        match self {
            Self::Forever => true,
            Self::Ttl(ttl) => now.saturating_duration_since(fetched_at) < ttl,
        }
    }
}

/// Keys usable with [`KeyedCache`].
pub trait CacheKey: Clone + Eq + Hash + Send + Sync + 'static {
    /// Parameter part of the key, for logs and error context.
    fn label(&self) -> Option<String> {
        None
    }
}

impl CacheKey for () {}

impl CacheKey for TermKey {
    fn label(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl CacheKey for AvailabilityKey {
    fn label(&self) -> Option<String> {
        Some(self.to_string())
    }
}

/// A stored payload and the instant its fetch completed.
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub value: Arc<V>,
    pub fetched_at: Instant,
}

impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
        }
    }
}

struct SlotState<V> {
    entry: Option<CacheEntry<V>>,
    /// Outcome of the latest fetch when it failed, handed to queued callers.
    last_error: Option<FetchError>,
}

struct Slot<V> {
    state: Mutex<SlotState<V>>,
    /// Number of fetches completed on this slot.
    completed: AtomicU64,
    populated: AtomicBool,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                entry: None,
                last_error: None,
            }),
            completed: AtomicU64::new(0),
            populated: AtomicBool::new(false),
        }
    }
}

#[derive(Default)]
struct DomainCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    failures: AtomicU64,
}

/// Activity counters for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub domain: CacheDomain,
    /// Keys currently holding a loaded entry.
    pub entries: u64,
    pub hits: u64,
    /// Lookups that found no usable entry.
    pub misses: u64,
    /// Upstream fetches issued, forced ones included.
    pub fetches: u64,
    pub failures: u64,
}

/// Single-flight cache for one domain.
pub struct KeyedCache<K, V> {
    domain: CacheDomain,
    freshness: Freshness,
    slots: Cache<K, Arc<Slot<V>>>,
    counters: DomainCounters,
}

impl<K, V> KeyedCache<K, V>
where
    K: CacheKey,
    V: Send + Sync + 'static,
{
    /// Create a cache holding at most `max_keys` slots. Eviction only
    /// matters for keyed domains; singleton domains use one slot.
    pub fn new(domain: CacheDomain, freshness: Freshness, max_keys: u64) -> Self {
        Self {
            domain,
            freshness,
            slots: Cache::builder().max_capacity(max_keys).build(),
            counters: DomainCounters::default(),
        }
    }

    pub fn domain(&self) -> CacheDomain {
        self.domain
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    /// Return the entry for `key`, fetching it when absent, stale or forced.
    ///
    /// A caller that queued behind an in-flight fetch returns that fetch's
    /// outcome instead of issuing its own, even when forcing a reload. A
    /// failed fetch leaves the previous entry in place and surfaces as
    /// [`RegistrarError::Upstream`].
    pub async fn get<F, Fut>(&self, key: &K, force_reload: bool, fetch: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<V>>,
    {
        let slot = self
            .slots
            .get_with(key.clone(), async { Arc::new(Slot::new()) })
            .await;

        let observed = slot.completed.load(Ordering::Acquire);
        let mut state = slot.state.lock().await;

        if slot.completed.load(Ordering::Acquire) != observed {
            if let Some(error) = state.last_error.clone() {
                return Err(self.upstream_error(key, error));
            }
            if let Some(entry) = &state.entry {
                self.record_hit(key, "shared in-flight fetch");
                return Ok(Arc::clone(&entry.value));
            }
        }

        if !force_reload {
            if let Some(entry) = &state.entry {
                if self.freshness.is_fresh(entry.fetched_at, Instant::now()) {
                    self.record_hit(key, "fresh entry");
                    return Ok(Arc::clone(&entry.value));
                }
            }
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            get_metrics()
                .cache_misses_total
                .with_label_values(&[self.domain.as_str()])
                .inc();
        }

        info!(
            domain = %self.domain,
            key = ?key.label(),
            force_reload,
            "Fetching from portal"
        );
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        let metrics = get_metrics();
        metrics
            .upstream_fetches_total
            .with_label_values(&[self.domain.as_str()])
            .inc();
        let timer = Metrics::start_timer(
            &metrics
                .fetch_duration_seconds
                .with_label_values(&[self.domain.as_str()]),
        );
        let outcome = fetch().await;
        drop(timer);

        let result = match outcome {
            Ok(value) => {
                let value = Arc::new(value);
                state.entry = Some(CacheEntry {
                    value: Arc::clone(&value),
                    fetched_at: Instant::now(),
                });
                state.last_error = None;
                slot.populated.store(true, Ordering::Release);
                Ok(value)
            }
            Err(error) => {
                warn!(
                    domain = %self.domain,
                    key = ?key.label(),
                    error = %error,
                    kept_previous = state.entry.is_some(),
                    "Portal fetch failed"
                );
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                metrics
                    .upstream_failures_total
                    .with_label_values(&[self.domain.as_str()])
                    .inc();
                state.last_error = Some(error.clone());
                Err(self.upstream_error(key, error))
            }
        };
        // published while the lock is held so queued callers see it
        slot.completed.fetch_add(1, Ordering::AcqRel);
        result
    }

    /// The stored entry for `key`, fresh or not, without fetching.
    pub async fn peek(&self, key: &K) -> Option<CacheEntry<V>> {
        let slot = self.slots.get(key).await?;
        let state = slot.state.lock().await;
        state.entry.clone()
    }

    /// Drop every entry. Nothing is fetched until the next lookup.
    pub fn invalidate_all(&self) {
        self.slots.invalidate_all();
        debug!(domain = %self.domain, "Cache invalidated");
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.populated.load(Ordering::Acquire))
            .count() as u64;
        CacheStats {
            domain: self.domain,
            entries,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    fn record_hit(&self, key: &K, reason: &'static str) {
        debug!(domain = %self.domain, key = ?key.label(), reason, "Cache hit");
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        get_metrics()
            .cache_hits_total
            .with_label_values(&[self.domain.as_str()])
            .inc();
    }

    fn upstream_error(&self, key: &K, source: FetchError) -> RegistrarError {
        let key = match key.label() {
            Some(label) => format!("{}[{}]", self.domain, label),
            None => self.domain.to_string(),
        };
        RegistrarError::Upstream { key, source }
    }
}

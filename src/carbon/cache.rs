//! Region-keyed TTL cache in front of an [`IntensityProvider`].
//!
//! Policy:
//! - an entry is served only while `now - fetched_at < ttl`;
//! - an expired entry is dropped before refreshing, so a failed refresh
//!   leaves the region absent rather than serving stale data;
//! - failures are never cached, the next `get` tries upstream again;
//! - the lock is released around the upstream call, so concurrent misses for
//!   one region may each fetch (no single-flight).
//!
//! One instance is meant to be shared process-wide behind an `Arc`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::provider::IntensityProvider;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub fetches: u64,
    pub fetch_failures: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub region: String,
    pub value: f64,
    pub fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

pub struct IntensityCache {
    provider: Arc<dyn IntensityProvider>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl IntensityCache {
    pub fn new(provider: Arc<dyn IntensityProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn with_default_ttl(provider: Arc<dyn IntensityProvider>) -> Self {
        Self::new(provider, DEFAULT_TTL)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Current intensity for `region`, fetching upstream at most once when
    /// the cached value is missing or expired. May block for the duration of
    /// that fetch.
    pub fn get(&self, region: &str) -> Option<f64> {
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            let now = Instant::now();

            if let Some(entry) = state.entries.get(region) {
                if entry.is_fresh(self.ttl, now) {
                    let value = entry.value;
                    state.stats.hits += 1;
                    log_debug!("using cached carbon intensity for {region}: {value} gCO2eq/kWh");
                    return Some(value);
                }
                state.entries.remove(region);
                state.stats.expirations += 1;
            }

            state.stats.misses += 1;
            state.stats.fetches += 1;
        }

        match self.provider.fetch(region) {
            Ok(value) if value.is_finite() && value >= 0.0 => {
                let entry = CacheEntry {
                    region: region.to_string(),
                    value,
                    fetched_at: Instant::now(),
                };
                self.lock().entries.insert(region.to_string(), entry);
                log_debug!("fetched carbon intensity for {region}: {value} gCO2eq/kWh");
                Some(value)
            }
            Ok(value) => {
                self.lock().stats.fetch_failures += 1;
                log_warn!(
                    "{} returned an unusable carbon intensity for {region}: {value}",
                    self.provider.name()
                );
                None
            }
            Err(err) => {
                self.lock().stats.fetch_failures += 1;
                log_warn!(
                    "could not fetch carbon intensity for {region} from {}: {err}",
                    self.provider.name()
                );
                None
            }
        }
    }

    /// Cached entry for `region` if still fresh; never fetches.
    pub fn peek(&self, region: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        self.lock()
            .entries
            .get(region)
            .filter(|entry| entry.is_fresh(self.ttl, now))
            .cloned()
    }

    pub fn invalidate(&self, region: &str) -> bool {
        self.lock().entries.remove(region).is_some()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    Clock, PermitsPerSecond, RateLimitStore, SystemClock, TokenBucketState, TollgateError,
    clock::SharedClock,
};

const MICROS_PER_SECOND: u64 = 1_000_000;

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u64,
    expires_at_micros: u64,
}

#[derive(Debug, Clone, Copy)]
struct BucketRecord {
    state: TokenBucketState,
    expires_at_micros: u64,
}

#[inline]
fn expiry(now_micros: u64, ttl_seconds: u64) -> u64 {
    now_micros.saturating_add(ttl_seconds.saturating_mul(MICROS_PER_SECOND))
}

/// In-process [`RateLimitStore`].
///
/// Every procedure runs while holding the [`DashMap`] entry lock of its key, which
/// gives the same per-key atomicity Redis gives a Lua script. Expiry is tracked
/// against the store's own clock; expired records are invisible to every procedure
/// and are dropped by [`LocalStore::purge_expired`].
///
/// State is only shared between limiters built on the same `LocalStore` instance,
/// so this store cannot coordinate separate processes.
#[derive(Debug)]
pub struct LocalStore {
    clock: SharedClock,
    counters: DashMap<String, WindowCounter>,
    buckets: DashMap<String, BucketRecord>,
}

impl LocalStore {
    /// Create a store whose clock is the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store driven by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            counters: DashMap::new(),
            buckets: DashMap::new(),
        }
    }

    /// Current value of the fixed window counter at `key`, if it exists and has not expired.
    pub fn window_count(&self, key: &str) -> Result<Option<u64>, TollgateError> {
        let now = self.clock.now_micros()?;

        Ok(self
            .counters
            .get(key)
            .filter(|counter| counter.expires_at_micros > now)
            .map(|counter| counter.count))
    }

    /// Drop every expired counter and bucket. Returns how many records were removed.
    pub fn purge_expired(&self) -> Result<usize, TollgateError> {
        let now = self.clock.now_micros()?;
        let before = self.counters.len() + self.buckets.len();

        self.counters
            .retain(|_, counter| counter.expires_at_micros > now);
        self.buckets
            .retain(|_, record| record.expires_at_micros > now);

        Ok(before.saturating_sub(self.counters.len() + self.buckets.len()))
    } // end method purge_expired

    fn live_bucket(&self, id: &str, now: u64) -> Result<TokenBucketState, TollgateError> {
        self.buckets
            .get(id)
            .filter(|record| record.expires_at_micros > now)
            .map(|record| record.state)
            .ok_or_else(|| TollgateError::LimiterNotFound(id.to_string()))
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitStore for LocalStore {
    fn fixed_window_check_and_increment(
        &self,
        key: &str,
        limit: u64,
        ttl_seconds: u64,
    ) -> Result<bool, TollgateError> {
        let now = self.clock.now_micros()?;

        match self.counters.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let counter = occupied.get_mut();
                let current = if counter.expires_at_micros > now {
                    counter.count
                } else {
                    0
                };

                if current + 1 > limit {
                    return Ok(false);
                }

                counter.count = current + 1;
                counter.expires_at_micros = expiry(now, ttl_seconds);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                if limit == 0 {
                    return Ok(false);
                }

                vacant.insert(WindowCounter {
                    count: 1,
                    expires_at_micros: expiry(now, ttl_seconds),
                });
                Ok(true)
            }
        }
    }

    fn token_bucket_init(
        &self,
        id: &str,
        permits_per_second: PermitsPerSecond,
        ttl_seconds: u64,
    ) -> Result<(), TollgateError> {
        let now = self.clock.now_micros()?;

        self.buckets.insert(
            id.to_string(),
            BucketRecord {
                state: TokenBucketState::new(permits_per_second),
                expires_at_micros: expiry(now, ttl_seconds),
            },
        );

        Ok(())
    }

    fn token_bucket_reserve(&self, id: &str, permits: u64) -> Result<u64, TollgateError> {
        let Some(mut record) = self.buckets.get_mut(id) else {
            return Err(TollgateError::LimiterNotFound(id.to_string()));
        };

        let now = self.clock.now_micros()?;
        if record.expires_at_micros <= now {
            return Err(TollgateError::LimiterNotFound(id.to_string()));
        }

        Ok(record.state.reserve(now as f64, permits))
    }

    fn token_bucket_next_free_ticket_micros(&self, id: &str) -> Result<u64, TollgateError> {
        let now = self.clock.now_micros()?;

        Ok(self.live_bucket(id, now)?.next_free_ticket_micros as u64)
    }

    fn token_bucket_state(&self, id: &str) -> Result<TokenBucketState, TollgateError> {
        let now = self.clock.now_micros()?;

        self.live_bucket(id, now)
    }

    fn token_bucket_delete(&self, id: &str) -> Result<(), TollgateError> {
        self.buckets.remove(id);
        Ok(())
    }
}

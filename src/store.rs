//! The backing store contract.
//!
//! Every mutation of shared limiter state happens inside one of the procedures below,
//! and each implementation must run a procedure indivisibly with respect to every other
//! procedure on the same key. Limiters never hold mutable state of their own, so this
//! is the only synchronization between processes sharing a limiter.

use crate::{PermitsPerSecond, TollgateError};

/// A shared key-value store able to run the limiter procedures atomically.
///
/// Implemented by [`LocalStore`](crate::LocalStore) and, with the `redis` feature,
/// by [`RedisStore`](crate::RedisStore).
pub trait RateLimitStore: Send + Sync {
    /// `FixedWindowCheckAndIncrement(key, limit, ttl)`.
    ///
    /// Reads the counter at `key` (missing counts as 0). If `count + 1 > limit` returns
    /// `false` without touching the counter, otherwise increments it, sets its expiry to
    /// `ttl_seconds` and returns `true`.
    fn fixed_window_check_and_increment(
        &self,
        key: &str,
        limit: u64,
        ttl_seconds: u64,
    ) -> Result<bool, TollgateError>;

    /// `TokenBucketInit(id, permitsPerSecond)`.
    ///
    /// Unconditionally overwrites the bucket at `id` with a full, undebted
    /// [`TokenBucketState::new`] and sets its expiry to `ttl_seconds`.
    fn token_bucket_init(
        &self,
        id: &str,
        permits_per_second: PermitsPerSecond,
        ttl_seconds: u64,
    ) -> Result<(), TollgateError>;

    /// `TokenBucketReserve(id, requestedPermits)`.
    ///
    /// Applies [`TokenBucketState::reserve`] at the store's current time and returns
    /// the microseconds the caller must wait. Fails with
    /// [`TollgateError::LimiterNotFound`] if the bucket does not exist.
    fn token_bucket_reserve(&self, id: &str, permits: u64) -> Result<u64, TollgateError>;

    /// Direct read of `nextFreeTicketMicros`.
    fn token_bucket_next_free_ticket_micros(&self, id: &str) -> Result<u64, TollgateError>;

    /// Direct read of the whole bucket.
    fn token_bucket_state(&self, id: &str) -> Result<TokenBucketState, TollgateError>;

    /// Delete the bucket. Deleting a missing bucket is not an error.
    fn token_bucket_delete(&self, id: &str) -> Result<(), TollgateError>;
}

/// Persistent state of a smooth bursty token bucket.
///
/// All values are kept as floating point numbers, matching what the Lua procedures
/// store in Redis: the interval of a rate such as 3/s is not a whole number of
/// microseconds and permits accrue fractionally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucketState {
    /// Microseconds between two permits at the steady rate.
    pub stable_interval_micros: f64,
    /// Burst capacity.
    pub max_permits: f64,
    /// Permits banked and available without waiting.
    pub stored_permits: f64,
    /// Store-clock time before which newly requested permits must wait.
    pub next_free_ticket_micros: f64,
}

impl TokenBucketState {
    /// A full bucket with no debt.
    pub fn new(permits_per_second: PermitsPerSecond) -> Self {
        Self {
            stable_interval_micros: permits_per_second.stable_interval_micros(),
            max_permits: *permits_per_second,
            stored_permits: *permits_per_second,
            next_free_ticket_micros: 0f64,
        }
    }

    /// Reserve `permits` at `now_micros` (store clock).
    ///
    /// Never refuses: the permits are always committed. Banked permits are spent first,
    /// the rest is added as debt to `next_free_ticket_micros`. The returned wait only
    /// covers debt that existed before this call, so a caller draining a full bucket
    /// proceeds immediately and the next caller pays for it.
    pub fn reserve(&mut self, now_micros: f64, permits: u64) -> u64 {
        self.resync(now_micros);

        let old_next_free_ticket_micros = self.next_free_ticket_micros;

        let requested = permits as f64;
        let stored_permits_to_spend = requested.min(self.stored_permits);
        let fresh_permits = requested - stored_permits_to_spend;
        let wait_micros = fresh_permits * self.stable_interval_micros;

        self.next_free_ticket_micros += wait_micros;
        self.stored_permits -= stored_permits_to_spend;

        (old_next_free_ticket_micros - now_micros).max(0f64) as u64
    } // end method reserve

    fn resync(&mut self, now_micros: f64) {
        if now_micros > self.next_free_ticket_micros {
            let new_permits =
                (now_micros - self.next_free_ticket_micros) / self.stable_interval_micros;
            self.stored_permits = self.max_permits.min(self.stored_permits + new_permits);
            self.next_free_ticket_micros = now_micros;
        }
    }
}

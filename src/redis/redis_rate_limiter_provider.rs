use std::sync::Arc;

use crate::{
    FixedWindowOptions, FixedWindowRateLimiter, RedisConnectionPool, RedisStore,
    SmoothBurstyOptions, SmoothBurstyRateLimiter, SystemClock, TollgateError, clock::SharedClock,
};

/// Configuration for Redis-backed rate limiters.
///
/// # Requirements
///
/// - **Redis version:** >= 5.0
///
/// # Examples
///
/// ```ignore
/// use tollgate::{RedisConnectionPool, RedisRateLimiterOptions};
///
/// let pool = RedisConnectionPool::open("redis://127.0.0.1:6379/", 4)?;
/// let options = RedisRateLimiterOptions { pool };
/// ```
#[derive(Clone, Debug)]
pub struct RedisRateLimiterOptions {
    /// Connections used by every limiter built from the provider.
    pub pool: RedisConnectionPool,
}

/// Provider for Redis-backed distributed rate limiting.
///
/// Limiters built here share state with every process pointing at the same Redis and
/// using the same key prefix or bucket id. All state transitions are atomic Lua
/// scripts, so no coordination between the processes is needed.
///
/// # Clocks
///
/// - **Fixed window:** windows are computed from this process's system clock
/// - **Smooth bursty:** accrual uses the Redis server clock (`TIME`)
///
/// # Examples
///
/// ```ignore
/// use tollgate::{FixedWindowOptions, RateLimiter, RateLimiterOptions, RedisRateLimiterOptions};
///
/// let rl = RateLimiter::new(RateLimiterOptions {
///     local: Default::default(),
///     redis: RedisRateLimiterOptions { pool },
/// });
///
/// let limiter = rl.redis().fixed_window(FixedWindowOptions::default());
/// if limiter.try_acquire()? {
///     /* proceed */
/// } else {
///     /* send 429 */
/// }
/// ```
pub struct RedisRateLimiterProvider {
    store: Arc<RedisStore>,
    clock: SharedClock,
}

impl RedisRateLimiterProvider {
    pub(crate) fn new(options: RedisRateLimiterOptions) -> Self {
        Self {
            store: Arc::new(RedisStore::new(options.pool)),
            clock: Arc::new(SystemClock),
        }
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<RedisStore> {
        &self.store
    }

    /// Build a fixed window limiter.
    pub fn fixed_window(&self, options: FixedWindowOptions) -> FixedWindowRateLimiter {
        FixedWindowRateLimiter::new(self.store.clone(), self.clock.clone(), options)
    }

    /// Build a smooth bursty limiter, resetting its bucket in Redis.
    pub fn smooth_bursty(
        &self,
        options: SmoothBurstyOptions,
    ) -> Result<SmoothBurstyRateLimiter, TollgateError> {
        SmoothBurstyRateLimiter::new(self.store.clone(), self.clock.clone(), options)
    }
}

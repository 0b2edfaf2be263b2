use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    Clock, LimiterKey, Permits, PermitsPerSecond, RateLimitStore, TOKEN_BUCKET_TTL_SECONDS,
    TokenBucketState, TollgateError, clock::SharedClock, sleep_uninterruptibly,
};

/// Configuration for a [`SmoothBurstyRateLimiter`].
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SmoothBurstyOptions {
    /// Store key of the bucket. Limiters sharing an id share one bucket.
    pub id: LimiterKey,
    /// Steady rate, also used as the burst capacity.
    pub permits_per_second: PermitsPerSecond,
}

impl Default for SmoothBurstyOptions {
    fn default() -> Self {
        Self {
            id: LimiterKey::default_smooth_bursty_id(),
            permits_per_second: PermitsPerSecond::default(),
        }
    }
}

/// Token bucket limiter that allows a burst of up to one second worth of permits and
/// then smooths admissions to the configured rate.
///
/// The bucket lives in the store. Reservations are applied by an atomic procedure that
/// reads the *store's* clock, so all processes agree on when permits accrue.
///
/// # Algorithm
///
/// 1. **Accrual:** idle time since `next_free_ticket` is converted to banked permits,
///    capped at `permits_per_second`
/// 2. **Spend:** banked permits are consumed first
/// 3. **Debt:** missing permits push `next_free_ticket` into the future
/// 4. **Wait:** the caller only waits for debt left by *earlier* reservations
///
/// # Semantics & Limitations
///
/// **Reservations are never refused:**
/// - [`acquire`](Self::acquire) always succeeds eventually
/// - Outstanding debt is unbounded
///
/// **Timed-out reservations are kept:**
/// - [`try_acquire_permits`](Self::try_acquire_permits) may reserve permits and still
///   return `false` when the resulting wait exceeds the timeout
/// - The reservation is not rolled back, later callers wait for it
///
/// **Construction resets the bucket:**
/// - Creating a limiter re-initializes the bucket to full with no debt, even if other
///   processes are using it. A restarted process never inherits old debt.
///
/// # Examples
///
/// ```no_run
/// use std::{sync::Arc, time::Duration};
/// use tollgate::{LocalStore, Permits, PermitsPerSecond, SmoothBurstyOptions, SmoothBurstyRateLimiter, SystemClock};
/// # fn main() -> Result<(), tollgate::TollgateError> {
/// let limiter = SmoothBurstyRateLimiter::new(
///     Arc::new(LocalStore::new()),
///     Arc::new(SystemClock),
///     SmoothBurstyOptions {
///         permits_per_second: PermitsPerSecond::try_from(5.0)?,
///         ..SmoothBurstyOptions::default()
///     },
/// )?;
///
/// // The full burst is available immediately.
/// limiter.acquire_permits(Permits::try_from(5)?)?;
///
/// // Afterwards permits are handed out every 200ms.
/// let granted = limiter.try_acquire_timeout(Duration::from_millis(250))?;
/// # Ok(())
/// # }
/// ```
pub struct SmoothBurstyRateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: SharedClock,
    id: LimiterKey,
    permits_per_second: PermitsPerSecond,
}

impl SmoothBurstyRateLimiter {
    /// Create a limiter on `store` and (re)initialize its bucket.
    ///
    /// `clock` is only used for the advisory check in `try_acquire*`; accrual always
    /// uses the store's clock.
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        options: SmoothBurstyOptions,
    ) -> Result<Self, TollgateError> {
        let limiter = Self {
            store,
            clock,
            id: options.id,
            permits_per_second: options.permits_per_second,
        };

        limiter.reinit()?;

        Ok(limiter)
    } // end constructor

    /// Bucket id.
    pub fn id(&self) -> &LimiterKey {
        &self.id
    }

    /// Configured rate.
    pub fn permits_per_second(&self) -> PermitsPerSecond {
        self.permits_per_second
    }

    /// Reset the bucket to full with no debt and refresh its expiry.
    ///
    /// Also recreates a bucket removed by [`destroy`](Self::destroy).
    pub fn reinit(&self) -> Result<(), TollgateError> {
        self.store
            .token_bucket_init(&self.id, self.permits_per_second, TOKEN_BUCKET_TTL_SECONDS)?;

        info!(
            id = %self.id,
            permits_per_second = *self.permits_per_second,
            "smooth bursty rate limiter initialized"
        );

        Ok(())
    }

    /// Reserve `permits` and return how long the caller must wait before using them.
    ///
    /// The reservation is committed whatever the wait.
    pub fn reserve(&self, permits: Permits) -> Result<Duration, TollgateError> {
        Ok(Duration::from_micros(self.reserve_micros(permits)?))
    }

    /// Block until one permit is available. Returns the time slept.
    pub fn acquire(&self) -> Result<Duration, TollgateError> {
        self.acquire_permits(Permits::one())
    }

    /// Block until `permits` are available. Returns the time slept.
    pub fn acquire_permits(&self, permits: Permits) -> Result<Duration, TollgateError> {
        let wait = self.reserve(permits)?;
        sleep_uninterruptibly(wait);

        Ok(wait)
    }

    /// Take one permit if it is available now.
    pub fn try_acquire(&self) -> Result<bool, TollgateError> {
        self.try_acquire_permits(Permits::one(), Duration::ZERO)
    }

    /// Take one permit if it becomes available within `timeout`.
    pub fn try_acquire_timeout(&self, timeout: Duration) -> Result<bool, TollgateError> {
        self.try_acquire_permits(Permits::one(), timeout)
    }

    /// Take `permits` if they become available within `timeout`.
    ///
    /// If the bucket is already in debt beyond `timeout` (compared against the client
    /// clock) this returns `false` without reserving anything. Otherwise the permits are
    /// reserved, and if the resulting wait still exceeds `timeout` this returns `false`
    /// *keeping the reservation*.
    pub fn try_acquire_permits(
        &self,
        permits: Permits,
        timeout: Duration,
    ) -> Result<bool, TollgateError> {
        let timeout_micros = u64::try_from(timeout.as_micros()).unwrap_or(u64::MAX);
        let now_micros = self.clock.now_micros()?;

        if !self.can_acquire(now_micros, timeout_micros)? {
            debug!(id = %self.id, permits = *permits, "bucket debt exceeds timeout");
            return Ok(false);
        }

        let wait_micros = self.reserve_micros(permits)?;
        if wait_micros > timeout_micros {
            debug!(
                id = %self.id,
                permits = *permits,
                wait_micros,
                "reserved wait exceeds timeout, reservation kept"
            );
            return Ok(false);
        }

        sleep_uninterruptibly(Duration::from_micros(wait_micros));

        Ok(true)
    } // end method try_acquire_permits

    /// Store-clock time, in microseconds since the Unix epoch, before which newly
    /// requested permits must wait.
    pub fn query_earliest_available(&self) -> Result<u64, TollgateError> {
        self.store.token_bucket_next_free_ticket_micros(&self.id)
    }

    /// Current bucket state as stored.
    pub fn state(&self) -> Result<TokenBucketState, TollgateError> {
        self.store.token_bucket_state(&self.id)
    }

    /// Delete the bucket from the store.
    ///
    /// Any limiter sharing the id fails with [`TollgateError::LimiterNotFound`] until
    /// one of them calls [`reinit`](Self::reinit).
    pub fn destroy(&self) -> Result<(), TollgateError> {
        self.store.token_bucket_delete(&self.id)?;
        info!(id = %self.id, "smooth bursty rate limiter destroyed");

        Ok(())
    }

    // The free ticket is read without any reservation. If the deadline cannot reach it,
    // the attempt is bound to fail.
    fn can_acquire(&self, now_micros: u64, timeout_micros: u64) -> Result<bool, TollgateError> {
        Ok(self
            .query_earliest_available()?
            .saturating_sub(timeout_micros)
            <= now_micros)
    }

    fn reserve_micros(&self, permits: Permits) -> Result<u64, TollgateError> {
        let wait_micros = self.store.token_bucket_reserve(&self.id, *permits)?;
        debug!(id = %self.id, permits = *permits, wait_micros, "permits reserved");

        Ok(wait_micros)
    }
}

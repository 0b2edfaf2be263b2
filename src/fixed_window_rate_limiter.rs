use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use tracing::debug;

use crate::{
    Clock, LimiterKey, RateLimit, RateLimitStore, TollgateError, WindowSizeMs,
    clock::SharedClock,
    common::{next_window_begin_ms, window_index},
    sleep_uninterruptibly,
};

/// Configuration for a [`FixedWindowRateLimiter`].
///
/// Every field has a default, so a host can deserialize a partial record:
///
/// ```
/// # use tollgate::FixedWindowOptions;
/// let options: FixedWindowOptions = serde_json::from_str(r#"{ "limit": 5 }"#).unwrap();
/// assert_eq!(*options.limit, 5);
/// assert_eq!(*options.window_ms, 1000);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FixedWindowOptions {
    /// Prefix of the counter keys. Counters are stored at `<prefix>:<window index>`.
    pub prefix: LimiterKey,
    /// Admissions allowed per window.
    pub limit: RateLimit,
    /// Window length.
    pub window_ms: WindowSizeMs,
}

impl Default for FixedWindowOptions {
    fn default() -> Self {
        Self {
            prefix: LimiterKey::default_fixed_window_prefix(),
            limit: RateLimit::default(),
            window_ms: WindowSizeMs::default(),
        }
    }
}

/// Fixed window counter limiter.
///
/// Time is cut into windows of `window_ms`, indexed by `floor(now_ms / window_ms)` on
/// the client clock. Each window has its own counter in the store, incremented by an
/// atomic check-and-increment procedure, so across every process sharing the prefix at
/// most `limit` callers are admitted per window.
///
/// # Semantics & Limitations
///
/// **Boundary bursts:**
/// - Windows are counted independently
/// - Up to `2 × limit` admissions can happen in a short span straddling a boundary
///
/// **Client clock:**
/// - Window indexes and boundaries come from the caller's clock, not the store's
/// - Callers with skewed clocks may count into different windows
///
/// **Denials are free:**
/// - A denied attempt never modifies the counter
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tollgate::{FixedWindowOptions, FixedWindowRateLimiter, LocalStore, RateLimit, SystemClock};
/// # fn main() -> Result<(), tollgate::TollgateError> {
/// let limiter = FixedWindowRateLimiter::new(
///     Arc::new(LocalStore::new()),
///     Arc::new(SystemClock),
///     FixedWindowOptions {
///         limit: RateLimit::try_from(5)?,
///         ..FixedWindowOptions::default()
///     },
/// );
///
/// // Blocks until the current window has room.
/// let waited = limiter.acquire()?;
///
/// // Gives up when the next window starts after the deadline.
/// let granted = limiter.try_acquire_timeout(std::time::Duration::from_millis(100))?;
/// # Ok(())
/// # }
/// ```
pub struct FixedWindowRateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: SharedClock,
    prefix: LimiterKey,
    limit: RateLimit,
    window: WindowSizeMs,
}

impl FixedWindowRateLimiter {
    /// Create a limiter on `store`, computing windows from `clock`.
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        options: FixedWindowOptions,
    ) -> Self {
        Self {
            store,
            clock,
            prefix: options.prefix,
            limit: options.limit,
            window: options.window_ms,
        }
    } // end constructor

    /// Key prefix of this limiter.
    pub fn prefix(&self) -> &LimiterKey {
        &self.prefix
    }

    /// Configured limit.
    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Configured window.
    pub fn window(&self) -> WindowSizeMs {
        self.window
    }

    /// Store key of the window containing `now_ms`.
    pub fn window_key(&self, now_ms: u64, window: WindowSizeMs) -> String {
        format!("{}:{}", self.prefix, window_index(now_ms, *window))
    }

    /// Make a single admission attempt against the current window.
    ///
    /// Returns `true` and consumes one unit of the window's quota, or `false` with
    /// no side effect.
    pub fn try_once(&self, limit: RateLimit, window: WindowSizeMs) -> Result<bool, TollgateError> {
        let now_ms = self.clock.now_millis()?;
        let key = self.window_key(now_ms, window);

        let granted =
            self.store
                .fixed_window_check_and_increment(&key, *limit, window.ttl_seconds())?;

        if !granted {
            debug!(key = %key, limit = *limit, "fixed window exhausted");
        }

        Ok(granted)
    }

    /// Block until admitted under the configured limit and window.
    ///
    /// See [`FixedWindowRateLimiter::acquire_with`].
    pub fn acquire(&self) -> Result<Duration, TollgateError> {
        self.acquire_with(self.limit, self.window)
    }

    /// Block until admitted under `limit` per `window`.
    ///
    /// Each denial sleeps until the next window boundary and retries, with no retry
    /// limit: under sustained overload this may block indefinitely. Store errors are
    /// returned immediately. Returns the total time slept, excluding store round trips.
    pub fn acquire_with(
        &self,
        limit: RateLimit,
        window: WindowSizeMs,
    ) -> Result<Duration, TollgateError> {
        let mut waited = Duration::ZERO;

        while !self.try_once(limit, window)? {
            let sleep_for = self.time_to_next_window(window)?;
            debug!(prefix = %self.prefix, sleep_ms = sleep_for.as_millis() as u64, "sleeping until next window");

            sleep_uninterruptibly(sleep_for);
            waited += sleep_for;
        }

        Ok(waited)
    } // end method acquire_with

    /// Attempt admission once, without waiting.
    pub fn try_acquire(&self) -> Result<bool, TollgateError> {
        self.try_acquire_timeout(Duration::ZERO)
    }

    /// Attempt admission, waiting at most about `timeout`.
    ///
    /// Gives up as soon as the deadline has passed or the next window would only start
    /// at or after the deadline. Store round-trip time counts against the deadline but
    /// the final attempt may finish slightly after it.
    pub fn try_acquire_timeout(&self, timeout: Duration) -> Result<bool, TollgateError> {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let deadline_ms = self.clock.now_millis()?.saturating_add(timeout_ms);

        while !self.try_once(self.limit, self.window)? {
            let now_ms = self.clock.now_millis()?;
            if now_ms >= deadline_ms {
                return Ok(false);
            }

            let next_window_ms = next_window_begin_ms(now_ms, *self.window);
            if next_window_ms >= deadline_ms {
                return Ok(false);
            }

            sleep_uninterruptibly(Duration::from_millis(next_window_ms - now_ms));
        }

        Ok(true)
    } // end method try_acquire_timeout

    fn time_to_next_window(&self, window: WindowSizeMs) -> Result<Duration, TollgateError> {
        let now_ms = self.clock.now_millis()?;
        Ok(Duration::from_millis(
            next_window_begin_ms(now_ms, *window).saturating_sub(now_ms),
        ))
    }
}

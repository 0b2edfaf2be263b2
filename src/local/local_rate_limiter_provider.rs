use std::sync::Arc;

use crate::{
    Clock, FixedWindowOptions, FixedWindowRateLimiter, LocalStore, SmoothBurstyOptions,
    SmoothBurstyRateLimiter, SystemClock, TollgateError, clock::SharedClock,
};

/// Configuration for the local provider.
#[derive(Clone, Debug)]
pub struct LocalRateLimiterOptions {
    /// Clock used both as the store clock and as the client clock of every limiter.
    pub clock: Arc<dyn Clock>,
}

impl Default for LocalRateLimiterOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }
}

/// Provider for in-process rate limiting.
///
/// Limiters built here share one [`LocalStore`]: limiters with the same key prefix
/// or bucket id share quota within this process only.
pub struct LocalRateLimiterProvider {
    store: Arc<LocalStore>,
    clock: SharedClock,
}

impl LocalRateLimiterProvider {
    pub(crate) fn new(options: LocalRateLimiterOptions) -> Self {
        Self {
            store: Arc::new(LocalStore::with_clock(options.clock.clone())),
            clock: options.clock,
        }
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Build a fixed window limiter.
    pub fn fixed_window(&self, options: FixedWindowOptions) -> FixedWindowRateLimiter {
        FixedWindowRateLimiter::new(self.store.clone(), self.clock.clone(), options)
    }

    /// Build a smooth bursty limiter, resetting its bucket.
    pub fn smooth_bursty(
        &self,
        options: SmoothBurstyOptions,
    ) -> Result<SmoothBurstyRateLimiter, TollgateError> {
        SmoothBurstyRateLimiter::new(self.store.clone(), self.clock.clone(), options)
    }
}

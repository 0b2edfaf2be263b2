//! Time sources.
//!
//! The fixed window limiter derives window boundaries from a client clock, while the
//! token bucket derives accrual from the store's clock. Both are expressed through
//! [`Clock`] so that either side can be replaced in tests.

use std::{
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Source of wall-clock time, in microseconds since the Unix epoch.
///
/// Implementors must be thread-safe; a single clock is shared by every limiter
/// built from the same provider.
pub trait Clock: Debug + Send + Sync {
    /// Current time in microseconds since the Unix epoch.
    fn now_micros(&self) -> Result<u64, ClockError>;

    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> Result<u64, ClockError> {
        Ok(self.now_micros()? / 1_000)
    }
}

/// Clock error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// The system clock reports a time before the Unix epoch.
    #[error("system time is before the unix epoch")]
    SystemTimeBeforeEpoch,
    /// A manual clock was told to fail.
    #[error("clock is unavailable")]
    Unavailable,
}

/// [`Clock`] backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> Result<u64, ClockError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .map_err(|_| ClockError::SystemTimeBeforeEpoch)
    }
}

/// A [`Clock`] that only moves when told to.
///
/// Clones share the same underlying time, so a clone handed to a
/// [`LocalStore`](crate::LocalStore) can be advanced from a test.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
    fail_next: Arc<AtomicBool>,
}

impl ManualClock {
    /// Create a clock frozen at `initial` since the Unix epoch.
    pub fn new(initial: Duration) -> Self {
        Self {
            micros: Arc::new(AtomicU64::new(initial.as_micros() as u64)),
            fail_next: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.micros
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    /// Set the clock to an absolute time since the Unix epoch.
    pub fn set(&self, to: Duration) {
        self.micros.store(to.as_micros() as u64, Ordering::SeqCst);
    }

    /// Make the next read fail with [`ClockError::Unavailable`].
    pub fn fail_next_read(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> Result<u64, ClockError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ClockError::Unavailable);
        }

        Ok(self.micros.load(Ordering::SeqCst))
    }
}

/// Shared handle to a clock.
pub(crate) type SharedClock = Arc<dyn Clock>;

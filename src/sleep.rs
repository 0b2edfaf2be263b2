use std::{
    thread,
    time::{Duration, Instant},
};

/// Block the current thread for at least `duration`.
///
/// The wait is built on [`thread::park_timeout`], which may return early either
/// spuriously or because another thread called [`Thread::unpark`](std::thread::Thread::unpark)
/// on this one. Early returns are absorbed: the remaining time is recomputed and the
/// thread parks again until the full duration has elapsed.
///
/// A wake-up consumed while sleeping is not lost. Once the sleep completes, the
/// current thread's park token is set again so the caller's next `park` returns
/// immediately, exactly as if the wake-up had arrived after the sleep.
///
/// A spurious early return cannot be told apart from an `unpark`, so it is re-asserted
/// too. Callers may therefore see one extra wake-up; as with `park` itself, they must
/// re-check their own condition after waking. A sleep that runs to its deadline
/// without returning early leaves the park token untouched.
pub fn sleep_uninterruptibly(duration: Duration) {
    if duration.is_zero() {
        return;
    }

    let start = Instant::now();
    let mut woken = false;
    let mut remaining = duration;

    while !remaining.is_zero() {
        let parked_at = Instant::now();
        thread::park_timeout(remaining);

        if parked_at.elapsed() < remaining {
            woken = true;
        }

        remaining = duration.saturating_sub(start.elapsed());
    }

    if woken {
        thread::current().unpark();
    }
}

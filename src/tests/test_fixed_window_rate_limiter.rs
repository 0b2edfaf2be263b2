use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use crate::{
    ClockError, FixedWindowOptions, FixedWindowRateLimiter, LimiterKey, LocalRateLimiterOptions,
    LocalRateLimiterProvider, LocalStore, ManualClock, RateLimit, SystemClock, TollgateError,
    WindowSizeMs,
};

// Aligned to a window boundary for any window that divides one second.
const T0: Duration = Duration::from_secs(1_700_000_000);

fn options(prefix: &str, limit: u64, window_ms: u64) -> FixedWindowOptions {
    FixedWindowOptions {
        prefix: LimiterKey::try_from(prefix).unwrap(),
        limit: RateLimit::try_from(limit).unwrap(),
        window_ms: WindowSizeMs::try_from(window_ms).unwrap(),
    }
}

fn manual_limiter(
    limit: u64,
    window_ms: u64,
) -> (FixedWindowRateLimiter, Arc<LocalStore>, ManualClock) {
    let clock = ManualClock::new(T0);
    let store = Arc::new(LocalStore::with_clock(Arc::new(clock.clone())));
    let limiter = FixedWindowRateLimiter::new(
        store.clone(),
        Arc::new(clock.clone()),
        options("fw", limit, window_ms),
    );

    (limiter, store, clock)
}

fn system_limiter(limit: u64, window_ms: u64) -> FixedWindowRateLimiter {
    FixedWindowRateLimiter::new(
        Arc::new(LocalStore::new()),
        Arc::new(SystemClock),
        options("fw", limit, window_ms),
    )
}

fn sleep_to_window_start(window_ms: u64) {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    thread::sleep(Duration::from_millis(window_ms - now_ms % window_ms));
}

#[test]
fn window_key_is_prefix_and_index() {
    let (limiter, _store, _clock) = manual_limiter(1, 1000);
    let window = limiter.window();

    assert_eq!(limiter.window_key(0, window), "fw:0");
    assert_eq!(limiter.window_key(999, window), "fw:0");
    assert_eq!(limiter.window_key(1000, window), "fw:1");
    assert_eq!(
        limiter.window_key(T0.as_millis() as u64 + 1500, window),
        "fw:1700000001"
    );
}

#[test]
fn grants_limit_then_denies() {
    let (limiter, store, _clock) = manual_limiter(3, 1000);

    for _ in 0..3 {
        assert!(limiter.try_acquire().unwrap());
    }
    assert!(!limiter.try_acquire().unwrap());
    assert!(!limiter.try_acquire().unwrap());

    assert_eq!(store.window_count("fw:1700000000").unwrap(), Some(3));
}

#[test]
fn next_window_has_fresh_quota() {
    let (limiter, _store, clock) = manual_limiter(2, 1000);

    assert!(limiter.try_acquire().unwrap());
    assert!(limiter.try_acquire().unwrap());

    clock.advance(Duration::from_millis(999));
    assert!(!limiter.try_acquire().unwrap());

    clock.advance(Duration::from_millis(1));
    assert!(limiter.try_acquire().unwrap());
    assert!(limiter.try_acquire().unwrap());
    assert!(!limiter.try_acquire().unwrap());
}

#[test]
fn counter_expires_after_ttl() {
    // 2s window: counter lives 4s.
    let (limiter, store, clock) = manual_limiter(1, 2000);

    assert!(limiter.try_acquire().unwrap());
    clock.advance(Duration::from_millis(3999));
    assert_eq!(store.window_count("fw:850000000").unwrap(), Some(1));

    clock.advance(Duration::from_millis(1));
    assert_eq!(store.window_count("fw:850000000").unwrap(), None);
}

#[test]
fn try_acquire_timeout_gives_up_when_next_window_is_past_deadline() {
    let (limiter, _store, clock) = manual_limiter(1, 1000);
    clock.advance(Duration::from_millis(200));

    assert!(limiter.try_acquire().unwrap());

    // The next window opens in 800ms.
    let start = Instant::now();
    assert!(!limiter.try_acquire_timeout(Duration::from_millis(500)).unwrap());
    assert!(!limiter.try_acquire_timeout(Duration::from_millis(800)).unwrap());
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[test]
fn try_acquire_timeout_waits_for_next_window() {
    let limiter = system_limiter(1, 100);
    sleep_to_window_start(100);

    assert!(limiter.try_acquire().unwrap());

    let start = Instant::now();
    assert!(limiter.try_acquire_timeout(Duration::from_millis(500)).unwrap());
    assert!(start.elapsed() < Duration::from_millis(400));
}

#[test]
fn acquire_blocks_until_next_window() {
    let limiter = system_limiter(2, 200);
    sleep_to_window_start(200);

    let start = Instant::now();
    assert_eq!(limiter.acquire().unwrap(), Duration::ZERO);
    assert_eq!(limiter.acquire().unwrap(), Duration::ZERO);

    let waited = limiter.acquire().unwrap();
    assert!(waited > Duration::from_millis(100), "waited {waited:?}");
    assert!(waited <= Duration::from_millis(200), "waited {waited:?}");
    assert!(start.elapsed() >= waited);
}

#[test]
fn acquire_with_overrides_limit() {
    let (limiter, _store, _clock) = manual_limiter(1, 1000);

    assert_eq!(limiter.acquire().unwrap(), Duration::ZERO);
    assert!(!limiter.try_acquire().unwrap());

    let limit = RateLimit::try_from(2).unwrap();
    assert_eq!(
        limiter.acquire_with(limit, limiter.window()).unwrap(),
        Duration::ZERO
    );
    assert!(!limiter.try_once(limit, limiter.window()).unwrap());
}

#[test]
fn concurrent_callers_never_exceed_limit() {
    let (limiter, _store, _clock) = manual_limiter(25, 1000);
    let limiter = Arc::new(limiter);

    let handles = (0..10)
        .map(|_| {
            let limiter = limiter.clone();
            thread::spawn(move || {
                (0..10)
                    .filter(|_| limiter.try_acquire().unwrap())
                    .count()
            })
        })
        .collect::<Vec<_>>();

    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(granted, 25);
}

#[test]
fn limiters_sharing_a_prefix_share_quota() {
    let clock = ManualClock::new(T0);
    let provider = LocalRateLimiterProvider::new(LocalRateLimiterOptions {
        clock: Arc::new(clock),
    });

    let a = provider.fixed_window(options("shared", 2, 1000));
    let b = provider.fixed_window(options("shared", 2, 1000));
    let other = provider.fixed_window(options("other", 2, 1000));

    assert!(a.try_acquire().unwrap());
    assert!(b.try_acquire().unwrap());
    assert!(!a.try_acquire().unwrap());
    assert!(!b.try_acquire().unwrap());
    assert!(other.try_acquire().unwrap());

    assert_eq!(
        provider.store().window_count("shared:1700000000").unwrap(),
        Some(2)
    );
}

#[test]
fn clock_error_is_returned() {
    let (limiter, store, clock) = manual_limiter(1, 1000);

    clock.fail_next_read();
    assert!(matches!(
        limiter.try_acquire(),
        Err(TollgateError::Clock(ClockError::Unavailable))
    ));

    clock.fail_next_read();
    assert!(matches!(
        limiter.acquire(),
        Err(TollgateError::Clock(ClockError::Unavailable))
    ));

    assert_eq!(store.window_count("fw:1700000000").unwrap(), None);
}

#[test]
fn largest_window_denies_without_overflow() {
    let (limiter, _store, _clock) = manual_limiter(1, u64::MAX);

    assert!(limiter.try_acquire().unwrap());

    let start = Instant::now();
    assert!(!limiter.try_acquire_timeout(Duration::from_millis(10)).unwrap());
    assert!(!limiter.try_acquire_timeout(Duration::MAX).unwrap());
    assert!(start.elapsed() < Duration::from_millis(100));
}

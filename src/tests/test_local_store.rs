use std::{sync::Arc, time::Duration};

use crate::{
    ClockError, LocalStore, ManualClock, PermitsPerSecond, RateLimitStore, TollgateError,
};

fn store() -> (LocalStore, ManualClock) {
    let clock = ManualClock::new(Duration::from_secs(1_700_000_000));
    (LocalStore::with_clock(Arc::new(clock.clone())), clock)
}

fn pps(value: f64) -> PermitsPerSecond {
    PermitsPerSecond::try_from(value).unwrap()
}

#[test]
fn check_and_increment_counts_up_to_limit() {
    let (store, _clock) = store();

    for _ in 0..3 {
        assert!(store.fixed_window_check_and_increment("k:1", 3, 2).unwrap());
    }
    assert!(!store.fixed_window_check_and_increment("k:1", 3, 2).unwrap());
    assert_eq!(store.window_count("k:1").unwrap(), Some(3));
}

#[test]
fn denial_does_not_touch_the_counter() {
    let (store, clock) = store();

    assert!(store.fixed_window_check_and_increment("k:1", 1, 2).unwrap());
    clock.advance(Duration::from_millis(1500));

    // A denied attempt must not refresh the expiry either.
    assert!(!store.fixed_window_check_and_increment("k:1", 1, 2).unwrap());
    clock.advance(Duration::from_millis(600));

    assert_eq!(store.window_count("k:1").unwrap(), None);
}

#[test]
fn counters_are_independent_per_key() {
    let (store, _clock) = store();

    assert!(store.fixed_window_check_and_increment("k:1", 1, 2).unwrap());
    assert!(!store.fixed_window_check_and_increment("k:1", 1, 2).unwrap());
    assert!(store.fixed_window_check_and_increment("k:2", 1, 2).unwrap());
}

#[test]
fn expired_counter_starts_over() {
    let (store, clock) = store();

    assert!(store.fixed_window_check_and_increment("k:1", 1, 1).unwrap());
    assert!(!store.fixed_window_check_and_increment("k:1", 1, 1).unwrap());

    clock.advance(Duration::from_secs(1));

    assert_eq!(store.window_count("k:1").unwrap(), None);
    assert!(store.fixed_window_check_and_increment("k:1", 1, 1).unwrap());
    assert_eq!(store.window_count("k:1").unwrap(), Some(1));
}

#[test]
fn purge_expired_drops_only_expired_records() {
    let (store, clock) = store();

    store.fixed_window_check_and_increment("old:1", 5, 1).unwrap();
    store.token_bucket_init("bucket", pps(1f64), 10).unwrap();

    clock.advance(Duration::from_secs(2));
    store.fixed_window_check_and_increment("new:1", 5, 1).unwrap();

    assert_eq!(store.purge_expired().unwrap(), 1);
    assert_eq!(store.window_count("new:1").unwrap(), Some(1));
    assert!(store.token_bucket_state("bucket").is_ok());

    clock.advance(Duration::from_secs(10));
    assert_eq!(store.purge_expired().unwrap(), 2);
    assert_eq!(store.purge_expired().unwrap(), 0);
}

#[test]
fn reserve_uses_store_clock() {
    let (store, clock) = store();
    store.token_bucket_init("bucket", pps(5f64), 60).unwrap();

    assert_eq!(store.token_bucket_reserve("bucket", 5).unwrap(), 0);
    assert_eq!(store.token_bucket_reserve("bucket", 1).unwrap(), 0);
    assert_eq!(store.token_bucket_reserve("bucket", 1).unwrap(), 200_000);

    clock.advance(Duration::from_millis(100));
    assert_eq!(store.token_bucket_reserve("bucket", 1).unwrap(), 300_000);

    let now_micros = 1_700_000_000_100_000u64;
    assert_eq!(
        store.token_bucket_next_free_ticket_micros("bucket").unwrap(),
        now_micros + 500_000
    );
}

#[test]
fn init_overwrites_existing_bucket() {
    let (store, _clock) = store();
    store.token_bucket_init("bucket", pps(5f64), 60).unwrap();
    store.token_bucket_reserve("bucket", 20).unwrap();

    store.token_bucket_init("bucket", pps(10f64), 60).unwrap();

    let state = store.token_bucket_state("bucket").unwrap();
    assert_eq!(state.max_permits, 10f64);
    assert_eq!(state.stored_permits, 10f64);
    assert_eq!(state.next_free_ticket_micros, 0f64);
    assert_eq!(store.token_bucket_reserve("bucket", 1).unwrap(), 0);
}

#[test]
fn missing_bucket_is_not_found() {
    let (store, _clock) = store();

    assert!(matches!(
        store.token_bucket_reserve("nope", 1),
        Err(TollgateError::LimiterNotFound(id)) if id == "nope"
    ));
    assert!(matches!(
        store.token_bucket_next_free_ticket_micros("nope"),
        Err(TollgateError::LimiterNotFound(_))
    ));
    assert!(matches!(
        store.token_bucket_state("nope"),
        Err(TollgateError::LimiterNotFound(_))
    ));
}

#[test]
fn deleted_or_expired_bucket_is_not_found() {
    let (store, clock) = store();

    store.token_bucket_init("deleted", pps(5f64), 60).unwrap();
    store.token_bucket_delete("deleted").unwrap();
    store.token_bucket_delete("deleted").unwrap();
    assert!(matches!(
        store.token_bucket_reserve("deleted", 1),
        Err(TollgateError::LimiterNotFound(_))
    ));

    store.token_bucket_init("expiring", pps(5f64), 1).unwrap();
    clock.advance(Duration::from_secs(1));
    assert!(matches!(
        store.token_bucket_reserve("expiring", 1),
        Err(TollgateError::LimiterNotFound(_))
    ));
}

#[test]
fn clock_failure_is_propagated() {
    let (store, clock) = store();
    store.token_bucket_init("bucket", pps(5f64), 60).unwrap();

    clock.fail_next_read();
    assert!(matches!(
        store.fixed_window_check_and_increment("k:1", 1, 1),
        Err(TollgateError::Clock(ClockError::Unavailable))
    ));
    assert_eq!(store.window_count("k:1").unwrap(), None);

    clock.fail_next_read();
    assert!(matches!(
        store.token_bucket_reserve("bucket", 1),
        Err(TollgateError::Clock(ClockError::Unavailable))
    ));
    assert_eq!(store.token_bucket_state("bucket").unwrap().stored_permits, 5f64);
}

#[test]
fn concurrent_increments_never_exceed_limit() {
    let (store, _clock) = store();
    let store = Arc::new(store);

    let handles = (0..8)
        .map(|_| {
            let store = store.clone();
            std::thread::spawn(move || {
                (0..50)
                    .filter(|_| {
                        store
                            .fixed_window_check_and_increment("hot:1", 100, 10)
                            .unwrap()
                    })
                    .count()
            })
        })
        .collect::<Vec<_>>();

    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(granted, 100);
    assert_eq!(store.window_count("hot:1").unwrap(), Some(100));
}

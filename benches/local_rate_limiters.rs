use std::{hint::black_box, sync::Arc, time::Duration};

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use tollgate::{
    FixedWindowOptions, FixedWindowRateLimiter, LimiterKey, LocalStore, ManualClock, Permits,
    PermitsPerSecond, RateLimit, SmoothBurstyOptions, SmoothBurstyRateLimiter, SystemClock,
    WindowSizeMs,
};

fn fixed_window(store: Arc<LocalStore>, prefix: &str, limit: u64) -> FixedWindowRateLimiter {
    FixedWindowRateLimiter::new(
        store,
        Arc::new(SystemClock),
        FixedWindowOptions {
            prefix: LimiterKey::try_from(prefix).unwrap(),
            limit: RateLimit::try_from(limit).unwrap(),
            window_ms: WindowSizeMs::try_from(60_000).unwrap(),
        },
    )
}

fn bench_fixed_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_fixed_window");
    group.sample_size(200);

    group.bench_function("try_acquire/granted", |b| {
        let limiter = fixed_window(Arc::new(LocalStore::new()), "hot", u64::MAX);

        b.iter(|| {
            black_box(limiter.try_acquire().unwrap());
        });
    });

    group.bench_function("try_acquire/denied", |b| {
        let limiter = fixed_window(Arc::new(LocalStore::new()), "hot", 10);
        for _ in 0..10 {
            limiter.try_acquire().unwrap();
        }

        b.iter(|| {
            black_box(limiter.try_acquire().unwrap());
        });
    });

    for key_space in [1_000_usize, 100_000] {
        group.bench_function(format!("try_acquire/prefixes={key_space}"), |b| {
            let store = Arc::new(LocalStore::new());
            let limiters: Vec<FixedWindowRateLimiter> = (0..key_space)
                .map(|i| fixed_window(store.clone(), &format!("user_{i}"), u64::MAX))
                .collect();

            b.iter_batched(
                || 0_usize,
                |mut idx| {
                    idx = idx.wrapping_add(1);
                    black_box(limiters[idx % limiters.len()].try_acquire().unwrap());
                    idx
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_smooth_bursty(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_smooth_bursty");
    group.sample_size(200);

    group.bench_function("reserve", |b| {
        // Frozen clock: the bucket only accumulates debt, which `reserve` never sleeps on.
        let clock = ManualClock::new(Duration::from_secs(1_700_000_000));
        let limiter = SmoothBurstyRateLimiter::new(
            Arc::new(LocalStore::with_clock(Arc::new(clock.clone()))),
            Arc::new(clock),
            SmoothBurstyOptions {
                id: LimiterKey::try_from("bench").unwrap(),
                permits_per_second: PermitsPerSecond::try_from(1_000f64).unwrap(),
            },
        )
        .unwrap();

        b.iter(|| {
            black_box(limiter.reserve(black_box(Permits::one())).unwrap());
        });
    });

    group.bench_function("try_acquire/in_debt", |b| {
        let limiter = SmoothBurstyRateLimiter::new(
            Arc::new(LocalStore::new()),
            Arc::new(SystemClock),
            SmoothBurstyOptions {
                id: LimiterKey::try_from("bench").unwrap(),
                permits_per_second: PermitsPerSecond::try_from(1f64).unwrap(),
            },
        )
        .unwrap();
        limiter
            .reserve(Permits::try_from(1_000_000).unwrap())
            .unwrap();

        b.iter(|| {
            black_box(limiter.try_acquire().unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_fixed_window, bench_smooth_bursty);
criterion_main!(benches);

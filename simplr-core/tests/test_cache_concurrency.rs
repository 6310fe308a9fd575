use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use simplr_core::{CacheConfig, CacheManager, Namespace};

fn shared_cache() -> Arc<CacheManager<u64>> {
    Arc::new(CacheManager::new(CacheConfig::default()))
}

#[test]
fn concurrent_misses_compute_once() {
    let cache = shared_cache();
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get_with(Namespace::FilteredLists, "v1|filter=all", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(50));
                    42
                })
            })
        })
        .collect();

    for h in handles {
        assert_eq!(h.join().unwrap(), 42);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_compute_lets_a_waiter_retry() {
    let cache = shared_cache();
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get(Namespace::Aggregates, "v1|filter=overdue", || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        thread::sleep(Duration::from_millis(50));
                        Err("snapshot torn")
                    } else {
                        Ok(3)
                    }
                })
            })
        })
        .collect();

    let results: Vec<Result<u64, &str>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    assert_eq!(results.iter().filter(|r| **r == Ok(3)).count(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn invalidation_during_flight_forces_waiters_to_recompute() {
    let cache = shared_cache();
    let calls = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let first = {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        thread::spawn(move || {
            cache.get_with(Namespace::CategoryLists, "v1|filter=category:home", || {
                calls.fetch_add(1, Ordering::SeqCst);
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                1
            })
        })
    };

    started_rx.recv().unwrap();
    let second = {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        thread::spawn(move || {
            cache.get_with(Namespace::CategoryLists, "v1|filter=category:home", || {
                calls.fetch_add(1, Ordering::SeqCst);
                2
            })
        })
    };

    cache.invalidate(Namespace::CategoryLists, "v1|filter=category:home");
    release_tx.send(()).unwrap();

    assert_eq!(first.join().unwrap(), 1);
    assert_eq!(second.join().unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn readers_and_invalidator_do_not_deadlock() {
    let cache = shared_cache();
    let readers: Vec<_> = (0..4)
        .map(|r| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..200u64 {
                    let key = format!("v{}|filter=all", i % 5);
                    let v = cache.get_with(Namespace::FilteredLists, &key, || i % 5);
                    assert_eq!(v, i % 5, "reader {r}");
                }
            })
        })
        .collect();

    let writer = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for _ in 0..50 {
                cache.invalidate_all(Namespace::FilteredLists);
                thread::yield_now();
            }
        })
    };

    for h in readers {
        h.join().unwrap();
    }
    writer.join().unwrap();
}

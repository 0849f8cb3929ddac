use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{mpsc, Arc};
use std::thread;

use multiplex_pool::Pool;

/// Pooled value that checks mutual exclusion of its holders.
#[derive(Default)]
struct Guard {
    active: AtomicUsize,
}

impl Guard {
    fn enter(&self, cap: usize) {
        let active = self.active.fetch_add(1, SeqCst);
        assert!(active < cap, "entry multiplexed past its cap");
    }

    fn exit(&self) {
        self.active.fetch_sub(1, SeqCst);
    }
}

/// Pooled value that counts how often it is dropped.
struct Tracked {
    drops: Arc<AtomicUsize>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, SeqCst);
    }
}

#[test]
fn concurrent_acquire_is_exclusive() {
    const THREADS: usize = 32;
    const CYCLES: usize = 10_000;
    const ENTRIES: usize = 8;

    let pool = Pool::new(ENTRIES, 4);
    for _ in 0..ENTRIES {
        pool.reserve(None).unwrap().enable(Guard::default());
    }

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                let mut done = 0;
                while done < CYCLES {
                    let Some(entry) = pool.acquire() else {
                        thread::yield_now();
                        continue;
                    };
                    let guard = entry.pooled().unwrap();
                    guard.enter(1);
                    guard.exit();
                    assert!(entry.release());
                    done += 1;
                }
            });
        }
    });

    let values = pool.values();
    assert_eq!(values.len(), ENTRIES);
    let total: u64 = values.iter().map(|e| u64::from(e.usage_count())).sum();
    assert_eq!(total, (THREADS * CYCLES) as u64);
    for entry in &values {
        assert!(entry.is_idle());
        assert!(entry.usage_count() > 0, "an entry was starved");
    }
}

#[test]
fn concurrent_multiplexing_respects_the_cap() {
    let pool = Pool::new(1, 0);
    pool.set_max_multiplex(3);
    pool.reserve(None).unwrap().enable(Guard::default());

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..2_000 {
                    if let Some(entry) = pool.acquire() {
                        let guard = entry.pooled().unwrap();
                        guard.enter(3);
                        guard.exit();
                        assert!(entry.release());
                    } else {
                        thread::yield_now();
                    }
                }
            });
        }
    });

    assert_eq!(pool.in_use_count(), 0);
}

#[test]
fn retirement_caps_total_acquisitions() {
    const BUDGET: usize = 100;

    let pool = Pool::new(1, 0);
    pool.set_max_usage_count(BUDGET as i32);
    pool.reserve(None).unwrap().enable(Guard::default());

    let acquisitions = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| loop {
                match pool.acquire() {
                    Some(entry) => {
                        acquisitions.fetch_add(1, SeqCst);
                        if !entry.release() {
                            assert!(pool.remove(&entry));
                        }
                    }
                    None => {
                        if pool.size() == 0 {
                            break;
                        }
                        thread::yield_now();
                    }
                }
            });
        }
    });

    assert_eq!(acquisitions.load(SeqCst), BUDGET);
    assert_eq!(pool.size(), 0);
}

#[test]
fn close_drains_in_use_entries() {
    let drops = Arc::new(AtomicUsize::new(0));
    let pool = Pool::new(2, 0);
    for _ in 0..2 {
        pool.reserve(None).unwrap().enable(Tracked {
            drops: Arc::clone(&drops),
        });
    }

    let e1 = pool.acquire().unwrap();
    let e2 = pool.acquire().unwrap();

    thread::scope(|s| {
        s.spawn(|| pool.close());
    });
    assert!(pool.is_closed());
    assert!(pool.values().is_empty());
    assert_eq!(drops.load(SeqCst), 0, "held values survive the close");

    assert!(!e1.release());
    assert!(!e2.release());
    assert!(!pool.remove(&e1));
    assert!(!pool.remove(&e2));

    drop(e1);
    drop(e2);
    assert_eq!(drops.load(SeqCst), 2, "each value is dropped exactly once");
}

#[test]
fn close_disposes_idle_entries_immediately() {
    let drops = Arc::new(AtomicUsize::new(0));
    let pool = Pool::new(2, 0);
    for _ in 0..2 {
        pool.reserve(None).unwrap().enable(Tracked {
            drops: Arc::clone(&drops),
        });
    }

    pool.close();
    assert_eq!(drops.load(SeqCst), 2);
}

#[test]
fn releasing_on_another_thread_poisons_only_its_cache() {
    let pool = Pool::new(1, 2);
    pool.reserve(None).unwrap().enable(String::from("c"));

    thread::scope(|s| {
        let (tx, rx) = mpsc::channel();
        let pool = &pool;
        s.spawn(move || {
            let entry = pool.acquire().unwrap();
            tx.send(entry).unwrap();
        });

        // This thread releases an entry it never acquired; its cache now
        // hints at the entry and acquisition revalidates the hint.
        let entry = rx.recv().unwrap();
        assert!(pool.release(&entry));

        let again = pool.acquire().unwrap();
        assert_eq!(again.pooled().map(String::as_str), Some("c"));
        assert!(again.release());
    });
}

#[test]
fn cached_entries_are_never_handed_out_twice() {
    let pool = Pool::new(2, 2);
    for _ in 0..2 {
        pool.reserve(None).unwrap().enable(Guard::default());
    }

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..5_000 {
                    if let Some(entry) = pool.acquire() {
                        let guard = entry.pooled().unwrap();
                        guard.enter(1);
                        guard.exit();
                        assert!(entry.release());
                    }
                }
            });
        }
    });
}

#[test]
fn concurrent_reservations_respect_capacity() {
    let pool = Pool::<String>::new(4, 0);

    thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|_| s.spawn(|| pool.reserve(None))).collect();
        let reservations: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(reservations.len(), 4, "capacity bounds reservations");
        assert_eq!(pool.size(), 4);
        assert_eq!(pool.pending_count(), 4);

        drop(reservations);
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.pending_count(), 0);
    });
}

#[test]
fn closed_entries_never_resurrect() {
    let pool = Pool::new(4, 2);
    for _ in 0..4 {
        pool.reserve(None).unwrap().enable(Guard::default());
    }

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..2_000 {
                    if let Some(entry) = pool.acquire() {
                        let guard = entry.pooled().unwrap();
                        guard.enter(1);
                        guard.exit();
                        if !entry.release() {
                            pool.remove(&entry);
                        }
                    }
                }
            });
        }
        s.spawn(|| {
            // Evict entries out from under the acquiring threads; a removal
            // deferred to a holder is finished by that holder's release path.
            for index in 0..4 {
                if let Some(entry) = pool.acquire_at(index) {
                    pool.remove(&entry);
                    thread::yield_now();
                }
            }
        });
    });
}

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use cmap_rs::CMap;
use rand::prelude::*;

#[test]
fn concurrent_mixed_ops_string_keys() {
    let m: Arc<CMap<String, usize>> = Arc::new(CMap::with_capacity(1024));
    let n_threads = 6;
    let iters = 3_000;
    let barrier = Arc::new(Barrier::new(n_threads));

    let mut handles = Vec::new();
    for t in 0..n_threads {
        let b = barrier.clone();
        let map = m.clone();
        handles.push(thread::spawn(move || {
            b.wait();
            for i in 0..iters {
                let k = format!("k:{}:{}", t, i % 1024);
                if i % 4 == 0 {
                    map.insert(k, i);
                } else if i % 4 == 1 {
                    let _ = map.get(&k);
                } else if i % 4 == 2 {
                    let _ = map.get_or_insert(k, i);
                } else {
                    let _ = map.remove(&k);
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert!(m.len() <= n_threads * 1024);
    assert_eq!(m.len(), m.iter().count());
}

#[test]
fn concurrent_distinct_inserts_then_deletes() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 2048;
    let m: Arc<CMap<usize, usize>> = Arc::new(CMap::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let mut handles = Vec::new();
    for t in 0..THREADS {
        let b = barrier.clone();
        let map = m.clone();
        handles.push(thread::spawn(move || {
            b.wait();
            for i in (t * PER_THREAD)..((t + 1) * PER_THREAD) {
                let _ = map.insert(i, i);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let total = THREADS * PER_THREAD;
    assert_eq!(m.len(), total);
    let mut seen = vec![false; total];
    for (k, v) in m.iter() {
        assert_eq!(k, v);
        assert!(!seen[k], "key {} visited twice", k);
        seen[k] = true;
    }
    assert!(seen.iter().all(|&s| s), "iteration missed keys");

    // and tear it all back down concurrently
    let barrier = Arc::new(Barrier::new(THREADS));
    let mut handles = Vec::new();
    for t in 0..THREADS {
        let b = barrier.clone();
        let map = m.clone();
        handles.push(thread::spawn(move || {
            b.wait();
            for i in (t * PER_THREAD)..((t + 1) * PER_THREAD) {
                assert_eq!(map.remove(&i), Some(i));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(m.len(), 0);
    assert_eq!(m.iter().count(), 0);
}

#[test]
fn get_or_insert_has_exactly_one_winner() {
    const THREADS: usize = 8;
    let m: Arc<CMap<u32, usize>> = Arc::new(CMap::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let mut handles = Vec::new();
    for t in 0..THREADS {
        let b = barrier.clone();
        let map = m.clone();
        handles.push(thread::spawn(move || {
            b.wait();
            map.get_or_insert(999, t)
        }));
    }
    let results: Vec<(usize, bool)> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<usize> = results
        .iter()
        .filter(|(_, loaded)| !*loaded)
        .map(|(v, _)| *v)
        .collect();
    assert_eq!(winners.len(), 1, "expected exactly one storing caller");
    for (v, _) in &results {
        assert_eq!(*v, winners[0], "all callers must see the winner's value");
    }
    assert_eq!(m.len(), 1);
    assert_eq!(m.get(&999), Some(winners[0]));
}

#[test]
fn range_sees_each_key_once_with_consistent_values() {
    const MAP_SIZE: u64 = 1 << 10;
    const WRITERS: u64 = 4;

    let m: Arc<CMap<u64, u64>> = Arc::new(CMap::new());
    for n in 1..=MAP_SIZE {
        let _ = m.insert(n, n);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();
    for g in 1..=WRITERS {
        let map = m.clone();
        let stop = stop.clone();
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(g);
            let mut i = 1u64;
            while !stop.load(Ordering::Relaxed) {
                for n in 1..MAP_SIZE {
                    if rng.gen_range(0..MAP_SIZE) == 0 {
                        // values stay multiples of the key
                        let _ = map.insert(n, n.wrapping_mul(i).wrapping_mul(g));
                    } else {
                        let _ = map.get(&n);
                    }
                }
                i += 1;
            }
        }));
    }

    for _ in 0..64 {
        let mut seen = HashSet::new();
        for (k, v) in m.iter() {
            assert_eq!(v % k, 0, "value {} is not a multiple of key {}", v, k);
            assert!(seen.insert(k), "key {} visited twice", k);
        }
        assert_eq!(seen.len(), MAP_SIZE as usize);
    }

    stop.store(true, Ordering::Relaxed);
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn concurrent_growth_keeps_every_insertion() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 50_000;
    let m: Arc<CMap<usize, usize>> = Arc::new(CMap::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let mut handles = Vec::new();
    for t in 0..THREADS {
        let b = barrier.clone();
        let map = m.clone();
        handles.push(thread::spawn(move || {
            b.wait();
            // all threads hammer the same dense range so every grow happens under fire
            for i in 0..PER_THREAD {
                let _ = map.insert(i, i + t);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(m.len(), PER_THREAD);
    for i in (0..PER_THREAD).step_by(997) {
        let v = m.get(&i).expect("key lost during concurrent growth");
        assert!((v - i) < THREADS);
    }
}

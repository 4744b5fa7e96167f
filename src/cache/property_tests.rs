//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check store and memoization invariants over random inputs.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::cache::{derive_key, memoize, CacheStore, CallArgs};

// == Test Configuration ==
const TEST_DEFAULT_TTL: Duration = Duration::from_secs(300);

fn new_store() -> CacheStore<String> {
    CacheStore::new(TEST_DEFAULT_TTL)
}

// == Strategies ==
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_:]{1,64}"
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,256}"
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
    Clear,
}

// Small key space so operations hit the same keys often
fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    let key = "[a-e]";
    prop_oneof![
        4 => (key, value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        4 => key.prop_map(|key| CacheOp::Get { key }),
        2 => key.prop_map(|key| CacheOp::Delete { key }),
        1 => Just(CacheOp::Clear),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // For any key/value, set followed by get returns the value.
    #[test]
    fn prop_roundtrip_storage(key in key_strategy(), value in value_strategy()) {
        let store = new_store();

        store.set(key.clone(), value.clone(), None);

        prop_assert_eq!(store.get(&key), Some(value));
    }

    // A second set on the same key replaces the first; only one entry remains.
    #[test]
    fn prop_overwrite_semantics(
        key in key_strategy(),
        first in value_strategy(),
        second in value_strategy(),
    ) {
        let store = new_store();

        store.set(key.clone(), first, None);
        store.set(key.clone(), second.clone(), None);

        prop_assert_eq!(store.get(&key), Some(second));
        prop_assert_eq!(store.len(), 1);
    }

    // After delete, get misses.
    #[test]
    fn prop_delete_removes_entry(key in key_strategy(), value in value_strategy()) {
        let store = new_store();

        store.set(key.clone(), value, None);
        prop_assert!(store.delete(&key));

        prop_assert_eq!(store.get(&key), None);
    }

    // Absent keys always yield the caller's default.
    #[test]
    fn prop_absent_key_returns_default(key in key_strategy(), default in value_strategy()) {
        let store = new_store();

        prop_assert_eq!(store.get_or(&key, default.clone()), default);
    }

    // The store behaves like a HashMap model for any operation sequence,
    // and the statistics count every lookup.
    #[test]
    fn prop_matches_model(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let store = new_store();
        let mut model: HashMap<String, String> = HashMap::new();
        let mut lookups: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    store.set(key.clone(), value.clone(), None);
                    model.insert(key, value);
                }
                CacheOp::Get { key } => {
                    lookups += 1;
                    prop_assert_eq!(store.get(&key), model.get(&key).cloned());
                }
                CacheOp::Delete { key } => {
                    prop_assert_eq!(store.delete(&key), model.remove(&key).is_some());
                }
                CacheOp::Clear => {
                    store.clear();
                    model.clear();
                }
            }
        }

        let stats = store.stats();
        prop_assert_eq!(stats.hits + stats.misses, lookups);
        prop_assert_eq!(stats.total_entries, model.len());
        prop_assert_eq!(store.len(), model.len());
    }

    // Keyword arguments yield the same key in any insertion order.
    #[test]
    fn prop_kwarg_order_is_irrelevant(
        kwargs in prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..6),
        positional in prop::collection::vec("[a-z0-9]{1,8}", 0..4),
    ) {
        let base = positional.iter().fold(CallArgs::new(), |args, p| args.arg(p));

        let forward = kwargs.iter().fold(base.clone(), |args, (k, v)| args.kwarg(k.clone(), v));
        let backward = kwargs.iter().rev().fold(base, |args, (k, v)| args.kwarg(k.clone(), v));

        prop_assert_eq!(derive_key("f", &forward), derive_key("f", &backward));
    }

    // A memoized function runs its body once per distinct argument tuple.
    #[test]
    fn prop_memoize_runs_once_per_distinct_args(
        calls in prop::collection::vec((0i32..5, 0i32..5), 1..40),
    ) {
        let counter = Arc::new(AtomicUsize::new(0));
        let body_counter = counter.clone();
        let f = memoize(Arc::new(CacheStore::new(TEST_DEFAULT_TTL)), "f", move |(a, b): (i32, i32)| {
            body_counter.fetch_add(1, Ordering::SeqCst);
            a * 10 + b
        });

        for &(a, b) in &calls {
            prop_assert_eq!(f.call((a, b)), a * 10 + b);
        }

        let distinct: std::collections::HashSet<_> = calls.iter().collect();
        prop_assert_eq!(counter.load(Ordering::SeqCst), distinct.len());
    }
}

// N threads writing N disjoint keys lose no writes.
#[test]
fn test_concurrent_disjoint_writes() {
    let store = Arc::new(new_store());
    let threads = 16;
    let per_thread = 50;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..per_thread {
                    store.set(format!("t{}_k{}", t, i), format!("{}", i), None);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), threads * per_thread);
    for t in 0..threads {
        for i in 0..per_thread {
            assert_eq!(store.get(&format!("t{}_k{}", t, i)), Some(format!("{}", i)));
        }
    }
}

// Readers racing with the reaper's sweep never see an expired value.
#[test]
fn test_sweep_races_with_readers() {
    let store = Arc::new(new_store());
    for i in 0..200 {
        store.set(format!("k{}", i), "v".to_string(), Some(Duration::from_millis(20)));
    }
    thread::sleep(Duration::from_millis(40));

    let sweeper = {
        let store = store.clone();
        thread::spawn(move || store.cleanup_expired())
    };
    let reader = {
        let store = store.clone();
        thread::spawn(move || (0..200).filter(|i| store.get(&format!("k{}", i)).is_some()).count())
    };

    let swept = sweeper.join().unwrap();
    let served = reader.join().unwrap();

    assert_eq!(served, 0);
    assert_eq!(store.len(), 0);
    assert!(swept <= 200);
    // Each expired entry is counted once, by whichever side removed it
    assert_eq!(store.stats().expirations, 200);
}

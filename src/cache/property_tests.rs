//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache against its documented behaviour.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::TimeDelta;

use crate::cache::{Cache, FixedMemory, ManualClock};
use crate::config::CacheOptions;
use crate::error::CacheError;

// == Test Configuration ==
const TEST_TTL: i64 = 60;

fn test_cache(ttl: i64) -> (Cache, ManualClock, Arc<FixedMemory>) {
    let clock = ManualClock::default();
    let memory = Arc::new(FixedMemory::new(1_000));
    let options = CacheOptions {
        namespace: "prop".to_string(),
        ttl,
        memory_limit: 0,
    };
    let cache = Cache::with_sources(options, Arc::new(clock.clone()), memory.clone()).unwrap();
    (cache, clock, memory)
}

// == Strategies ==
/// Generates cache keys
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_:]{1,32}"
}

/// Generates namespaces
fn namespace_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,12}"
}

/// Generates arbitrary JSON payloads, nested up to a few levels
fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,32}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::hash_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

fn tag_set_strategy() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("[a-d]", 0..4)
}

/// Generates a sequence of cache operations for testing
#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: i64 },
    Add { key: String, value: i64 },
    Replace { key: String, value: i64 },
    Remove { key: String },
    Increment { key: String, delta: i64 },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    let key = "[a-e]";
    prop_oneof![
        (key, -1000i64..1000).prop_map(|(key, value)| CacheOp::Set { key, value }),
        (key, -1000i64..1000).prop_map(|(key, value)| CacheOp::Add { key, value }),
        (key, -1000i64..1000).prop_map(|(key, value)| CacheOp::Replace { key, value }),
        key.prop_map(|key| CacheOp::Remove { key }),
        (key, -1000i64..1000).prop_map(|(key, delta)| CacheOp::Increment { key, delta }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Round-trip: any JSON value written is read back unchanged.
    #[test]
    fn prop_roundtrip_storage(key in key_strategy(), value in value_strategy()) {
        let (mut cache, _, _) = test_cache(TEST_TTL);

        cache.set(&key, value.clone()).unwrap();

        prop_assert_eq!(cache.get(&key), Some(value));
    }

    // TTL expiry: readable strictly before write_time + ttl, unreadable from then on.
    #[test]
    fn prop_ttl_boundary(
        key in key_strategy(),
        ttl in 1i64..3600,
        elapsed_ms in 0i64..7_200_000
    ) {
        let (mut cache, clock, _) = test_cache(ttl);

        cache.set(&key, json!("v")).unwrap();
        clock.advance(TimeDelta::milliseconds(elapsed_ms));

        let expected = elapsed_ms < ttl * 1000;
        prop_assert_eq!(cache.has(&key), expected);
        prop_assert_eq!(cache.get(&key).is_some(), expected);
        prop_assert_eq!(cache.keys().any(|k| k == key), expected);
    }

    // Namespace isolation: a key written in one namespace is invisible in another.
    #[test]
    fn prop_namespace_isolation(
        key in key_strategy(),
        first in namespace_strategy(),
        second in namespace_strategy()
    ) {
        prop_assume!(first != second);
        let (mut cache, _, _) = test_cache(TEST_TTL);

        cache.set_namespace(first.clone()).unwrap();
        cache.set(&key, json!(1)).unwrap();
        cache.set_namespace(second).unwrap();

        prop_assert!(!cache.has(&key));
        prop_assert_eq!(cache.get(&key), None);

        cache.set_namespace(first).unwrap();
        prop_assert!(cache.has(&key));
    }

    // The cache agrees with a plain map model over mixed write sequences.
    #[test]
    fn prop_matches_map_model(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let (mut cache, _, _) = test_cache(0);
        let mut model: HashMap<String, i64> = HashMap::new();

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    cache.set(&key, json!(value)).unwrap();
                    model.insert(key, value);
                }
                CacheOp::Add { key, value } => {
                    let added = cache.add(&key, json!(value)).unwrap();
                    prop_assert_eq!(added, !model.contains_key(&key));
                    model.entry(key).or_insert(value);
                }
                CacheOp::Replace { key, value } => {
                    let replaced = cache.replace(&key, json!(value)).unwrap();
                    prop_assert_eq!(replaced, model.contains_key(&key));
                    if let Some(slot) = model.get_mut(&key) {
                        *slot = value;
                    }
                }
                CacheOp::Remove { key } => {
                    prop_assert_eq!(cache.remove(&key), model.remove(&key).is_some());
                }
                CacheOp::Increment { key, delta } => {
                    let updated = cache.increment(&key, delta).unwrap();
                    let slot = model.entry(key).or_insert(0);
                    *slot += delta;
                    prop_assert_eq!(updated, json!(*slot));
                }
            }
        }

        prop_assert_eq!(cache.len(), model.len());
        prop_assert_eq!(cache.namespace_count(), usize::from(!model.is_empty()));
        for (key, value) in &model {
            prop_assert_eq!(cache.get(key), Some(json!(value)));
        }
    }

    // Tag eviction: OR removes entries intersecting the query, AND removes supersets.
    #[test]
    fn prop_clear_by_tags(
        entries in prop::collection::vec(tag_set_strategy(), 1..12),
        query in tag_set_strategy(),
        disjunction in any::<bool>()
    ) {
        let (mut cache, _, _) = test_cache(TEST_TTL);
        for (i, tags) in entries.iter().enumerate() {
            let key = format!("k{}", i);
            cache.set(&key, json!(i)).unwrap();
            cache.set_tags(&key, tags.iter().cloned());
        }

        let query: Vec<String> = query.into_iter().collect();
        let removed = cache.clear_by_tags(&query[..], disjunction);

        let mut expected_removed = 0;
        for (i, tags) in entries.iter().enumerate() {
            let matches = !tags.is_empty() && if disjunction {
                query.iter().any(|tag| tags.contains(tag))
            } else {
                query.iter().all(|tag| tags.contains(tag))
            };
            if matches {
                expected_removed += 1;
            }
            prop_assert_eq!(cache.has(&format!("k{}", i)), !matches);
        }
        prop_assert_eq!(removed, expected_removed);
    }

    // Prefix eviction removes exactly the keys starting with the prefix.
    #[test]
    fn prop_clear_by_prefix(
        keys in prop::collection::btree_set(key_strategy(), 1..20),
        prefix in "[a-zA-Z0-9_:]{1,3}"
    ) {
        let (mut cache, _, _) = test_cache(TEST_TTL);
        for key in &keys {
            cache.set(key, json!(null)).unwrap();
        }

        let removed = cache.clear_by_prefix(&prefix).unwrap();

        let expected = keys.iter().filter(|k| k.starts_with(prefix.as_str())).count();
        prop_assert_eq!(removed, expected);
        for key in &keys {
            prop_assert_eq!(cache.has(key), !key.starts_with(prefix.as_str()));
        }
    }

    // Capacity guard: with usage at or above the limit no write changes anything.
    #[test]
    fn prop_capacity_guard(
        keys in prop::collection::btree_set(key_strategy(), 1..10),
        excess in 0u64..1_000
    ) {
        let (mut cache, _, memory) = test_cache(TEST_TTL);
        for key in &keys {
            cache.set(key, json!(0)).unwrap();
        }
        cache.set_memory_limit(4_096);
        memory.set(4_096 + excess);
        let before = cache.len();

        for key in &keys {
            let rejected = matches!(cache.set(key, json!(1)), Err(CacheError::OutOfSpace { .. }));
            prop_assert!(rejected, "set should be rejected");
            let rejected = matches!(cache.replace(key, json!(1)), Err(CacheError::OutOfSpace { .. }));
            prop_assert!(rejected, "replace should be rejected");
            let rejected = matches!(cache.increment(key, 1), Err(CacheError::OutOfSpace { .. }));
            prop_assert!(rejected, "increment should be rejected");
        }
        let rejected = matches!(
            cache.set_items([("new", json!(1))]),
            Err(CacheError::OutOfSpace { .. })
        );
        prop_assert!(rejected, "bulk write should be rejected");

        prop_assert_eq!(cache.len(), before);
        for key in &keys {
            prop_assert_eq!(cache.get(key), Some(json!(0)));
        }
    }

    // Flush leaves nothing behind in any namespace.
    #[test]
    fn prop_flush_clears_all_namespaces(
        entries in prop::collection::vec((namespace_strategy(), key_strategy()), 1..20)
    ) {
        let (mut cache, _, _) = test_cache(TEST_TTL);
        for (namespace, key) in &entries {
            cache.set_namespace(namespace.clone()).unwrap();
            cache.set(key, json!(true)).unwrap();
        }

        cache.flush();

        prop_assert!(cache.is_empty());
        for (namespace, key) in &entries {
            cache.set_namespace(namespace.clone()).unwrap();
            prop_assert!(!cache.has(key));
        }
    }
}

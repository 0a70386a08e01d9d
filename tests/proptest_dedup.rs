//! Property-based tests for change detection.
//!
//! Uses proptest to generate random property bags and verify the dedup
//! contract holds for any input: repeats are skipped, real changes are not,
//! and volatile fields never count as a change.
//!
//! Run with: `cargo test --test proptest_dedup`

use proptest::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;

use changelog_engine::{
    ChangeRecord, DedupCache, EdgeChange, NodeChange, Properties, DEFAULT_IGNORED_KEYS,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

fn json_leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        "[a-zA-Z0-9 _-]{0,20}".prop_map(Value::String),
    ]
}

fn json_value_strategy() -> impl Strategy<Value = Value> {
    json_leaf_strategy().prop_recursive(3, 32, 5, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..5)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Property maps whose keys never collide with the volatile ignore-set
fn property_map_strategy() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map("p_[a-z]{1,8}", json_value_strategy(), 0..8)
}

fn object_id_strategy() -> impl Strategy<Value = String> {
    "S-1-5-21-[0-9]{1,10}"
}

fn props(map: &BTreeMap<String, Value>) -> Properties {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// An unchanged record is submitted once, then skipped forever
    #[test]
    fn prop_idempotent_resubmission(
        id in object_id_strategy(),
        map in property_map_strategy(),
        repeats in 1usize..20,
    ) {
        let cache = DedupCache::new(0);
        let record = NodeChange::new(id, ["User"], props(&map));

        prop_assert!(cache.should_submit(&record).unwrap());
        for _ in 0..repeats {
            prop_assert!(!cache.should_submit(&record).unwrap());
        }

        let stats = cache.stats();
        prop_assert_eq!(stats.misses, 1);
        prop_assert_eq!(stats.hits, repeats as u64);
    }

    /// A different value under the same identity is a change, and becomes the stored state
    #[test]
    fn prop_change_detection(
        id in object_id_strategy(),
        map in property_map_strategy(),
        key in "p_[a-z]{1,8}",
        a in json_leaf_strategy(),
        b in json_leaf_strategy(),
    ) {
        prop_assume!(a != b);

        let mut first = map.clone();
        first.insert(key.clone(), a);
        let mut second = map;
        second.insert(key, b);

        let cache = DedupCache::new(0);
        let v1 = NodeChange::new(id.clone(), ["User"], props(&first));
        let v2 = NodeChange::new(id, ["User"], props(&second));

        prop_assert!(cache.should_submit(&v1).unwrap());
        prop_assert!(cache.should_submit(&v2).unwrap());
        prop_assert!(!cache.should_submit(&v2).unwrap());
        prop_assert_eq!(cache.len(), 1);
    }

    /// Volatile fields never change the content hash
    #[test]
    fn prop_volatile_fields_ignored(
        id in object_id_strategy(),
        map in property_map_strategy(),
        volatile in prop::collection::vec(json_leaf_strategy(), DEFAULT_IGNORED_KEYS.len()),
    ) {
        let plain = NodeChange::new(id.clone(), ["User"], props(&map));

        let mut noisy = props(&map);
        for (key, value) in DEFAULT_IGNORED_KEYS.iter().zip(volatile) {
            noisy.set(*key, value);
        }
        let noisy = NodeChange::new(id, ["User"], noisy);

        prop_assert_eq!(plain.content_hash().unwrap(), noisy.content_hash().unwrap());
    }

    /// Insertion order of properties never matters
    #[test]
    fn prop_property_order_irrelevant(
        id in object_id_strategy(),
        map in property_map_strategy(),
    ) {
        let forward: Properties = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let backward: Properties = map.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();

        let a = NodeChange::new(id.clone(), ["User", "Base"], forward);
        let b = NodeChange::new(id, ["Base", "User"], backward);
        prop_assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    /// Edge identity depends only on (source, target, kind)
    #[test]
    fn prop_edge_identity_stable(
        source in object_id_strategy(),
        target in object_id_strategy(),
        kind in "[A-Z][a-zA-Z]{2,12}",
        m1 in property_map_strategy(),
        m2 in property_map_strategy(),
    ) {
        let a = EdgeChange::new(source.clone(), target.clone(), kind.clone(), props(&m1));
        let b = EdgeChange::new(source, target, kind, props(&m2));
        prop_assert_eq!(a.identity_key().unwrap(), b.identity_key().unwrap());
    }

    /// Hashing never panics on arbitrary nested values
    #[test]
    fn prop_hashing_never_panics(
        id in ".{0,20}",
        map in prop::collection::btree_map(".{0,10}", json_value_strategy(), 0..10),
    ) {
        let record = NodeChange::new(id, ["User"], props(&map));
        let _ = record.identity_key();
        let _ = record.content_hash();
    }
}

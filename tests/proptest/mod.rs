// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for tenant-cluster-operator.
//!
//! Uses proptest to generate random record collections and verify the diff
//! invariants every unit relies on.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use tenant_cluster_operator::crd::ClusterPhase;
use tenant_cluster_operator::resources::configmap::ConfigMapSpec;
use tenant_cluster_operator::state::diff::{
    delete_for_full_teardown, delete_for_update, new_delete_patch, new_update_patch, to_create,
    to_update,
};
use tenant_cluster_operator::state::record::{Record, RecordCollection};

/// Strategy for a record collection with unique names drawn from a small
/// pool, so current and desired overlap often.
fn any_collection() -> impl Strategy<Value = RecordCollection<ConfigMapSpec>> {
    prop::collection::btree_map("[a-f]", "v[0-2]", 0..6).prop_map(|entries| {
        let records = entries
            .into_iter()
            .map(|(name, value)| {
                let mut data = BTreeMap::new();
                data.insert("value".to_string(), value);
                Record::new(name, Some("giantswarm"), ConfigMapSpec { data })
            })
            .collect();
        RecordCollection::new(records).unwrap()
    })
}

fn names(c: &RecordCollection<ConfigMapSpec>) -> BTreeSet<String> {
    c.iter().map(|r| r.name.clone()).collect()
}

/// Apply `patch` to `current` the way a store would.
fn apply(
    current: &RecordCollection<ConfigMapSpec>,
    desired: &RecordCollection<ConfigMapSpec>,
) -> RecordCollection<ConfigMapSpec> {
    let patch = new_update_patch(current, desired);
    let mut records: BTreeMap<String, Record<ConfigMapSpec>> = current
        .iter()
        .map(|r| (r.name.clone(), r.clone()))
        .collect();
    for r in patch.to_delete.iter() {
        records.remove(&r.name);
    }
    for r in patch.to_create.iter().chain(patch.to_update.iter()) {
        records.insert(r.name.clone(), r.clone());
    }
    RecordCollection::new(records.into_values().collect()).unwrap()
}

/// Strategy for generating random phases.
fn any_phase() -> impl Strategy<Value = ClusterPhase> {
    prop_oneof![
        Just(ClusterPhase::Pending),
        Just(ClusterPhase::Reconciling),
        Just(ClusterPhase::Ready),
        Just(ClusterPhase::WaitingForDependency),
        Just(ClusterPhase::Failed),
        Just(ClusterPhase::Deleting),
    ]
}

proptest! {
    /// Property: diffing a collection against itself yields an empty patch.
    #[test]
    fn test_diff_is_idempotent(current in any_collection()) {
        prop_assert!(new_update_patch(&current, &current).is_empty());
    }

    /// Property: applying the update patch converges onto desired.
    #[test]
    fn test_update_patch_converges(current in any_collection(), desired in any_collection()) {
        let converged = apply(&current, &desired);
        prop_assert_eq!(names(&converged), names(&desired));
        for r in desired.iter() {
            prop_assert!(converged.get(&r.name).unwrap().is_equivalent(r));
        }
        prop_assert!(new_update_patch(&converged, &desired).is_empty());
    }

    /// Property: create, update and delete sets never share a name.
    #[test]
    fn test_patch_sets_are_disjoint(current in any_collection(), desired in any_collection()) {
        let create = names(&to_create(&current, &desired));
        let update = names(&to_update(&current, &desired));
        let delete = names(&delete_for_update(&current, &desired));
        prop_assert!(create.is_disjoint(&update));
        prop_assert!(create.is_disjoint(&delete));
        prop_assert!(update.is_disjoint(&delete));
    }

    /// Property: creates are exactly the desired names missing from current.
    #[test]
    fn test_create_set_is_complete(current in any_collection(), desired in any_collection()) {
        let expected: BTreeSet<String> = names(&desired).difference(&names(&current)).cloned().collect();
        prop_assert_eq!(names(&to_create(&current, &desired)), expected);
    }

    /// Property: delete-for-update never touches a desired record, while
    /// full teardown removes every current record.
    #[test]
    fn test_delete_semantics(current in any_collection(), desired in any_collection()) {
        let for_update = names(&delete_for_update(&current, &desired));
        prop_assert!(for_update.is_disjoint(&names(&desired)));
        prop_assert!(for_update.is_subset(&names(&current)));

        prop_assert_eq!(names(&delete_for_full_teardown(&current)), names(&current));
        let teardown = new_delete_patch(&current, &desired);
        prop_assert!(teardown.to_create.is_empty());
        prop_assert!(teardown.to_update.is_empty());
        prop_assert_eq!(teardown.to_delete.len(), current.len());
    }

    /// Property: Phase can be serialized and deserialized.
    #[test]
    fn test_phase_roundtrip(phase in any_phase()) {
        let serialized = serde_json::to_string(&phase).unwrap();
        let deserialized: ClusterPhase = serde_json::from_str(&serialized).unwrap();
        prop_assert_eq!(phase, deserialized);
    }
}

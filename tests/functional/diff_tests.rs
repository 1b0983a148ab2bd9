//! Patch computation through the unit boundary.
//!
//! Each case feeds tagged state through a template-backed unit and checks the
//! resulting patch, so the typed diff and the tagged wrapper are covered
//! together.

use std::collections::BTreeMap;
use std::sync::Arc;

use tenant_cluster_operator::controller::context::ReconciliationContext;
use tenant_cluster_operator::controller::error::{Error, Result};
use tenant_cluster_operator::controller::unit::{ResourceUnit, Template, TemplateSource, Unit};
use tenant_cluster_operator::resources::configmap::ConfigMapSpec;
use tenant_cluster_operator::state::diff::{delete_for_full_teardown, delete_for_update};
use tenant_cluster_operator::state::memory::MemoryStore;
use tenant_cluster_operator::state::record::{Record, RecordCollection, State};
use tenant_cluster_operator::state::store::Scope;

fn record(name: &str, value: &str) -> Record<ConfigMapSpec> {
    let mut data = BTreeMap::new();
    data.insert("value".to_string(), value.to_string());
    Record::new(name, Some("giantswarm"), ConfigMapSpec { data })
}

fn state(records: Vec<Record<ConfigMapSpec>>) -> State {
    State::ConfigMaps(RecordCollection::new(records).unwrap())
}

struct NoTemplate;

impl Template<ConfigMapSpec> for NoTemplate {
    fn scope(&self, _rc: &ReconciliationContext) -> Scope {
        Scope::default()
    }

    fn render(&self, _rc: &ReconciliationContext) -> Result<RecordCollection<ConfigMapSpec>> {
        Ok(RecordCollection::empty())
    }
}

fn unit() -> Unit<ConfigMapSpec> {
    let store: Arc<MemoryStore<ConfigMapSpec>> = Arc::new(MemoryStore::new());
    Unit::new(
        "configmaps",
        Arc::new(TemplateSource::new(store, Arc::new(NoTemplate))),
    )
}

/// Scenario A: a missing record is created.
#[test]
fn test_missing_record_is_created() {
    let patch = unit()
        .new_update_patch(&state(vec![]), &state(vec![record("api-cert", "v1")]))
        .unwrap();
    assert_eq!(patch.to_create, state(vec![record("api-cert", "v1")]));
    assert!(patch.to_update.is_empty());
    assert!(patch.to_delete.is_empty());
}

/// Scenario B: a changed record is updated to the desired spec.
#[test]
fn test_changed_record_is_updated() {
    let patch = unit()
        .new_update_patch(&state(vec![record("x", "v1")]), &state(vec![record("x", "v2")]))
        .unwrap();
    assert!(patch.to_create.is_empty());
    assert_eq!(patch.to_update, state(vec![record("x", "v2")]));
    assert!(patch.to_delete.is_empty());
}

/// Scenario C: an undesired record is deleted on update.
#[test]
fn test_undesired_record_is_deleted() {
    let current = RecordCollection::new(vec![record("a", "v1"), record("b", "v1")]).unwrap();
    let desired = RecordCollection::new(vec![record("a", "v1")]).unwrap();
    let deleted = delete_for_update(&current, &desired);
    assert_eq!(deleted.names(), vec!["b"]);

    let patch = unit()
        .new_update_patch(
            &State::ConfigMaps(current),
            &State::ConfigMaps(desired),
        )
        .unwrap();
    assert!(patch.to_create.is_empty());
    assert!(patch.to_update.is_empty());
    assert_eq!(patch.to_delete, state(vec![record("b", "v1")]));
}

/// Full teardown deletes everything current, even records still desired.
#[test]
fn test_teardown_deletes_desired_records_too() {
    let current = RecordCollection::new(vec![record("a", "v1"), record("b", "v1")]).unwrap();
    let desired = RecordCollection::new(vec![record("a", "v1")]).unwrap();
    assert!(delete_for_update(&current, &desired).contains("b"));
    assert!(!delete_for_update(&current, &desired).contains("a"));
    assert_eq!(delete_for_full_teardown(&current).names(), vec!["a", "b"]);

    let patch = unit()
        .new_delete_patch(&State::ConfigMaps(current), &State::ConfigMaps(desired))
        .unwrap();
    assert!(patch.to_create.is_empty());
    assert!(patch.to_update.is_empty());
    assert_eq!(patch.to_delete.len(), 2);
}

/// State of another kind is rejected at the unit boundary.
#[test]
fn test_foreign_state_is_wrong_type() {
    let err = unit()
        .new_update_patch(
            &State::Namespaces(RecordCollection::empty()),
            &state(vec![]),
        )
        .unwrap_err();
    assert!(matches!(err, Error::WrongType { .. }));
}

//! Full-pass scenarios over the in-memory harness.
//!
//! These tests run complete reconciliation passes through the version router
//! and verify the records left behind, the calls issued, and how passes end.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::mock_state::{CLUSTER_NAMESPACE, Harness, cluster, handled};
use tenant_cluster_operator::controller::context::{PassContext, ReconciliationContext};
use tenant_cluster_operator::controller::error::{Error, Result};
use tenant_cluster_operator::controller::outcome::Step;
use tenant_cluster_operator::controller::resource_set::{PassOutcome, ResourceSet};
use tenant_cluster_operator::controller::router::{Routed, VersionRouter};
use tenant_cluster_operator::controller::unit::{ResourceUnit, StatePatch};
use tenant_cluster_operator::controller::wrappers::OPERATOR_NAME;
use tenant_cluster_operator::resources::chart::RELEASE_NAME;
use tenant_cluster_operator::resources::common::{LABEL_VERSION, TENANT_NAMESPACE};
use tenant_cluster_operator::resources::encryption::secret_name;
use tenant_cluster_operator::state::record::{RecordCollection, State};
use tenant_cluster_operator::versions::Provider;

// ============================================================================
// Creation and steady state
// ============================================================================

/// A fresh cluster gets every record of its bundle in one pass.
#[tokio::test]
async fn test_first_pass_creates_all_records() {
    let harness = Harness::new(Provider::Aws);
    let outcome = handled(harness.pass(&cluster("3.2.0")).await.unwrap());

    assert!(!outcome.is_canceled());
    assert_eq!(harness.encryption_keys.records().len(), 1);
    assert_eq!(harness.cert_configs.records().len(), 7);
    assert_eq!(harness.namespaces.records().len(), 1);
    assert_eq!(harness.config_maps.records().len(), 1);
    assert_eq!(harness.releases.records().len(), 1);
    assert_eq!(outcome.total().created, 11);

    let key = harness
        .encryption_keys
        .get(Some(CLUSTER_NAMESPACE), &secret_name("al9qy"))
        .unwrap();
    assert_eq!(key.spec.algorithm, "aescbc");
    assert!(harness.namespaces.get(None, TENANT_NAMESPACE).is_some());
}

/// A second pass over converged state issues no mutation.
#[tokio::test]
async fn test_second_pass_is_a_no_op() {
    let harness = Harness::new(Provider::Aws);
    harness.pass(&cluster("3.2.0")).await.unwrap();
    harness.clear_calls();

    let outcome = handled(harness.pass(&cluster("3.2.0")).await.unwrap());
    assert!(outcome.total().is_empty());
    assert_eq!(harness.mutation_count(), 0);
    assert_eq!(outcome.to_string(), "completed: no changes needed");
}

/// Units run in bundle order.
#[tokio::test]
async fn test_reports_follow_unit_order() {
    let harness = Harness::new(Provider::Aws);
    let outcome = handled(harness.pass(&cluster("3.2.0")).await.unwrap());
    let units: Vec<&str> = outcome.reports().iter().map(|r| r.unit.as_str()).collect();
    assert_eq!(
        units,
        vec!["encryptionkey", "certconfigs", "namespace", "chartvalues", "chartoperator"]
    );
}

// ============================================================================
// Version changes
// ============================================================================

/// Moving to a newer bundle adds values config maps and re-labels records.
#[tokio::test]
async fn test_bundle_upgrade_updates_records() {
    let harness = Harness::new(Provider::Aws);
    harness.pass(&cluster("3.2.0")).await.unwrap();

    let outcome = handled(harness.pass(&cluster("4.0.0")).await.unwrap());
    let total = outcome.total();
    assert_eq!(total.created, 2);
    assert!(total.updated > 0);
    assert_eq!(total.deleted, 0);

    assert_eq!(harness.config_maps.records().len(), 3);
    let release = harness
        .releases
        .get(Some(TENANT_NAMESPACE), RELEASE_NAME)
        .unwrap();
    assert_eq!(release.spec.channel, "stable");
    assert_eq!(release.labels[LABEL_VERSION], "4.0.0");
}

/// Moving to an older bundle deletes what it no longer renders.
#[tokio::test]
async fn test_bundle_downgrade_deletes_extra_records() {
    let harness = Harness::new(Provider::Aws);
    harness.pass(&cluster("4.0.0")).await.unwrap();

    let outcome = handled(harness.pass(&cluster("3.3.0")).await.unwrap());
    assert_eq!(outcome.total().deleted, 1);
    assert!(
        harness
            .config_maps
            .get(Some(TENANT_NAMESPACE), "kube-state-metrics-values")
            .is_none()
    );
}

// ============================================================================
// Cancellation (Scenario D)
// ============================================================================

/// An unavailable first dependency cancels the pass before any mutation.
#[tokio::test]
async fn test_unavailable_dependency_cancels_without_mutations() {
    let harness = Harness::new(Provider::Aws);
    harness.encryption_keys.set_unavailable(true);

    let outcome = handled(harness.pass(&cluster("3.2.0")).await.unwrap());
    match &outcome {
        PassOutcome::Canceled { unit, reports, .. } => {
            assert_eq!(unit, "encryptionkey");
            assert!(reports.is_empty());
        }
        other => panic!("expected cancellation, got {:?}", other),
    }
    assert_eq!(harness.mutation_count(), 0);
    assert_eq!(
        harness
            .health
            .metrics
            .unit_invocations(OPERATOR_NAME, "encryptionkey", "get_current_state", "canceled"),
        1
    );
}

/// A tenant API that is not up yet stops the pass at the first tenant unit;
/// later units are deferred, earlier ones keep their work.
#[tokio::test]
async fn test_tenant_unavailable_defers_remaining_units() {
    let harness = Harness::new(Provider::Aws);
    harness.namespaces.set_unavailable(true);

    let outcome = handled(harness.pass(&cluster("3.2.0")).await.unwrap());
    match &outcome {
        PassOutcome::Canceled { unit, reports, .. } => {
            assert_eq!(unit, "namespace");
            assert_eq!(reports.len(), 2);
        }
        other => panic!("expected cancellation, got {:?}", other),
    }
    assert_eq!(harness.cert_configs.records().len(), 7);
    assert!(harness.config_maps.calls().is_empty());
    assert!(harness.releases.calls().is_empty());

    // The next pass picks up where this one stopped
    harness.namespaces.set_unavailable(false);
    let outcome = handled(harness.pass(&cluster("3.2.0")).await.unwrap());
    assert!(!outcome.is_canceled());
    assert_eq!(outcome.total().created, 3);
}

/// A pass whose token is already cancelled stops without mutations.
#[tokio::test]
async fn test_cancelled_token_stops_pass() {
    let harness = Harness::new(Provider::Aws);
    let cx = PassContext::with_timeout(cluster("3.2.0"), std::time::Duration::from_secs(30));
    cx.deadline.token().cancel();

    let outcome = handled(harness.router.dispatch(&cx).await.unwrap());
    assert!(outcome.is_canceled());
    assert_eq!(harness.mutation_count(), 0);
}

// ============================================================================
// Routing (Scenario E)
// ============================================================================

/// An unknown version touches nothing and is not an error.
#[tokio::test]
async fn test_unknown_version_is_ignored() {
    let harness = Harness::new(Provider::Aws);
    let routed = harness.pass(&cluster("9.9.9")).await.unwrap();
    assert_eq!(
        routed,
        Routed::Ignored {
            version: "9.9.9".to_string()
        }
    );
    assert_eq!(harness.call_count(), 0);
}

// ============================================================================
// Retries and failures
// ============================================================================

/// Transient failures within the retry budget do not surface.
#[tokio::test]
async fn test_transient_failures_are_retried() {
    let harness = Harness::new(Provider::Aws);
    harness.cert_configs.fail_next(2);

    let outcome = handled(harness.pass(&cluster("3.2.0")).await.unwrap());
    assert!(!outcome.is_canceled());
    assert_eq!(harness.cert_configs.records().len(), 7);
}

/// Failures beyond the retry budget fail the pass.
#[tokio::test]
async fn test_exhausted_retries_fail_pass() {
    let harness = Harness::new(Provider::Aws);
    harness.cert_configs.fail_next(3);

    let err = harness.pass(&cluster("3.2.0")).await.unwrap_err();
    assert!(matches!(err, Error::Transient(_)));
    assert!(harness.namespaces.calls().is_empty());
    assert_eq!(
        harness
            .health
            .metrics
            .unit_invocations(OPERATOR_NAME, "certconfigs", "get_current_state", "failure"),
        1
    );
}

/// An invalid cluster definition fails before any mutation.
#[tokio::test]
async fn test_invalid_domain_fails_before_mutation() {
    let harness = Harness::new(Provider::Aws);
    let rc = ReconciliationContext::new("al9qy", "Not_A_Domain", "acme", "3.2.0")
        .with_namespace(CLUSTER_NAMESPACE);

    let err = harness.pass(&rc).await.unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert!(err.is_fatal());
    assert_eq!(harness.mutation_count(), 0);
}

/// An organization that cannot be a label value fails before any mutation.
#[tokio::test]
async fn test_invalid_organization_fails_before_mutation() {
    let harness = Harness::new(Provider::Aws);
    let rc = ReconciliationContext::new(
        "al9qy",
        "gauss.eu-central-1.aws.example.com",
        "acme corp/eu",
        "3.2.0",
    )
    .with_namespace(CLUSTER_NAMESPACE);

    let err = harness.pass(&rc).await.unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert_eq!(harness.mutation_count(), 0);
    assert_eq!(harness.record_count(), 0);
}

// ============================================================================
// Chart packages
// ============================================================================

/// The pulled package is gone once the apply call returns.
#[tokio::test]
async fn test_pulled_package_is_removed() {
    let harness = Harness::new(Provider::Aws);
    harness.pass(&cluster("3.2.0")).await.unwrap();
    harness.pass(&cluster("4.0.0")).await.unwrap();

    let packages = harness.release_client.packages();
    assert_eq!(packages.len(), 2);
    for path in packages {
        assert!(!path.exists(), "{} was left behind", path.display());
    }
}

/// A package missing from the registry fails the pass instead of being
/// absorbed.
#[tokio::test]
async fn test_missing_package_fails_pass() {
    let harness = Harness::with_channels(Provider::Aws, &["stable"]);
    let err = harness.pass(&cluster("3.2.0")).await.unwrap_err();
    assert!(matches!(err, Error::Package(_)));
    assert!(harness.releases.records().is_empty());
    assert_eq!(harness.config_maps.records().len(), 1);
}

// ============================================================================
// Teardown
// ============================================================================

/// Deletion removes every record the cluster owns.
#[tokio::test]
async fn test_teardown_removes_everything() {
    let harness = Harness::new(Provider::Aws);
    harness.pass(&cluster("4.0.0")).await.unwrap();
    assert_eq!(harness.record_count(), 13);

    let outcome = handled(
        harness
            .pass(&cluster("4.0.0").with_deletion(true))
            .await
            .unwrap(),
    );
    assert!(!outcome.is_canceled());
    assert_eq!(outcome.total().deleted, 13);
    assert_eq!(harness.record_count(), 0);
}

/// Deleting a cluster whose tenant is already gone still cleans up the
/// control plane instead of waiting on the tenant forever.
#[tokio::test]
async fn test_teardown_completes_when_tenant_is_gone() {
    let harness = Harness::new(Provider::Aws);
    harness.pass(&cluster("3.2.0")).await.unwrap();
    harness.namespaces.set_tenant_gone(true);
    harness.config_maps.set_tenant_gone(true);
    harness.releases.set_tenant_gone(true);

    let outcome = handled(
        harness
            .pass(&cluster("3.2.0").with_deletion(true))
            .await
            .unwrap(),
    );
    assert!(!outcome.is_canceled());
    assert_eq!(outcome.total().deleted, 8);
    assert!(harness.encryption_keys.records().is_empty());
    assert!(harness.cert_configs.records().is_empty());
    assert_eq!(harness.namespaces.mutation_count(), 0);
}

/// A normal pass still waits for a tenant without published access.
#[tokio::test]
async fn test_tenant_gone_cancels_normal_pass() {
    let harness = Harness::new(Provider::Aws);
    harness.namespaces.set_tenant_gone(true);

    let outcome = handled(harness.pass(&cluster("3.2.0")).await.unwrap());
    match &outcome {
        PassOutcome::Canceled { unit, .. } => assert_eq!(unit, "namespace"),
        other => panic!("expected cancellation, got {:?}", other),
    }
}

/// Teardown never renders desired state, so an invalid definition does not
/// block it.
#[tokio::test]
async fn test_teardown_ignores_invalid_definition() {
    let harness = Harness::new(Provider::Aws);
    harness.pass(&cluster("3.2.0")).await.unwrap();

    let rc = ReconciliationContext::new("al9qy", "Not_A_Domain", "acme", "3.2.0")
        .with_namespace(CLUSTER_NAMESPACE)
        .with_deletion(true);
    let outcome = handled(harness.pass(&rc).await.unwrap());
    assert!(!outcome.is_canceled());
    assert_eq!(harness.record_count(), 0);
}

/// Teardown leaves records of other clusters alone.
#[tokio::test]
async fn test_teardown_is_scoped_to_cluster() {
    let harness = Harness::new(Provider::Aws);
    let other = ReconciliationContext::new("b7x2k", "gauss.eu-central-1.aws.example.com", "acme", "3.2.0")
        .with_namespace(CLUSTER_NAMESPACE);
    harness.pass(&cluster("3.2.0")).await.unwrap();
    harness.pass(&other).await.unwrap();

    harness
        .pass(&cluster("3.2.0").with_deletion(true))
        .await
        .unwrap();
    assert_eq!(harness.cert_configs.records().len(), 7);
    assert!(
        harness
            .cert_configs
            .records()
            .iter()
            .all(|r| r.name.starts_with("b7x2k-"))
    );
}

/// Unit that records when it runs and tears down nothing.
struct Recorder {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ResourceUnit for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_current_state(&self, _cx: &PassContext) -> Result<Step<State>> {
        self.log.lock().unwrap().push(self.name.clone());
        Ok(Step::Ready(State::Namespaces(RecordCollection::empty())))
    }

    async fn get_desired_state(&self, _cx: &PassContext) -> Result<Step<State>> {
        Ok(Step::Ready(State::Namespaces(RecordCollection::empty())))
    }

    fn new_update_patch(&self, current: &State, _desired: &State) -> Result<StatePatch> {
        Ok(StatePatch {
            to_create: current.empty_like(),
            to_update: current.empty_like(),
            to_delete: current.empty_like(),
        })
    }

    fn new_delete_patch(&self, current: &State, desired: &State) -> Result<StatePatch> {
        self.new_update_patch(current, desired)
    }

    async fn apply_create_change(&self, _cx: &PassContext, _create: &State) -> Result<Step<()>> {
        Ok(Step::Ready(()))
    }

    async fn apply_update_change(&self, _cx: &PassContext, _update: &State) -> Result<Step<()>> {
        Ok(Step::Ready(()))
    }

    async fn apply_delete_change(&self, _cx: &PassContext, _delete: &State) -> Result<Step<()>> {
        Ok(Step::Ready(()))
    }
}

/// Deletion runs units in reverse order.
#[tokio::test]
async fn test_teardown_runs_units_in_reverse() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let set = ["first", "second", "third"]
        .iter()
        .fold(ResourceSet::new("1.0.0"), |set, name| {
            set.with_unit(Arc::new(Recorder {
                name: name.to_string(),
                log: log.clone(),
            }))
        });
    let mut router = VersionRouter::new();
    router.register(set).unwrap();

    let rc = ReconciliationContext::new("al9qy", "example.com", "acme", "1.0.0");
    router
        .dispatch(&PassContext::with_timeout(rc.clone(), std::time::Duration::from_secs(5)))
        .await
        .unwrap();
    router
        .dispatch(&PassContext::with_timeout(
            rc.with_deletion(true),
            std::time::Duration::from_secs(5),
        ))
        .await
        .unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["first", "second", "third", "third", "second", "first"]
    );
}

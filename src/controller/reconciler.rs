//! Reconciliation loop for TenantCluster.
//!
//! Every event builds a fresh [`ReconciliationContext`] from the object and
//! dispatches one pass through the version router. Objects whose version no
//! resource set claims are left untouched, including their finalizers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::{
    Api, ResourceExt,
    api::{Patch, PatchParams},
    runtime::controller::Action,
};
use tracing::{debug, error, info, warn};

use crate::{
    controller::{
        context::{Context, FIELD_MANAGER, PassContext, ReconciliationContext},
        error::{Error, Result},
        resource_set::PassOutcome,
        router::Routed,
        status::{failed_status, get_condition_reason, pass_status},
        wrappers::OPERATOR_NAME,
    },
    crd::{TenantCluster, TenantClusterStatus},
};

/// Finalizer name for graceful deletion
pub const FINALIZER: &str = "tenantcluster.operator.example.com/finalizer";

/// Requeue delay after adding the finalizer
const FINALIZER_REQUEUE: Duration = Duration::from_secs(1);

/// Reconcile a TenantCluster
///
/// This is the main reconciliation function called by the controller.
pub async fn reconcile(obj: Arc<TenantCluster>, ctx: Arc<Context>) -> Result<Action> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<TenantCluster> = Api::namespaced(ctx.client.clone(), &namespace);
    let deleting = obj.metadata.deletion_timestamp.is_some();
    let has_finalizer = obj.finalizers().iter().any(|f| f == FINALIZER);

    debug!(name = %name, namespace = %namespace, deleting, "Reconciling TenantCluster");

    if deleting && !has_finalizer {
        return Ok(Action::await_change());
    }

    let rc = match ReconciliationContext::from_cluster(&obj) {
        Ok(rc) => rc,
        Err(e) if deleting => {
            warn!(name = %name, error = %e, "Cannot build context for deleted cluster, releasing it");
            remove_finalizer(&api, &obj).await?;
            return Ok(Action::await_change());
        }
        Err(e) => {
            error!(name = %name, error = %e, "Invalid TenantCluster");
            ctx.publish_warning_event(&obj, "ValidationFailed", "Validating", Some(e.to_string()))
                .await;
            update_status(&api, &name, failed_status(&e, obj.metadata.generation, conditions(&obj)))
                .await?;
            return Err(e);
        }
    };

    if ctx.router.route(&rc.version_bundle_version).is_none() {
        debug!(
            name = %name,
            version = %rc.version_bundle_version,
            supported = ?ctx.router.versions(),
            "Version not handled by this operator, ignoring"
        );
        return Ok(Action::await_change());
    }

    if !deleting && !has_finalizer {
        info!(name = %name, "Adding finalizer");
        add_finalizer(&api, &obj).await?;
        return Ok(Action::requeue(FINALIZER_REQUEUE));
    }

    let cx = PassContext::new(rc, ctx.pass_deadline());
    let routed = ctx.router.dispatch(&cx).await;
    let outcome = match routed {
        Ok(Routed::Handled(outcome)) => outcome,
        Ok(Routed::Ignored { .. }) => return Ok(Action::await_change()),
        Err(e) => {
            if e.is_fatal() {
                error!(name = %name, error = %e, "Reconciliation pass failed");
                ctx.publish_warning_event(&obj, "ReconcileFailed", "Reconciling", Some(e.to_string()))
                    .await;
                update_status(&api, &name, failed_status(&e, obj.metadata.generation, conditions(&obj)))
                    .await?;
            }
            return Err(e);
        }
    };

    if let PassOutcome::Canceled { unit, reason, .. } = &outcome {
        info!(name = %name, unit = %unit, reason = %reason, "Pass stopped early, waiting for dependency");
        if let Some(ref health_state) = ctx.health_state {
            health_state.metrics.record_canceled_pass(OPERATOR_NAME, unit);
        }
    }

    if let Some(ref health_state) = ctx.health_state {
        health_state
            .metrics
            .record_reconcile(&namespace, &name, start_time.elapsed().as_secs_f64());
    }

    if deleting && !outcome.is_canceled() {
        info!(name = %name, summary = %outcome, "Teardown complete, removing finalizer");
        ctx.publish_normal_event(&obj, "Deleted", "Deleting", Some(outcome.to_string()))
            .await;
        remove_finalizer(&api, &obj).await?;
        return Ok(Action::await_change());
    }

    let status = pass_status(&outcome, deleting, obj.metadata.generation, conditions(&obj));
    if status_changed(&obj, &status) {
        ctx.publish_normal_event(
            &obj,
            &status.phase.to_string(),
            "Reconciling",
            Some(outcome.to_string()),
        )
        .await;
    }
    update_status(&api, &name, status).await?;

    Ok(Action::requeue(ctx.config.resync_period))
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<TenantCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(&namespace, &name);
    }

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
    }
    Action::requeue(error.requeue_after())
}

fn conditions(obj: &TenantCluster) -> &[crate::crd::Condition] {
    obj.status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default()
}

/// Whether `status` moves the phase or the Ready reason of `obj`.
fn status_changed(obj: &TenantCluster, status: &TenantClusterStatus) -> bool {
    let previous_phase = obj.status.as_ref().map(|s| s.phase);
    previous_phase != Some(status.phase)
        || get_condition_reason(conditions(obj), "Ready")
            != get_condition_reason(&status.conditions, "Ready")
}

/// Finalizers of `obj` with ours added or removed.
fn finalizers_with(obj: &TenantCluster, present: bool) -> Vec<String> {
    let mut finalizers: Vec<String> = obj
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != FINALIZER)
        .cloned()
        .collect();
    if present {
        finalizers.push(FINALIZER.to_string());
    }
    finalizers
}

/// Add finalizer to resource
async fn add_finalizer(api: &Api<TenantCluster>, obj: &TenantCluster) -> Result<()> {
    patch_finalizers(api, obj, finalizers_with(obj, true)).await
}

/// Remove finalizer from resource, keeping any others
async fn remove_finalizer(api: &Api<TenantCluster>, obj: &TenantCluster) -> Result<()> {
    patch_finalizers(api, obj, finalizers_with(obj, false)).await
}

async fn patch_finalizers(
    api: &Api<TenantCluster>,
    obj: &TenantCluster,
    finalizers: Vec<String>,
) -> Result<()> {
    let patch = serde_json::json!({
        "metadata": {
            "resourceVersion": obj.resource_version(),
            "finalizers": finalizers,
        }
    });
    match api
        .patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(_) => Ok(()),
        // Already gone once the last finalizer was dropped
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(Error::Kube(e)),
    }
}

/// Update the status of a TenantCluster
async fn update_status(
    api: &Api<TenantCluster>,
    name: &str,
    status: TenantClusterStatus,
) -> Result<()> {
    let patch = serde_json::json!({
        "status": status
    });
    api.patch_status(
        name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

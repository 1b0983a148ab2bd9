//! tenant-cluster-operator library crate
//!
//! This module exports the controller, the TenantCluster CRD, the record
//! model and the resource templates reconciled for every tenant cluster.

pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;
pub mod state;
pub mod versions;

pub use config::OperatorConfig;
pub use health::HealthState;

use std::sync::Arc;

use futures::{Stream, StreamExt};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{Controller, WatchStreamExt, predicates, reflector, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use controller::context::Context;
use controller::error::Result;
use controller::reconciler::{error_policy, reconcile};
use controller::retry::RetryConfig;
use crd::TenantCluster;
use resources::{UnitDeps, build_router};

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Create the default watcher configuration.
///
/// `any_semantic()` gives more reliable resource discovery in test
/// environments.
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Create a filtered stream for a resource type with standard optimizations.
///
/// This creates a reflector-backed stream that:
/// - Maintains an in-memory cache via reflector
/// - Uses automatic retry with exponential backoff on errors
/// - Converts watch events to objects (Added/Modified only)
/// - Filters out status-only updates via generation predicate
///
/// Returns the reflector store (for cache lookups) and the filtered stream.
fn create_filtered_stream<K>(
    api: Api<K>,
    watcher_config: WatcherConfig,
) -> (
    reflector::Store<K>,
    impl Stream<Item = std::result::Result<K, watcher::Error>>,
)
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher_config))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::generation);
    (reader, stream)
}

/// Build the shared controller context for `config`.
///
/// Resource sets for every version bundle of the configured provider are
/// registered with the router here, wrapped with retries and, when a health
/// state is given, metrics.
pub fn build_context(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    config: OperatorConfig,
    shutdown: CancellationToken,
) -> Result<Context> {
    let deps = UnitDeps::kube(client.clone(), &config);
    let retry = RetryConfig::with_max_attempts(config.retry_max_attempts);
    let router = build_router(config.provider, &deps, &retry, health_state.as_ref())?;
    info!(
        provider = %config.provider,
        versions = ?router.versions(),
        "Registered resource sets"
    );
    Ok(Context::new(client, health_state, Arc::new(router), config).with_shutdown(shutdown))
}

/// Run the TenantCluster controller (cluster-wide).
///
/// It can be called from main.rs or spawned as a background task during
/// integration tests. If health_state is provided, metrics are recorded for
/// reconciliations and unit operations.
pub async fn run_controller(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    config: OperatorConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    run_controller_scoped(client, health_state, config, shutdown, None).await
}

/// Run the TenantCluster controller with optional namespace scoping.
///
/// When `namespace` is `Some(ns)`, only watches resources in that namespace.
/// When `namespace` is `None`, watches resources cluster-wide.
pub async fn run_controller_scoped(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    config: OperatorConfig,
    shutdown: CancellationToken,
    namespace: Option<&str>,
) -> Result<()> {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    info!(
        "Starting controller for TenantCluster resources (scope: {})",
        scope_msg
    );

    let ctx = Arc::new(build_context(
        client.clone(),
        health_state.clone(),
        config,
        shutdown,
    )?);

    // Mark as ready once the router is built
    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let clusters: Api<TenantCluster> = scoped_api(client, namespace);
    let (reader, cluster_stream) = create_filtered_stream(clusters, default_watcher_config());

    Controller::for_stream(cluster_stream, reader)
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    // ObjectNotFound errors are expected after deletion.
                    let is_not_found = match &e {
                        kube::runtime::controller::Error::ObjectNotFound(_) => true,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) => {
                            err.is_not_found()
                        }
                        _ => false,
                    };
                    if is_not_found {
                        debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    // This should never complete in normal operation
    error!("Controller stream ended unexpectedly");
    Ok(())
}

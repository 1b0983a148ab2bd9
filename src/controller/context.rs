//! Shared and per-pass context for the controller.
//!
//! [`Context`] holds process-wide state passed to the reconciler: the
//! Kubernetes client, event reporter, version router and configuration.
//! [`ReconciliationContext`] and [`PassContext`] are rebuilt from the incoming
//! object on every pass and never persisted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use tokio_util::sync::CancellationToken;

use crate::config::OperatorConfig;
use crate::controller::error::{Error, Result};
use crate::controller::router::VersionRouter;
use crate::crd::TenantCluster;
use crate::health::HealthState;

/// Field manager name for the operator
pub const FIELD_MANAGER: &str = "tenant-cluster-operator";

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Event reporter identity
    reporter: Reporter,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
    /// Resource sets keyed by version bundle version
    pub router: Arc<VersionRouter>,
    pub config: OperatorConfig,
    /// Cancelled on shutdown; every pass derives its token from it.
    pub shutdown: CancellationToken,
}

impl Context {
    /// Create a new context
    pub fn new(
        client: Client,
        health_state: Option<Arc<HealthState>>,
        router: Arc<VersionRouter>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: FIELD_MANAGER.into(),
                instance: std::env::var("POD_NAME").ok(),
            },
            health_state,
            router,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use `shutdown` as the parent of every pass token.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Deadline for one reconciliation pass.
    pub fn pass_deadline(&self) -> Deadline {
        Deadline::new(self.shutdown.child_token(), self.config.pass_deadline)
    }

    /// Create an event recorder for publishing Kubernetes events
    fn recorder(&self) -> Recorder {
        Recorder::new(self.client.clone(), self.reporter.clone())
    }

    async fn publish(
        &self,
        resource: &TenantCluster,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let recorder = self.recorder();
        let object_ref = resource.object_ref(&());
        if let Err(e) = recorder
            .publish(
                &Event {
                    type_,
                    reason: reason.into(),
                    note,
                    action: action.into(),
                    secondary: None,
                },
                &object_ref,
            )
            .await
        {
            tracing::warn!(reason = %reason, error = %e, "Failed to publish event");
        }
    }

    /// Publish a normal event for a resource
    pub async fn publish_normal_event(
        &self,
        resource: &TenantCluster,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish(resource, EventType::Normal, reason, action, note)
            .await;
    }

    /// Publish a warning event for a resource
    pub async fn publish_warning_event(
        &self,
        resource: &TenantCluster,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish(resource, EventType::Warning, reason, action, note)
            .await;
    }
}

/// Per-event data every unit renders its records from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconciliationContext {
    pub cluster_id: String,
    /// Control-plane namespace of the `TenantCluster` object.
    pub namespace: String,
    pub base_domain: String,
    /// `api.<cluster_id>.k8s.<base_domain>`
    pub api_domain: String,
    pub organization: String,
    pub version_bundle_version: String,
    /// In-cluster IP of the tenant Kubernetes API service.
    pub api_ip: String,
    pub deletion_requested: bool,
}

/// API service IP used when the cluster does not set one.
pub const DEFAULT_API_IP: &str = "172.31.0.1";

impl ReconciliationContext {
    pub fn new(cluster_id: &str, base_domain: &str, organization: &str, version: &str) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            namespace: "default".to_string(),
            base_domain: base_domain.to_string(),
            api_domain: api_domain(cluster_id, base_domain),
            organization: organization.to_string(),
            version_bundle_version: version.to_string(),
            api_ip: DEFAULT_API_IP.to_string(),
            deletion_requested: false,
        }
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn with_deletion(mut self, deletion_requested: bool) -> Self {
        self.deletion_requested = deletion_requested;
        self
    }

    /// Build the context from the incoming object.
    ///
    /// Only extracts fields; syntactic validation of domain and identifiers
    /// happens when desired state is rendered.
    pub fn from_cluster(obj: &TenantCluster) -> Result<Self> {
        let cluster_id = obj
            .spec
            .cluster_id
            .clone()
            .or_else(|| obj.metadata.name.clone())
            .ok_or_else(|| Error::MissingField("spec.clusterId".to_string()))?;
        if obj.spec.base_domain.is_empty() {
            return Err(Error::MissingField("spec.baseDomain".to_string()));
        }
        if obj.spec.version_bundle.version.is_empty() {
            return Err(Error::MissingField("spec.versionBundle.version".to_string()));
        }
        Ok(Self {
            api_domain: api_domain(&cluster_id, &obj.spec.base_domain),
            cluster_id,
            namespace: obj.namespace().unwrap_or_else(|| "default".to_string()),
            base_domain: obj.spec.base_domain.clone(),
            organization: obj.spec.organization.clone(),
            version_bundle_version: obj.spec.version_bundle.version.clone(),
            api_ip: obj
                .spec
                .api_ip
                .clone()
                .unwrap_or_else(|| DEFAULT_API_IP.to_string()),
            deletion_requested: obj.metadata.deletion_timestamp.is_some(),
        })
    }
}

fn api_domain(cluster_id: &str, base_domain: &str) -> String {
    format!("api.{}.k8s.{}", cluster_id, base_domain)
}

/// Stand-in for timeouts too large to add to the current instant.
const UNBOUNDED_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Cancellation token plus absolute deadline for one pass.
#[derive(Clone, Debug)]
pub struct Deadline {
    token: CancellationToken,
    at: tokio::time::Instant,
}

impl Deadline {
    pub fn new(token: CancellationToken, timeout: Duration) -> Self {
        let now = tokio::time::Instant::now();
        Self {
            token,
            at: now
                .checked_add(timeout)
                .unwrap_or_else(|| now + UNBOUNDED_TIMEOUT),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Run `fut`, failing with `Timeout` when the pass is cancelled or its
    /// deadline passes first.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                Err(Error::Timeout(format!("{}: pass cancelled", operation)))
            }
            _ = tokio::time::sleep_until(self.at) => {
                Err(Error::Timeout(format!("{}: deadline exceeded", operation)))
            }
            result = fut => result,
        }
    }
}

/// Everything a unit sees during one pass.
#[derive(Clone, Debug)]
pub struct PassContext {
    pub rc: ReconciliationContext,
    pub deadline: Deadline,
}

impl PassContext {
    pub fn new(rc: ReconciliationContext, deadline: Deadline) -> Self {
        Self { rc, deadline }
    }

    /// Pass context with a fresh token and the given timeout.
    pub fn with_timeout(rc: ReconciliationContext, timeout: Duration) -> Self {
        Self::new(rc, Deadline::new(CancellationToken::new(), timeout))
    }
}

//! TenantCluster Custom Resource Definition.
//!
//! A TenantCluster declares a workload cluster managed from the control plane.
//! The operator reconciles its auxiliary resources (encryption key, certificate
//! requests, tenant namespace, chart values and the chart operator release)
//! according to the version bundle named in `spec.versionBundle.version`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// TenantCluster is a custom resource describing one tenant cluster.
///
/// Example:
/// ```yaml
/// apiVersion: cluster.giantswarm.io/v1alpha1
/// kind: TenantCluster
/// metadata:
///   name: al9qy
///   namespace: org-acme
/// spec:
///   baseDomain: gauss.eu-central-1.aws.example.com
///   organization: acme
///   versionBundle:
///     version: 3.2.0
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "cluster.giantswarm.io",
    version = "v1alpha1",
    kind = "TenantCluster",
    plural = "tenantclusters",
    shortname = "tc",
    status = "TenantClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.versionBundle.version"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TenantClusterSpec {
    /// Cluster ID. Defaults to the object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,

    /// DNS zone the cluster's endpoints live under.
    pub base_domain: String,

    /// Owning organization.
    #[serde(default)]
    pub organization: String,

    /// Version bundle selecting which resource set reconciles this cluster.
    pub version_bundle: VersionBundleRef,

    /// In-cluster IP of the Kubernetes API service, added to the API
    /// certificate. Defaults to `172.31.0.1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_ip: Option<String>,
}

/// Reference to a version bundle.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VersionBundleRef {
    /// Semantic version, e.g. `3.2.0`.
    pub version: String,
}

/// Status of a TenantCluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TenantClusterStatus {
    /// Current phase of the cluster lifecycle.
    #[serde(default)]
    pub phase: ClusterPhase,

    /// The generation most recently observed by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions describing the current state.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Summary of the last reconciliation pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pass: Option<String>,
}

/// ClusterPhase represents the lifecycle phase of a TenantCluster.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ClusterPhase {
    /// Initial state, waiting for reconciliation.
    #[default]
    Pending,
    /// A pass applied changes.
    Reconciling,
    /// The last pass found nothing to change.
    Ready,
    /// The last pass stopped early because a dependency was not reachable.
    WaitingForDependency,
    /// The last pass failed with a non-recoverable error.
    Failed,
    /// Cluster resources are being torn down.
    Deleting,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterPhase::Pending => write!(f, "Pending"),
            ClusterPhase::Reconciling => write!(f, "Reconciling"),
            ClusterPhase::Ready => write!(f, "Ready"),
            ClusterPhase::WaitingForDependency => write!(f, "WaitingForDependency"),
            ClusterPhase::Failed => write!(f, "Failed"),
            ClusterPhase::Deleting => write!(f, "Deleting"),
        }
    }
}

/// Condition describes the state of a cluster at a certain point.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: String,
    /// The generation of the resource this condition was observed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new condition.
    pub fn new(
        condition_type: &str,
        status: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: jiff::Timestamp::now().to_string(),
            observed_generation: generation,
        }
    }

    /// Create a "Ready" condition.
    pub fn ready(ready: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new("Ready", ready, reason, message, generation)
    }

    /// Create a "Progressing" condition.
    pub fn progressing(
        progressing: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self::new("Progressing", progressing, reason, message, generation)
    }

    /// Create a "Degraded" condition.
    pub fn degraded(degraded: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new("Degraded", degraded, reason, message, generation)
    }
}

//! Certificate requests for tenant cluster components.
//!
//! Renders one `CertConfig` per component into the control-plane namespace of
//! the TenantCluster. A separate certificate operator issues them; this unit
//! only keeps the requests in line with the cluster definition.

use kube::api::{ApiResource, DynamicObject};
use serde::{Deserialize, Serialize};

use crate::controller::context::ReconciliationContext;
use crate::controller::error::Result;
use crate::controller::unit::Template;
use crate::controller::validation::validate_context;
use crate::state::kube_store::{KubeRecord, object_for, object_name};
use crate::state::record::{Record, RecordCollection};
use crate::state::store::Scope;

use super::common::{object_labels, selector, standard_labels, wrong_type};

// ============================================================================
// CertConfig types
// ============================================================================

/// Certificate request payload, the `spec.cert` block of a `CertConfig`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertConfigSpec {
    /// Component the certificate is issued for.
    pub cluster_component: String,

    /// Subject common name.
    pub common_name: String,

    /// Additional DNS names.
    #[serde(default)]
    pub alt_names: Vec<String>,

    /// IP subject alternative names.
    #[serde(default)]
    pub ip_sans: Vec<String>,

    /// Whether the bare domain may be used as a DNS name.
    #[serde(default)]
    pub allow_bare_domains: bool,

    /// Requested certificate lifetime.
    pub ttl: String,
}

/// Components that get a certificate.
pub const COMPONENTS: [&str; 7] = [
    "api",
    "etcd",
    "worker",
    "service-account",
    "prometheus",
    "calico-etcd-client",
    "node-operator",
];

/// DNS names the Kubernetes API is reachable under from inside the cluster.
const KUBERNETES_ALT_NAMES: [&str; 4] = [
    "kubernetes",
    "kubernetes.default",
    "kubernetes.default.svc",
    "kubernetes.default.svc.cluster.local",
];

// ============================================================================
// CertConfig generation
// ============================================================================

/// Name of the CertConfig for `component`.
pub fn cert_config_name(cluster_id: &str, component: &str) -> String {
    format!("{}-{}", cluster_id, component)
}

/// Common name of the certificate for `component`.
///
/// For `api` this equals the cluster's API domain.
pub fn common_name(rc: &ReconciliationContext, component: &str) -> String {
    format!("{}.{}.k8s.{}", component, rc.cluster_id, rc.base_domain)
}

/// Generate the certificate request for one component.
pub fn generate_cert_config(
    rc: &ReconciliationContext,
    component: &str,
    ttl: &str,
) -> CertConfigSpec {
    let (alt_names, ip_sans) = match component {
        "api" => (
            KUBERNETES_ALT_NAMES.iter().map(|n| n.to_string()).collect(),
            vec![rc.api_ip.clone()],
        ),
        "etcd" => (Vec::new(), vec!["127.0.0.1".to_string()]),
        _ => (Vec::new(), Vec::new()),
    };

    CertConfigSpec {
        cluster_component: component.to_string(),
        common_name: common_name(rc, component),
        alt_names,
        ip_sans,
        allow_bare_domains: component == "etcd",
        ttl: ttl.to_string(),
    }
}

/// Desired CertConfigs for a cluster.
pub struct CertConfigTemplate {
    pub ttl: String,
}

impl Template<CertConfigSpec> for CertConfigTemplate {
    fn scope(&self, rc: &ReconciliationContext) -> Scope {
        Scope::new(Some(&rc.namespace), selector(rc))
    }

    fn render(&self, rc: &ReconciliationContext) -> Result<RecordCollection<CertConfigSpec>> {
        validate_context(rc)?;
        let labels = standard_labels(rc);
        RecordCollection::new(
            COMPONENTS
                .iter()
                .map(|component| {
                    Record::new(
                        cert_config_name(&rc.cluster_id, component),
                        Some(&rc.namespace),
                        generate_cert_config(rc, component, &self.ttl),
                    )
                    .with_labels(labels.clone())
                })
                .collect(),
        )
    }
}

impl KubeRecord for CertConfigSpec {
    fn api_resource() -> ApiResource {
        ApiResource {
            group: "core.giantswarm.io".to_string(),
            version: "v1alpha1".to_string(),
            api_version: "core.giantswarm.io/v1alpha1".to_string(),
            kind: "CertConfig".to_string(),
            plural: "certconfigs".to_string(),
        }
    }

    fn to_object(record: &Record<Self>) -> Result<DynamicObject> {
        let mut obj = object_for(record, &Self::api_resource());
        obj.data = serde_json::json!({
            "spec": {
                "cert": serde_json::to_value(&record.spec)?,
                "versionBundle": { "version": "0.1.0" },
            }
        });
        Ok(obj)
    }

    fn from_object(obj: DynamicObject) -> Result<Record<Self>> {
        let name = object_name(&obj, "cert-config")?;
        let cert = obj
            .data
            .pointer("/spec/cert")
            .cloned()
            .ok_or_else(|| wrong_type("cert-config", &obj, "has no spec.cert"))?;
        let spec: CertConfigSpec = serde_json::from_value(cert)
            .map_err(|e| wrong_type("cert-config", &obj, &e.to_string()))?;
        Ok(Record::new(name, obj.metadata.namespace.as_deref(), spec)
            .with_labels(object_labels(&obj)))
    }
}

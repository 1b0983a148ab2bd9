//! Common labels and object helpers shared by every resource template.

use std::collections::BTreeMap;

use kube::api::DynamicObject;

use crate::controller::context::ReconciliationContext;
use crate::controller::error::Error;

/// Cluster a record belongs to
pub const LABEL_CLUSTER: &str = "giantswarm.io/cluster";
/// Organization owning the cluster
pub const LABEL_ORGANIZATION: &str = "giantswarm.io/organization";
/// Manager of the record
pub const LABEL_MANAGED_BY: &str = "giantswarm.io/managed-by";
/// Version bundle the record was rendered for
pub const LABEL_VERSION: &str = "cluster-operator.giantswarm.io/version";

/// Value of [`LABEL_MANAGED_BY`] on every record this operator renders
pub const MANAGED_BY: &str = "tenant-cluster-operator";

/// Namespace in the tenant cluster holding operator-managed components
pub const TENANT_NAMESPACE: &str = "giantswarm";

/// Standard labels applied to all rendered records
pub fn standard_labels(rc: &ReconciliationContext) -> BTreeMap<String, String> {
    let mut labels = selector(rc);
    labels.insert(LABEL_ORGANIZATION.to_string(), rc.organization.clone());
    labels.insert(LABEL_VERSION.to_string(), rc.version_bundle_version.clone());
    labels
}

/// Labels current-state lists select on.
///
/// Excludes organization and version so records rendered by an older bundle
/// are still found and updated.
pub fn selector(rc: &ReconciliationContext) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_CLUSTER.to_string(), rc.cluster_id.clone());
    labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string());
    labels
}

/// Labels of an object read back from the API.
pub fn object_labels(obj: &DynamicObject) -> BTreeMap<String, String> {
    obj.metadata.labels.clone().unwrap_or_default()
}

/// `WrongType` error for an object that does not have the expected shape.
pub fn wrong_type(expected: &'static str, obj: &DynamicObject, detail: &str) -> Error {
    Error::WrongType {
        expected,
        actual: format!(
            "object {} {}",
            obj.metadata.name.as_deref().unwrap_or("<unnamed>"),
            detail
        ),
    }
}

//! Operator namespace inside the tenant cluster.

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{ApiResource, DynamicObject};

use crate::controller::context::ReconciliationContext;
use crate::controller::error::Result;
use crate::controller::unit::Template;
use crate::controller::validation::validate_context;
use crate::state::kube_store::{KubeRecord, object_for, object_name};
use crate::state::record::{Record, RecordCollection};
use crate::state::store::Scope;

use super::common::{TENANT_NAMESPACE, object_labels, selector, standard_labels};

/// Namespaces carry no payload beyond name and labels.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceSpec {}

/// Desired namespaces in the tenant cluster.
pub struct NamespaceTemplate;

impl Template<NamespaceSpec> for NamespaceTemplate {
    fn scope(&self, rc: &ReconciliationContext) -> Scope {
        Scope::new(None, selector(rc))
    }

    fn render(&self, rc: &ReconciliationContext) -> Result<RecordCollection<NamespaceSpec>> {
        validate_context(rc)?;
        RecordCollection::new(vec![
            Record::new(TENANT_NAMESPACE, None, NamespaceSpec::default())
                .with_labels(standard_labels(rc)),
        ])
    }
}

impl KubeRecord for NamespaceSpec {
    fn api_resource() -> ApiResource {
        ApiResource::erase::<Namespace>(&())
    }

    fn to_object(record: &Record<Self>) -> Result<DynamicObject> {
        Ok(object_for(record, &Self::api_resource()))
    }

    fn from_object(obj: DynamicObject) -> Result<Record<Self>> {
        let name = object_name(&obj, "namespace")?;
        Ok(Record::new(name, None, NamespaceSpec::default()).with_labels(object_labels(&obj)))
    }
}

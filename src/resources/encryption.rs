//! Per-cluster encryption key for secrets at rest.
//!
//! The key lives in a Secret named `<clusterID>-encryption` next to the
//! TenantCluster. Only the algorithm is compared; the key material is
//! generated once on create and never re-rendered, so it is not rotated by
//! later passes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{ApiResource, DynamicObject};
use rand::RngCore;

use crate::controller::context::ReconciliationContext;
use crate::controller::error::Result;
use crate::controller::unit::Template;
use crate::controller::validation::validate_context;
use crate::state::kube_store::{KubeRecord, object_for, object_name};
use crate::state::record::{Record, RecordCollection};
use crate::state::store::Scope;

use super::common::{object_labels, selector, standard_labels, wrong_type};

/// Annotation carrying the key algorithm
pub const ALGORITHM_ANNOTATION: &str = "encryption.giantswarm.io/algorithm";

/// Secret data key holding the encryption key
pub const KEY_FIELD: &str = "encryption";

/// Algorithm used for new keys
pub const DEFAULT_ALGORITHM: &str = "aescbc";

/// Key length in bytes
const KEY_LEN: usize = 32;

/// Compared part of an encryption key record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptionKeySpec {
    pub algorithm: String,
}

impl Default for EncryptionKeySpec {
    fn default() -> Self {
        Self {
            algorithm: DEFAULT_ALGORITHM.to_string(),
        }
    }
}

/// Name of the encryption key secret.
pub fn secret_name(cluster_id: &str) -> String {
    format!("{}-encryption", cluster_id)
}

/// Generate fresh base64-encoded key material.
pub fn generate_key() -> String {
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    STANDARD.encode(key)
}

/// Desired encryption key of a cluster.
pub struct EncryptionKeyTemplate;

impl Template<EncryptionKeySpec> for EncryptionKeyTemplate {
    fn scope(&self, rc: &ReconciliationContext) -> Scope {
        Scope::new(Some(&rc.namespace), selector(rc))
    }

    fn render(&self, rc: &ReconciliationContext) -> Result<RecordCollection<EncryptionKeySpec>> {
        validate_context(rc)?;
        RecordCollection::new(vec![
            Record::new(
                secret_name(&rc.cluster_id),
                Some(&rc.namespace),
                EncryptionKeySpec::default(),
            )
            .with_labels(standard_labels(rc)),
        ])
    }
}

impl KubeRecord for EncryptionKeySpec {
    fn api_resource() -> ApiResource {
        ApiResource::erase::<Secret>(&())
    }

    fn to_object(record: &Record<Self>) -> Result<DynamicObject> {
        let mut obj = object_for(record, &Self::api_resource());
        obj.metadata.annotations = Some(
            [(ALGORITHM_ANNOTATION.to_string(), record.spec.algorithm.clone())]
                .into_iter()
                .collect(),
        );
        obj.data = serde_json::json!({ "type": "Opaque" });
        Ok(obj)
    }

    fn from_object(obj: DynamicObject) -> Result<Record<Self>> {
        let name = object_name(&obj, "encryption-key")?;
        let algorithm = obj
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(ALGORITHM_ANNOTATION))
            .cloned()
            .ok_or_else(|| wrong_type("encryption-key", &obj, "has no algorithm annotation"))?;
        Ok(Record::new(
            name,
            obj.metadata.namespace.as_deref(),
            EncryptionKeySpec { algorithm },
        )
        .with_labels(object_labels(&obj)))
    }

    fn prepare_create(obj: &mut DynamicObject) -> Result<()> {
        if let Some(fields) = obj.data.as_object_mut() {
            fields.insert(
                "stringData".to_string(),
                serde_json::json!({ KEY_FIELD: generate_key() }),
            );
        }
        Ok(())
    }
}

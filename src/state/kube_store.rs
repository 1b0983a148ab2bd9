//! Record store backed by the Kubernetes API.
//!
//! Records are converted to and from [`DynamicObject`]s by their [`KubeRecord`]
//! implementation. The target client is resolved per call from the
//! [`ClientSource`]: either the control-plane client, or a tenant-cluster client
//! looked up for the cluster being reconciled.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::Client;
use tracing::debug;

use crate::controller::context::{FIELD_MANAGER, ReconciliationContext};
use crate::controller::error::{Error, Result};
use crate::resources::tenant::TenantClients;

use super::record::{Record, RecordSpec};
use super::store::{RecordStore, Scope};

/// Conversion between a record payload and its Kubernetes object.
pub trait KubeRecord: RecordSpec {
    /// API resource the records are stored as.
    fn api_resource() -> ApiResource;

    /// Render the object for create and server-side apply.
    fn to_object(record: &Record<Self>) -> Result<DynamicObject>;

    /// Read a record back. Objects of unexpected shape fail with `WrongType`.
    fn from_object(obj: DynamicObject) -> Result<Record<Self>>;

    /// Fields only set on creation, never re-applied on update.
    fn prepare_create(_obj: &mut DynamicObject) -> Result<()> {
        Ok(())
    }
}

/// Where a store gets its client from.
#[derive(Clone)]
pub enum ClientSource {
    /// The cluster the operator runs in.
    ControlPlane(Client),
    /// The tenant cluster named by the reconciliation context.
    Tenant(Arc<TenantClients>),
}

impl ClientSource {
    async fn client(&self, rc: &ReconciliationContext) -> Result<Client> {
        match self {
            ClientSource::ControlPlane(client) => Ok(client.clone()),
            ClientSource::Tenant(clients) => clients.client(rc).await,
        }
    }

    /// Map a kube error into the controller taxonomy.
    ///
    /// Transport failures against a tenant cluster mean the tenant API is not up
    /// yet, which cancels the pass rather than failing it.
    fn classify(&self, err: kube::Error, what: &str) -> Error {
        match err {
            kube::Error::Api(ref e) if e.code == 404 => Error::NotFound(what.to_string()),
            kube::Error::Api(ref e) if e.code == 409 && e.reason == "AlreadyExists" => {
                Error::AlreadyExists(what.to_string())
            }
            kube::Error::HyperError(_) | kube::Error::Service(_)
                if matches!(self, ClientSource::Tenant(_)) =>
            {
                Error::DependencyUnavailable(format!("tenant API unreachable: {}", err))
            }
            other => Error::Kube(other),
        }
    }
}

/// [`RecordStore`] over a Kubernetes API.
pub struct KubeStore<S> {
    source: ClientSource,
    _kind: std::marker::PhantomData<fn() -> S>,
}

impl<S: KubeRecord> KubeStore<S> {
    pub fn new(source: ClientSource) -> Self {
        Self {
            source,
            _kind: std::marker::PhantomData,
        }
    }

    async fn api(
        &self,
        rc: &ReconciliationContext,
        namespace: Option<&str>,
    ) -> Result<Api<DynamicObject>> {
        let client = self.source.client(rc).await?;
        let ar = S::api_resource();
        Ok(match namespace {
            Some(ns) => Api::namespaced_with(client, ns, &ar),
            None => Api::all_with(client, &ar),
        })
    }
}

#[async_trait]
impl<S: KubeRecord> RecordStore<S> for KubeStore<S> {
    async fn list(&self, rc: &ReconciliationContext, scope: &Scope) -> Result<Vec<Record<S>>> {
        let api = self.api(rc, scope.namespace.as_deref()).await?;
        let params = ListParams::default().labels(&scope.selector_string());
        let objects = api
            .list(&params)
            .await
            .map_err(|e| self.source.classify(e, &S::KIND.to_string()))?;
        objects.items.into_iter().map(S::from_object).collect()
    }

    async fn create(&self, rc: &ReconciliationContext, record: &Record<S>) -> Result<()> {
        let api = self.api(rc, record.namespace.as_deref()).await?;
        let mut obj = S::to_object(record)?;
        S::prepare_create(&mut obj)?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.create(&params, &obj)
            .await
            .map_err(|e| self.source.classify(e, &record.key().to_string()))?;
        debug!(record = %record.key(), "Created record");
        Ok(())
    }

    async fn update(&self, rc: &ReconciliationContext, record: &Record<S>) -> Result<()> {
        let api = self.api(rc, record.namespace.as_deref()).await?;
        let obj = S::to_object(record)?;
        // Server-side apply only touches the fields rendered here, so data set
        // in prepare_create survives.
        api.patch(
            &record.name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&obj),
        )
        .await
        .map_err(|e| self.source.classify(e, &record.key().to_string()))?;
        debug!(record = %record.key(), "Updated record");
        Ok(())
    }

    async fn delete(&self, rc: &ReconciliationContext, record: &Record<S>) -> Result<()> {
        let api = self.api(rc, record.namespace.as_deref()).await?;
        api.delete(&record.name, &DeleteParams::background())
            .await
            .map_err(|e| self.source.classify(e, &record.key().to_string()))?;
        debug!(record = %record.key(), "Deleted record");
        Ok(())
    }
}

/// Copy name, namespace and labels of `record` onto a fresh object.
pub fn object_for<S: RecordSpec>(record: &Record<S>, ar: &ApiResource) -> DynamicObject {
    let mut obj = DynamicObject::new(&record.name, ar);
    obj.metadata.namespace = record.namespace.clone();
    if !record.labels.is_empty() {
        obj.metadata.labels = Some(record.labels.clone());
    }
    obj
}

/// Name of an object read back from the API.
pub fn object_name(obj: &DynamicObject, expected: &'static str) -> Result<String> {
    obj.metadata.name.clone().ok_or_else(|| Error::WrongType {
        expected,
        actual: "object without metadata.name".to_string(),
    })
}

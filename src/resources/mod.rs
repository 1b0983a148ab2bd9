//! Resource templates and the wiring that turns version bundles into
//! resource sets.
//!
//! ## Resources Managed
//!
//! | Unit | Record | Lives in |
//! |------|--------|----------|
//! | encryptionkey | Secret `<id>-encryption` | control plane |
//! | certconfigs | CertConfig per component | control plane |
//! | namespace | Namespace `giantswarm` | tenant cluster |
//! | chartvalues | ConfigMap `<chart>-values` | tenant cluster |
//! | chartoperator | chart-operator release | tenant cluster |

pub mod certificate;
pub mod chart;
pub mod common;
pub mod configmap;
pub mod encryption;
pub mod namespace;
pub mod package;
pub mod tenant;

use std::sync::Arc;

use kube::Client;

use crate::config::OperatorConfig;
use crate::controller::error::Result;
use crate::controller::resource_set::ResourceSet;
use crate::controller::retry::RetryConfig;
use crate::controller::router::VersionRouter;
use crate::controller::unit::{ResourceUnit, TemplateSource, Unit};
use crate::controller::wrappers::wrap;
use crate::health::HealthState;
use crate::state::kube_store::{ClientSource, KubeStore};
use crate::state::store::RecordStore;
use crate::versions::{Provider, TemplateParams, UnitKind, VersionBundle, bundles};

use certificate::{CertConfigSpec, CertConfigTemplate};
use chart::{ChartOperatorTemplate, ChartSource, HelmReleaseClient, ReleaseClient};
use configmap::{ChartValuesTemplate, ConfigMapSpec};
use encryption::{EncryptionKeySpec, EncryptionKeyTemplate};
use namespace::{NamespaceSpec, NamespaceTemplate};
use package::{DirectoryRegistry, PackageRegistry};
use tenant::TenantClients;

pub use common::standard_labels;

/// Backends the units of every bundle share.
#[derive(Clone)]
pub struct UnitDeps {
    pub encryption_keys: Arc<dyn RecordStore<EncryptionKeySpec>>,
    pub cert_configs: Arc<dyn RecordStore<CertConfigSpec>>,
    pub namespaces: Arc<dyn RecordStore<NamespaceSpec>>,
    pub config_maps: Arc<dyn RecordStore<ConfigMapSpec>>,
    pub releases: Arc<dyn ReleaseClient>,
    pub registry: Arc<dyn PackageRegistry>,
}

impl UnitDeps {
    /// Backends talking to the control plane through `client` and to tenant
    /// clusters through their published kubeconfigs.
    pub fn kube(client: Client, config: &OperatorConfig) -> Self {
        let control_plane = ClientSource::ControlPlane(client.clone());
        let tenants = Arc::new(TenantClients::new(client));
        let tenant = ClientSource::Tenant(tenants.clone());
        Self {
            encryption_keys: Arc::new(KubeStore::new(control_plane.clone())),
            cert_configs: Arc::new(KubeStore::new(control_plane)),
            namespaces: Arc::new(KubeStore::new(tenant.clone())),
            config_maps: Arc::new(KubeStore::new(tenant)),
            releases: Arc::new(
                HelmReleaseClient::new(tenants).with_binary(config.helm_binary.clone()),
            ),
            registry: Arc::new(DirectoryRegistry::new(config.chart_registry_dir.clone())),
        }
    }
}

/// Build the unwrapped unit for `kind`.
pub fn build_unit(kind: UnitKind, params: &TemplateParams, deps: &UnitDeps) -> Arc<dyn ResourceUnit> {
    let name = kind.name();
    match kind {
        UnitKind::EncryptionKey => Arc::new(Unit::new(
            name,
            Arc::new(TemplateSource::new(
                deps.encryption_keys.clone(),
                Arc::new(EncryptionKeyTemplate),
            )),
        )),
        UnitKind::CertConfigs => Arc::new(Unit::new(
            name,
            Arc::new(TemplateSource::new(
                deps.cert_configs.clone(),
                Arc::new(CertConfigTemplate {
                    ttl: params.cert_ttl.to_string(),
                }),
            )),
        )),
        UnitKind::Namespace => Arc::new(Unit::new(
            name,
            Arc::new(TemplateSource::new(
                deps.namespaces.clone(),
                Arc::new(NamespaceTemplate),
            )),
        )),
        UnitKind::ChartValues => Arc::new(Unit::new(
            name,
            Arc::new(TemplateSource::new(
                deps.config_maps.clone(),
                Arc::new(ChartValuesTemplate {
                    params: params.clone(),
                }),
            )),
        )),
        UnitKind::ChartOperator => Arc::new(Unit::new(
            name,
            Arc::new(ChartSource::new(
                Arc::new(ChartOperatorTemplate {
                    channel: params.chart_channel.to_string(),
                }),
                deps.releases.clone(),
                deps.registry.clone(),
            )),
        )),
    }
}

/// Build the wrapped resource set of one bundle.
pub fn build_resource_set(
    bundle: &VersionBundle,
    deps: &UnitDeps,
    retry: &RetryConfig,
    health: Option<&Arc<HealthState>>,
) -> ResourceSet {
    bundle
        .units
        .iter()
        .fold(ResourceSet::new(bundle.version), |set, kind| {
            set.with_unit(wrap(build_unit(*kind, &bundle.params, deps), retry, health))
        })
}

/// Router over every bundle supported for `provider`.
pub fn build_router(
    provider: Provider,
    deps: &UnitDeps,
    retry: &RetryConfig,
    health: Option<&Arc<HealthState>>,
) -> Result<VersionRouter> {
    let mut router = VersionRouter::new();
    for bundle in bundles(provider) {
        router.register(build_resource_set(&bundle, deps, retry, health))?;
    }
    Ok(router)
}

//! In-memory harness for driving full reconciliation passes.
//!
//! The harness wires every unit to a [`MemoryStore`], the chart release unit to
//! a [`StoreReleaseClient`], and the package registry to a temporary directory.
//! The router is built with the same function the operator uses at startup, so
//! passes run through the real pipeline, wrappers and templates.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use tenant_cluster_operator::controller::context::{PassContext, ReconciliationContext};
use tenant_cluster_operator::controller::error::Result;
use tenant_cluster_operator::controller::retry::RetryConfig;
use tenant_cluster_operator::controller::router::{Routed, VersionRouter};
use tenant_cluster_operator::health::HealthState;
use tenant_cluster_operator::resources::certificate::CertConfigSpec;
use tenant_cluster_operator::resources::chart::{CHART_NAME, ChartSpec, StoreReleaseClient};
use tenant_cluster_operator::resources::configmap::ConfigMapSpec;
use tenant_cluster_operator::resources::encryption::EncryptionKeySpec;
use tenant_cluster_operator::resources::namespace::NamespaceSpec;
use tenant_cluster_operator::resources::package::DirectoryRegistry;
use tenant_cluster_operator::resources::{UnitDeps, build_router};
use tenant_cluster_operator::state::memory::MemoryStore;
use tenant_cluster_operator::versions::{Provider, bundles};

/// Namespace the TenantCluster objects live in.
pub const CLUSTER_NAMESPACE: &str = "org-acme";

/// Backends and router for one simulated operator instance.
pub struct Harness {
    pub encryption_keys: Arc<MemoryStore<EncryptionKeySpec>>,
    pub cert_configs: Arc<MemoryStore<CertConfigSpec>>,
    pub namespaces: Arc<MemoryStore<NamespaceSpec>>,
    pub config_maps: Arc<MemoryStore<ConfigMapSpec>>,
    pub releases: Arc<MemoryStore<ChartSpec>>,
    pub release_client: Arc<StoreReleaseClient>,
    pub health: Arc<HealthState>,
    pub router: VersionRouter,
    _registry_root: TempDir,
}

impl Harness {
    /// Harness whose registry holds the chart for every channel of `provider`.
    pub fn new(provider: Provider) -> Self {
        let channels: Vec<&str> = bundles(provider)
            .iter()
            .map(|b| b.params.chart_channel)
            .collect();
        Self::with_channels(provider, &channels)
    }

    /// Harness whose registry only holds the chart for `channels`.
    pub fn with_channels(provider: Provider, channels: &[&str]) -> Self {
        let registry_root = TempDir::new().unwrap();
        for channel in channels {
            let dir = registry_root.path().join(channel);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(format!("{}.tgz", CHART_NAME)), b"chart-operator").unwrap();
        }

        let encryption_keys = Arc::new(MemoryStore::new());
        let cert_configs = Arc::new(MemoryStore::new());
        let namespaces = Arc::new(MemoryStore::new());
        let config_maps = Arc::new(MemoryStore::new());
        let releases = Arc::new(MemoryStore::new());
        let release_client = Arc::new(StoreReleaseClient::new(releases.clone()));
        let health = Arc::new(HealthState::new());

        let deps = UnitDeps {
            encryption_keys: encryption_keys.clone(),
            cert_configs: cert_configs.clone(),
            namespaces: namespaces.clone(),
            config_maps: config_maps.clone(),
            releases: release_client.clone(),
            registry: Arc::new(DirectoryRegistry::new(registry_root.path())),
        };
        let router =
            build_router(provider, &deps, &RetryConfig::immediate(3), Some(&health)).unwrap();

        Self {
            encryption_keys,
            cert_configs,
            namespaces,
            config_maps,
            releases,
            release_client,
            health,
            router,
            _registry_root: registry_root,
        }
    }

    /// Run one pass with a generous deadline.
    pub async fn pass(&self, rc: &ReconciliationContext) -> Result<Routed> {
        let cx = PassContext::with_timeout(rc.clone(), Duration::from_secs(30));
        self.router.dispatch(&cx).await
    }

    /// Create, update and delete calls across every backend.
    pub fn mutation_count(&self) -> usize {
        self.encryption_keys.mutation_count()
            + self.cert_configs.mutation_count()
            + self.namespaces.mutation_count()
            + self.config_maps.mutation_count()
            + self.releases.mutation_count()
    }

    /// Calls of any kind across every backend.
    pub fn call_count(&self) -> usize {
        self.encryption_keys.calls().len()
            + self.cert_configs.calls().len()
            + self.namespaces.calls().len()
            + self.config_maps.calls().len()
            + self.releases.calls().len()
    }

    pub fn clear_calls(&self) {
        self.encryption_keys.clear_calls();
        self.cert_configs.clear_calls();
        self.namespaces.clear_calls();
        self.config_maps.clear_calls();
        self.releases.clear_calls();
    }

    /// Records stored across every backend.
    pub fn record_count(&self) -> usize {
        self.encryption_keys.records().len()
            + self.cert_configs.records().len()
            + self.namespaces.records().len()
            + self.config_maps.records().len()
            + self.releases.records().len()
    }
}

/// Context for cluster `al9qy` on `version`.
pub fn cluster(version: &str) -> ReconciliationContext {
    ReconciliationContext::new(
        "al9qy",
        "gauss.eu-central-1.aws.example.com",
        "acme",
        version,
    )
    .with_namespace(CLUSTER_NAMESPACE)
}

/// Unwrap a handled pass.
pub fn handled(routed: Routed) -> tenant_cluster_operator::controller::resource_set::PassOutcome {
    match routed {
        Routed::Handled(outcome) => outcome,
        Routed::Ignored { version } => panic!("version {} was ignored", version),
    }
}

//! Chart operator release in the tenant cluster.
//!
//! Unlike the other units, creating or updating a release needs the chart
//! package on local disk. [`ChartSource`] pulls it from the registry for the
//! duration of one apply call; the
//! [`PulledPackage`](super::package::PulledPackage) handle removes it again on
//! every exit path.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Output;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use crate::controller::context::ReconciliationContext;
use crate::controller::error::{Error, Result};
use crate::controller::unit::{StateSource, Template};
use crate::controller::validation::validate_context;
use crate::state::record::{Record, RecordCollection};
use crate::state::store::{RecordStore, Scope};

use super::common::{TENANT_NAMESPACE, selector, standard_labels};
use super::package::PackageRegistry;
use super::tenant::TenantClients;

/// Release name of the chart operator
pub const RELEASE_NAME: &str = "chart-operator";

/// Package name of the chart operator chart
pub const CHART_NAME: &str = "chart-operator-chart";

/// Values block identifying releases managed by this operator
const VALUES_BLOCK: &str = "clusterOperator";

/// Compared part of a chart release.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSpec {
    /// Package name in the registry.
    pub chart: String,
    /// Registry channel the package is pulled from.
    pub channel: String,
}

/// Installs and inspects releases in a tenant cluster.
#[async_trait]
pub trait ReleaseClient: Send + Sync {
    /// Releases inside `scope`.
    async fn list(&self, rc: &ReconciliationContext, scope: &Scope) -> Result<Vec<Record<ChartSpec>>>;

    /// Install a release from the package at `package`.
    async fn install(
        &self,
        rc: &ReconciliationContext,
        release: &Record<ChartSpec>,
        package: &Path,
    ) -> Result<()>;

    /// Upgrade a release to the package at `package`.
    async fn upgrade(
        &self,
        rc: &ReconciliationContext,
        release: &Record<ChartSpec>,
        package: &Path,
    ) -> Result<()>;

    async fn uninstall(&self, rc: &ReconciliationContext, release: &Record<ChartSpec>) -> Result<()>;
}

/// Desired chart operator release of one bundle.
pub struct ChartOperatorTemplate {
    pub channel: String,
}

impl Template<ChartSpec> for ChartOperatorTemplate {
    fn scope(&self, rc: &ReconciliationContext) -> Scope {
        Scope::new(Some(TENANT_NAMESPACE), selector(rc))
    }

    fn render(&self, rc: &ReconciliationContext) -> Result<RecordCollection<ChartSpec>> {
        validate_context(rc)?;
        RecordCollection::new(vec![
            Record::new(
                RELEASE_NAME,
                Some(TENANT_NAMESPACE),
                ChartSpec {
                    chart: CHART_NAME.to_string(),
                    channel: self.channel.clone(),
                },
            )
            .with_labels(standard_labels(rc)),
        ])
    }
}

/// [`StateSource`] for chart releases.
pub struct ChartSource {
    template: Arc<dyn Template<ChartSpec>>,
    releases: Arc<dyn ReleaseClient>,
    registry: Arc<dyn PackageRegistry>,
}

impl ChartSource {
    pub fn new(
        template: Arc<dyn Template<ChartSpec>>,
        releases: Arc<dyn ReleaseClient>,
        registry: Arc<dyn PackageRegistry>,
    ) -> Self {
        Self {
            template,
            releases,
            registry,
        }
    }
}

#[async_trait]
impl StateSource<ChartSpec> for ChartSource {
    async fn get_current(&self, rc: &ReconciliationContext) -> Result<RecordCollection<ChartSpec>> {
        let releases = self.releases.list(rc, &self.template.scope(rc)).await?;
        RecordCollection::new(releases)
    }

    async fn get_desired(&self, rc: &ReconciliationContext) -> Result<RecordCollection<ChartSpec>> {
        self.template.render(rc)
    }

    async fn create(&self, rc: &ReconciliationContext, record: &Record<ChartSpec>) -> Result<()> {
        let package = self
            .registry
            .pull_package(&record.spec.chart, &record.spec.channel)
            .await?;
        self.releases.install(rc, record, package.path()).await
    }

    async fn update(&self, rc: &ReconciliationContext, record: &Record<ChartSpec>) -> Result<()> {
        let package = self
            .registry
            .pull_package(&record.spec.chart, &record.spec.channel)
            .await?;
        self.releases.upgrade(rc, record, package.path()).await
    }

    async fn delete(&self, rc: &ReconciliationContext, record: &Record<ChartSpec>) -> Result<()> {
        self.releases.uninstall(rc, record).await
    }
}

// ============================================================================
// Store-backed release client
// ============================================================================

/// [`ReleaseClient`] keeping releases in a [`RecordStore`].
///
/// Used for dry runs and tests. Installs and upgrades check that the package
/// is present and remember where it was read from.
pub struct StoreReleaseClient {
    store: Arc<dyn RecordStore<ChartSpec>>,
    packages: Mutex<Vec<std::path::PathBuf>>,
}

impl StoreReleaseClient {
    pub fn new(store: Arc<dyn RecordStore<ChartSpec>>) -> Self {
        Self {
            store,
            packages: Mutex::new(Vec::new()),
        }
    }

    /// Package paths seen by install and upgrade, oldest first.
    pub fn packages(&self) -> Vec<std::path::PathBuf> {
        self.packages.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn check_package(&self, package: &Path) -> Result<()> {
        if !package.is_file() {
            return Err(Error::Package(format!(
                "package {} is not available",
                package.display()
            )));
        }
        if let Ok(mut packages) = self.packages.lock() {
            packages.push(package.to_path_buf());
        }
        Ok(())
    }
}

#[async_trait]
impl ReleaseClient for StoreReleaseClient {
    async fn list(&self, rc: &ReconciliationContext, scope: &Scope) -> Result<Vec<Record<ChartSpec>>> {
        self.store.list(rc, scope).await
    }

    async fn install(
        &self,
        rc: &ReconciliationContext,
        release: &Record<ChartSpec>,
        package: &Path,
    ) -> Result<()> {
        self.check_package(package)?;
        self.store.create(rc, release).await
    }

    async fn upgrade(
        &self,
        rc: &ReconciliationContext,
        release: &Record<ChartSpec>,
        package: &Path,
    ) -> Result<()> {
        self.check_package(package)?;
        self.store.update(rc, release).await
    }

    async fn uninstall(&self, rc: &ReconciliationContext, release: &Record<ChartSpec>) -> Result<()> {
        self.store.delete(rc, release).await
    }
}

// ============================================================================
// Helm release client
// ============================================================================

/// Values block written into every managed release.
#[derive(Debug, Serialize, Deserialize)]
struct ManagedValues {
    chart: String,
    channel: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ListedRelease {
    name: String,
    namespace: String,
}

/// [`ReleaseClient`] driving the `helm` binary against the tenant cluster.
pub struct HelmReleaseClient {
    tenants: Arc<TenantClients>,
    helm: String,
}

impl HelmReleaseClient {
    pub fn new(tenants: Arc<TenantClients>) -> Self {
        Self {
            tenants,
            helm: "helm".to_string(),
        }
    }

    /// Use a different helm binary.
    pub fn with_binary(mut self, helm: impl Into<String>) -> Self {
        self.helm = helm.into();
        self
    }

    /// Run helm with the tenant kubeconfig and return stdout.
    async fn run(&self, rc: &ReconciliationContext, what: &str, args: &[&str]) -> Result<Vec<u8>> {
        let kubeconfig = NamedTempFile::new()?;
        tokio::fs::write(kubeconfig.path(), self.tenants.kubeconfig(rc).await?).await?;

        let mut cmd = Command::new(&self.helm);
        cmd.arg("--kubeconfig")
            .arg(kubeconfig.path())
            .args(args)
            .kill_on_drop(true);
        debug!(command = ?cmd, "Executing helm");

        let output = cmd
            .output()
            .await
            .map_err(|e| Error::Package(format!("failed to execute {}: {}", self.helm, e)))?;
        classify_output(output, what)
    }

    async fn values(&self, rc: &ReconciliationContext, release: &ListedRelease) -> Result<Option<ManagedValues>> {
        let stdout = self
            .run(
                rc,
                &release.name,
                &[
                    "get",
                    "values",
                    release.name.as_str(),
                    "-n",
                    release.namespace.as_str(),
                    "-o",
                    "json",
                ],
            )
            .await?;
        let values: serde_json::Value = serde_json::from_slice(&stdout)?;
        match values.get(VALUES_BLOCK) {
            Some(block) => Ok(serde_json::from_value(block.clone()).ok()),
            None => Ok(None),
        }
    }

    async fn install_or_upgrade(
        &self,
        rc: &ReconciliationContext,
        verb: &str,
        release: &Record<ChartSpec>,
        package: &Path,
    ) -> Result<()> {
        let values = serde_json::json!({
            VALUES_BLOCK: ManagedValues {
                chart: release.spec.chart.clone(),
                channel: release.spec.channel.clone(),
                labels: release.labels.clone(),
            }
        });
        let values_file = NamedTempFile::new()?;
        tokio::fs::write(values_file.path(), serde_json::to_vec(&values)?).await?;

        let namespace = release.namespace.as_deref().unwrap_or(TENANT_NAMESPACE);
        let package = package.to_string_lossy();
        let values_path = values_file.path().to_string_lossy();
        self.run(
            rc,
            &release.name,
            &[
                verb,
                release.name.as_str(),
                &*package,
                "-n",
                namespace,
                "-f",
                &*values_path,
            ],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReleaseClient for HelmReleaseClient {
    async fn list(&self, rc: &ReconciliationContext, scope: &Scope) -> Result<Vec<Record<ChartSpec>>> {
        let mut args = vec!["list", "-o", "json"];
        match scope.namespace.as_deref() {
            Some(ns) => args.extend(["-n", ns]),
            None => args.push("--all-namespaces"),
        }
        let stdout = self.run(rc, "releases", &args).await?;
        let listed: Vec<ListedRelease> = serde_json::from_slice(&stdout)?;

        let mut records = Vec::new();
        for release in listed {
            // Releases installed by someone else carry no managed values block
            let Some(values) = self.values(rc, &release).await? else {
                continue;
            };
            let record = Record::new(
                release.name,
                Some(&release.namespace),
                ChartSpec {
                    chart: values.chart,
                    channel: values.channel,
                },
            )
            .with_labels(values.labels);
            if scope.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn install(
        &self,
        rc: &ReconciliationContext,
        release: &Record<ChartSpec>,
        package: &Path,
    ) -> Result<()> {
        self.install_or_upgrade(rc, "install", release, package).await
    }

    async fn upgrade(
        &self,
        rc: &ReconciliationContext,
        release: &Record<ChartSpec>,
        package: &Path,
    ) -> Result<()> {
        self.install_or_upgrade(rc, "upgrade", release, package).await
    }

    async fn uninstall(&self, rc: &ReconciliationContext, release: &Record<ChartSpec>) -> Result<()> {
        let namespace = release.namespace.as_deref().unwrap_or(TENANT_NAMESPACE);
        self.run(rc, &release.name, &["uninstall", release.name.as_str(), "-n", namespace])
            .await?;
        Ok(())
    }
}

/// Map a finished helm invocation into the controller taxonomy.
fn classify_output(output: Output, what: &str) -> Result<Vec<u8>> {
    if output.status.success() {
        return Ok(output.stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(classify_stderr(&stderr, what))
}

fn classify_stderr(stderr: &str, what: &str) -> Error {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("kubernetes cluster unreachable") {
        Error::DependencyUnavailable(format!("tenant API unreachable: {}", stderr))
    } else if lower.contains("cannot re-use a name that is still in use") {
        Error::AlreadyExists(what.to_string())
    } else if lower.contains("release: not found") || lower.contains("has no deployed releases") {
        Error::NotFound(what.to_string())
    } else {
        Error::Package(format!("helm failed for {}: {}", what, stderr))
    }
}

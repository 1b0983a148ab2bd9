//! tenant-cluster-operator binary.
//!
//! One replica holds the lease and reconciles TenantCluster objects; the
//! others serve health endpoints and wait. Losing the lease or receiving
//! SIGTERM cancels every in-flight pass before the process exits.

use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tenant_cluster_operator::OperatorConfig;
use tenant_cluster_operator::health::{HealthState, run_health_server};
use tenant_cluster_operator::run_controller;

const LEASE_NAME: &str = "tenant-cluster-operator-leader";
const LEASE_TTL: Duration = Duration::from_secs(15);
const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Time a canceled pass gets to reach its next step boundary.
const DRAIN_PERIOD: Duration = Duration::from_secs(5);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_tracing()?;

    let config = OperatorConfig::from_env();
    info!(
        provider = %config.provider,
        resync_secs = config.resync_period.as_secs(),
        pass_deadline_secs = config.pass_deadline.as_secs(),
        retry_max_attempts = config.retry_max_attempts,
        helm = %config.helm_binary,
        charts = %config.chart_registry_dir.display(),
        "tenant-cluster-operator configured"
    );

    let client = Client::try_default().await?;
    let (holder, namespace) = identity(&config);

    let health = Arc::new(HealthState::new());
    let health_task = tokio::spawn({
        let health = health.clone();
        async move {
            if let Err(e) = run_health_server(health).await {
                error!(error = %e, "health server stopped");
            }
        }
    });

    let lease = lease_lock(&client, &namespace, &holder);
    info!(holder = %holder, namespace = %namespace, lease = LEASE_NAME, "standing by for leadership");
    acquire_leadership(&lease).await;
    info!(holder = %holder, "leading, starting tenant cluster controller");

    let shutdown = CancellationToken::new();
    let controller_task = tokio::spawn({
        let client = client.clone();
        let health = health.clone();
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = run_controller(client, Some(health), config, shutdown).await {
                error!(error = %e, "tenant cluster controller stopped");
            }
        }
    });

    let outcome: Result<(), BoxError> = tokio::select! {
        joined = controller_task => {
            joined.map_err(|e| -> BoxError { format!("controller task aborted: {e}").into() })
        }
        joined = health_task => {
            joined.map_err(|e| -> BoxError { format!("health task aborted: {e}").into() })
        }
        lost = hold_leadership(lease) => {
            error!(error = %lost, "leadership lost, canceling tenant passes");
            Err(lost.into())
        }
        received = shutdown_signal() => {
            info!("termination requested, canceling tenant passes");
            received.map_err(BoxError::from)
        }
    };

    health.set_ready(false).await;
    shutdown.cancel();
    debug!(drain_secs = DRAIN_PERIOD.as_secs(), "draining canceled passes");
    tokio::time::sleep(DRAIN_PERIOD).await;

    info!("tenant-cluster-operator exited");
    outcome
}

/// JSON logs, `info` for this crate and kube unless `RUST_LOG` says otherwise.
fn init_tracing() -> Result<(), BoxError> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("tenant_cluster_operator=info".parse()?)
        .add_directive("kube=info".parse()?)
        .add_directive("kube_leader_election=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
    Ok(())
}

/// Lease holder id and namespace, from the downward API when present.
fn identity(config: &OperatorConfig) -> (String, String) {
    let holder = match &config.pod_name {
        Some(name) => name.clone(),
        None => {
            let host = hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "tenant-cluster-operator".to_string());
            warn!(holder = %host, "POD_NAME unset, falling back to hostname");
            host
        }
    };
    let namespace = config.pod_namespace.clone().unwrap_or_else(|| {
        warn!("POD_NAMESPACE unset, holding the lease in 'default'");
        "default".to_string()
    });
    (holder, namespace)
}

fn lease_lock(client: &Client, namespace: &str, holder: &str) -> LeaseLock {
    LeaseLock::new(
        client.clone(),
        namespace,
        LeaseLockParams {
            holder_id: holder.to_string(),
            lease_name: LEASE_NAME.to_string(),
            lease_ttl: LEASE_TTL,
        },
    )
}

/// Poll the lease until this replica holds it.
async fn acquire_leadership(lease: &LeaseLock) {
    loop {
        match lease.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => return,
            Ok(_) => debug!("lease held by another replica"),
            Err(e) => warn!(error = %e, "lease acquisition failed"),
        }
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
    }
}

/// Renew the lease until a renewal fails or another replica takes it.
/// Only returns on loss.
async fn hold_leadership(lease: LeaseLock) -> String {
    loop {
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
        match lease.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {}
            Ok(_) => return "lease taken over by another replica".to_string(),
            Err(e) => return format!("lease renewal failed: {e}"),
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            received = signal::ctrl_c() => received,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await
    }
}

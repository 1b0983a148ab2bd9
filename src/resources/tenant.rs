//! Access to tenant cluster APIs.
//!
//! The kubeconfig of a tenant cluster is published by its provisioner as the
//! Secret `<clusterID>-kubeconfig` in the TenantCluster's namespace. Until it
//! exists the tenant API is not reachable, which callers see as
//! `TenantGone`. A normal pass cancels on it; a teardown pass treats the
//! tenant's records as already removed along with the cluster.

use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};

use crate::controller::context::ReconciliationContext;
use crate::controller::error::{Error, Result};

/// Secret data key holding the kubeconfig document
pub const KUBECONFIG_KEY: &str = "kubeconfig";

/// Name of the kubeconfig secret of a tenant cluster.
pub fn kubeconfig_secret_name(cluster_id: &str) -> String {
    format!("{}-kubeconfig", cluster_id)
}

/// Resolves clients for tenant clusters through the control plane.
#[derive(Clone)]
pub struct TenantClients {
    control_plane: Client,
}

impl TenantClients {
    pub fn new(control_plane: Client) -> Self {
        Self { control_plane }
    }

    /// Raw kubeconfig document of the cluster in `rc`.
    pub async fn kubeconfig(&self, rc: &ReconciliationContext) -> Result<String> {
        let name = kubeconfig_secret_name(&rc.cluster_id);
        let api: Api<Secret> = Api::namespaced(self.control_plane.clone(), &rc.namespace);
        let secret = api.get_opt(&name).await?.ok_or_else(|| {
            Error::TenantGone(format!("kubeconfig secret {} does not exist", name))
        })?;
        let bytes = secret
            .data
            .and_then(|mut data| data.remove(KUBECONFIG_KEY))
            .ok_or_else(|| {
                Error::TenantGone(format!(
                    "kubeconfig secret {} has no {} key",
                    name, KUBECONFIG_KEY
                ))
            })?;
        String::from_utf8(bytes.0).map_err(|_| {
            Error::InvalidConfig(format!("kubeconfig secret {} is not UTF-8", name))
        })
    }

    /// Client for the tenant cluster in `rc`.
    pub async fn client(&self, rc: &ReconciliationContext) -> Result<Client> {
        let raw = self.kubeconfig(rc).await?;
        client_from_kubeconfig(&raw).await
    }
}

/// Build a client from a kubeconfig document.
pub async fn client_from_kubeconfig(raw: &str) -> Result<Client> {
    let kubeconfig = Kubeconfig::from_yaml(raw)
        .map_err(|e| Error::InvalidConfig(format!("invalid tenant kubeconfig: {}", e)))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::InvalidConfig(format!("invalid tenant kubeconfig: {}", e)))?;
    Ok(Client::try_from(config)?)
}

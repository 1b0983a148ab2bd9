//! Custom Resource Definitions (CRDs) for tenant-cluster-operator.
//!
//! - `TenantCluster`: declares a tenant cluster and its version bundle

mod tenant_cluster;

pub use tenant_cluster::*;

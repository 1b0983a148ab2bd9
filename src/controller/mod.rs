//! Controller module for tenant-cluster-operator.
//!
//! Contains the reconciliation loop, the resource unit pipeline and its
//! wrappers, version routing, error handling, status management and
//! validation logic.

// Shared modules
pub mod context;
pub mod error;
pub mod status;
pub mod validation;

// Resource unit pipeline
pub mod outcome;
pub mod resource_set;
pub mod retry;
pub mod router;
pub mod unit;
pub mod unit_state_machine;
pub mod wrappers;

// TenantCluster controller
pub mod reconciler;

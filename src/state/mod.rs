//! Record model, diff engine and record stores.

pub mod diff;
pub mod kube_store;
pub mod memory;
pub mod record;
pub mod store;

//! Version-scoped dispatch.
//!
//! Each event is routed to the resource set registered for the object's
//! declared version bundle version. Events for unknown versions are ignored so
//! another operator instance can claim them.

use std::collections::BTreeMap;

use tracing::debug;

use crate::controller::context::PassContext;
use crate::controller::error::{Error, Result};
use crate::controller::resource_set::{PassOutcome, ResourceSet};

/// Result of routing one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Routed {
    /// No resource set claims the version; nothing ran.
    Ignored { version: String },
    Handled(PassOutcome),
}

/// Mapping from version string to resource set.
#[derive(Default)]
pub struct VersionRouter {
    sets: BTreeMap<String, ResourceSet>,
}

impl VersionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource set. Two sets may not claim the same version.
    pub fn register(&mut self, set: ResourceSet) -> Result<()> {
        let version = set.version().to_string();
        if self.sets.contains_key(&version) {
            return Err(Error::InvalidConfig(format!(
                "version {} is already claimed by another resource set",
                version
            )));
        }
        self.sets.insert(version, set);
        Ok(())
    }

    /// Resource set for `version`, if any.
    pub fn route(&self, version: &str) -> Option<&ResourceSet> {
        self.sets.get(version)
    }

    pub fn versions(&self) -> Vec<&str> {
        self.sets.keys().map(String::as_str).collect()
    }

    /// Run the resource set matching the pass's version bundle version.
    pub async fn dispatch(&self, cx: &PassContext) -> Result<Routed> {
        let version = &cx.rc.version_bundle_version;
        match self.route(version) {
            Some(set) => Ok(Routed::Handled(set.run(cx).await?)),
            None => {
                debug!(
                    cluster_id = %cx.rc.cluster_id,
                    version = %version,
                    "No resource set for version, ignoring event"
                );
                Ok(Routed::Ignored {
                    version: version.clone(),
                })
            }
        }
    }
}

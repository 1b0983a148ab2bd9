//! Backing store capability behind a state source.
//!
//! A store lists and mutates records of one kind. Implementations report
//! `NotFound`, `AlreadyExists` and `DependencyUnavailable` through the
//! controller [`Error`](crate::controller::error::Error) taxonomy so callers
//! can absorb or cancel uniformly.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::controller::context::ReconciliationContext;
use crate::controller::error::Result;

use super::record::{Record, RecordSpec};

/// Which records a list call covers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scope {
    /// Namespace to list in, `None` for cluster-scoped kinds.
    pub namespace: Option<String>,
    /// Labels every returned record must carry.
    pub selector: BTreeMap<String, String>,
}

impl Scope {
    pub fn new(namespace: Option<&str>, selector: BTreeMap<String, String>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            selector,
        }
    }

    /// Label selector in `key=value,key=value` form.
    pub fn selector_string(&self) -> String {
        self.selector
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// True when `record` falls inside this scope.
    pub fn matches<S: RecordSpec>(&self, record: &Record<S>) -> bool {
        let namespace_ok = match &self.namespace {
            Some(ns) => record.namespace.as_deref() == Some(ns.as_str()),
            None => true,
        };
        namespace_ok
            && self
                .selector
                .iter()
                .all(|(k, v)| record.labels.get(k) == Some(v))
    }
}

/// CRUD capability over records of one kind.
#[async_trait]
pub trait RecordStore<S: RecordSpec>: Send + Sync {
    /// List the records inside `scope`.
    async fn list(&self, rc: &ReconciliationContext, scope: &Scope) -> Result<Vec<Record<S>>>;

    /// Create a record. Fails with `AlreadyExists` if the name is taken.
    async fn create(&self, rc: &ReconciliationContext, record: &Record<S>) -> Result<()>;

    /// Replace a record. Fails with `NotFound` if it does not exist.
    async fn update(&self, rc: &ReconciliationContext, record: &Record<S>) -> Result<()>;

    /// Delete a record. Fails with `NotFound` if it does not exist.
    async fn delete(&self, rc: &ReconciliationContext, record: &Record<S>) -> Result<()>;
}

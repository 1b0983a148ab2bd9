//! In-process record store.
//!
//! Used for dry runs and tests. Mirrors the API-server semantics the engine
//! relies on: create of an existing name is `AlreadyExists`, update or delete of
//! a missing name is `NotFound`. Availability and transient failures can be
//! injected to exercise cancellation and retry paths.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::controller::context::ReconciliationContext;
use crate::controller::error::{Error, Result};

use super::record::{Record, RecordSpec};
use super::store::{RecordStore, Scope};

/// Store operation, as recorded in the call log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    List,
    Create,
    Update,
    Delete,
}

/// One call made against the store, successful or not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    /// Record name, empty for list calls.
    pub name: String,
}

type Key = (Option<String>, String);

/// Thread-safe in-memory [`RecordStore`].
pub struct MemoryStore<S> {
    records: Mutex<BTreeMap<Key, Record<S>>>,
    calls: Mutex<Vec<StoreCall>>,
    unavailable: AtomicBool,
    tenant_gone: AtomicBool,
    transient_failures: AtomicUsize,
}

impl<S: RecordSpec> Default for MemoryStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: RecordSpec> MemoryStore<S> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
            tenant_gone: AtomicBool::new(false),
            transient_failures: AtomicUsize::new(0),
        }
    }

    /// Create a store pre-populated with `records`.
    pub fn with_records(records: Vec<Record<S>>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.records.lock() {
            for record in records {
                map.insert(key_of(&record), record);
            }
        }
        store
    }

    /// Make every call fail with `DependencyUnavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every call fail with `TenantGone` until reset, as a store inside a
    /// deleted tenant cluster does.
    pub fn set_tenant_gone(&self, gone: bool) {
        self.tenant_gone.store(gone, Ordering::SeqCst);
    }

    /// Fail the next `count` calls with a transient error.
    pub fn fail_next(&self, count: usize) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Snapshot of stored records in key order.
    pub fn records(&self) -> Vec<Record<S>> {
        self.records
            .lock()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, namespace: Option<&str>, name: &str) -> Option<Record<S>> {
        let key = (namespace.map(str::to_string), name.to_string());
        self.records
            .lock()
            .ok()
            .and_then(|map| map.get(&key).cloned())
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of create, update and delete calls made so far.
    pub fn mutation_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.op != StoreOp::List)
            .count()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn enter(&self, op: StoreOp, name: &str) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(StoreCall {
                op,
                name: name.to_string(),
            });
        }
        if self.tenant_gone.load(Ordering::SeqCst) {
            return Err(Error::TenantGone(format!("{} store was removed", S::KIND)));
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::DependencyUnavailable(format!(
                "{} store is not reachable",
                S::KIND
            )));
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Transient(format!("injected failure on {:?}", op)));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<Key, Record<S>>>> {
        self.records
            .lock()
            .map_err(|_| Error::Transient("memory store lock poisoned".to_string()))
    }
}

fn key_of<S: RecordSpec>(record: &Record<S>) -> Key {
    (record.namespace.clone(), record.name.clone())
}

#[async_trait]
impl<S: RecordSpec> RecordStore<S> for MemoryStore<S> {
    async fn list(&self, _rc: &ReconciliationContext, scope: &Scope) -> Result<Vec<Record<S>>> {
        self.enter(StoreOp::List, "")?;
        Ok(self
            .lock()?
            .values()
            .filter(|r| scope.matches(r))
            .cloned()
            .collect())
    }

    async fn create(&self, _rc: &ReconciliationContext, record: &Record<S>) -> Result<()> {
        self.enter(StoreOp::Create, &record.name)?;
        let mut map = self.lock()?;
        let key = key_of(record);
        if map.contains_key(&key) {
            return Err(Error::AlreadyExists(record.key().to_string()));
        }
        map.insert(key, record.clone());
        Ok(())
    }

    async fn update(&self, _rc: &ReconciliationContext, record: &Record<S>) -> Result<()> {
        self.enter(StoreOp::Update, &record.name)?;
        let mut map = self.lock()?;
        match map.get_mut(&key_of(record)) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(Error::NotFound(record.key().to_string())),
        }
    }

    async fn delete(&self, _rc: &ReconciliationContext, record: &Record<S>) -> Result<()> {
        self.enter(StoreOp::Delete, &record.name)?;
        match self.lock()?.remove(&key_of(record)) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(record.key().to_string())),
        }
    }
}

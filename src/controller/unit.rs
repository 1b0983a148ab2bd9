//! Resource unit contract and the generic unit built on a state source.
//!
//! Every reconcilable concern implements [`ResourceUnit`] so the resource set
//! can drive it uniformly: fetch current, fetch desired, compute a patch, then
//! apply create, update and delete changes in that order. Units only see the
//! tagged [`State`]; [`Unit`] recovers its typed collections from it and fails
//! with `WrongType` on any other variant.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::controller::context::{PassContext, ReconciliationContext};
use crate::controller::error::Result;
use crate::controller::outcome::{Step, absorb_cancellation};
use crate::state::diff::{self, Patch, PatchSummary};
use crate::state::record::{Record, RecordCollection, RecordSpec, State};
use crate::state::store::{RecordStore, Scope};

/// A patch over tagged state.
#[derive(Clone, Debug, PartialEq)]
pub struct StatePatch {
    pub to_create: State,
    pub to_update: State,
    pub to_delete: State,
}

impl StatePatch {
    pub fn summary(&self) -> PatchSummary {
        PatchSummary {
            created: self.to_create.len(),
            updated: self.to_update.len(),
            deleted: self.to_delete.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary().is_empty()
    }
}

impl<S: RecordSpec> From<Patch<S>> for StatePatch {
    fn from(patch: Patch<S>) -> Self {
        Self {
            to_create: S::into_state(patch.to_create),
            to_update: S::into_state(patch.to_update),
            to_delete: S::into_state(patch.to_delete),
        }
    }
}

/// The seven-operation contract every unit implements.
#[async_trait]
pub trait ResourceUnit: Send + Sync {
    /// Stable identifier used in logs and metrics.
    fn name(&self) -> &str;

    /// Records that exist now. Unreachable dependencies cancel the pass.
    async fn get_current_state(&self, cx: &PassContext) -> Result<Step<State>>;

    /// Records that should exist, rendered from the reconciliation context.
    async fn get_desired_state(&self, cx: &PassContext) -> Result<Step<State>>;

    /// Patch converging current onto desired.
    fn new_update_patch(&self, current: &State, desired: &State) -> Result<StatePatch>;

    /// Patch removing everything currently present.
    fn new_delete_patch(&self, current: &State, desired: &State) -> Result<StatePatch>;

    async fn apply_create_change(&self, cx: &PassContext, create: &State) -> Result<Step<()>>;

    async fn apply_update_change(&self, cx: &PassContext, update: &State) -> Result<Step<()>>;

    async fn apply_delete_change(&self, cx: &PassContext, delete: &State) -> Result<Step<()>>;
}

/// Current and desired records of one kind, plus the capability to change them.
#[async_trait]
pub trait StateSource<S: RecordSpec>: Send + Sync {
    async fn get_current(&self, rc: &ReconciliationContext) -> Result<RecordCollection<S>>;

    async fn get_desired(&self, rc: &ReconciliationContext) -> Result<RecordCollection<S>>;

    async fn create(&self, rc: &ReconciliationContext, record: &Record<S>) -> Result<()>;

    async fn update(&self, rc: &ReconciliationContext, record: &Record<S>) -> Result<()>;

    async fn delete(&self, rc: &ReconciliationContext, record: &Record<S>) -> Result<()>;
}

/// Renders the desired records of one kind for a cluster.
pub trait Template<S: RecordSpec>: Send + Sync {
    /// Where the current records of this kind live.
    fn scope(&self, rc: &ReconciliationContext) -> Scope;

    /// Desired records. Unusable context values fail with `InvalidConfig`.
    fn render(&self, rc: &ReconciliationContext) -> Result<RecordCollection<S>>;
}

/// [`StateSource`] reading current state from a store and desired state from a
/// template.
pub struct TemplateSource<S> {
    store: Arc<dyn RecordStore<S>>,
    template: Arc<dyn Template<S>>,
}

impl<S: RecordSpec> TemplateSource<S> {
    pub fn new(store: Arc<dyn RecordStore<S>>, template: Arc<dyn Template<S>>) -> Self {
        Self { store, template }
    }
}

#[async_trait]
impl<S: RecordSpec> StateSource<S> for TemplateSource<S> {
    async fn get_current(&self, rc: &ReconciliationContext) -> Result<RecordCollection<S>> {
        let records = self.store.list(rc, &self.template.scope(rc)).await?;
        RecordCollection::new(records)
    }

    async fn get_desired(&self, rc: &ReconciliationContext) -> Result<RecordCollection<S>> {
        self.template.render(rc)
    }

    async fn create(&self, rc: &ReconciliationContext, record: &Record<S>) -> Result<()> {
        self.store.create(rc, record).await
    }

    async fn update(&self, rc: &ReconciliationContext, record: &Record<S>) -> Result<()> {
        self.store.update(rc, record).await
    }

    async fn delete(&self, rc: &ReconciliationContext, record: &Record<S>) -> Result<()> {
        self.store.delete(rc, record).await
    }
}

/// [`ResourceUnit`] over a typed [`StateSource`].
pub struct Unit<S> {
    name: String,
    source: Arc<dyn StateSource<S>>,
}

impl<S: RecordSpec> Unit<S> {
    pub fn new(name: impl Into<String>, source: Arc<dyn StateSource<S>>) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }
}

#[async_trait]
impl<S: RecordSpec> ResourceUnit for Unit<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_current_state(&self, cx: &PassContext) -> Result<Step<State>> {
        let result = match cx
            .deadline
            .run("get_current", self.source.get_current(&cx.rc))
            .await
        {
            // Records inside a removed tenant cluster went away with it.
            Err(e) if cx.rc.deletion_requested && e.is_tenant_gone() => {
                debug!(unit = %self.name, reason = %e, "Tenant cluster is gone, nothing to tear down");
                Ok(RecordCollection::empty())
            }
            other => other,
        };
        Ok(absorb_cancellation(result)?.map(S::into_state))
    }

    async fn get_desired_state(&self, cx: &PassContext) -> Result<Step<State>> {
        let result = cx
            .deadline
            .run("get_desired", self.source.get_desired(&cx.rc))
            .await;
        Ok(absorb_cancellation(result)?.map(S::into_state))
    }

    fn new_update_patch(&self, current: &State, desired: &State) -> Result<StatePatch> {
        let current = S::from_state(current.clone())?;
        let desired = S::from_state(desired.clone())?;
        Ok(diff::new_update_patch(&current, &desired).into())
    }

    fn new_delete_patch(&self, current: &State, desired: &State) -> Result<StatePatch> {
        let current = S::from_state(current.clone())?;
        let desired = S::from_state(desired.clone())?;
        Ok(diff::new_delete_patch(&current, &desired).into())
    }

    async fn apply_create_change(&self, cx: &PassContext, create: &State) -> Result<Step<()>> {
        for record in S::from_state(create.clone())? {
            let result = cx
                .deadline
                .run("create", self.source.create(&cx.rc, &record))
                .await;
            match absorb_cancellation(result) {
                Ok(Step::Ready(())) => {}
                Ok(Step::Canceled(reason)) => return Ok(Step::Canceled(reason)),
                Err(e) if e.is_already_exists() => {
                    debug!(unit = %self.name, record = %record.key(), "Record already exists");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Step::Ready(()))
    }

    async fn apply_update_change(&self, cx: &PassContext, update: &State) -> Result<Step<()>> {
        for record in S::from_state(update.clone())? {
            let result = cx
                .deadline
                .run("update", self.source.update(&cx.rc, &record))
                .await;
            match absorb_cancellation(result) {
                Ok(Step::Ready(())) => {}
                Ok(Step::Canceled(reason)) => return Ok(Step::Canceled(reason)),
                // Removed concurrently; the next pass recreates it.
                Err(e) if e.is_not_found() => {
                    debug!(unit = %self.name, record = %record.key(), "Record to update is gone");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Step::Ready(()))
    }

    async fn apply_delete_change(&self, cx: &PassContext, delete: &State) -> Result<Step<()>> {
        for record in S::from_state(delete.clone())? {
            let result = cx
                .deadline
                .run("delete", self.source.delete(&cx.rc, &record))
                .await;
            match absorb_cancellation(result) {
                Ok(Step::Ready(())) => {}
                Ok(Step::Canceled(reason)) => return Ok(Step::Canceled(reason)),
                Err(e) if e.is_not_found() => {
                    debug!(unit = %self.name, record = %record.key(), "Record already deleted");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Step::Ready(()))
    }
}

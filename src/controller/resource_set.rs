//! Ordered pipeline of resource units for one version bundle.
//!
//! Units run strictly one after another: a unit's apply completes before the
//! next unit fetches. Later units depend on records created by earlier ones, so
//! on deletion the order is reversed. A canceled step stops the rest of the
//! pass without marking it failed.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::controller::context::PassContext;
use crate::controller::error::Result;
use crate::controller::outcome::{CancelReason, Step};
use crate::controller::unit::ResourceUnit;
use crate::controller::unit_state_machine::{UnitEvent, UnitRun};
use crate::state::diff::PatchSummary;

/// Changes applied by one unit in one pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitReport {
    pub unit: String,
    pub summary: PatchSummary,
}

/// How a pass over a resource set ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every unit reached Done.
    Completed { reports: Vec<UnitReport> },
    /// `unit` stopped the pass early; units after it did not run.
    Canceled {
        unit: String,
        reason: CancelReason,
        reports: Vec<UnitReport>,
    },
}

impl PassOutcome {
    pub fn is_canceled(&self) -> bool {
        matches!(self, PassOutcome::Canceled { .. })
    }

    pub fn reports(&self) -> &[UnitReport] {
        match self {
            PassOutcome::Completed { reports } | PassOutcome::Canceled { reports, .. } => reports,
        }
    }

    /// Sum of the changes of every unit that ran.
    pub fn total(&self) -> PatchSummary {
        let mut total = PatchSummary::default();
        for report in self.reports() {
            total += report.summary;
        }
        total
    }
}

impl fmt::Display for PassOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassOutcome::Completed { .. } => write!(f, "completed: {}", self.total()),
            PassOutcome::Canceled { unit, reason, .. } => {
                write!(f, "canceled by {}: {}", unit, reason)
            }
        }
    }
}

/// Ordered resource units scoped to one version.
pub struct ResourceSet {
    version: String,
    units: Vec<Arc<dyn ResourceUnit>>,
}

impl ResourceSet {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            units: Vec::new(),
        }
    }

    /// Append a unit. Units run in insertion order.
    pub fn with_unit(mut self, unit: Arc<dyn ResourceUnit>) -> Self {
        self.units.push(unit);
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn unit_names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name()).collect()
    }

    /// Run one pass over every unit.
    pub async fn run(&self, cx: &PassContext) -> Result<PassOutcome> {
        let teardown = cx.rc.deletion_requested;
        let ordered: Vec<&Arc<dyn ResourceUnit>> = if teardown {
            self.units.iter().rev().collect()
        } else {
            self.units.iter().collect()
        };

        let mut reports = Vec::with_capacity(ordered.len());
        for unit in ordered {
            let mut run = UnitRun::new(unit.name());
            match drive(unit.as_ref(), cx, &mut run).await {
                Ok(Step::Ready(summary)) => {
                    info!(
                        cluster_id = %cx.rc.cluster_id,
                        version = %self.version,
                        unit = %unit.name(),
                        "{}",
                        summary
                    );
                    reports.push(UnitReport {
                        unit: unit.name().to_string(),
                        summary,
                    });
                }
                Ok(Step::Canceled(reason)) => {
                    run.fire(UnitEvent::DependencyUnavailable);
                    debug!(
                        cluster_id = %cx.rc.cluster_id,
                        unit = %unit.name(),
                        reason = %reason,
                        "Pass canceled, remaining units deferred to next resync"
                    );
                    return Ok(PassOutcome::Canceled {
                        unit: unit.name().to_string(),
                        reason,
                        reports,
                    });
                }
                Err(e) => {
                    run.fire(UnitEvent::StepFailed);
                    error!(
                        cluster_id = %cx.rc.cluster_id,
                        unit = %unit.name(),
                        phase = %run.phase(),
                        error = %e,
                        "Unit failed"
                    );
                    return Err(e);
                }
            }
        }
        Ok(PassOutcome::Completed { reports })
    }
}

/// Extract the value of a ready step, returning early on cancellation.
macro_rules! ready {
    ($step:expr) => {
        match $step {
            Step::Ready(value) => value,
            Step::Canceled(reason) => return Ok(Step::Canceled(reason)),
        }
    };
}

/// Drive one unit through fetch, diff and apply.
async fn drive(
    unit: &dyn ResourceUnit,
    cx: &PassContext,
    run: &mut UnitRun<'_>,
) -> Result<Step<PatchSummary>> {
    run.fire(UnitEvent::PassStarted);
    let current = ready!(unit.get_current_state(cx).await?);
    run.fire(UnitEvent::CurrentFetched);

    let patch = if cx.rc.deletion_requested {
        // Teardown never consults desired state, so a context that no longer
        // renders cannot block removal.
        let desired = current.empty_like();
        run.fire(UnitEvent::DesiredFetched);
        unit.new_delete_patch(&current, &desired)?
    } else {
        let desired = ready!(unit.get_desired_state(cx).await?);
        run.fire(UnitEvent::DesiredFetched);
        unit.new_update_patch(&current, &desired)?
    };
    run.fire(UnitEvent::PatchComputed);

    ready!(unit.apply_create_change(cx, &patch.to_create).await?);
    ready!(unit.apply_update_change(cx, &patch.to_update).await?);
    ready!(unit.apply_delete_change(cx, &patch.to_delete).await?);
    run.fire(UnitEvent::ChangesApplied);

    Ok(Step::Ready(patch.summary()))
}

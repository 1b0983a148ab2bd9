//! Status management utilities.
//!
//! Maps the outcome of a pass onto the TenantCluster status. A canceled pass
//! is reported as `WaitingForDependency`, never as `Failed`.

use crate::controller::error::Error;
use crate::controller::resource_set::PassOutcome;
use crate::crd::{ClusterPhase, Condition, TenantClusterStatus};

/// Builder for managing conditions list
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
}

impl ConditionBuilder {
    /// Create a new condition builder
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Start from the conditions currently on the object.
    pub fn from_existing(conditions: &[Condition]) -> Self {
        Self {
            conditions: conditions.to_vec(),
        }
    }

    /// Add or update a condition.
    ///
    /// The transition time only moves when the status changes.
    pub fn set(&mut self, mut condition: Condition) -> &mut Self {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time.clone();
            }
            *existing = condition;
        } else {
            self.conditions.push(condition);
        }
        self
    }

    /// Set Ready condition
    pub fn ready(
        &mut self,
        ready: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> &mut Self {
        self.set(Condition::ready(ready, reason, message, generation))
    }

    /// Set Progressing condition
    pub fn progressing(
        &mut self,
        progressing: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> &mut Self {
        self.set(Condition::progressing(
            progressing,
            reason,
            message,
            generation,
        ))
    }

    /// Set Degraded condition
    pub fn degraded(
        &mut self,
        degraded: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> &mut Self {
        self.set(Condition::degraded(degraded, reason, message, generation))
    }

    /// Build the conditions list
    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

impl Default for ConditionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if a condition type is true
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .is_some_and(|c| c.status == "True")
}

/// Get the reason for a condition
pub fn get_condition_reason<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a str> {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .map(|c| c.reason.as_str())
}

/// Status after a pass that ran to completion or was canceled.
pub fn pass_status(
    outcome: &PassOutcome,
    deleting: bool,
    generation: Option<i64>,
    previous: &[Condition],
) -> TenantClusterStatus {
    let mut conditions = ConditionBuilder::from_existing(previous);
    let message = outcome.to_string();
    let phase = match outcome {
        PassOutcome::Canceled { .. } => {
            conditions
                .progressing(true, "WaitingForDependency", &message, generation)
                .degraded(false, "WaitingForDependency", &message, generation);
            if deleting {
                ClusterPhase::Deleting
            } else {
                conditions.ready(false, "WaitingForDependency", &message, generation);
                ClusterPhase::WaitingForDependency
            }
        }
        PassOutcome::Completed { .. } if deleting => {
            conditions
                .ready(false, "Deleting", &message, generation)
                .progressing(true, "Deleting", &message, generation);
            ClusterPhase::Deleting
        }
        PassOutcome::Completed { .. } if outcome.total().is_empty() => {
            conditions
                .ready(true, "InSync", &message, generation)
                .progressing(false, "InSync", &message, generation)
                .degraded(false, "InSync", &message, generation);
            ClusterPhase::Ready
        }
        PassOutcome::Completed { .. } => {
            conditions
                .ready(false, "ChangesApplied", &message, generation)
                .progressing(true, "ChangesApplied", &message, generation)
                .degraded(false, "ChangesApplied", &message, generation);
            ClusterPhase::Reconciling
        }
    };

    TenantClusterStatus {
        phase,
        observed_generation: generation,
        conditions: conditions.build(),
        last_pass: Some(message),
    }
}

/// Status after a pass failed with a fatal error.
pub fn failed_status(
    error: &Error,
    generation: Option<i64>,
    previous: &[Condition],
) -> TenantClusterStatus {
    let message = error.to_string();
    let mut conditions = ConditionBuilder::from_existing(previous);
    conditions
        .ready(false, "ReconciliationFailed", &message, generation)
        .progressing(false, "ReconciliationFailed", &message, generation)
        .degraded(true, "ReconciliationFailed", &message, generation);
    TenantClusterStatus {
        phase: ClusterPhase::Failed,
        observed_generation: generation,
        conditions: conditions.build(),
        last_pass: Some(format!("failed: {}", message)),
    }
}

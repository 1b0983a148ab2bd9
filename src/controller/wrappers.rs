//! Decorators applied to every resource unit.
//!
//! [`RetryWrapper`] retries failed fetch and apply steps with bounded backoff.
//! [`MetricsWrapper`] records duration and outcome of every operation. Neither
//! changes what the wrapped unit returns, apart from the retries themselves.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::controller::context::PassContext;
use crate::controller::error::Result;
use crate::controller::outcome::Step;
use crate::controller::retry::{RetryConfig, retry_with_backoff};
use crate::controller::unit::{ResourceUnit, StatePatch};
use crate::health::HealthState;
use crate::state::record::State;

/// Process name used as the `operator` metric label.
pub const OPERATOR_NAME: &str = env!("CARGO_PKG_NAME");

/// Retries fetch and apply steps that fail with a retryable error.
///
/// Canceled steps are returned as they are; they never count as failures.
pub struct RetryWrapper {
    inner: Arc<dyn ResourceUnit>,
    config: RetryConfig,
}

impl RetryWrapper {
    pub fn new(inner: Arc<dyn ResourceUnit>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    fn operation(&self, op: &str) -> String {
        format!("{}.{}", self.inner.name(), op)
    }
}

#[async_trait]
impl ResourceUnit for RetryWrapper {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get_current_state(&self, cx: &PassContext) -> Result<Step<State>> {
        retry_with_backoff(&self.config, &self.operation("get_current_state"), || {
            self.inner.get_current_state(cx)
        })
        .await
    }

    async fn get_desired_state(&self, cx: &PassContext) -> Result<Step<State>> {
        retry_with_backoff(&self.config, &self.operation("get_desired_state"), || {
            self.inner.get_desired_state(cx)
        })
        .await
    }

    fn new_update_patch(&self, current: &State, desired: &State) -> Result<StatePatch> {
        self.inner.new_update_patch(current, desired)
    }

    fn new_delete_patch(&self, current: &State, desired: &State) -> Result<StatePatch> {
        self.inner.new_delete_patch(current, desired)
    }

    async fn apply_create_change(&self, cx: &PassContext, create: &State) -> Result<Step<()>> {
        retry_with_backoff(&self.config, &self.operation("apply_create_change"), || {
            self.inner.apply_create_change(cx, create)
        })
        .await
    }

    async fn apply_update_change(&self, cx: &PassContext, update: &State) -> Result<Step<()>> {
        retry_with_backoff(&self.config, &self.operation("apply_update_change"), || {
            self.inner.apply_update_change(cx, update)
        })
        .await
    }

    async fn apply_delete_change(&self, cx: &PassContext, delete: &State) -> Result<Step<()>> {
        retry_with_backoff(&self.config, &self.operation("apply_delete_change"), || {
            self.inner.apply_delete_change(cx, delete)
        })
        .await
    }
}

/// Records duration and outcome of every operation of the wrapped unit.
pub struct MetricsWrapper {
    inner: Arc<dyn ResourceUnit>,
    health: Arc<HealthState>,
}

impl MetricsWrapper {
    pub fn new(inner: Arc<dyn ResourceUnit>, health: Arc<HealthState>) -> Self {
        Self { inner, health }
    }

    fn observe(&self, operation: &str, started: Instant, outcome: &str) {
        self.health.metrics.record_unit(
            OPERATOR_NAME,
            self.inner.name(),
            operation,
            outcome,
            started.elapsed().as_secs_f64(),
        );
    }

    fn observe_step<T>(&self, operation: &str, started: Instant, result: &Result<Step<T>>) {
        let outcome = match result {
            Ok(Step::Ready(_)) => "success",
            Ok(Step::Canceled(_)) => "canceled",
            Err(_) => "failure",
        };
        self.observe(operation, started, outcome);
    }

    fn observe_patch(&self, operation: &str, started: Instant, result: &Result<StatePatch>) {
        let outcome = if result.is_ok() { "success" } else { "failure" };
        self.observe(operation, started, outcome);
    }
}

#[async_trait]
impl ResourceUnit for MetricsWrapper {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get_current_state(&self, cx: &PassContext) -> Result<Step<State>> {
        let started = Instant::now();
        let result = self.inner.get_current_state(cx).await;
        self.observe_step("get_current_state", started, &result);
        result
    }

    async fn get_desired_state(&self, cx: &PassContext) -> Result<Step<State>> {
        let started = Instant::now();
        let result = self.inner.get_desired_state(cx).await;
        self.observe_step("get_desired_state", started, &result);
        result
    }

    fn new_update_patch(&self, current: &State, desired: &State) -> Result<StatePatch> {
        let started = Instant::now();
        let result = self.inner.new_update_patch(current, desired);
        self.observe_patch("new_update_patch", started, &result);
        result
    }

    fn new_delete_patch(&self, current: &State, desired: &State) -> Result<StatePatch> {
        let started = Instant::now();
        let result = self.inner.new_delete_patch(current, desired);
        self.observe_patch("new_delete_patch", started, &result);
        result
    }

    async fn apply_create_change(&self, cx: &PassContext, create: &State) -> Result<Step<()>> {
        let started = Instant::now();
        let result = self.inner.apply_create_change(cx, create).await;
        self.observe_step("apply_create_change", started, &result);
        result
    }

    async fn apply_update_change(&self, cx: &PassContext, update: &State) -> Result<Step<()>> {
        let started = Instant::now();
        let result = self.inner.apply_update_change(cx, update).await;
        self.observe_step("apply_update_change", started, &result);
        result
    }

    async fn apply_delete_change(&self, cx: &PassContext, delete: &State) -> Result<Step<()>> {
        let started = Instant::now();
        let result = self.inner.apply_delete_change(cx, delete).await;
        self.observe_step("apply_delete_change", started, &result);
        result
    }
}

/// Apply the standard decorators: metrics outside, retries inside.
pub fn wrap(
    unit: Arc<dyn ResourceUnit>,
    retry: &RetryConfig,
    health: Option<&Arc<HealthState>>,
) -> Arc<dyn ResourceUnit> {
    let retried: Arc<dyn ResourceUnit> = Arc::new(RetryWrapper::new(unit, retry.clone()));
    match health {
        Some(health) => Arc::new(MetricsWrapper::new(retried, health.clone())),
        None => retried,
    }
}

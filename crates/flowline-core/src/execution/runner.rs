//! Step runner: dispatch, validation, timing and per-attempt logging.
//!
//! The runner is the single entry point workers use to execute a step. It
//! dispatches on the step's action discriminant, runs `validate` before
//! `execute`, measures duration around `execute` only, and records one
//! execution-log entry per attempt through a detached task -- a log-write
//! failure can never fail a step.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use flowline_types::execution::{ExecutionLogEntry, StepResult};
use flowline_types::step::{Step, StepAction};
use uuid::Uuid;

use super::context::StepContext;
use super::executors::{
    ApiCallExecutor, ConditionExecutor, CustomExecutor, StepExecutor, TransformExecutor,
};
use super::retry::is_transient;
use crate::http::{ApiDispatcher, ConnectionResolver};
use crate::repository::log::ExecutionLogSink;

/// Dispatches steps to the executor matching their action discriminant.
pub struct StepRunner<S: ExecutionLogSink + 'static> {
    custom: CustomExecutor,
    transform: TransformExecutor,
    condition: ConditionExecutor,
    api_call: ApiCallExecutor,
    log_sink: Arc<S>,
    step_retry_limit: u32,
}

impl<S: ExecutionLogSink + 'static> StepRunner<S> {
    /// Create a runner wired to a log sink and the API-call ports.
    pub fn new(
        log_sink: Arc<S>,
        resolver: Arc<dyn ConnectionResolver>,
        dispatcher: Arc<dyn ApiDispatcher>,
    ) -> Self {
        Self {
            custom: CustomExecutor,
            transform: TransformExecutor,
            condition: ConditionExecutor,
            api_call: ApiCallExecutor::new(resolver, dispatcher),
            log_sink,
            step_retry_limit: flowline_types::config::CoreConfig::default().step_retry_limit,
        }
    }

    /// Override the ceiling on per-step in-invocation retry attempts.
    pub fn with_step_retry_limit(mut self, limit: u32) -> Self {
        self.step_retry_limit = limit.max(1);
        self
    }

    /// Execute one step against the given context.
    ///
    /// Never errors: validation failures and executor failures both come
    /// back as a failed `StepResult`. When the step carries a retry config,
    /// transiently failing attempts are re-executed up to the configured
    /// ceiling, with every attempt logged and the count reported in
    /// `retry_count`.
    pub async fn execute_step(&self, step: &Step, ctx: &StepContext) -> StepResult {
        let kind = step.action.kind();

        if !self.validate(step) {
            let result = StepResult::failed(format!("Invalid step configuration for {kind}"), 0);
            self.record_attempt(step, ctx, 1, &result);
            tracing::debug!(
                execution_id = %ctx.execution_id,
                step_id = step.id.as_str(),
                kind = %kind,
                "step rejected by validation"
            );
            return result;
        }

        let max_attempts = step
            .retry
            .map(|retry| retry.max_attempts)
            .unwrap_or(1)
            .clamp(1, self.step_retry_limit);

        let mut attempt = 1u32;
        loop {
            let started = Instant::now();
            let mut result = self.dispatch(step, ctx).await;
            result.duration_ms = started.elapsed().as_millis() as u64;
            result.retry_count = attempt - 1;

            self.record_attempt(step, ctx, attempt, &result);

            if result.success {
                return result;
            }

            let transient = result.error.as_deref().map(is_transient).unwrap_or(false);
            if !transient || attempt >= max_attempts {
                tracing::debug!(
                    execution_id = %ctx.execution_id,
                    step_id = step.id.as_str(),
                    attempt,
                    error = result.error.as_deref().unwrap_or("<none>"),
                    "step failed"
                );
                return result;
            }

            attempt += 1;
            tracing::debug!(
                execution_id = %ctx.execution_id,
                step_id = step.id.as_str(),
                attempt,
                "re-executing step after transient failure"
            );
        }
    }

    fn validate(&self, step: &Step) -> bool {
        match &step.action {
            StepAction::Custom(_) => self.custom.validate(step),
            StepAction::Transform(_) => self.transform.validate(step),
            StepAction::Condition(_) => self.condition.validate(step),
            StepAction::ApiCall(_) => self.api_call.validate(step),
        }
    }

    async fn dispatch(&self, step: &Step, ctx: &StepContext) -> StepResult {
        match &step.action {
            StepAction::Custom(_) => self.custom.execute(step, ctx).await,
            StepAction::Transform(_) => self.transform.execute(step, ctx).await,
            StepAction::Condition(_) => self.condition.execute(step, ctx).await,
            StepAction::ApiCall(_) => self.api_call.execute(step, ctx).await,
        }
    }

    /// Emit one log entry for an attempt, fire-and-forget.
    fn record_attempt(&self, step: &Step, ctx: &StepContext, attempt: u32, result: &StepResult) {
        let entry = ExecutionLogEntry {
            id: Uuid::now_v7(),
            execution_id: ctx.execution_id,
            step_id: step.id.clone(),
            step_name: step.name.clone(),
            attempt,
            success: result.success,
            output: (!result.data.is_null()).then(|| result.data.clone()),
            error: result.error.clone(),
            duration_ms: result.duration_ms,
            created_at: Utc::now(),
        };

        let sink = Arc::clone(&self.log_sink);
        tokio::spawn(async move {
            if let Err(err) = sink.record(&entry).await {
                tracing::warn!(
                    execution_id = %entry.execution_id,
                    step_id = entry.step_id.as_str(),
                    error = %err,
                    "execution log write failed"
                );
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

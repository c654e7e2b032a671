//! Step executors: one strategy per `StepAction` variant.
//!
//! Every executor implements the same two-phase contract:
//! - `validate` -- a cheap structural check, returning `false` rather than
//!   erroring; the runner turns `false` into the fixed
//!   `"Invalid step configuration for <TYPE>"` failure without executing.
//! - `execute` -- performs the unit of work and always returns a
//!   `StepResult`; no error escapes the call, every internal failure is
//!   folded into `StepResult::failed`.
//!
//! Dispatch happens in the runner as a match on the action discriminant, so
//! a step can never reach more than one executor.

pub mod api_call;
pub mod condition;
pub mod custom;
pub mod transform;

use flowline_types::execution::StepResult;
use flowline_types::step::Step;

use super::context::StepContext;

pub use api_call::ApiCallExecutor;
pub use condition::ConditionExecutor;
pub use custom::CustomExecutor;
pub use transform::TransformExecutor;

/// Uniform executor contract.
pub trait StepExecutor: Send + Sync {
    /// Cheap structural check performed before execution is attempted.
    /// Returning `false` is a configuration error, not a runtime failure.
    fn validate(&self, step: &Step) -> bool;

    /// Perform the unit of work. Must not let errors escape.
    fn execute(
        &self,
        step: &Step,
        ctx: &StepContext,
    ) -> impl std::future::Future<Output = StepResult> + Send;
}

/// Failure returned when an executor receives a step of the wrong variant.
/// Unreachable through the runner, which dispatches on the discriminant.
pub(crate) fn wrong_variant(expected: &str) -> StepResult {
    StepResult::failed(
        format!("INTERNAL_ERROR: step dispatched to {expected} executor with mismatched action"),
        0,
    )
}

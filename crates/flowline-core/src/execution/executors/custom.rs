//! Custom step executor: ad hoc actions interpreted by name.
//!
//! Deliberately permissive -- this is the fallback for ad hoc steps, so an
//! unrecognized action name succeeds with a generic payload. Only thrown
//! internal errors (e.g. a `wait` without a usable duration) fail.

use std::time::Duration;

use flowline_types::execution::StepResult;
use flowline_types::step::{Step, StepAction};
use serde_json::json;

use super::super::context::StepContext;
use super::{StepExecutor, wrong_variant};

/// Executor for `StepAction::Custom`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CustomExecutor;

impl StepExecutor for CustomExecutor {
    fn validate(&self, step: &Step) -> bool {
        match &step.action {
            StepAction::Custom(custom) => !custom.action.trim().is_empty(),
            _ => false,
        }
    }

    async fn execute(&self, step: &Step, ctx: &StepContext) -> StepResult {
        let StepAction::Custom(custom) = &step.action else {
            return wrong_variant("custom");
        };

        match custom.action.as_str() {
            "noop" => StepResult::succeeded(json!({ "action": "noop" }), 0),

            "wait" => {
                let Some(duration_ms) = custom.params.get("duration_ms").and_then(|v| v.as_u64())
                else {
                    return StepResult::failed(
                        "INVALID_CONFIGURATION: wait requires a numeric 'duration_ms'",
                        0,
                    );
                };
                tokio::time::sleep(Duration::from_millis(duration_ms)).await;
                StepResult::succeeded(
                    json!({ "action": "wait", "waited_ms": duration_ms }),
                    0,
                )
            }

            "log" => {
                let message = custom
                    .params
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|m| ctx.resolve_template(m))
                    .unwrap_or_default();
                tracing::info!(
                    execution_id = %ctx.execution_id,
                    step_id = step.id.as_str(),
                    message = message.as_str(),
                    "log step"
                );
                StepResult::succeeded(json!({ "action": "log", "message": message }), 0)
            }

            other => {
                tracing::debug!(
                    step_id = step.id.as_str(),
                    action = other,
                    "unrecognized custom action treated as no-op"
                );
                StepResult::succeeded(
                    json!({ "action": other, "handled": false }),
                    0,
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

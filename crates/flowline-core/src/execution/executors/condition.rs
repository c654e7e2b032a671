//! Condition step executor.
//!
//! Evaluates a single field/operator/value predicate against the execution
//! context and reports which branch the caller should take. It never
//! branches control flow itself -- the worker owns step sequencing.

use flowline_types::execution::StepResult;
use flowline_types::step::{ConditionOperator, Step, StepAction};
use serde_json::{Value, json};

use super::super::context::StepContext;
use super::{StepExecutor, wrong_variant};

/// Executor for `StepAction::Condition`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionExecutor;

impl StepExecutor for ConditionExecutor {
    fn validate(&self, step: &Step) -> bool {
        match &step.action {
            StepAction::Condition(cond) => !cond.condition.field.trim().is_empty(),
            _ => false,
        }
    }

    async fn execute(&self, step: &Step, ctx: &StepContext) -> StepResult {
        let StepAction::Condition(config) = &step.action else {
            return wrong_variant("condition");
        };

        let actual = ctx.lookup_path(&config.condition.field);
        let verdict = compare(
            config.condition.operator,
            actual.as_ref(),
            &config.condition.value,
        );

        let next_step = if verdict {
            config.true_step.as_deref()
        } else {
            config.false_step.as_deref()
        };

        tracing::debug!(
            execution_id = %ctx.execution_id,
            step_id = step.id.as_str(),
            field = config.condition.field.as_str(),
            verdict,
            next_step = next_step.unwrap_or("<none>"),
            "condition evaluated"
        );

        StepResult::succeeded(
            json!({ "condition": verdict, "next_step": next_step }),
            0,
        )
    }
}

/// Apply a comparison operator to an (optionally missing) actual value.
///
/// Shared with the transform executor's `filter` operation, where the actual
/// value comes from each input item instead of the execution context.
pub(crate) fn compare(
    operator: ConditionOperator,
    actual: Option<&Value>,
    expected: &Value,
) -> bool {
    match operator {
        ConditionOperator::Equals => actual == Some(expected),
        ConditionOperator::NotEquals => actual != Some(expected),
        ConditionOperator::GreaterThan => numeric_pair(actual, expected)
            .map(|(a, b)| a > b)
            .unwrap_or(false),
        ConditionOperator::LessThan => numeric_pair(actual, expected)
            .map(|(a, b)| a < b)
            .unwrap_or(false),
        ConditionOperator::Contains => match actual {
            Some(Value::String(s)) => expected.as_str().is_some_and(|needle| s.contains(needle)),
            Some(Value::Array(items)) => items.contains(expected),
            _ => false,
        },
        ConditionOperator::Exists => matches!(actual, Some(v) if !v.is_null()),
    }
}

fn numeric_pair(actual: Option<&Value>, expected: &Value) -> Option<(f64, f64)> {
    Some((actual?.as_f64()?, expected.as_f64()?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_types::step::{Condition, ConditionStep};
    use uuid::Uuid;

    fn condition_step(field: &str, operator: ConditionOperator, value: Value) -> Step {
        Step {
            id: "gate".to_string(),
            name: "Gate".to_string(),
            action: StepAction::Condition(ConditionStep {
                condition: Condition {
                    field: field.to_string(),
                    operator,
                    value,
                },
                true_step: Some("on-true".to_string()),
                false_step: Some("on-false".to_string()),
            }),
            step_order: None,
            retry: None,
        }
    }

    fn ctx() -> StepContext {
        let mut ctx = StepContext::new(Uuid::now_v7(), Uuid::now_v7(), "user-1");
        ctx.parameters.insert("count".to_string(), json!(7));
        ctx.parameters.insert("region".to_string(), json!("eu"));
        ctx
    }

    #[test]
    fn test_validate_requires_field() {
        let executor = ConditionExecutor;
        assert!(executor.validate(&condition_step(
            "param.region",
            ConditionOperator::Equals,
            json!("eu")
        )));
        assert!(!executor.validate(&condition_step("", ConditionOperator::Equals, json!("eu"))));
    }

    #[tokio::test]
    async fn test_true_branch_reported() {
        let step = condition_step("param.region", ConditionOperator::Equals, json!("eu"));
        let result = ConditionExecutor.execute(&step, &ctx()).await;
        assert!(result.success);
        assert_eq!(result.data["condition"], true);
        assert_eq!(result.data["next_step"], "on-true");
    }

    #[tokio::test]
    async fn test_false_branch_reported() {
        let step = condition_step("param.region", ConditionOperator::Equals, json!("us"));
        let result = ConditionExecutor.execute(&step, &ctx()).await;
        assert!(result.success);
        assert_eq!(result.data["condition"], false);
        assert_eq!(result.data["next_step"], "on-false");
    }

    #[tokio::test]
    async fn test_missing_field_fails_condition_not_step() {
        let step = condition_step("param.absent", ConditionOperator::Equals, json!("x"));
        let result = ConditionExecutor.execute(&step, &ctx()).await;
        // The step itself succeeds; the verdict is false.
        assert!(result.success);
        assert_eq!(result.data["condition"], false);
    }

    #[test]
    fn test_compare_operators() {
        assert!(compare(
            ConditionOperator::GreaterThan,
            Some(&json!(7)),
            &json!(5)
        ));
        assert!(compare(
            ConditionOperator::LessThan,
            Some(&json!(3)),
            &json!(5)
        ));
        assert!(compare(
            ConditionOperator::NotEquals,
            Some(&json!("a")),
            &json!("b")
        ));
        assert!(compare(ConditionOperator::NotEquals, None, &json!("b")));
        assert!(compare(
            ConditionOperator::Contains,
            Some(&json!("hello world")),
            &json!("world")
        ));
        assert!(compare(
            ConditionOperator::Contains,
            Some(&json!([1, 2, 3])),
            &json!(2)
        ));
        assert!(compare(ConditionOperator::Exists, Some(&json!(0)), &json!(null)));
        assert!(!compare(ConditionOperator::Exists, Some(&json!(null)), &json!(null)));
        assert!(!compare(ConditionOperator::Exists, None, &json!(null)));
        // Non-numeric comparison is false, not an error.
        assert!(!compare(
            ConditionOperator::GreaterThan,
            Some(&json!("high")),
            &json!(1)
        ));
    }
}

//! Data-transform step executor: `map`, `filter` and `aggregate` over an
//! input collection.
//!
//! The input is either an inline JSON array or a template string resolved
//! against the execution context (typically `"{{ steps.<id>.data }}"`).
//! Unsupported operations and aggregate functions are reported failures,
//! never panics.

use flowline_types::execution::StepResult;
use flowline_types::step::{Condition, Step, StepAction, TransformOp, TransformStep};
use serde_json::{Map, Value, json};

use super::super::context::{StepContext, descend, interpolate, sole_placeholder};
use super::condition::compare;
use super::{StepExecutor, wrong_variant};

/// Executor for `StepAction::Transform`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransformExecutor;

impl StepExecutor for TransformExecutor {
    fn validate(&self, step: &Step) -> bool {
        match &step.action {
            StepAction::Transform(transform) => {
                let input_ok = matches!(transform.input, Value::Array(_) | Value::String(_));
                let op_ok = match &transform.operation {
                    TransformOp::Aggregate { field, .. } => !field.trim().is_empty(),
                    _ => true,
                };
                input_ok && op_ok
            }
            _ => false,
        }
    }

    async fn execute(&self, step: &Step, ctx: &StepContext) -> StepResult {
        let StepAction::Transform(transform) = &step.action else {
            return wrong_variant("transform");
        };

        let items = match resolve_input(transform, ctx) {
            Ok(items) => items,
            Err(message) => return StepResult::failed(message, 0),
        };

        match &transform.operation {
            TransformOp::Map { output } => {
                let mapped: Vec<Value> = items.iter().map(|item| project(output, item)).collect();
                StepResult::succeeded(Value::Array(mapped), 0)
            }

            TransformOp::Filter { condition } => {
                let retained: Vec<Value> = items
                    .into_iter()
                    .filter(|item| item_matches(item, condition))
                    .collect();
                StepResult::succeeded(Value::Array(retained), 0)
            }

            TransformOp::Aggregate { field, function } => aggregate(&items, field, function),

            TransformOp::Unsupported => {
                StepResult::failed("TRANSFORM_ERROR: unsupported transform operation", 0)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Input resolution
// ---------------------------------------------------------------------------

fn resolve_input(transform: &TransformStep, ctx: &StepContext) -> Result<Vec<Value>, String> {
    let resolved = match &transform.input {
        Value::String(template) => ctx.resolve_template_value(template),
        other => other.clone(),
    };

    match resolved {
        Value::Array(items) => Ok(items),
        other => Err(format!(
            "TRANSFORM_ERROR: input did not resolve to an array (got {})",
            type_name(&other)
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

/// Project one input item through the output template. String template
/// values may reference item fields via `{{field}}` placeholders; unmatched
/// placeholders degrade to their literal form. Non-string template values
/// pass through unchanged.
fn project(output: &Map<String, Value>, item: &Value) -> Value {
    let mut projected = Map::with_capacity(output.len());
    for (key, template) in output {
        projected.insert(key.clone(), render(template, item));
    }
    Value::Object(projected)
}

fn render(template: &Value, item: &Value) -> Value {
    let Value::String(text) = template else {
        return template.clone();
    };

    // A sole placeholder keeps the referenced value's JSON shape.
    if let Some(path) = sole_placeholder(text)
        && let Some(value) = lookup_item(item, path)
    {
        return value;
    }

    Value::String(interpolate(text, |path| lookup_item(item, path)))
}

/// Dotted-path lookup relative to one input item.
fn lookup_item(item: &Value, path: &str) -> Option<Value> {
    let segments: Vec<&str> = path.split('.').collect();
    descend(item, &segments)
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

fn item_matches(item: &Value, condition: &Condition) -> bool {
    let actual = lookup_item(item, &condition.field);
    compare(condition.operator, actual.as_ref(), &condition.value)
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

fn aggregate(items: &[Value], field: &str, function: &str) -> StepResult {
    let numbers: Vec<f64> = items
        .iter()
        .filter_map(|item| lookup_item(item, field)?.as_f64())
        .collect();

    let value = match function {
        "sum" => number_value(numbers.iter().sum()),
        "avg" => {
            if numbers.is_empty() {
                json!(0)
            } else {
                number_value(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        "min" => numbers
            .iter()
            .copied()
            .fold(None, |acc: Option<f64>, n| {
                Some(acc.map_or(n, |a| a.min(n)))
            })
            .map(number_value)
            .unwrap_or(Value::Null),
        "max" => numbers
            .iter()
            .copied()
            .fold(None, |acc: Option<f64>, n| {
                Some(acc.map_or(n, |a| a.max(n)))
            })
            .map(number_value)
            .unwrap_or(Value::Null),
        "count" => json!(items.len()),
        other => {
            return StepResult::failed(
                format!("TRANSFORM_ERROR: unsupported aggregate function '{other}'"),
                0,
            );
        }
    };

    StepResult::succeeded(value, 0)
}

/// Emit integral results as JSON integers (`60`, not `60.0`).
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_types::step::ConditionOperator;
    use uuid::Uuid;

    fn transform_step(input: Value, operation: TransformOp) -> Step {
        Step {
            id: "shape".to_string(),
            name: "Shape".to_string(),
            action: StepAction::Transform(TransformStep { input, operation }),
            step_order: None,
            retry: None,
        }
    }

    fn ctx() -> StepContext {
        StepContext::new(Uuid::now_v7(), Uuid::now_v7(), "user-1")
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_validate_rejects_non_collection_input() {
        let executor = TransformExecutor;
        let step = transform_step(
            json!({ "not": "an array" }),
            TransformOp::Aggregate {
                field: "value".to_string(),
                function: "sum".to_string(),
            },
        );
        assert!(!executor.validate(&step));

        let step = transform_step(
            json!([]),
            TransformOp::Aggregate {
                field: "".to_string(),
                function: "sum".to_string(),
            },
        );
        assert!(!executor.validate(&step));
    }

    // -----------------------------------------------------------------------
    // Map
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_map_projects_fields() {
        let output: Map<String, Value> = json!({ "name": "{{first}}", "kind": "person" })
            .as_object()
            .cloned()
            .unwrap();
        let step = transform_step(
            json!([{ "first": "Ada" }, { "first": "Edsger" }]),
            TransformOp::Map { output },
        );

        let result = TransformExecutor.execute(&step, &ctx()).await;
        assert!(result.success);
        assert_eq!(
            result.data,
            json!([
                { "name": "Ada", "kind": "person" },
                { "name": "Edsger", "kind": "person" }
            ])
        );
    }

    #[tokio::test]
    async fn test_map_unmatched_placeholder_degrades_to_literal() {
        let output: Map<String, Value> = json!({ "name": "{{missing}}" })
            .as_object()
            .cloned()
            .unwrap();
        let step = transform_step(json!([{ "first": "Ada" }]), TransformOp::Map { output });

        let result = TransformExecutor.execute(&step, &ctx()).await;
        assert!(result.success);
        assert_eq!(result.data, json!([{ "name": "{{missing}}" }]));
    }

    #[tokio::test]
    async fn test_map_sole_placeholder_keeps_value_shape() {
        let output: Map<String, Value> = json!({ "tags": "{{labels}}" })
            .as_object()
            .cloned()
            .unwrap();
        let step = transform_step(
            json!([{ "labels": ["a", "b"] }]),
            TransformOp::Map { output },
        );

        let result = TransformExecutor.execute(&step, &ctx()).await;
        assert_eq!(result.data, json!([{ "tags": ["a", "b"] }]));
    }

    // -----------------------------------------------------------------------
    // Filter
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_filter_equals_retains_matching_items() {
        let step = transform_step(
            json!([
                { "id": 1, "active": true },
                { "id": 2, "active": false }
            ]),
            TransformOp::Filter {
                condition: Condition {
                    field: "active".to_string(),
                    operator: ConditionOperator::Equals,
                    value: json!(true),
                },
            },
        );

        let result = TransformExecutor.execute(&step, &ctx()).await;
        assert!(result.success);
        assert_eq!(result.data, json!([{ "id": 1, "active": true }]));
    }

    #[tokio::test]
    async fn test_filter_greater_than() {
        let step = transform_step(
            json!([{ "v": 1 }, { "v": 10 }, { "v": 5 }]),
            TransformOp::Filter {
                condition: Condition {
                    field: "v".to_string(),
                    operator: ConditionOperator::GreaterThan,
                    value: json!(4),
                },
            },
        );

        let result = TransformExecutor.execute(&step, &ctx()).await;
        assert_eq!(result.data, json!([{ "v": 10 }, { "v": 5 }]));
    }

    // -----------------------------------------------------------------------
    // Aggregate
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_aggregate_sum() {
        let step = transform_step(
            json!([{ "value": 10 }, { "value": 20 }, { "value": 30 }]),
            TransformOp::Aggregate {
                field: "value".to_string(),
                function: "sum".to_string(),
            },
        );

        let result = TransformExecutor.execute(&step, &ctx()).await;
        assert!(result.success);
        assert_eq!(result.data, json!(60));
    }

    #[tokio::test]
    async fn test_aggregate_avg_min_max_count() {
        let input = json!([{ "v": 2 }, { "v": 4 }, { "v": 9 }]);
        let cases = [("avg", json!(5)), ("min", json!(2)), ("max", json!(9)), ("count", json!(3))];

        for (function, expected) in cases {
            let step = transform_step(
                input.clone(),
                TransformOp::Aggregate {
                    field: "v".to_string(),
                    function: function.to_string(),
                },
            );
            let result = TransformExecutor.execute(&step, &ctx()).await;
            assert!(result.success, "{function} failed: {:?}", result.error);
            assert_eq!(result.data, expected, "{function}");
        }
    }

    #[tokio::test]
    async fn test_aggregate_unknown_function_is_reported_failure() {
        let step = transform_step(
            json!([{ "v": 1 }]),
            TransformOp::Aggregate {
                field: "v".to_string(),
                function: "median".to_string(),
            },
        );

        let result = TransformExecutor.execute(&step, &ctx()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("median"));
    }

    // -----------------------------------------------------------------------
    // Input resolution / unsupported
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_input_template_resolves_from_context() {
        let mut ctx = ctx();
        ctx.record_step_result(
            "fetch",
            flowline_types::execution::StepResult::succeeded(json!([{ "value": 7 }]), 1),
        );

        let step = transform_step(
            json!("{{ steps.fetch.data }}"),
            TransformOp::Aggregate {
                field: "value".to_string(),
                function: "sum".to_string(),
            },
        );

        let result = TransformExecutor.execute(&step, &ctx).await;
        assert!(result.success);
        assert_eq!(result.data, json!(7));
    }

    #[tokio::test]
    async fn test_non_array_input_is_reported_failure() {
        let step = transform_step(
            json!("{{ param.absent }}"),
            TransformOp::Aggregate {
                field: "v".to_string(),
                function: "sum".to_string(),
            },
        );

        let result = TransformExecutor.execute(&step, &ctx()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("TRANSFORM_ERROR"));
    }

    #[tokio::test]
    async fn test_unsupported_operation_is_reported_failure() {
        let step = transform_step(json!([]), TransformOp::Unsupported);
        let result = TransformExecutor.execute(&step, &ctx()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unsupported transform operation"));
    }
}

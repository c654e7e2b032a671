//! Step domain types for Flowline.
//!
//! A `Step` is one unit of work inside an execution, supplied by the
//! out-of-scope workflow definition layer and read-only to this core. The
//! kind of work is an explicit discriminant (`StepAction`, internally tagged
//! by `type`) rather than a structural guess, so a step can never match more
//! than one executor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A single step within a workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// User-defined step ID, unique within a workflow.
    pub id: String,
    /// Human-readable step name.
    pub name: String,
    /// What the step does, tagged by `type`.
    #[serde(flatten)]
    pub action: StepAction,
    /// Position within the workflow, when the definition layer supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_order: Option<u32>,
    /// Bounded in-invocation retry configuration for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<StepRetry>,
}

/// In-invocation retry configuration: how many times the runner may
/// re-execute this step on a transient failure before reporting it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepRetry {
    /// Maximum attempts within one invocation (default 1 = no retry).
    #[serde(default = "default_step_attempts")]
    pub max_attempts: u32,
}

fn default_step_attempts() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// StepAction
// ---------------------------------------------------------------------------

/// The kind of work a step performs.
///
/// Internally tagged by `type`:
/// ```json
/// { "id": "notify", "name": "Notify", "type": "api_call", "connection_id": "..." }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    /// Ad hoc action interpreted by name (`noop`, `wait`, `log`, ...).
    Custom(CustomStep),
    /// Collection transform (`map`, `filter`, `aggregate`).
    Transform(TransformStep),
    /// Condition evaluation reporting which branch the caller should take.
    Condition(ConditionStep),
    /// Outbound HTTP request against a configured connection.
    ApiCall(ApiCallStep),
}

impl StepAction {
    /// The coarse kind of this action, for dispatch and error messages.
    pub fn kind(&self) -> StepKind {
        match self {
            StepAction::Custom(_) => StepKind::Custom,
            StepAction::Transform(_) => StepKind::Transform,
            StepAction::Condition(_) => StepKind::Condition,
            StepAction::ApiCall(_) => StepKind::ApiCall,
        }
    }
}

/// Coarse step kind, used in log fields and fixed-shape error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Custom,
    Transform,
    Condition,
    ApiCall,
}

impl StepKind {
    /// Canonical uppercase name, as used in
    /// `"Invalid step configuration for <TYPE>"` messages.
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Custom => "CUSTOM",
            StepKind::Transform => "TRANSFORM",
            StepKind::Condition => "CONDITION",
            StepKind::ApiCall => "API_CALL",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Custom steps
// ---------------------------------------------------------------------------

/// Configuration for a custom step. The action is interpreted by name; the
/// executor is deliberately permissive and succeeds on unknown names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomStep {
    /// Action name (`noop`, `wait`, `log`, or anything else).
    pub action: String,
    /// Action parameters (e.g. `duration_ms` for `wait`, `message` for `log`).
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Transform steps
// ---------------------------------------------------------------------------

/// Configuration for a data-transform step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformStep {
    /// Input collection: an inline JSON array, or a string template resolved
    /// against the execution context (e.g. `"{{ steps.fetch.data }}"`).
    pub input: Value,
    /// Which transform to apply, tagged by `operation`.
    #[serde(flatten)]
    pub operation: TransformOp,
}

/// The transform operation and its operation-specific configuration.
///
/// An unrecognized `operation` value deserializes into `Unsupported` so that
/// it surfaces as a reported step failure instead of a parse error in the
/// out-of-scope definition layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum TransformOp {
    /// Project every input item through an output template. Each template
    /// value may contain `{{field}}` placeholders resolved against the item;
    /// unmatched placeholders degrade to their literal form.
    Map { output: serde_json::Map<String, Value> },
    /// Retain items matching a single condition.
    Filter { condition: Condition },
    /// Reduce a numeric field across all items. `sum` is always available;
    /// `avg`, `min`, `max` and `count` are extensions. Unknown function
    /// names are reported failures.
    Aggregate { field: String, function: String },
    /// Any operation name this core does not implement.
    #[serde(other)]
    Unsupported,
}

// ---------------------------------------------------------------------------
// Condition steps
// ---------------------------------------------------------------------------

/// Configuration for a condition step. The executor evaluates the condition
/// against the execution context and reports the branch verdict; it does not
/// branch control flow itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionStep {
    /// The condition to evaluate.
    pub condition: Condition,
    /// Step the caller should take when the condition holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_step: Option<String>,
    /// Step the caller should take when the condition does not hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_step: Option<String>,
}

/// A single field/operator/value predicate.
///
/// `field` is a dotted path into the evaluation scope: `param.region` reads
/// an execution parameter, `steps.fetch.data` reads a prior step result,
/// `vars.cursor` reads a global variable. In transform filters the path is
/// relative to each input item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

/// Supported comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    Exists,
}

// ---------------------------------------------------------------------------
// API-call steps
// ---------------------------------------------------------------------------

/// Configuration for an outbound API call.
///
/// `connection_id`, `method` and `path` are optional at the type level so a
/// structurally incomplete step can be rejected by `validate` with the fixed
/// configuration-error shape instead of failing to parse upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallStep {
    /// Connection to resolve credentials and base URL from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<Uuid>,
    /// HTTP method (`GET`, `POST`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Request path, joined onto the connection's base URL. May contain
    /// `{{...}}` placeholders resolved against the execution context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Additional request headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<std::collections::HashMap<String, String>>,
    /// Query parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<std::collections::HashMap<String, String>>,
    /// JSON request body. String values may contain `{{...}}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

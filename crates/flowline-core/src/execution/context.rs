//! Step execution context with dotted-path lookup and template resolution.
//!
//! `StepContext` is the read side of an execution that a step sees while it
//! runs: the execution's identity, its input parameters, the results of
//! prior steps, and global variables. Executors resolve `{{ ... }}`
//! placeholders and dotted field paths against it.

use std::collections::HashMap;

use flowline_types::execution::StepResult;
use serde_json::{Map, Value, json};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// StepContext
// ---------------------------------------------------------------------------

/// Read-only view of an execution passed to every step invocation.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Execution this step runs within.
    pub execution_id: Uuid,
    /// Workflow being executed.
    pub workflow_id: Uuid,
    /// Owner of the execution.
    pub user_id: String,
    /// Input parameters supplied at submission time.
    pub parameters: Map<String, Value>,
    /// Results of steps that already ran, keyed by step ID.
    pub step_results: HashMap<String, StepResult>,
    /// Variables shared across all steps of the execution.
    pub global_variables: Map<String, Value>,
}

impl StepContext {
    /// Create an empty context for an execution.
    pub fn new(execution_id: Uuid, workflow_id: Uuid, user_id: impl Into<String>) -> Self {
        Self {
            execution_id,
            workflow_id,
            user_id: user_id.into(),
            parameters: Map::new(),
            step_results: HashMap::new(),
            global_variables: Map::new(),
        }
    }

    /// Attach submission parameters.
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Record the result of a completed step so later steps can reference it.
    pub fn record_step_result(&mut self, step_id: impl Into<String>, result: StepResult) {
        self.step_results.insert(step_id.into(), result);
    }

    /// Look up a dotted path in the context.
    ///
    /// Roots:
    /// - `param.<name>...` / `params.<name>...` -- submission parameters
    /// - `steps.<step_id>.<field>...` -- a prior step result (`data`,
    ///   `success`, `error` are addressable)
    /// - `vars.<name>...` -- global variables
    ///
    /// A path with no recognized root is looked up in the parameters.
    /// Returns `None` when any segment is missing.
    pub fn lookup_path(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let root = segments.next()?;
        let rest: Vec<&str> = segments.collect();

        match root {
            "param" | "params" => {
                let (first, tail) = rest.split_first()?;
                descend(self.parameters.get(*first)?, tail)
            }
            "steps" => {
                let (step_id, tail) = rest.split_first()?;
                let result = self.step_results.get(*step_id)?;
                let as_value = json!({
                    "success": result.success,
                    "data": result.data,
                    "error": result.error,
                });
                descend(&as_value, tail)
            }
            "vars" => {
                let (first, tail) = rest.split_first()?;
                descend(self.global_variables.get(*first)?, tail)
            }
            other => {
                // Bare path: treat the whole thing as a parameter lookup.
                descend(self.parameters.get(other)?, &rest)
            }
        }
    }

    /// Resolve `{{ path }}` placeholders in a string against the context.
    ///
    /// Unresolvable placeholders are left in their literal form. A template
    /// consisting of exactly one placeholder resolves to the referenced value
    /// itself (preserving arrays/numbers); anything else resolves to a string.
    pub fn resolve_template_value(&self, template: &str) -> Value {
        if let Some(path) = sole_placeholder(template)
            && let Some(value) = self.lookup_path(path)
        {
            return value;
        }
        Value::String(self.resolve_template(template))
    }

    /// Resolve `{{ path }}` placeholders in a string, interpolating values
    /// into the surrounding text. Unresolvable placeholders stay literal.
    pub fn resolve_template(&self, template: &str) -> String {
        interpolate(template, |path| self.lookup_path(path))
    }
}

// ---------------------------------------------------------------------------
// Template helpers (shared with the transform executor)
// ---------------------------------------------------------------------------

/// If `template` is exactly one `{{ path }}` placeholder, return the path.
pub(crate) fn sole_placeholder(template: &str) -> Option<&str> {
    let trimmed = template.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    // Reject templates containing more than one placeholder.
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

/// Replace every `{{ path }}` placeholder via `lookup`, leaving unresolvable
/// placeholders in their literal form.
pub(crate) fn interpolate(template: &str, lookup: impl Fn(&str) -> Option<Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        match after_open.find("}}") {
            Some(end) => {
                let path = after_open[..end].trim();
                match lookup(path) {
                    Some(value) => out.push_str(&value_to_string(&value)),
                    // Keep the placeholder verbatim.
                    None => {
                        out.push_str("{{");
                        out.push_str(&after_open[..end]);
                        out.push_str("}}");
                    }
                }
                rest = &after_open[end + 2..];
            }
            None => {
                // Unterminated placeholder: emit the remainder as-is.
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Walk `tail` segments down into a JSON value.
pub(crate) fn descend(value: &Value, tail: &[&str]) -> Option<Value> {
    let mut current = value;
    for segment in tail {
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

/// Render a JSON value for interpolation into a string.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Objects/arrays interpolate as compact JSON.
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

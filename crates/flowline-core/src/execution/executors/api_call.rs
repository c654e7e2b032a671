//! API-call step executor.
//!
//! The most involved variant: resolves the step's connection through the
//! [`ConnectionResolver`] port, builds a fully resolved [`ApiRequest`]
//! (templates expanded, connection headers merged), and hands transport to
//! the [`ApiDispatcher`] port. Response statuses map onto the retry
//! taxonomy's error codes, so credential failures classify permanent and
//! rate limits / server errors classify transient.

use std::sync::Arc;

use flowline_types::execution::StepResult;
use flowline_types::step::{ApiCallStep, Step, StepAction};
use serde_json::{Value, json};

use super::super::context::StepContext;
use super::{StepExecutor, wrong_variant};
use crate::http::{ApiDispatcher, ApiRequest, ConnectionResolver, status_error_code};

/// Executor for `StepAction::ApiCall`.
pub struct ApiCallExecutor {
    resolver: Arc<dyn ConnectionResolver>,
    dispatcher: Arc<dyn ApiDispatcher>,
}

impl ApiCallExecutor {
    /// Create an executor wired to a connection resolver and a dispatcher.
    pub fn new(resolver: Arc<dyn ConnectionResolver>, dispatcher: Arc<dyn ApiDispatcher>) -> Self {
        Self {
            resolver,
            dispatcher,
        }
    }
}

impl StepExecutor for ApiCallExecutor {
    fn validate(&self, step: &Step) -> bool {
        match &step.action {
            StepAction::ApiCall(call) => {
                call.connection_id.is_some()
                    && call.method.as_deref().is_some_and(|m| !m.trim().is_empty())
                    && call.path.is_some()
            }
            _ => false,
        }
    }

    async fn execute(&self, step: &Step, ctx: &StepContext) -> StepResult {
        let StepAction::ApiCall(call) = &step.action else {
            return wrong_variant("api_call");
        };
        // Guaranteed by validate; kept defensive because execute never panics.
        let (Some(connection_id), Some(method), Some(path)) =
            (call.connection_id, call.method.as_deref(), call.path.as_deref())
        else {
            return StepResult::failed("INVALID_CONFIGURATION: incomplete api_call step", 0);
        };

        let connection = match self.resolver.resolve(connection_id).await {
            Ok(Some(connection)) => connection,
            Ok(None) => {
                return StepResult::failed(
                    format!("INVALID_CONFIGURATION: connection {connection_id} not found"),
                    0,
                );
            }
            Err(err) => return StepResult::failed(err.to_string(), 0),
        };

        let request = build_request(call, method, path, ctx, &connection);
        let url = request.url.clone();

        match self.dispatcher.dispatch(request).await {
            Ok(response) if (200..300).contains(&response.status) => {
                tracing::debug!(
                    execution_id = %ctx.execution_id,
                    step_id = step.id.as_str(),
                    status = response.status,
                    url = url.as_str(),
                    "api call succeeded"
                );
                StepResult::succeeded(
                    json!({
                        "status": response.status,
                        "headers": response.headers,
                        "body": response.body,
                    }),
                    0,
                )
            }
            Ok(response) => StepResult::failed(
                format!(
                    "{}: HTTP {} from {}",
                    status_error_code(response.status),
                    response.status,
                    url
                ),
                0,
            ),
            Err(err) => StepResult::failed(err.to_string(), 0),
        }
    }
}

// ---------------------------------------------------------------------------
// Request construction
// ---------------------------------------------------------------------------

fn build_request(
    call: &ApiCallStep,
    method: &str,
    path: &str,
    ctx: &StepContext,
    connection: &flowline_types::connection::ConnectionConfig,
) -> ApiRequest {
    let resolved_path = ctx.resolve_template(path);
    let url = format!(
        "{}/{}",
        connection.base_url.trim_end_matches('/'),
        resolved_path.trim_start_matches('/')
    );

    // Connection defaults first, step headers overlaid.
    let mut headers = connection.default_headers.clone();
    if let Some(step_headers) = &call.headers {
        for (key, value) in step_headers {
            headers.insert(key.clone(), ctx.resolve_template(value));
        }
    }

    let query = call
        .query
        .iter()
        .flatten()
        .map(|(key, value)| (key.clone(), ctx.resolve_template(value)))
        .collect();

    let body = call.body.as_ref().map(|body| resolve_body(body, ctx));

    ApiRequest {
        method: method.to_uppercase(),
        url,
        headers,
        query,
        body,
        auth: connection.auth.clone(),
    }
}

/// Recursively resolve `{{ ... }}` placeholders in string leaves of a body.
fn resolve_body(value: &Value, ctx: &StepContext) -> Value {
    match value {
        Value::String(template) => ctx.resolve_template_value(template),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_body(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_body(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ApiError, ApiResponse};
    use flowline_types::connection::{ConnectionAuth, ConnectionConfig};
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct StaticResolver {
        connection: Option<ConnectionConfig>,
    }

    impl ConnectionResolver for StaticResolver {
        fn resolve(
            &self,
            _id: Uuid,
        ) -> Pin<Box<dyn Future<Output = Result<Option<ConnectionConfig>, ApiError>> + Send + '_>>
        {
            let connection = self.connection.clone();
            Box::pin(async move { Ok(connection) })
        }
    }

    struct RecordingDispatcher {
        response: Result<ApiResponse, ApiError>,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl RecordingDispatcher {
        fn replying(status: u16, body: Value) -> Self {
            Self {
                response: Ok(ApiResponse {
                    status,
                    headers: HashMap::new(),
                    body,
                }),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ApiDispatcher for RecordingDispatcher {
        fn dispatch(
            &self,
            request: ApiRequest,
        ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, ApiError>> + Send + '_>> {
            self.seen.lock().unwrap().push(request);
            let response = match &self.response {
                Ok(r) => Ok(r.clone()),
                Err(ApiError::Timeout(m)) => Err(ApiError::Timeout(m.clone())),
                Err(other) => Err(ApiError::Network(other.to_string())),
            };
            Box::pin(async move { response })
        }
    }

    fn connection() -> ConnectionConfig {
        serde_json::from_value(json!({
            "id": "01938e90-0000-7000-8000-00000000000a",
            "name": "billing",
            "base_url": "https://billing.example.com/",
            "auth": { "scheme": "bearer", "token": "tok-1" },
            "default_headers": { "Accept": "application/json" }
        }))
        .unwrap()
    }

    fn api_step(connection_id: Option<Uuid>, method: Option<&str>, path: Option<&str>) -> Step {
        Step {
            id: "call".to_string(),
            name: "Call".to_string(),
            action: StepAction::ApiCall(ApiCallStep {
                connection_id,
                method: method.map(String::from),
                path: path.map(String::from),
                headers: Some(HashMap::from([(
                    "X-Region".to_string(),
                    "{{ param.region }}".to_string(),
                )])),
                query: None,
                body: Some(json!({ "region": "{{ param.region }}" })),
            }),
            step_order: None,
            retry: None,
        }
    }

    fn ctx() -> StepContext {
        let mut ctx = StepContext::new(Uuid::now_v7(), Uuid::now_v7(), "user-1");
        ctx.parameters.insert("region".to_string(), json!("eu"));
        ctx
    }

    fn executor(
        connection: Option<ConnectionConfig>,
        dispatcher: Arc<RecordingDispatcher>,
    ) -> ApiCallExecutor {
        ApiCallExecutor::new(Arc::new(StaticResolver { connection }), dispatcher)
    }

    #[test]
    fn test_validate_rejects_incomplete_steps() {
        let dispatcher = Arc::new(RecordingDispatcher::replying(200, json!({})));
        let exec = executor(Some(connection()), dispatcher);

        assert!(exec.validate(&api_step(Some(Uuid::now_v7()), Some("POST"), Some("/v1/x"))));
        assert!(!exec.validate(&api_step(None, Some("POST"), Some("/v1/x"))));
        assert!(!exec.validate(&api_step(Some(Uuid::now_v7()), None, Some("/v1/x"))));
        assert!(!exec.validate(&api_step(Some(Uuid::now_v7()), Some(" "), Some("/v1/x"))));
        assert!(!exec.validate(&api_step(Some(Uuid::now_v7()), Some("POST"), None)));
    }

    #[tokio::test]
    async fn test_successful_call_builds_resolved_request() {
        let dispatcher = Arc::new(RecordingDispatcher::replying(200, json!({ "ok": true })));
        let exec = executor(Some(connection()), Arc::clone(&dispatcher));

        let step = api_step(Some(Uuid::now_v7()), Some("post"), Some("/v1/{{ param.region }}/sync"));
        let result = exec.execute(&step, &ctx()).await;

        assert!(result.success);
        assert_eq!(result.data["status"], 200);
        assert_eq!(result.data["body"]["ok"], true);

        let seen = dispatcher.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "https://billing.example.com/v1/eu/sync");
        assert_eq!(request.headers.get("Accept").unwrap(), "application/json");
        assert_eq!(request.headers.get("X-Region").unwrap(), "eu");
        assert_eq!(request.body, Some(json!({ "region": "eu" })));
        assert!(matches!(request.auth, ConnectionAuth::Bearer { .. }));
    }

    #[tokio::test]
    async fn test_unknown_connection_is_permanent_failure() {
        let dispatcher = Arc::new(RecordingDispatcher::replying(200, json!({})));
        let exec = executor(None, Arc::clone(&dispatcher));

        let step = api_step(Some(Uuid::now_v7()), Some("GET"), Some("/v1/x"));
        let result = exec.execute(&step, &ctx()).await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("INVALID_CONFIGURATION"));
        assert!(!crate::execution::retry::is_transient(&error));
        // Dispatcher never reached.
        assert!(dispatcher.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_http_401_maps_to_invalid_api_key() {
        let dispatcher = Arc::new(RecordingDispatcher::replying(401, json!({})));
        let exec = executor(Some(connection()), dispatcher);

        let step = api_step(Some(Uuid::now_v7()), Some("GET"), Some("/v1/x"));
        let result = exec.execute(&step, &ctx()).await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.starts_with("INVALID_API_KEY"));
        assert!(!crate::execution::retry::is_transient(&error));
    }

    #[tokio::test]
    async fn test_http_503_is_transient_failure() {
        let dispatcher = Arc::new(RecordingDispatcher::replying(503, json!({})));
        let exec = executor(Some(connection()), dispatcher);

        let step = api_step(Some(Uuid::now_v7()), Some("GET"), Some("/v1/x"));
        let result = exec.execute(&step, &ctx()).await;

        assert!(!result.success);
        assert!(crate::execution::retry::is_transient(&result.error.unwrap()));
    }

    #[tokio::test]
    async fn test_transport_error_is_reported_not_thrown() {
        let dispatcher = Arc::new(RecordingDispatcher {
            response: Err(ApiError::Timeout("no response after 30s".to_string())),
            seen: Mutex::new(Vec::new()),
        });
        let exec = executor(Some(connection()), dispatcher);

        let step = api_step(Some(Uuid::now_v7()), Some("GET"), Some("/v1/x"));
        let result = exec.execute(&step, &ctx()).await;

        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("TIMEOUT"));
    }
}

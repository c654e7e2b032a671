//! Reqwest-backed API dispatcher.
//!
//! Implements the `ApiDispatcher` port from flowline-core: takes a fully
//! resolved `ApiRequest`, applies the connection's authentication scheme at
//! build time (credential material leaves its `SecretString` wrapper only
//! here), sends it, and returns the raw response. Non-2xx statuses are `Ok`
//! responses -- classification is the executor's job; only transport
//! failures error.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use flowline_core::http::{ApiDispatcher, ApiError, ApiRequest, ApiResponse};
use flowline_types::connection::ConnectionAuth;
use secrecy::ExposeSecret;
use serde_json::Value;

/// Default request deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `ApiDispatcher` implementation over a shared `reqwest::Client`.
pub struct HttpApiDispatcher {
    client: reqwest::Client,
}

impl HttpApiDispatcher {
    /// Build a dispatcher with the default client (30s timeout).
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("flowline/0.1")
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    /// Build a dispatcher over an existing client (custom proxies, TLS).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpApiDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiDispatcher for HttpApiDispatcher {
    fn dispatch(
        &self,
        request: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, ApiError>> + Send + '_>> {
        Box::pin(async move {
            let method: reqwest::Method = request.method.parse().map_err(|_| {
                ApiError::InvalidConfiguration(format!(
                    "invalid HTTP method: {}",
                    request.method
                ))
            })?;

            let mut builder = self.client.request(method, &request.url);

            for (key, value) in &request.headers {
                builder = builder.header(key.as_str(), value.as_str());
            }
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }

            builder = match &request.auth {
                ConnectionAuth::None => builder,
                ConnectionAuth::Bearer { token } => builder.bearer_auth(token.expose_secret()),
                ConnectionAuth::ApiKeyHeader { header, key } => {
                    builder.header(header.as_str(), key.expose_secret())
                }
                ConnectionAuth::Basic { username, password } => {
                    builder.basic_auth(username, Some(password.expose_secret()))
                }
            };

            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|err| {
                if err.is_timeout() {
                    ApiError::Timeout(format!("{} {}: {err}", request.method, request.url))
                } else {
                    ApiError::Network(format!("{} {}: {err}", request.method, request.url))
                }
            })?;

            let status = response.status().as_u16();
            let headers: HashMap<String, String> = response
                .headers()
                .iter()
                .map(|(key, value)| {
                    (
                        key.as_str().to_string(),
                        value.to_str().unwrap_or("<binary>").to_string(),
                    )
                })
                .collect();

            let text = response
                .text()
                .await
                .map_err(|err| ApiError::Network(format!("reading response body: {err}")))?;
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

            tracing::debug!(
                url = request.url.as_str(),
                status,
                "api request dispatched"
            );

            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        })
    }
}

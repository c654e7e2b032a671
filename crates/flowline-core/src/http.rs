//! Outbound-request ports for the API-call executor.
//!
//! The executor never talks to the network itself. It resolves a connection
//! through [`ConnectionResolver`], builds an [`ApiRequest`], and hands it to
//! an [`ApiDispatcher`]. Both traits are object-safe (boxed futures) so the
//! executor can hold them as trait objects; the reqwest-backed implementation
//! lives in flowline-infra, test stubs live next to the tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use flowline_types::connection::{ConnectionAuth, ConnectionConfig};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

/// A fully resolved outbound request: URL, headers and body are final, and
/// the connection's authentication scheme rides along for the dispatcher to
/// apply at build time.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method (`GET`, `POST`, ...).
    pub method: String,
    /// Absolute URL (connection base URL + resolved step path).
    pub url: String,
    /// Merged headers: connection defaults overlaid with step headers.
    pub headers: HashMap<String, String>,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// JSON body, if the step supplies one.
    pub body: Option<Value>,
    /// Authentication applied by the dispatcher when building the request.
    pub auth: ConnectionAuth,
}

/// The dispatcher's view of the upstream response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Response body, parsed as JSON when possible, otherwise a string.
    pub body: Value,
}

/// Errors raised by the resolver or dispatcher. Display strings lead with an
/// error code so they classify correctly in the retry taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Transport-level failure (DNS, connect, TLS, reset).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// The request did not complete within the dispatcher's deadline.
    #[error("TIMEOUT: {0}")]
    Timeout(String),

    /// The request could not be constructed (bad method, malformed URL).
    #[error("INVALID_CONFIGURATION: {0}")]
    InvalidConfiguration(String),

    /// Connection store failure while resolving credentials.
    #[error("SERVICE_UNAVAILABLE: connection store error: {0}")]
    ConnectionStore(String),
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Resolves a connection ID to its configuration. Implemented by the
/// out-of-scope connection-management layer; a static in-memory resolver
/// ships in flowline-infra for tests and embedded use.
pub trait ConnectionResolver: Send + Sync {
    /// Look up a connection. `Ok(None)` means the ID is unknown.
    fn resolve(
        &self,
        id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ConnectionConfig>, ApiError>> + Send + '_>>;
}

/// Carries a resolved request to the network and returns the raw response.
/// The dispatcher applies `ApiRequest::auth` and must report non-2xx statuses
/// as `Ok` responses -- only transport failures are `Err`.
pub trait ApiDispatcher: Send + Sync {
    fn dispatch(
        &self,
        request: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, ApiError>> + Send + '_>>;
}

// ---------------------------------------------------------------------------
// Status mapping
// ---------------------------------------------------------------------------

/// Map an HTTP status onto the retry taxonomy's error codes.
///
/// Credential and permission failures are permanent; rate limits, timeouts
/// and server errors are transient.
pub fn status_error_code(status: u16) -> &'static str {
    match status {
        401 => "INVALID_API_KEY",
        403 => "PERMISSION_DENIED",
        404 => "NOT_FOUND",
        408 => "TIMEOUT",
        429 => "RATE_LIMITED",
        500..=599 => "SERVICE_UNAVAILABLE",
        _ => "REQUEST_FAILED",
    }
}

//! Minimal connection-configuration shape.
//!
//! Connection management (CRUD, credential storage, OAuth flows) is an
//! external collaborator. This module only carries the resolved shape the
//! API-call executor needs to build a request: a base URL plus how to
//! authenticate against it. Credential material is wrapped in
//! `secrecy::SecretString` so it never lands in debug output or logs.

use std::collections::HashMap;

use secrecy::SecretString;
use serde::Deserialize;
use uuid::Uuid;

/// A resolved connection: where to send requests and how to authenticate.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Connection ID referenced by API-call steps.
    pub id: Uuid,
    /// Human-readable connection name.
    pub name: String,
    /// Base URL request paths are joined onto (no trailing slash expected).
    pub base_url: String,
    /// How to authenticate.
    #[serde(default)]
    pub auth: ConnectionAuth,
    /// Headers applied to every request on this connection.
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
}

/// Authentication scheme for a connection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum ConnectionAuth {
    /// No authentication.
    #[default]
    None,
    /// `Authorization: Bearer <token>`.
    Bearer { token: SecretString },
    /// An arbitrary header carrying an API key.
    ApiKeyHeader { header: String, key: SecretString },
    /// HTTP basic auth.
    Basic {
        username: String,
        password: SecretString,
    },
}

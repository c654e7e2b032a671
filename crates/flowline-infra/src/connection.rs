//! Static connection resolver.
//!
//! The real connection store is an external collaborator. This adapter
//! serves a fixed set of connections -- enough for tests and for embedded
//! deployments that configure their connections up front.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use flowline_core::http::{ApiError, ConnectionResolver};
use flowline_types::connection::ConnectionConfig;
use uuid::Uuid;

/// `ConnectionResolver` over a fixed map of connections.
#[derive(Default)]
pub struct StaticConnectionResolver {
    connections: HashMap<Uuid, ConnectionConfig>,
}

impl StaticConnectionResolver {
    /// Build a resolver from a set of connections.
    pub fn new(connections: impl IntoIterator<Item = ConnectionConfig>) -> Self {
        Self {
            connections: connections
                .into_iter()
                .map(|connection| (connection.id, connection))
                .collect(),
        }
    }
}

impl ConnectionResolver for StaticConnectionResolver {
    fn resolve(
        &self,
        id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ConnectionConfig>, ApiError>> + Send + '_>>
    {
        let connection = self.connections.get(&id).cloned();
        Box::pin(async move { Ok(connection) })
    }
}

//! Observability bootstrap for Flowline services.

pub mod tracing_setup;

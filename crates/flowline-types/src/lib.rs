//! Shared domain types for Flowline.
//!
//! This crate contains the domain types used across the Flowline workflow
//! execution core: executions and their lifecycle statuses, steps and their
//! tagged action configurations, connection shapes, runtime configuration,
//! and the error types shared by the repository/queue trait definitions.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror,
//! secrecy.

pub mod config;
pub mod connection;
pub mod error;
pub mod execution;
pub mod step;

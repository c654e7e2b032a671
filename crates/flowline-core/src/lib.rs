//! Business logic and port definitions for the Flowline execution core.
//!
//! This crate defines the "ports" (repository, queue, connection and
//! dispatch traits) that the infrastructure layer implements, plus the two
//! load-bearing components of the system: the step engine (runner +
//! executors) and the execution state manager. It depends only on
//! `flowline-types` -- never on a database or HTTP crate.

pub mod execution;
pub mod http;
pub mod queue;
pub mod repository;

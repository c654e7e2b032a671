//! Infrastructure adapters for the Flowline execution core.
//!
//! Implements the ports defined in `flowline-core`:
//! - `sqlite` -- SQLite-backed execution repository and log sink
//! - `memory` -- in-memory repository, queue service and log sink
//! - `http` -- reqwest-backed API dispatcher
//! - `connection` -- static connection resolver
//! - `config` -- TOML configuration loader with defaults fallback

pub mod config;
pub mod connection;
pub mod http;
pub mod memory;
pub mod sqlite;

//! SQLite adapters: split-pool database handle, execution repository and
//! execution log sink.

pub mod execution;
pub mod pool;

pub use execution::{SqliteExecutionRepository, SqliteLogSink};
pub use pool::DatabasePool;

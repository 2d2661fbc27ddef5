//! RelDB - an embeddable single-node relational data engine
//!
//! This library provides the storage-and-execution core of a small SQL
//! database:
//! - Value and schema primitives (cells, rows, columns)
//! - Indexed table storage with schema validation
//! - Session-scoped shared/exclusive table locks
//! - A database catalog with schema persistence and lenient recovery
//! - Per-database statement logging and restart replay
//! - A two-relation query executor (projection, equality filter, equality join)
//!
//! SQL parsing and any network or CLI transport are external collaborators:
//! the engine consumes structured statements and produces result sets or
//! status messages.

pub mod catalog;
pub mod command;
pub mod error;
pub mod executor;
pub mod session;
pub mod storage;

pub use catalog::Manager;
pub use command::Statement;
pub use error::{Error, Result};
pub use executor::QueryResult;
pub use session::SessionId;

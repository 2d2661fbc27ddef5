//! Storage engine module
//!
//! This module contains the storage components:
//! - Cell and row value primitives
//! - Binary row-stream codec
//! - Session-scoped table locks
//! - Indexed table storage
//! - The per-database statement log

pub mod cell;
pub mod codec;
pub mod locks;
pub mod row;
pub mod table;
pub mod wal;

pub use cell::Cell;
pub use locks::{ExclusiveGrant, LockState};
pub use row::Row;
pub use table::{Table, TableScan};
pub use wal::StatementLog;

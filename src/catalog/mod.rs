//! Catalog module
//!
//! This module contains the top-level manager, databases, column schemas
//! and data types.

pub mod database;
pub mod manager;
pub mod schema;
pub mod types;

pub use database::Database;
pub use manager::Manager;
pub use schema::Column;
pub use types::ColumnType;

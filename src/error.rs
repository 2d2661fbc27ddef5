//! Error types for RelDB
//!
//! This module defines all error types used throughout the engine.

use std::path::Path;
use thiserror::Error;

/// The main error type for RelDB
#[derive(Error, Debug)]
pub enum Error {
    // ========== Schema Errors ==========
    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Null value not allowed for column '{0}'")]
    NullConstraintViolation(String),

    #[error("Value for column '{0}' exceeds maximum length {1}")]
    ValueTooLong(String, usize),

    // ========== Key Errors ==========
    #[error("Duplicate primary key in table '{0}'")]
    DuplicateKey(String),

    #[error("Primary key not found in table '{0}'")]
    KeyNotFound(String),

    // ========== Catalog Errors ==========
    #[error("Table '{0}' already exists")]
    DuplicateTable(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("No database selected")]
    NoDatabaseSelected,

    // ========== Query Errors ==========
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    // ========== Lock Errors ==========
    #[error("Table '{0}' is in use by another session")]
    LockUnavailable(String),

    // ========== Storage Errors ==========
    #[error("Storage error: {0}")]
    StorageIo(String),
}

impl Error {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl AsRef<Path>, err: std::io::Error) -> Self {
        Error::StorageIo(format!("{}: {}", path.as_ref().display(), err))
    }
}

/// Result type alias for RelDB operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TableNotFound("users".to_string());
        assert_eq!(err.to_string(), "Table 'users' not found");

        let err = Error::ValueTooLong("name".to_string(), 10);
        assert_eq!(
            err.to_string(),
            "Value for column 'name' exceeds maximum length 10"
        );
    }
}

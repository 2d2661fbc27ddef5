//! Schema definitions for RelDB
//!
//! This module defines table columns and their constraints.

use super::types::ColumnType;
use serde::{Deserialize, Serialize};

/// Column definition in a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Data type
    pub column_type: ColumnType,
    /// Is this the primary-key column?
    pub primary: bool,
    /// Must values be non-null?
    pub not_null: bool,
    /// Maximum length; meaningful only for string columns
    pub max_length: usize,
}

impl Column {
    /// Create a new column with minimal required fields
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary: false,
            not_null: false,
            max_length: 0,
        }
    }

    /// Set the primary-key flag; a primary column is implicitly NOT NULL
    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        if primary {
            self.not_null = true;
        }
        self
    }

    /// Set the NOT NULL flag
    pub fn not_null(mut self, not_null: bool) -> Self {
        self.not_null = not_null;
        self
    }

    /// Set the maximum string length
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Human-readable one-line description (for DESCRIBE output)
    pub fn describe(&self) -> String {
        let mut text = format!("{} : {}", self.name, self.column_type);
        if self.column_type == ColumnType::Str {
            text.push_str(&format!("({})", self.max_length));
        }
        if self.not_null && !self.primary {
            text.push_str(" NOT NULL");
        }
        if self.primary {
            text.push_str(" PRIMARY KEY");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_implies_not_null() {
        let col = Column::new("id", ColumnType::Int).primary(true);
        assert!(col.primary);
        assert!(col.not_null);
    }

    #[test]
    fn test_describe() {
        let id = Column::new("id", ColumnType::Int).primary(true);
        assert_eq!(id.describe(), "id : INT PRIMARY KEY");

        let name = Column::new("name", ColumnType::Str)
            .max_length(16)
            .not_null(true);
        assert_eq!(name.describe(), "name : STRING(16) NOT NULL");
    }

    #[test]
    fn test_json_round_trip() {
        let col = Column::new("name", ColumnType::Str).max_length(32);
        let line = serde_json::to_string(&col).unwrap();
        let parsed: Column = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, col);
    }
}

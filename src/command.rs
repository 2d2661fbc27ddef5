//! Structured statements
//!
//! The engine does not parse SQL. A frontend hands it fully-typed
//! statements: names arrive case-normalized, literal values are pre-coerced
//! to the declared column types, and predicates arrive as operand pairs, so
//! the executor never performs string surgery. Statements are serializable
//! because the per-database statement log stores them verbatim.

use crate::catalog::Column;
use crate::storage::{Cell, Row};
use serde::{Deserialize, Serialize};

/// Requested result columns of a select
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResultColumns {
    /// All columns of all input tables, in input order
    Wildcard,
    /// Explicit column names, `table.column` qualified or bare
    Columns(Vec<String>),
}

/// Equality join predicate between two columns of the working row set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPredicate {
    /// Left operand column name
    pub left: String,
    /// Right operand column name
    pub right: String,
}

/// Equality filter comparing a column's textual rendering to a literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    /// Filtered column name
    pub column: String,
    /// Literal text the cell rendering must equal
    pub literal: String,
}

/// A structured command from the frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Create a database (no-op if it exists) and select it if none is
    CreateDatabase { name: String },
    /// Drop a database and all of its tables
    DropDatabase { name: String },
    /// Make a database current for unqualified statements
    UseDatabase { name: String },
    /// Create a table in the current database
    CreateTable { name: String, columns: Vec<Column> },
    /// Drop a table from the current database
    DropTable { name: String },
    /// Describe a table's schema
    ShowTable { name: String },
    /// Insert rows into a table
    Insert { table: String, rows: Vec<Row> },
    /// Delete matching rows (all rows when the filter is absent)
    Delete {
        table: String,
        filter: Option<FilterPredicate>,
    },
    /// Set one column on every matching row
    Update {
        table: String,
        column: String,
        value: Cell,
        filter: Option<FilterPredicate>,
    },
    /// Query one or two tables
    Select {
        tables: Vec<String>,
        columns: ResultColumns,
        join: Option<JoinPredicate>,
        filter: Option<FilterPredicate>,
    },
    /// Persist everything and shut down cleanly
    Quit,
}

impl Statement {
    /// Whether a successful execution must be appended to the statement log
    pub fn is_logged(&self) -> bool {
        matches!(
            self,
            Statement::CreateTable { .. }
                | Statement::DropTable { .. }
                | Statement::Insert { .. }
                | Statement::Delete { .. }
                | Statement::Update { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnType;

    #[test]
    fn test_only_mutations_are_logged() {
        let insert = Statement::Insert {
            table: "t".into(),
            rows: vec![Row::new(vec![Cell::Int(1)])],
        };
        assert!(insert.is_logged());

        let select = Statement::Select {
            tables: vec!["t".into()],
            columns: ResultColumns::Wildcard,
            join: None,
            filter: None,
        };
        assert!(!select.is_logged());
        assert!(!Statement::Quit.is_logged());
    }

    #[test]
    fn test_statement_json_round_trip() {
        let statement = Statement::CreateTable {
            name: "users".into(),
            columns: vec![
                Column::new("id", ColumnType::Int).primary(true),
                Column::new("name", ColumnType::Str).max_length(10),
            ],
        };
        let line = serde_json::to_string(&statement).unwrap();
        let parsed: Statement = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, statement);
    }
}

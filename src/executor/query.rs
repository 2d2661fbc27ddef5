//! Two-relation select evaluation
//!
//! Builds the working row set (a single scan, or the Cartesian product of
//! two scans), resolves the requested columns and predicate operands to
//! positions, applies the equality join and filter, and projects.
//!
//! The predicate language is exactly one equality comparison per clause —
//! no conjunctions, no range operators. That is a scope limit of the
//! design, not an accident.

use super::result::QueryResult;
use crate::command::{FilterPredicate, JoinPredicate, ResultColumns};
use crate::error::{Error, Result};
use crate::storage::{Row, Table};

/// A materialized table scan feeding the executor
#[derive(Debug)]
pub struct QueryTable {
    table_name: String,
    column_names: Vec<String>,
    rows: Vec<Row>,
}

impl QueryTable {
    /// Snapshot a table's rows in primary-key order
    pub fn from_table(table: &Table) -> Self {
        Self {
            table_name: table.name().to_string(),
            column_names: table.columns().iter().map(|c| c.name.clone()).collect(),
            rows: table.scan().collect(),
        }
    }

    /// Build a query table directly from parts
    pub fn new(table_name: impl Into<String>, column_names: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            table_name: table_name.into(),
            column_names,
            rows,
        }
    }
}

/// One column of the working row set
struct WorkingColumn {
    table: String,
    column: String,
    display: String,
}

/// Evaluate a select over one or two query tables.
///
/// Resolution failures come back as a descriptive message result rather
/// than an error: a query layer speaks in results, not faults.
pub fn select(
    tables: &[QueryTable],
    columns: &ResultColumns,
    join: Option<&JoinPredicate>,
    filter: Option<&FilterPredicate>,
) -> QueryResult {
    match evaluate(tables, columns, join, filter) {
        Ok(result) => result,
        Err(e) => QueryResult::message(e.to_string()),
    }
}

fn evaluate(
    tables: &[QueryTable],
    columns: &ResultColumns,
    join: Option<&JoinPredicate>,
    filter: Option<&FilterPredicate>,
) -> Result<QueryResult> {
    let (working_columns, mut working_rows) = match tables {
        [single] => working_set_single(single),
        [outer, inner] => working_set_product(outer, inner),
        _ => {
            return Ok(QueryResult::message(
                "Select supports one or two tables only.",
            ))
        }
    };

    let projection: Vec<usize> = match columns {
        ResultColumns::Wildcard => (0..working_columns.len()).collect(),
        ResultColumns::Columns(names) => names
            .iter()
            .map(|name| resolve(name, &working_columns))
            .collect::<Result<_>>()?,
    };

    if let Some(predicate) = join {
        let left = resolve(&predicate.left, &working_columns)?;
        let right = resolve(&predicate.right, &working_columns)?;
        // exact value and tag equality, no numeric coercion
        working_rows.retain(|row| row.get(left) == row.get(right));
    }

    if let Some(predicate) = filter {
        let target = resolve(&predicate.column, &working_columns)?;
        working_rows.retain(|row| {
            row.get(target)
                .is_some_and(|cell| cell.to_string() == predicate.literal)
        });
    }

    let result_rows: Vec<Row> = working_rows
        .iter()
        .map(|row| row.project(&projection))
        .collect();
    let result_columns: Vec<String> = projection
        .iter()
        .map(|&i| working_columns[i].display.clone())
        .collect();

    Ok(QueryResult::rows(result_columns, result_rows))
}

fn working_set_single(table: &QueryTable) -> (Vec<WorkingColumn>, Vec<Row>) {
    let columns = table
        .column_names
        .iter()
        .map(|name| WorkingColumn {
            table: table.table_name.clone(),
            column: name.clone(),
            display: name.clone(),
        })
        .collect();
    (columns, table.rows.clone())
}

fn working_set_product(outer: &QueryTable, inner: &QueryTable) -> (Vec<WorkingColumn>, Vec<Row>) {
    let mut columns = Vec::with_capacity(outer.column_names.len() + inner.column_names.len());
    for table in [outer, inner] {
        for name in &table.column_names {
            columns.push(WorkingColumn {
                table: table.table_name.clone(),
                column: name.clone(),
                display: format!("{}.{}", table.table_name, name),
            });
        }
    }

    // outer scan order, inner scan order nested
    let mut rows = Vec::with_capacity(outer.rows.len() * inner.rows.len());
    for outer_row in &outer.rows {
        for inner_row in &inner.rows {
            rows.push(outer_row.concat(inner_row));
        }
    }
    (columns, rows)
}

/// Resolve a requested column name to a position in the working column list.
///
/// Qualified `table.column` names must match both parts; a bare name matches
/// the first column with that name.
fn resolve(name: &str, columns: &[WorkingColumn]) -> Result<usize> {
    let position = match name.split_once('.') {
        Some((table, column)) => columns
            .iter()
            .position(|c| c.table == table && c.column == column),
        None => columns.iter().position(|c| c.column == name),
    };
    position.ok_or_else(|| Error::ColumnNotFound(name.to_string()))
}

//! End-to-end statement flow: create, insert, join, filter, project.

use reldb::catalog::{Column, ColumnType};
use reldb::command::{FilterPredicate, JoinPredicate, ResultColumns, Statement};
use reldb::storage::{Cell, Row};
use reldb::Manager;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();
}

fn setup(dir: &std::path::Path) -> Manager {
    init_tracing();
    let manager = Manager::open(dir).unwrap();
    manager.execute(
        Statement::CreateDatabase {
            name: "shop".into(),
        },
        1,
    );
    manager.execute(
        Statement::CreateTable {
            name: "users".into(),
            columns: vec![
                Column::new("id", ColumnType::Int).primary(true),
                Column::new("name", ColumnType::Str).max_length(10),
            ],
        },
        1,
    );
    manager.execute(
        Statement::CreateTable {
            name: "orders".into(),
            columns: vec![
                Column::new("uid", ColumnType::Int).primary(true),
                Column::new("item", ColumnType::Str).max_length(10),
            ],
        },
        1,
    );
    manager.execute(
        Statement::Insert {
            table: "users".into(),
            rows: vec![
                Row::new(vec![Cell::Int(1), Cell::Str("a".into())]),
                Row::new(vec![Cell::Int(2), Cell::Str("b".into())]),
            ],
        },
        1,
    );
    manager.execute(
        Statement::Insert {
            table: "orders".into(),
            rows: vec![
                Row::new(vec![Cell::Int(1), Cell::Str("x".into())]),
                Row::new(vec![Cell::Int(3), Cell::Str("y".into())]),
            ],
        },
        1,
    );
    manager
}

#[test]
fn test_equality_join_yields_matching_pairs_only() {
    let dir = tempfile::tempdir().unwrap();
    let manager = setup(dir.path());

    let result = manager.execute(
        Statement::Select {
            tables: vec!["users".into(), "orders".into()],
            columns: ResultColumns::Columns(vec!["users.id".into(), "orders.item".into()]),
            join: Some(JoinPredicate {
                left: "users.id".into(),
                right: "orders.uid".into(),
            }),
            filter: None,
        },
        1,
    );

    assert_eq!(result.columns, vec!["users.id", "orders.item"]);
    assert_eq!(
        result.rows,
        vec![Row::new(vec![Cell::Int(1), Cell::Str("x".into())])]
    );
}

#[test]
fn test_wildcard_preserves_declared_column_order() {
    let dir = tempfile::tempdir().unwrap();
    let manager = setup(dir.path());

    let result = manager.execute(
        Statement::Select {
            tables: vec!["users".into()],
            columns: ResultColumns::Wildcard,
            join: None,
            filter: None,
        },
        1,
    );

    assert_eq!(result.columns, vec!["id", "name"]);
    assert_eq!(
        result.rows,
        vec![
            Row::new(vec![Cell::Int(1), Cell::Str("a".into())]),
            Row::new(vec![Cell::Int(2), Cell::Str("b".into())]),
        ]
    );
}

#[test]
fn test_filter_on_joined_product() {
    let dir = tempfile::tempdir().unwrap();
    let manager = setup(dir.path());

    let result = manager.execute(
        Statement::Select {
            tables: vec!["users".into(), "orders".into()],
            columns: ResultColumns::Wildcard,
            join: None,
            filter: Some(FilterPredicate {
                column: "orders.item".into(),
                literal: "y".into(),
            }),
        },
        1,
    );

    // the full product has four rows, two of which carry item "y"
    assert_eq!(result.rows.len(), 2);
    for row in &result.rows {
        assert_eq!(row.get(3), Some(&Cell::Str("y".into())));
    }
}

#[test]
fn test_unknown_result_column_is_a_message_not_a_fault() {
    let dir = tempfile::tempdir().unwrap();
    let manager = setup(dir.path());

    let result = manager.execute(
        Statement::Select {
            tables: vec!["users".into()],
            columns: ResultColumns::Columns(vec!["users.age".into()]),
            join: None,
            filter: None,
        },
        1,
    );

    assert!(result.message.unwrap().contains("users.age"));
}

#[test]
fn test_select_is_blocked_while_another_session_writes() {
    let dir = tempfile::tempdir().unwrap();
    let manager = setup(dir.path());
    // session 1 holds exclusive locks from its inserts

    let result = manager.execute(
        Statement::Select {
            tables: vec!["users".into()],
            columns: ResultColumns::Wildcard,
            join: None,
            filter: None,
        },
        2,
    );
    assert_eq!(
        result.message.unwrap(),
        "Table is already in use, change failed."
    );

    manager.close_session(1);
    let result = manager.execute(
        Statement::Select {
            tables: vec!["users".into()],
            columns: ResultColumns::Wildcard,
            join: None,
            filter: None,
        },
        2,
    );
    assert_eq!(result.rows.len(), 2);
}

//! Top-level catalog, statement evaluation and log replay
//!
//! The manager owns every database, the current-database pointer, the
//! session registry and the per-database statement logs. It is an explicit
//! instance: construct one per process and hand it (by reference or `Arc`)
//! to every session handler — there is no ambient global.
//!
//! `execute` is the single entry point for structured statements. It
//! resolves targets, runs the session-lock protocol, mutates or scans, and
//! appends mutating statements to the current database's log only after
//! they succeeded, so replay can only ever re-apply committed work.

use super::database::Database;
use crate::command::{FilterPredicate, JoinPredicate, ResultColumns, Statement};
use crate::error::{Error, Result};
use crate::executor::QueryResult;
use crate::session::{SessionId, SessionRegistry};
use crate::storage::{Cell, ExclusiveGrant, Row, StatementLog, Table};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

const BUSY_MESSAGE: &str = "Table is already in use, change failed.";

/// The engine's top-level catalog
#[derive(Debug)]
pub struct Manager {
    root: PathBuf,
    databases: RwLock<IndexMap<String, Arc<Database>>>,
    current: RwLock<Option<Arc<Database>>>,
    sessions: Mutex<SessionRegistry>,
    /// Tables each session holds exclusively, as (database, table) pairs
    exclusive_tables: Mutex<HashMap<SessionId, HashSet<(String, String)>>>,
}

impl Manager {
    /// Open the engine rooted at `root`, recovering every persisted
    /// database and replaying its statement log.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let manager = Self {
            root: root.into(),
            databases: RwLock::new(IndexMap::new()),
            current: RwLock::new(None),
            sessions: Mutex::new(SessionRegistry::new()),
            exclusive_tables: Mutex::new(HashMap::new()),
        };
        let data_dir = manager.data_dir();
        fs::create_dir_all(&data_dir).map_err(|e| Error::io(&data_dir, e))?;
        manager.recover()?;
        Ok(manager)
    }

    fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    fn manager_file(&self) -> PathBuf {
        self.data_dir().join("manager")
    }

    // ========== Database registry ==========

    /// Create a database if absent; the first database created while none
    /// is selected becomes current.
    pub fn create_database_if_not_exists(&self, name: &str) -> Result<()> {
        let mut databases = self.databases.write().unwrap();
        if !databases.contains_key(name) {
            let database = Arc::new(Database::open(name, self.data_dir())?);
            databases.insert(name.to_string(), database);
        }
        let opened = databases.get(name).cloned();
        drop(databases);

        let mut current = self.current.write().unwrap();
        if current.is_none() {
            *current = opened;
        }
        Ok(())
    }

    /// Drop a database, its tables and its files
    pub fn drop_database(&self, name: &str) -> Result<()> {
        {
            let mut databases = self.databases.write().unwrap();
            let database = databases
                .shift_remove(name)
                .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))?;
            database.drop_database()?;
        }
        let mut current = self.current.write().unwrap();
        if current.as_ref().is_some_and(|db| db.name() == name) {
            *current = None;
        }
        drop(current);
        self.persist_registry()
    }

    /// Make a database current for unqualified statements
    pub fn switch_database(&self, name: &str) -> Result<()> {
        let database = self.get_database(name)?;
        *self.current.write().unwrap() = Some(database);
        Ok(())
    }

    /// Look up a database by name
    pub fn get_database(&self, name: &str) -> Result<Arc<Database>> {
        self.databases
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))
    }

    /// The currently selected database
    pub fn current_database(&self) -> Result<Arc<Database>> {
        self.current
            .read()
            .unwrap()
            .clone()
            .ok_or(Error::NoDatabaseSelected)
    }

    /// Names of all databases, in listing order
    pub fn database_names(&self) -> Vec<String> {
        self.databases.read().unwrap().keys().cloned().collect()
    }

    // ========== Sessions ==========

    /// Track a session as active
    pub fn register_session(&self, session: SessionId) {
        self.sessions.lock().unwrap().register(session);
    }

    /// Release every lock the session still holds and retire it
    pub fn close_session(&self, session: SessionId) {
        let held = self
            .exclusive_tables
            .lock()
            .unwrap()
            .remove(&session)
            .unwrap_or_default();
        for (database_name, table_name) in held {
            if let Ok(database) = self.get_database(&database_name) {
                if let Ok(table) = database.get_table(&table_name) {
                    table.unlock_exclusive(session);
                }
            }
        }
        self.sessions.lock().unwrap().retire(session);
    }

    /// Tables the session holds exclusively, as (database, table) pairs
    pub fn session_exclusive_tables(&self, session: SessionId) -> Vec<(String, String)> {
        let mut held: Vec<_> = self
            .exclusive_tables
            .lock()
            .unwrap()
            .get(&session)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        held.sort();
        held
    }

    fn record_exclusive(&self, session: SessionId, database: &str, table: &str) {
        self.exclusive_tables
            .lock()
            .unwrap()
            .entry(session)
            .or_default()
            .insert((database.to_string(), table.to_string()));
    }

    // ========== Statement evaluation ==========

    /// Execute one structured statement on behalf of a session.
    ///
    /// All errors are rendered into message results at this boundary; a
    /// denied lock yields a "try again" message, never an error.
    pub fn execute(&self, statement: Statement, session: SessionId) -> QueryResult {
        self.sessions.lock().unwrap().register(session);
        let log_copy = statement.is_logged().then(|| statement.clone());

        match self.apply(statement, session) {
            Ok(result) => {
                if let Some(statement) = log_copy {
                    if let Err(e) = self.append_log(&statement) {
                        return QueryResult::message(e.to_string());
                    }
                }
                result
            }
            Err(Error::LockUnavailable(_)) => {
                self.sessions.lock().unwrap().mark_waiting(session);
                QueryResult::message(BUSY_MESSAGE)
            }
            Err(e) => QueryResult::message(e.to_string()),
        }
    }

    /// Append a committed statement to the current database's log
    pub fn append_log(&self, statement: &Statement) -> Result<()> {
        let database = self.current_database()?;
        StatementLog::new(database.log_path()).append(statement)
    }

    fn apply(&self, statement: Statement, session: SessionId) -> Result<QueryResult> {
        match statement {
            Statement::CreateDatabase { name } => {
                self.create_database_if_not_exists(&name)?;
                self.persist_registry()?;
                Ok(QueryResult::message(format!("Created database {}.", name)))
            }
            Statement::DropDatabase { name } => {
                self.drop_database(&name)?;
                Ok(QueryResult::message(format!("Dropped database {}.", name)))
            }
            Statement::UseDatabase { name } => {
                self.switch_database(&name)?;
                Ok(QueryResult::message(format!(
                    "Switched to database {}.",
                    name
                )))
            }
            Statement::CreateTable { name, columns } => {
                let database = self.current_database()?;
                database.create_table(&name, columns)?;
                Ok(QueryResult::message(format!("Created table {}.", name)))
            }
            Statement::DropTable { name } => {
                let database = self.current_database()?;
                database.drop_table(&name)?;
                Ok(QueryResult::message(format!("Dropped table {}.", name)))
            }
            Statement::ShowTable { name } => self.show_table(&name),
            Statement::Insert { table, rows } => self.insert(&table, rows, session),
            Statement::Delete { table, filter } => self.delete(&table, filter.as_ref(), session),
            Statement::Update {
                table,
                column,
                value,
                filter,
            } => self.update(&table, &column, value, filter.as_ref(), session),
            Statement::Select {
                tables,
                columns,
                join,
                filter,
            } => self.select(&tables, &columns, join.as_ref(), filter.as_ref(), session),
            Statement::Quit => {
                self.quit()?;
                Ok(QueryResult::message("Quit."))
            }
        }
    }

    /// Take (or re-enter) the session's exclusive lock on a table
    fn lock_exclusive(&self, database: &Database, table: &Table, session: SessionId) -> Result<()> {
        match table.try_lock_exclusive(session) {
            ExclusiveGrant::Granted => {
                self.record_exclusive(session, database.name(), table.name());
                Ok(())
            }
            ExclusiveGrant::AlreadyHeld => Ok(()),
            ExclusiveGrant::Busy => Err(Error::LockUnavailable(table.name().to_string())),
        }
    }

    fn insert(&self, table_name: &str, rows: Vec<Row>, session: SessionId) -> Result<QueryResult> {
        let database = self.current_database()?;
        let table = database.get_table(table_name)?;
        self.lock_exclusive(&database, &table, session)?;

        // all-or-nothing per statement: back the statement's own rows out
        // again on a mid-batch failure
        let mut inserted: Vec<Row> = Vec::with_capacity(rows.len());
        for row in rows {
            if let Err(e) = table.insert(row.clone()) {
                for done in &inserted {
                    let _ = table.delete(done);
                }
                return Err(e);
            }
            inserted.push(row);
        }
        Ok(QueryResult::message(format!(
            "Inserted {} rows into {}.",
            inserted.len(),
            table_name
        )))
    }

    fn delete(
        &self,
        table_name: &str,
        filter: Option<&FilterPredicate>,
        session: SessionId,
    ) -> Result<QueryResult> {
        let database = self.current_database()?;
        let table = database.get_table(table_name)?;
        self.lock_exclusive(&database, &table, session)?;

        let victims = matching_rows(&table, filter)?;
        for row in &victims {
            table.delete(row)?;
        }
        Ok(QueryResult::message(format!(
            "Deleted {} rows from {}.",
            victims.len(),
            table_name
        )))
    }

    fn update(
        &self,
        table_name: &str,
        set_column: &str,
        value: Cell,
        filter: Option<&FilterPredicate>,
        session: SessionId,
    ) -> Result<QueryResult> {
        let database = self.current_database()?;
        let table = database.get_table(table_name)?;
        self.lock_exclusive(&database, &table, session)?;

        let set_index = column_position(&table, set_column)?;
        let victims = matching_rows(&table, filter)?;
        let primary = table.primary_index();
        for row in &victims {
            let old_key = row.cells()[primary].clone();
            let mut new_row = row.clone();
            new_row.set(set_index, value.clone());
            table.update(&old_key, new_row)?;
        }
        Ok(QueryResult::message(format!(
            "Updated {} rows in {}.",
            victims.len(),
            table_name
        )))
    }

    fn select(
        &self,
        table_names: &[String],
        columns: &ResultColumns,
        join: Option<&JoinPredicate>,
        filter: Option<&FilterPredicate>,
        session: SessionId,
    ) -> Result<QueryResult> {
        let database = self.current_database()?;

        // shared locks in statement order; back out on a busy table
        let mut locked: Vec<Arc<Table>> = Vec::with_capacity(table_names.len());
        for name in table_names {
            let table = database.get_table(name)?;
            if !table.try_lock_shared(session) {
                for held in &locked {
                    held.unlock_shared(session);
                }
                return Err(Error::LockUnavailable(name.clone()));
            }
            locked.push(table);
        }

        let result = database.select(table_names, columns, join, filter);
        for held in &locked {
            held.unlock_shared(session);
        }
        result
    }

    /// Describe a table's schema. Metadata-only reads take no session lock.
    fn show_table(&self, name: &str) -> Result<QueryResult> {
        let database = self.current_database()?;
        let table = database.get_table(name)?;

        let mut text = format!("Table name: {}\n", name);
        for column in table.columns() {
            text.push_str(&format!("  {}\n", column.describe()));
        }
        Ok(QueryResult::message(text))
    }

    // ========== Persistence & recovery ==========

    fn persist_registry(&self) -> Result<()> {
        let path = self.manager_file();
        let mut file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        for name in self.database_names() {
            writeln!(file, "{}", name).map_err(|e| Error::io(&path, e))?;
        }
        Ok(())
    }

    /// Snapshot one database (rows + schemas) and truncate its log
    pub fn persist_database(&self, name: &str) -> Result<()> {
        let database = self.get_database(name)?;
        database.persist()?;
        StatementLog::new(database.log_path()).truncate()?;
        self.persist_registry()
    }

    /// Snapshot every database and shut the catalog down cleanly
    pub fn quit(&self) -> Result<()> {
        let databases: Vec<Arc<Database>> =
            self.databases.write().unwrap().values().cloned().collect();
        for database in databases {
            database.persist()?;
            StatementLog::new(database.log_path()).truncate()?;
        }
        self.persist_registry()
    }

    fn recover(&self) -> Result<()> {
        let path = self.manager_file();
        if !path.is_file() {
            return Ok(());
        }
        let file = File::open(&path).map_err(|e| Error::io(&path, e))?;
        let reader = BufReader::new(file);
        let mut names = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|e| Error::io(&path, e))?;
            let name = line.trim();
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }

        for name in names {
            info!(database = %name, "recovering database");
            self.create_database_if_not_exists(&name)?;
            self.replay_log(&name)?;
            // checkpoint so the next restart replays nothing
            self.persist_database(&name)?;
        }

        // recovery leaves no database selected
        *self.current.write().unwrap() = None;
        Ok(())
    }

    /// Re-execute a database's logged statements under a synthetic session
    /// whose id is strictly greater than every live session id.
    fn replay_log(&self, name: &str) -> Result<()> {
        let database = self.get_database(name)?;
        let log = StatementLog::new(database.log_path());
        let statements = log.read_all()?;
        if statements.is_empty() {
            return Ok(());
        }

        let session = {
            let mut sessions = self.sessions.lock().unwrap();
            let id = sessions.fresh_id();
            sessions.register(id);
            id
        };
        self.switch_database(name)?;
        info!(database = %name, statements = statements.len(), session, "replaying statement log");

        for statement in statements {
            // a DuplicateKey or DuplicateTable here means the change was
            // already durable before the log was truncated
            if let Err(e) = self.apply(statement, session) {
                warn!(database = %name, error = %e, "replayed statement rejected, skipping");
            }
        }
        self.close_session(session);
        Ok(())
    }
}

/// Snapshot the rows matching an optional textual equality filter
fn matching_rows(table: &Table, filter: Option<&FilterPredicate>) -> Result<Vec<Row>> {
    let target = match filter {
        Some(predicate) => Some((column_position(table, &predicate.column)?, predicate)),
        None => None,
    };
    let rows = table
        .scan()
        .filter(|row| match target {
            Some((index, predicate)) => row.cells()[index].to_string() == predicate.literal,
            None => true,
        })
        .collect();
    Ok(rows)
}

/// Resolve a bare or `table.column` qualified name against one table
fn column_position(table: &Table, name: &str) -> Result<usize> {
    let column_name = match name.split_once('.') {
        Some((qualifier, column)) if qualifier == table.name() => column,
        Some(_) => return Err(Error::ColumnNotFound(name.to_string())),
        None => name,
    };
    table
        .columns()
        .iter()
        .position(|c| c.name == column_name)
        .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, ColumnType};
    use crate::command::ResultColumns;

    fn user_columns() -> Vec<Column> {
        vec![
            Column::new("id", ColumnType::Int).primary(true),
            Column::new("name", ColumnType::Str).max_length(10),
        ]
    }

    fn user_row(id: i32, name: &str) -> Row {
        Row::new(vec![Cell::Int(id), Cell::Str(name.into())])
    }

    fn open_with_users(dir: &std::path::Path) -> Manager {
        let manager = Manager::open(dir).unwrap();
        let result = manager.execute(
            Statement::CreateDatabase {
                name: "school".into(),
            },
            1,
        );
        assert!(result.message.unwrap().contains("Created"));
        manager.execute(
            Statement::CreateTable {
                name: "users".into(),
                columns: user_columns(),
            },
            1,
        );
        manager
    }

    #[test]
    fn test_insert_and_select_flow() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_with_users(dir.path());

        let result = manager.execute(
            Statement::Insert {
                table: "users".into(),
                rows: vec![user_row(1, "a"), user_row(2, "b")],
            },
            1,
        );
        assert_eq!(result.message.unwrap(), "Inserted 2 rows into users.");

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
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn test_insert_batch_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_with_users(dir.path());

        let result = manager.execute(
            Statement::Insert {
                table: "users".into(),
                rows: vec![user_row(1, "a"), user_row(1, "dup")],
            },
            1,
        );
        assert!(result.message.unwrap().contains("Duplicate"));

        let table = manager
            .get_database("school")
            .unwrap()
            .get_table("users")
            .unwrap();
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn test_busy_table_yields_retry_message() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_with_users(dir.path());

        manager.execute(
            Statement::Insert {
                table: "users".into(),
                rows: vec![user_row(1, "a")],
            },
            1,
        );

        // session 1 still holds its exclusive lock
        let result = manager.execute(
            Statement::Insert {
                table: "users".into(),
                rows: vec![user_row(2, "b")],
            },
            2,
        );
        assert_eq!(result.message.unwrap(), BUSY_MESSAGE);

        // closing the session releases the lock
        manager.close_session(1);
        let result = manager.execute(
            Statement::Insert {
                table: "users".into(),
                rows: vec![user_row(2, "b")],
            },
            2,
        );
        assert_eq!(result.message.unwrap(), "Inserted 1 rows into users.");
    }

    #[test]
    fn test_exclusive_bookkeeping() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_with_users(dir.path());

        manager.execute(
            Statement::Insert {
                table: "users".into(),
                rows: vec![user_row(1, "a")],
            },
            7,
        );
        assert_eq!(
            manager.session_exclusive_tables(7),
            vec![("school".to_string(), "users".to_string())]
        );

        manager.close_session(7);
        assert!(manager.session_exclusive_tables(7).is_empty());
        let table = manager
            .get_database("school")
            .unwrap()
            .get_table("users")
            .unwrap();
        assert_eq!(table.exclusive_holder(), None);
    }

    #[test]
    fn test_delete_and_update_with_filter() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_with_users(dir.path());

        manager.execute(
            Statement::Insert {
                table: "users".into(),
                rows: vec![user_row(1, "a"), user_row(2, "b"), user_row(3, "b")],
            },
            1,
        );

        let result = manager.execute(
            Statement::Update {
                table: "users".into(),
                column: "name".into(),
                value: Cell::Str("c".into()),
                filter: Some(FilterPredicate {
                    column: "id".into(),
                    literal: "1".into(),
                }),
            },
            1,
        );
        assert_eq!(result.message.unwrap(), "Updated 1 rows in users.");

        let result = manager.execute(
            Statement::Delete {
                table: "users".into(),
                filter: Some(FilterPredicate {
                    column: "name".into(),
                    literal: "b".into(),
                }),
            },
            1,
        );
        assert_eq!(result.message.unwrap(), "Deleted 2 rows from users.");

        let table = manager
            .get_database("school")
            .unwrap()
            .get_table("users")
            .unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(
            table.get(&Cell::Int(1)).unwrap().get(1),
            Some(&Cell::Str("c".into()))
        );
    }

    #[test]
    fn test_show_table_describes_schema() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_with_users(dir.path());

        let result = manager.execute(Statement::ShowTable { name: "users".into() }, 1);
        let text = result.message.unwrap();
        assert!(text.contains("id : INT PRIMARY KEY"));
        assert!(text.contains("name : STRING(10)"));
    }

    #[test]
    fn test_statement_without_database_selected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::open(dir.path()).unwrap();

        let result = manager.execute(
            Statement::Insert {
                table: "users".into(),
                rows: vec![user_row(1, "a")],
            },
            1,
        );
        assert_eq!(result.message.unwrap(), "No database selected");
    }
}

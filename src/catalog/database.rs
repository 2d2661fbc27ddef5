//! Database catalog
//!
//! A database owns a namespace of tables, persists their schemas, recovers
//! them at open time, and hosts the two-relation select executor. The table
//! map is guarded by a readers-writer lock: lookups take the read side,
//! create/drop take the write side, and so does the select pass, so a
//! concurrent drop can never be observed mid-scan.

use super::schema::Column;
use crate::command::{FilterPredicate, JoinPredicate, ResultColumns};
use crate::error::{Error, Result};
use crate::executor::{self, QueryResult, QueryTable};
use crate::storage::table::META_EXT;
use crate::storage::Table;
use indexmap::IndexMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// A named collection of tables
#[derive(Debug)]
pub struct Database {
    name: String,
    tables: RwLock<IndexMap<String, Arc<Table>>>,
    dir: PathBuf,
}

impl Database {
    /// Open (or create) a database directory and recover its tables
    pub fn open(name: impl Into<String>, data_dir: impl AsRef<Path>) -> Result<Self> {
        let name = name.into();
        let dir = data_dir.as_ref().join(&name);
        let database = Self {
            name,
            tables: RwLock::new(IndexMap::new()),
            dir,
        };
        let tables_dir = database.tables_dir();
        fs::create_dir_all(&tables_dir).map_err(|e| Error::io(&tables_dir, e))?;
        database.recover();
        Ok(database)
    }

    /// Get the database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the per-table schema and row files
    pub fn tables_dir(&self) -> PathBuf {
        self.dir.join("tables")
    }

    /// Path of this database's statement log
    pub fn log_path(&self) -> PathBuf {
        self.dir.join("log")
    }

    /// Create a table and persist its schema immediately.
    ///
    /// Rows persist separately, via `persist` or the statement log.
    pub fn create_table(&self, name: &str, columns: Vec<Column>) -> Result<()> {
        let mut tables = self.tables.write().unwrap();
        if tables.contains_key(name) {
            return Err(Error::DuplicateTable(name.to_string()));
        }
        let table = Table::create(name, columns, self.tables_dir())?;
        self.persist_schema(&table)?;
        tables.insert(name.to_string(), Arc::new(table));
        Ok(())
    }

    /// Look up a table by name
    pub fn get_table(&self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Names of all tables, in listing order
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().unwrap().keys().cloned().collect()
    }

    /// Drop a table and remove its files
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let mut tables = self.tables.write().unwrap();
        let table = tables
            .shift_remove(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
        table.remove_files()?;
        Ok(())
    }

    /// Drop every table and delete the database directory
    pub fn drop_database(&self) -> Result<()> {
        let mut tables = self.tables.write().unwrap();
        for table in tables.values() {
            table.remove_files()?;
        }
        tables.clear();
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        }
        Ok(())
    }

    /// Persist every table's rows and schema (the full-state snapshot)
    pub fn persist(&self) -> Result<()> {
        let tables = self.tables.write().unwrap();
        for table in tables.values() {
            table.persist()?;
            self.persist_schema(table)?;
        }
        Ok(())
    }

    /// Evaluate a select over the named tables.
    ///
    /// Holds the table-map write lock for the whole pass; the session-lock
    /// protocol around it belongs to the statement layer.
    pub fn select(
        &self,
        table_names: &[String],
        columns: &ResultColumns,
        join: Option<&JoinPredicate>,
        filter: Option<&FilterPredicate>,
    ) -> Result<QueryResult> {
        let tables = self.tables.write().unwrap();
        let mut query_tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            let table = tables
                .get(name)
                .ok_or_else(|| Error::TableNotFound(name.clone()))?;
            query_tables.push(QueryTable::from_table(table));
        }
        Ok(executor::select(&query_tables, columns, join, filter))
    }

    fn persist_schema(&self, table: &Table) -> Result<()> {
        let path = table.meta_path();
        let mut file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        for column in table.columns() {
            let line = serde_json::to_string(column)
                .map_err(|e| Error::StorageIo(format!("{}: {}", path.display(), e)))?;
            writeln!(file, "{}", line).map_err(|e| Error::io(&path, e))?;
        }
        Ok(())
    }

    fn read_schema(path: &Path) -> Result<Vec<Column>> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let reader = BufReader::new(file);
        let mut columns = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|e| Error::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let column = serde_json::from_str(&line)
                .map_err(|e| Error::StorageIo(format!("{}: {}", path.display(), e)))?;
            columns.push(column);
        }
        Ok(columns)
    }

    /// Rebuild every table from its schema file and row stream.
    ///
    /// Recovery is lenient: a table that fails to come back is skipped with
    /// a warning, because a partially recovered catalog beats none at all.
    fn recover(&self) {
        let dir = self.tables_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        let mut tables = self.tables.write().unwrap();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }
            let Some(table_name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };
            match Self::read_schema(&path)
                .and_then(|columns| Table::open(&table_name, columns, &dir))
            {
                Ok(table) => {
                    tables.insert(table_name, Arc::new(table));
                }
                Err(e) => {
                    warn!(database = %self.name, table = %table_name, error = %e,
                        "skipping unrecoverable table");
                }
            }
        }
        if !tables.is_empty() {
            tables.sort_keys();
            info!(database = %self.name, tables = tables.len(), "recovered catalog");
        }
    }
}

//! Indexed table storage
//!
//! A table owns its column schema and an ordered primary-key index that is
//! the sole storage for rows. Schema validation runs on every mutating call,
//! not at row construction: rows are plain value bags crossing the catalog
//! boundary, so the table is the backstop against a malformed statement.
//!
//! Two lock layers coexist. The structural `RwLock` keeps the in-memory
//! index consistent under concurrent calls; the session `LockState` models
//! statement-level shared/exclusive table locks on top of it.

use super::cell::Cell;
use super::codec;
use super::locks::{ExclusiveGrant, LockState};
use super::row::Row;
use crate::catalog::Column;
use crate::error::{Error, Result};
use crate::session::SessionId;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::ops::Bound;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

/// File extension of a table's schema listing
pub(crate) const META_EXT: &str = "meta";
/// File extension of a table's binary row stream
pub(crate) const ROWS_EXT: &str = "rows";

/// A table: schema, ordered primary-key index, and lock state
#[derive(Debug)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    primary_index: usize,
    index: RwLock<BTreeMap<Cell, Row>>,
    locks: LockState,
    dir: PathBuf,
}

impl Table {
    /// Create an empty table.
    ///
    /// Fails with `SchemaError` unless exactly one column is declared
    /// primary, or when two columns share a name.
    pub fn create(
        name: impl Into<String>,
        columns: Vec<Column>,
        dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let name = name.into();
        let primary_index = validate_columns(&name, &columns)?;
        Ok(Self {
            name,
            columns,
            primary_index,
            index: RwLock::new(BTreeMap::new()),
            locks: LockState::new(),
            dir: dir.into(),
        })
    }

    /// Open a table and recover its rows from the row-stream file.
    ///
    /// A missing file means an empty table; an unreadable one is a
    /// `StorageIo` error the database-level recovery treats leniently.
    pub fn open(
        name: impl Into<String>,
        columns: Vec<Column>,
        dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let table = Self::create(name, columns, dir)?;
        table.recover()?;
        Ok(table)
    }

    fn recover(&self) -> Result<()> {
        let path = self.rows_path();
        if !path.exists() {
            return Ok(());
        }
        let file = File::open(&path).map_err(|e| Error::io(&path, e))?;
        let mut reader = BufReader::new(file);
        let mut index = self.index.write().unwrap();
        while let Some(row) = codec::read_row(&mut reader).map_err(|e| Error::io(&path, e))? {
            let key = row
                .get(self.primary_index)
                .cloned()
                .ok_or_else(|| Error::StorageIo(format!("{}: row too short", path.display())))?;
            index.insert(key, row);
        }
        debug!(table = %self.name, rows = index.len(), "recovered row stream");
        Ok(())
    }

    /// Get table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the ordered column list
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Position of the primary-key column
    pub fn primary_index(&self) -> usize {
        self.primary_index
    }

    /// Number of stored rows
    pub fn row_count(&self) -> usize {
        self.index.read().unwrap().len()
    }

    // ========== Session locks ==========

    /// Try to take a shared lock for the session
    pub fn try_lock_shared(&self, session: SessionId) -> bool {
        self.locks.try_acquire_shared(session)
    }

    /// Release the session's shared lock
    pub fn unlock_shared(&self, session: SessionId) {
        self.locks.release_shared(session);
    }

    /// Try to take the exclusive lock for the session
    pub fn try_lock_exclusive(&self, session: SessionId) -> ExclusiveGrant {
        self.locks.try_acquire_exclusive(session)
    }

    /// Release the session's exclusive lock
    pub fn unlock_exclusive(&self, session: SessionId) {
        self.locks.release_exclusive(session);
    }

    /// The session holding the exclusive lock, if any
    pub fn exclusive_holder(&self) -> Option<SessionId> {
        self.locks.exclusive_holder()
    }

    /// Sessions holding shared locks
    pub fn shared_holders(&self) -> Vec<SessionId> {
        self.locks.shared_holders()
    }

    // ========== Row operations ==========

    /// Check a row against the schema: shape, per-column type, nullability
    /// and string length.
    pub fn validate_row(&self, row: &Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::SchemaMismatch(format!(
                "table '{}' has {} columns, row has {}",
                self.name,
                self.columns.len(),
                row.len()
            )));
        }
        for (cell, column) in row.cells().iter().zip(self.columns.iter()) {
            match cell.column_type() {
                None => {
                    if column.not_null {
                        return Err(Error::NullConstraintViolation(column.name.clone()));
                    }
                }
                Some(cell_type) => {
                    if cell_type != column.column_type {
                        return Err(Error::SchemaMismatch(format!(
                            "column '{}' is {}, value is {}",
                            column.name, column.column_type, cell_type
                        )));
                    }
                    if let Cell::Str(text) = cell {
                        if text.chars().count() > column.max_length {
                            return Err(Error::ValueTooLong(
                                column.name.clone(),
                                column.max_length,
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Point lookup by primary-key cell
    pub fn get(&self, key: &Cell) -> Option<Row> {
        self.index.read().unwrap().get(key).cloned()
    }

    /// Check whether a primary-key cell is present
    pub fn contains_key(&self, key: &Cell) -> bool {
        self.index.read().unwrap().contains_key(key)
    }

    /// Insert a row; fails with `DuplicateKey` if its key is taken
    pub fn insert(&self, row: Row) -> Result<()> {
        self.validate_row(&row)?;
        let key = row.cells()[self.primary_index].clone();
        let mut index = self.index.write().unwrap();
        if index.contains_key(&key) {
            return Err(Error::DuplicateKey(self.name.clone()));
        }
        index.insert(key, row);
        Ok(())
    }

    /// Delete a row; fails with `KeyNotFound` if its key is absent
    pub fn delete(&self, row: &Row) -> Result<()> {
        self.validate_row(row)?;
        let key = &row.cells()[self.primary_index];
        let mut index = self.index.write().unwrap();
        if index.remove(key).is_none() {
            return Err(Error::KeyNotFound(self.name.clone()));
        }
        Ok(())
    }

    /// Replace the row at `old_key` with `new_row` in one write-guarded
    /// step. A key change is delete+insert, but readers blocked on the
    /// write lock can never observe the intermediate state.
    pub fn update(&self, old_key: &Cell, new_row: Row) -> Result<()> {
        self.validate_row(&new_row)?;
        let new_key = new_row.cells()[self.primary_index].clone();
        let mut index = self.index.write().unwrap();
        if !index.contains_key(old_key) {
            return Err(Error::KeyNotFound(self.name.clone()));
        }
        if new_key != *old_key && index.contains_key(&new_key) {
            return Err(Error::DuplicateKey(self.name.clone()));
        }
        index.remove(old_key);
        index.insert(new_key, new_row);
        Ok(())
    }

    /// Scan all rows in primary-key order.
    ///
    /// The scan holds the index read guard for its lifetime: writers are
    /// excluded until it is dropped, so an open scan never observes a
    /// concurrent mutation.
    pub fn scan(&self) -> TableScan<'_> {
        TableScan {
            guard: self.index.read().unwrap(),
            cursor: None,
        }
    }

    // ========== Persistence ==========

    /// Path of the row-stream file
    pub fn rows_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, ROWS_EXT))
    }

    /// Path of the schema listing file
    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, META_EXT))
    }

    /// Write the full row set out as a binary row stream.
    ///
    /// Holds only the read lock: the statement layer guarantees no
    /// concurrent writer via its exclusive session lock. I/O errors here
    /// are fatal, unlike during recovery.
    pub fn persist(&self) -> Result<()> {
        let index = self.index.read().unwrap();
        fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let path = self.rows_path();
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        for row in index.values() {
            codec::write_row(&mut writer, row).map_err(|e| Error::io(&path, e))?;
        }
        writer.flush().map_err(|e| Error::io(&path, e))?;
        debug!(table = %self.name, rows = index.len(), "persisted row stream");
        Ok(())
    }

    /// Delete the table's schema and row files
    pub fn remove_files(&self) -> Result<()> {
        let _index = self.index.write().unwrap();
        for path in [self.meta_path(), self.rows_path()] {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
            }
        }
        Ok(())
    }
}

fn validate_columns(table: &str, columns: &[Column]) -> Result<usize> {
    let mut primary = None;
    for (position, column) in columns.iter().enumerate() {
        if columns[..position].iter().any(|c| c.name == column.name) {
            return Err(Error::SchemaError(format!(
                "table '{}' declares column '{}' twice",
                table, column.name
            )));
        }
        if column.primary {
            if primary.is_some() {
                return Err(Error::SchemaError(format!(
                    "table '{}' declares more than one primary key",
                    table
                )));
            }
            primary = Some(position);
        }
    }
    primary.ok_or_else(|| Error::SchemaError(format!("table '{}' declares no primary key", table)))
}

/// Lazy, restartable scan over a table's rows in primary-key order
pub struct TableScan<'a> {
    guard: RwLockReadGuard<'a, BTreeMap<Cell, Row>>,
    cursor: Option<Cell>,
}

impl TableScan<'_> {
    /// Restart the scan from the first row
    pub fn rewind(&mut self) {
        self.cursor = None;
    }
}

impl Iterator for TableScan<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let next = {
            let mut range = match &self.cursor {
                None => self.guard.range::<Cell, _>(..),
                Some(last) => self.guard.range((Bound::Excluded(last), Bound::Unbounded)),
            };
            range.next().map(|(key, row)| (key.clone(), row.clone()))
        };
        let (key, row) = next?;
        self.cursor = Some(key);
        Some(row)
    }
}

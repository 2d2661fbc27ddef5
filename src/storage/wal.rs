//! Statement log
//!
//! Append-only per-database record of successfully applied mutating
//! statements, one JSON-serialized statement per line. The log is replayed
//! at database open to reconstruct everything since the last snapshot, and
//! truncated whenever a full-state snapshot makes its history redundant.

use crate::command::Statement;
use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Append-only log of applied statements for one database
#[derive(Debug)]
pub struct StatementLog {
    path: PathBuf,
}

impl StatementLog {
    /// Create a handle on a log file; the file itself is created on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the underlying log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one statement. Called only after the statement succeeded:
    /// replay must never re-apply an operation that did not commit.
    pub fn append(&self, statement: &Statement) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::io(&self.path, e))?;
        let line = serde_json::to_string(statement)
            .map_err(|e| Error::StorageIo(format!("{}: {}", self.path.display(), e)))?;
        writeln!(file, "{}", line).map_err(|e| Error::io(&self.path, e))?;
        Ok(())
    }

    /// Read every logged statement in append order
    pub fn read_all(&self) -> Result<Vec<Statement>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let reader = BufReader::new(file);
        let mut statements = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|e| Error::io(&self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let statement = serde_json::from_str(&line)
                .map_err(|e| Error::StorageIo(format!("{}: {}", self.path.display(), e)))?;
            statements.push(statement);
        }
        Ok(statements)
    }

    /// Drop the log's history after a full-state snapshot
    pub fn truncate(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| Error::io(&self.path, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Cell, Row};

    fn sample_statement(key: i32) -> Statement {
        Statement::Insert {
            table: "t".into(),
            rows: vec![Row::new(vec![Cell::Int(key), Cell::Str("v".into())])],
        }
    }

    #[test]
    fn test_append_and_read_all() {
        let dir = tempfile::tempdir().unwrap();
        let log = StatementLog::new(dir.path().join("log"));

        assert!(log.read_all().unwrap().is_empty());

        log.append(&sample_statement(1)).unwrap();
        log.append(&sample_statement(2)).unwrap();

        let statements = log.read_all().unwrap();
        assert_eq!(statements, vec![sample_statement(1), sample_statement(2)]);
    }

    #[test]
    fn test_truncate_clears_history() {
        let dir = tempfile::tempdir().unwrap();
        let log = StatementLog::new(dir.path().join("log"));

        log.append(&sample_statement(1)).unwrap();
        log.truncate().unwrap();
        assert!(log.read_all().unwrap().is_empty());

        // truncating an absent log is fine
        log.truncate().unwrap();
    }

    #[test]
    fn test_garbage_line_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        std::fs::write(&path, "not json\n").unwrap();

        let log = StatementLog::new(&path);
        assert!(matches!(log.read_all(), Err(Error::StorageIo(_))));
    }
}

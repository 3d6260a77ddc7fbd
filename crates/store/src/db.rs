use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use duckdb::Connection;
use serde::{Deserialize, Serialize};
use triage_core::error::{Result, TriageError};
use triage_core::model::document::{DOCUMENTATION, TELEMETRY};

use crate::schema::SCHEMA_SQL;

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub db_path: String,
    pub db_size_bytes: u64,
    pub chunk_count: usize,
    pub telemetry_chunks: usize,
    pub documentation_chunks: usize,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TriageError::Io(format!("failed to create db dir: {e}")))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| TriageError::Store(format!("failed to open duckdb: {e}")))?;
        conn.execute_batch("PRAGMA threads=4;")
            .map_err(|e| TriageError::Store(format!("failed to set pragmas: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| TriageError::Store(format!("failed to initialize schema: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.display().to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TriageError::Store(format!("failed to open in-memory db: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| TriageError::Store(format!("failed to initialize schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: ":memory:".to_string(),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TriageError::Store("store mutex poisoned".to_string()))
    }

    pub fn status(&self) -> Result<IndexStatus> {
        let conn = self.conn()?;

        let chunk_count = scalar_usize(&conn, "SELECT COUNT(*) FROM chunks", None)?;
        let telemetry_chunks = scalar_usize(
            &conn,
            "SELECT COUNT(*) FROM chunks WHERE doc_type = ?",
            Some(TELEMETRY),
        )?;
        let documentation_chunks = scalar_usize(
            &conn,
            "SELECT COUNT(*) FROM chunks WHERE doc_type = ?",
            Some(DOCUMENTATION),
        )?;

        let db_size_bytes = if self.db_path == ":memory:" {
            0
        } else {
            fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(IndexStatus {
            db_path: self.db_path.clone(),
            db_size_bytes,
            chunk_count,
            telemetry_chunks,
            documentation_chunks,
        })
    }
}

fn scalar_usize(conn: &Connection, sql: &str, arg: Option<&str>) -> Result<usize> {
    let res = match arg {
        Some(arg) => conn.query_row(sql, [arg], |row| row.get::<_, i64>(0)),
        None => conn.query_row(sql, [], |row| row.get::<_, i64>(0)),
    };
    res.map(|v| v.max(0) as usize)
        .map_err(|e| TriageError::Store(format!("query failed: {e}")))
}

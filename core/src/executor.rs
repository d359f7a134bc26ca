use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

use crate::error::ExecutionError;

// ---------------------------------------------------------------------------
// Result set
// ---------------------------------------------------------------------------

/// One SQLite value as read from a result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for Scalar {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Scalar::Null,
            ValueRef::Integer(i) => Scalar::Integer(i),
            ValueRef::Real(f) => Scalar::Real(f),
            ValueRef::Text(t) => Scalar::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Scalar::Blob(b.to_vec()),
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => f.write_str("NULL"),
            Scalar::Integer(i) => write!(f, "{i}"),
            Scalar::Real(r) => write!(f, "{r}"),
            Scalar::Text(t) => f.write_str(t),
            Scalar::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

/// Rows produced by one accepted query, in the order the engine returned
/// them. Never mutated after execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column/value pairs of row `index`, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<(&str, &Scalar)>> {
        let row = self.rows.get(index)?;
        Some(
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect(),
        )
    }

    /// Every row as ordered column/value pairs.
    pub fn rows_as_maps(&self) -> Vec<Vec<(&str, &Scalar)>> {
        (0..self.rows.len()).filter_map(|i| self.row(i)).collect()
    }

    /// Render row `index` as a JSON object, preserving column order.
    pub fn row_json(&self, index: usize) -> Option<String> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .row(index)?
            .into_iter()
            .map(|(column, value)| {
                let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                (column.to_string(), value)
            })
            .collect();
        Some(serde_json::Value::Object(object).to_string())
    }
}

// ---------------------------------------------------------------------------
// Executors
// ---------------------------------------------------------------------------

/// Runs a judged query and returns its rows. Implementations must not grant
/// write access.
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, sql: &str) -> Result<ResultSet, ExecutionError>;
}

/// Executes against a SQLite file through a read-only connection opened for
/// each call and closed before returning, on success and on error alike.
#[derive(Debug, Clone)]
pub struct SqliteExecutor {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteExecutor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_millis(5000),
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, ExecutionError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch("PRAGMA query_only = ON;")?;
        Ok(conn)
    }
}

impl QueryExecutor for SqliteExecutor {
    fn execute(&self, sql: &str) -> Result<ResultSet, ExecutionError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(Scalar::from(row.get_ref(i)?));
            }
            rows.push(values);
        }

        tracing::debug!(rows = rows.len(), columns = width, "query executed");
        Ok(ResultSet { columns, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_json_keeps_column_order() {
        let rs = ResultSet {
            columns: vec!["z".into(), "a".into()],
            rows: vec![vec![Scalar::Integer(1), Scalar::Text("x".into())]],
        };
        assert_eq!(rs.row_json(0).unwrap(), r#"{"z":1,"a":"x"}"#);
        assert!(rs.row_json(1).is_none());
        assert_eq!(
            rs.rows_as_maps(),
            vec![vec![("z", &Scalar::Integer(1)), ("a", &Scalar::Text("x".into()))]]
        );
    }
}

//! Connection layer.
//!
//! The query engine only needs to run a SELECT and read rows as ordered
//! column/value pairs. [`SqliteConnection`] implements that on top of
//! `rusqlite`.

use std::path::Path;

use rusqlite::types::ValueRef;

use super::error::ConnectionError;
use crate::model::{Row, Value};
use crate::sql::Dialect;

/// Rows of a statement, in order.
pub type RowIter<'c> = Box<dyn Iterator<Item = Result<Row, ConnectionError>> + 'c>;

/// Executes SELECT statements.
pub trait Connection {
    /// Dialect statements are rendered in for this connection.
    fn dialect(&self) -> Dialect;

    fn query(&self, sql: &str) -> Result<RowIter<'_>, ConnectionError>;
}

/// A SQLite database.
///
/// Rows are read eagerly when the statement runs.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConnectionError> {
        Ok(Self {
            conn: rusqlite::Connection::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, ConnectionError> {
        Ok(Self {
            conn: rusqlite::Connection::open_in_memory()?,
        })
    }

    /// Run statements that return no rows (schema setup, fixtures).
    pub fn execute_batch(&self, sql: &str) -> Result<(), ConnectionError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str) -> Result<RowIter<'_>, ConnectionError> {
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut out = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Row::new();
            for (i, name) in names.iter().enumerate() {
                let value = match row.get_ref(i)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(n) => Value::Int(n),
                    ValueRef::Real(f) => Value::Float(f),
                    ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
                    ValueRef::Blob(_) => {
                        return Err(ConnectionError::UnsupportedType {
                            column: name.clone(),
                        })
                    }
                };
                values.push(name.as_str(), value);
            }
            out.push(Ok(values));
        }
        Ok(Box::new(out.into_iter()))
    }
}

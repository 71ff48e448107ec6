//! Driver abstraction and result types.
//!
//! A [`Driver`] turns a [`ConnectionConfig`] into a live [`Session`]. The
//! registry and the executor only ever talk to these traits, which keeps
//! the cell pipeline independent of the wire protocol.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::cell::Cell;
use crate::db::error::DbError;

/// Connection settings for one logical connection name.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Logical name the service refers to.
    pub name: String,
    pub host: String,
    pub user: String,
    pub password: String,
    /// Database (schema) name.
    pub database: String,
    pub port: u16,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("port", &self.port)
            .finish()
    }
}

/// Statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Time(DateTime<Utc>),
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::Bool(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Param::Int(v.into())
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int(v)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Float(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl From<Vec<u8>> for Param {
    fn from(v: Vec<u8>) -> Self {
        Param::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Param {
    fn from(v: DateTime<Utc>) -> Self {
        Param::Time(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Param::Null)
    }
}

/// One row: cells in column order.
pub type Row = Vec<Cell>;

/// One result set of a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What running a statement produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Row-returning statement; one entry per result set.
    Rows(Vec<ResultSet>),
    /// Any other statement.
    Affected(u64),
}

impl QueryOutcome {
    /// Rows for row statements, affected rows otherwise.
    pub fn count(&self) -> u64 {
        match self {
            QueryOutcome::Rows(sets) => sets.iter().map(|s| s.rows.len() as u64).sum(),
            QueryOutcome::Affected(n) => *n,
        }
    }

    /// All rows of all result sets, in order.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryOutcome::Rows(sets) => sets.into_iter().flat_map(|s| s.rows).collect(),
            QueryOutcome::Affected(_) => Vec::new(),
        }
    }
}

/// A live database session. Must be usable from many tasks at once.
#[async_trait]
pub trait Session: Send + Sync {
    /// Run one statement (or a batch when `params` is empty).
    async fn run(&self, statement: &str, params: &[Param]) -> Result<QueryOutcome, DbError>;

    /// Release the session. Further calls may fail.
    async fn close(&self) -> Result<(), DbError>;
}

/// Factory for sessions.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Session>, DbError>;
}

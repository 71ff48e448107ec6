//! Data-access errors.

use thiserror::Error;

/// Errors raised by the connection registry, the executor and drivers.
#[derive(Debug, Error)]
pub enum DbError {
    /// No configuration registered under the name.
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    /// The name is registered but no live session has been opened.
    #[error("connection not found: {0} is not open")]
    ConnectionNotOpen(String),

    /// Statement text was empty after trimming.
    #[error("empty statement")]
    EmptyStatement,

    /// The driver could not establish or verify a session.
    #[error("failed to open connection {name}: {reason}")]
    Open { name: String, reason: String },

    /// The statement was rejected or failed while running.
    #[error("statement failed: {0}")]
    Statement(String),

    /// A column could not be scanned into a cell.
    #[error("scan failed on column {column}: {reason}")]
    Scan { column: String, reason: String },

    /// A parameter could not be bound.
    #[error("cannot bind parameter {index}: {reason}")]
    Bind { index: usize, reason: String },
}

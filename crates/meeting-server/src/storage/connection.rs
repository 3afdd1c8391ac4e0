//! Driver-facing connection contract.

use common::Status;
use thiserror::Error;

/// Driver failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Unique-constraint violation.
    DuplicateEntry,
    /// The connection is broken and should be discarded.
    ConnectionLost,
    Other,
}

/// A failure reported by the concrete driver.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::DuplicateEntry,
            message: message.into(),
        }
    }

    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::ConnectionLost,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Other,
            message: message.into(),
        }
    }

    /// Map to the uniform status taxonomy.
    pub fn to_status(&self) -> Status {
        match self.kind {
            DriverErrorKind::DuplicateEntry => Status::already_exists("duplicate entry"),
            DriverErrorKind::ConnectionLost => {
                Status::unavailable(format!("connection lost: {}", self.message))
            }
            DriverErrorKind::Other => Status::internal(self.message.clone()),
        }
    }
}

/// One result row: column values in select order, `None` for SQL NULL.
pub type SqlRow = Vec<Option<String>>;

/// A live connection to the durable store.
///
/// Not thread-safe; a connection is used by one worker at a time, via the
/// pool's lease.
pub trait SqlConnection: Send {
    /// Run a statement; returns affected rows.
    fn execute(&mut self, sql: &str) -> Result<u64, DriverError>;

    /// Run a query; returns result rows.
    fn query(&mut self, sql: &str) -> Result<Vec<SqlRow>, DriverError>;

    /// Liveness probe, used when a lease returns to the pool.
    fn ping(&mut self) -> bool;

    fn set_autocommit(&mut self, enabled: bool) -> Result<(), DriverError>;

    fn commit(&mut self) -> Result<(), DriverError>;

    fn rollback(&mut self) -> Result<(), DriverError>;
}

/// Factory for connections, configured with the store's address and
/// credentials.
pub trait SqlConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn SqlConnection>, DriverError>;
}

/// Escape and single-quote a string value for statement interpolation.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\'' => quoted.push_str("\\'"),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\0' => quoted.push_str("\\0"),
            _ => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

pub(crate) fn row_str(row: &SqlRow, index: usize) -> String {
    row.get(index)
        .and_then(Clone::clone)
        .unwrap_or_default()
}

pub(crate) fn row_u64(row: &SqlRow, index: usize) -> u64 {
    row.get(index)
        .and_then(|field| field.as_deref())
        .and_then(|field| field.parse().ok())
        .unwrap_or(0)
}

pub(crate) fn row_i64(row: &SqlRow, index: usize) -> i64 {
    row.get(index)
        .and_then(|field| field.as_deref())
        .and_then(|field| field.parse().ok())
        .unwrap_or(0)
}

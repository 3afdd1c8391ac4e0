//! Coordination-service client contract.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordErrorKind {
    /// The backend is unreachable or the session is gone.
    ConnectionLoss,
    /// The addressed node does not exist.
    NoNode,
    Other,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CoordError {
    pub kind: CoordErrorKind,
    pub message: String,
}

impl CoordError {
    pub fn connection_loss(message: impl Into<String>) -> Self {
        Self {
            kind: CoordErrorKind::ConnectionLoss,
            message: message.into(),
        }
    }

    pub fn no_node(message: impl Into<String>) -> Self {
        Self {
            kind: CoordErrorKind::NoNode,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: CoordErrorKind::Other,
            message: message.into(),
        }
    }
}

/// Hierarchical coordination service.
///
/// Ephemeral nodes are owned by the client session and vanish with it;
/// `ensure_node` treats "already exists" as success, which makes
/// registration idempotent.
pub trait Coordinator: Send + Sync {
    /// Create the node if absent. Persistent or ephemeral per `ephemeral`.
    fn ensure_node(&self, path: &str, data: &str, ephemeral: bool) -> Result<(), CoordError>;

    fn delete_node(&self, path: &str) -> Result<(), CoordError>;

    /// Child names (not full paths) under `path`.
    fn children(&self, path: &str) -> Result<Vec<String>, CoordError>;
}

//! Transaction wrapper over a pooled connection.
//!
//! Begin acquires a lease and disables autocommit; the transaction rolls
//! back on drop unless committed.

use std::sync::Arc;

use common::{Result, Status};
use tracing::warn;

use super::connection::SqlConnection;
use super::pool::{ConnectionPool, Lease};

pub struct Transaction {
    lease: Lease,
    active: bool,
}

impl Transaction {
    /// Acquire a connection and open a transaction on it.
    pub fn begin(pool: &Arc<ConnectionPool>) -> Result<Self> {
        let mut lease = pool.acquire()?;
        lease
            .conn()
            .set_autocommit(false)
            .map_err(|e| e.to_status())?;
        Ok(Self {
            lease,
            active: true,
        })
    }

    /// The underlying connection, for running statements inside the
    /// transaction.
    pub fn conn(&mut self) -> &mut dyn SqlConnection {
        self.lease.conn()
    }

    /// Commit and restore autocommit.
    pub fn commit(mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.lease.conn().commit().map_err(|e| {
            self.active = false;
            let status: Status = e.to_status();
            status
        })?;
        let _ = self.lease.conn().set_autocommit(true);
        self.active = false;
        Ok(())
    }

    /// Roll back and restore autocommit.
    pub fn rollback(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        if let Err(e) = self.lease.conn().rollback() {
            warn!(target: "meeting.storage", error = %e, "rollback failed");
        }
        let _ = self.lease.conn().set_autocommit(true);
        self.active = false;
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.active {
            let _ = self.rollback();
        }
    }
}

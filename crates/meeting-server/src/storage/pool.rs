//! Fixed-capacity connection pool with RAII leases.
//!
//! Acquire takes an idle connection if present, creates one while under
//! capacity, and otherwise waits up to `acquire_timeout` for a return. A
//! returning connection is pinged; a broken one is discarded and the total
//! decremented so a replacement can be created.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{Result, Status};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::connection::{SqlConnection, SqlConnector};

#[derive(Debug, Clone)]
pub struct StorageOptions {
    pub pool_size: usize,
    pub acquire_timeout: Duration,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            pool_size: 8,
            acquire_timeout: Duration::from_millis(3000),
        }
    }
}

struct PoolState {
    idle: Vec<Box<dyn SqlConnection>>,
    total: usize,
}

/// Connection pool. Leases return their connection on drop.
pub struct ConnectionPool {
    connector: Box<dyn SqlConnector>,
    options: StorageOptions,
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl ConnectionPool {
    pub fn new(connector: Box<dyn SqlConnector>, options: StorageOptions) -> Arc<Self> {
        Arc::new(Self {
            connector,
            options,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                total: 0,
            }),
            returned: Condvar::new(),
        })
    }

    /// Borrow a connection.
    ///
    /// # Errors
    ///
    /// `Unavailable` when no connection could be created or freed within
    /// `acquire_timeout`.
    pub fn acquire(self: &Arc<Self>) -> Result<Lease> {
        let connection = {
            let mut state = self.state.lock();
            if let Some(connection) = state.idle.pop() {
                Some(connection)
            } else if state.total < self.options.pool_size {
                state.total += 1;
                drop(state);
                match self.connector.connect() {
                    Ok(connection) => Some(connection),
                    Err(e) => {
                        let mut state = self.state.lock();
                        state.total -= 1;
                        drop(state);
                        self.returned.notify_one();
                        warn!(target: "meeting.storage", error = %e, "connection create failed");
                        return Err(Status::unavailable(format!(
                            "failed to create connection: {e}"
                        )));
                    }
                }
            } else {
                let deadline = Instant::now() + self.options.acquire_timeout;
                loop {
                    if let Some(connection) = state.idle.pop() {
                        break Some(connection);
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Status::unavailable("acquire connection timeout"));
                    }
                    self.returned.wait_for(&mut state, deadline - now);
                }
            }
        };

        Ok(Lease {
            pool: Arc::clone(self),
            connection,
        })
    }

    fn give_back(&self, mut connection: Box<dyn SqlConnection>) {
        if !connection.ping() {
            // Broken connection: discard and free a capacity slot.
            let mut state = self.state.lock();
            state.total -= 1;
            drop(state);
            self.returned.notify_one();
            debug!(target: "meeting.storage", "discarded broken connection");
            return;
        }
        {
            let mut state = self.state.lock();
            state.idle.push(connection);
        }
        self.returned.notify_one();
    }

    /// Connections currently alive (idle + leased).
    pub fn total_connections(&self) -> usize {
        self.state.lock().total
    }
}

/// RAII handle on a pooled connection. Not thread-safe; do not share a
/// lease across workers.
pub struct Lease {
    pool: Arc<ConnectionPool>,
    connection: Option<Box<dyn SqlConnection>>,
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease").finish_non_exhaustive()
    }
}

impl Lease {
    pub fn conn(&mut self) -> &mut dyn SqlConnection {
        self.connection
            .as_mut()
            .map(AsMut::as_mut)
            .unwrap_or_else(|| unreachable!("lease used after return"))
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.give_back(connection);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::testing::{MockConnection, MockConnector, MockReply};
    use crate::storage::DriverError;
    use common::StatusCode;
    use std::sync::atomic::Ordering;
    use std::thread;

    fn options(pool_size: usize, timeout_ms: u64) -> StorageOptions {
        StorageOptions {
            pool_size,
            acquire_timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[test]
    fn test_acquire_creates_then_reuses() {
        let connector = MockConnector::new(vec![
            MockConnection::new(vec![]),
            MockConnection::new(vec![]),
        ]);
        let pool = ConnectionPool::new(Box::new(connector), options(2, 100));

        {
            let _lease = pool.acquire().unwrap();
            assert_eq!(pool.total_connections(), 1);
        }
        // Returned connection is reused, not recreated.
        let _lease = pool.acquire().unwrap();
        assert_eq!(pool.total_connections(), 1);
    }

    #[test]
    fn test_acquire_times_out_at_capacity() {
        let connector = MockConnector::new(vec![MockConnection::new(vec![])]);
        let pool = ConnectionPool::new(Box::new(connector), options(1, 50));

        let held = pool.acquire().unwrap();
        let err = pool.acquire().unwrap_err();
        assert_eq!(err.code(), StatusCode::Unavailable);
        drop(held);
    }

    #[test]
    fn test_waiter_gets_a_returned_connection() {
        let connector = MockConnector::new(vec![MockConnection::new(vec![])]);
        let pool = ConnectionPool::new(Box::new(connector), options(1, 2000));

        let held = pool.acquire().unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.acquire().map(|_| ()))
        };
        thread::sleep(Duration::from_millis(30));
        drop(held);
        waiter.join().unwrap().unwrap();
    }

    #[test]
    fn test_broken_connection_is_discarded_on_return() {
        let broken = MockConnection::new(vec![]);
        broken.healthy.store(false, Ordering::Relaxed);
        let connector = MockConnector::new(vec![broken, MockConnection::new(vec![])]);
        let pool = ConnectionPool::new(Box::new(connector), options(1, 100));

        {
            let _lease = pool.acquire().unwrap();
        }
        assert_eq!(pool.total_connections(), 0);

        // Capacity freed: a fresh connection can be created.
        let _lease = pool.acquire().unwrap();
        assert_eq!(pool.total_connections(), 1);
    }

    #[test]
    fn test_failed_create_frees_the_slot() {
        struct FailingConnector;
        impl crate::storage::SqlConnector for FailingConnector {
            fn connect(
                &self,
            ) -> std::result::Result<Box<dyn crate::storage::SqlConnection>, DriverError> {
                Err(DriverError::connection_lost("refused"))
            }
        }
        let pool = ConnectionPool::new(Box::new(FailingConnector), options(1, 50));
        assert_eq!(pool.acquire().unwrap_err().code(), StatusCode::Unavailable);
        assert_eq!(pool.total_connections(), 0);
    }

    #[test]
    fn test_lease_executes_through_connection() {
        let connection = MockConnection::new(vec![MockReply::Affected(1)]);
        let statements = Arc::clone(&connection.statements);
        let connector = MockConnector::new(vec![connection]);
        let pool = ConnectionPool::new(Box::new(connector), options(1, 100));

        let mut lease = pool.acquire().unwrap();
        assert_eq!(lease.conn().execute("UPDATE t SET x = 1").unwrap(), 1);
        drop(lease);
        assert_eq!(statements.lock().as_slice(), ["UPDATE t SET x = 1"]);
    }
}

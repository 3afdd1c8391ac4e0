//! Durable store binding.
//!
//! The wire driver is a collaborator behind [`SqlConnection`]; everything
//! above it - the fixed-capacity [`ConnectionPool`] with RAII leases, the
//! [`Transaction`] wrapper, and the SQL repositories - is driver-agnostic.
//! Statements are formatted with explicit escaping for string values;
//! driver errors map as: duplicate entry to `AlreadyExists`, zero affected
//! rows on update/delete to `NotFound`, anything else to `Internal`.

mod connection;
mod meeting_repository;
mod pool;
mod session_repository;
mod transaction;
mod user_repository;

pub use connection::{
    quote, DriverError, DriverErrorKind, SqlConnection, SqlConnector, SqlRow,
};
pub use meeting_repository::SqlMeetingRepository;
pub use pool::{ConnectionPool, Lease, StorageOptions};
pub use session_repository::SqlSessionRepository;
pub use transaction::Transaction;
pub use user_repository::SqlUserRepository;

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted connections for exercising the stack without a server.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::{DriverError, SqlConnection, SqlConnector, SqlRow};

    /// One scripted reply.
    pub enum MockReply {
        Affected(u64),
        Rows(Vec<SqlRow>),
        Fail(DriverError),
    }

    /// Connection that replays a script and records every statement.
    pub struct MockConnection {
        script: Mutex<VecDeque<MockReply>>,
        pub statements: Arc<Mutex<Vec<String>>>,
        pub healthy: Arc<AtomicBool>,
    }

    impl MockConnection {
        pub fn new(script: Vec<MockReply>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                statements: Arc::new(Mutex::new(Vec::new())),
                healthy: Arc::new(AtomicBool::new(true)),
            }
        }

        fn next(&self) -> MockReply {
            self.script
                .lock()
                .pop_front()
                .unwrap_or(MockReply::Affected(0))
        }
    }

    impl SqlConnection for MockConnection {
        fn execute(&mut self, sql: &str) -> Result<u64, DriverError> {
            self.statements.lock().push(sql.to_string());
            match self.next() {
                MockReply::Affected(n) => Ok(n),
                MockReply::Fail(e) => Err(e),
                MockReply::Rows(_) => Ok(0),
            }
        }

        fn query(&mut self, sql: &str) -> Result<Vec<SqlRow>, DriverError> {
            self.statements.lock().push(sql.to_string());
            match self.next() {
                MockReply::Rows(rows) => Ok(rows),
                MockReply::Fail(e) => Err(e),
                MockReply::Affected(_) => Ok(Vec::new()),
            }
        }

        fn ping(&mut self) -> bool {
            self.healthy.load(Ordering::Relaxed)
        }

        fn set_autocommit(&mut self, enabled: bool) -> Result<(), DriverError> {
            self.statements
                .lock()
                .push(format!("-- autocommit={}", i32::from(enabled)));
            Ok(())
        }

        fn commit(&mut self) -> Result<(), DriverError> {
            self.statements.lock().push("-- commit".to_string());
            Ok(())
        }

        fn rollback(&mut self) -> Result<(), DriverError> {
            self.statements.lock().push("-- rollback".to_string());
            Ok(())
        }
    }

    /// Connector handing out pre-built mock connections.
    pub struct MockConnector {
        connections: Mutex<VecDeque<MockConnection>>,
        pub connects: AtomicUsize,
    }

    impl MockConnector {
        pub fn new(connections: Vec<MockConnection>) -> Self {
            Self {
                connections: Mutex::new(connections.into()),
                connects: AtomicUsize::new(0),
            }
        }
    }

    impl SqlConnector for MockConnector {
        fn connect(&self) -> Result<Box<dyn SqlConnection>, DriverError> {
            self.connects.fetch_add(1, Ordering::Relaxed);
            match self.connections.lock().pop_front() {
                Some(connection) => Ok(Box::new(connection)),
                None => Err(DriverError::other("no more scripted connections")),
            }
        }
    }
}

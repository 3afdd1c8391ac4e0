//! SQL-backed session repository.

use std::sync::Arc;

use common::{Result, Status};

use crate::core::user::{SessionRecord, SessionRepository};

use super::connection::{quote, row_i64, row_str, row_u64};
use super::pool::ConnectionPool;

/// Sessions over the durable store, keyed by token.
pub struct SqlSessionRepository {
    pool: Arc<ConnectionPool>,
}

impl SqlSessionRepository {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }
}

impl SessionRepository for SqlSessionRepository {
    fn create_session(&self, record: &SessionRecord) -> Result<()> {
        let mut lease = self.pool.acquire()?;
        let sql = format!(
            "INSERT INTO sessions (token, user_id, user_uuid, expires_at) \
             VALUES ({}, {}, {}, FROM_UNIXTIME({}))",
            quote(&record.token),
            record.user_id,
            quote(&record.user_uuid),
            record.expires_at.max(1),
        );
        lease.conn().execute(&sql).map_err(|e| e.to_status())?;
        Ok(())
    }

    fn find_session(&self, token: &str) -> Result<SessionRecord> {
        let mut lease = self.pool.acquire()?;
        let sql = format!(
            "SELECT token, user_id, user_uuid, UNIX_TIMESTAMP(expires_at) \
             FROM sessions WHERE token = {} LIMIT 1",
            quote(token)
        );
        let rows = lease.conn().query(&sql).map_err(|e| e.to_status())?;
        let Some(row) = rows.first() else {
            return Err(Status::unauthenticated("invalid session token"));
        };
        Ok(SessionRecord {
            token: row_str(row, 0),
            user_id: row_u64(row, 1),
            user_uuid: row_str(row, 2),
            expires_at: row_i64(row, 3),
        })
    }

    fn delete_session(&self, token: &str) -> Result<()> {
        let mut lease = self.pool.acquire()?;
        let sql = format!("DELETE FROM sessions WHERE token = {}", quote(token));
        let affected = lease.conn().execute(&sql).map_err(|e| e.to_status())?;
        if affected == 0 {
            return Err(Status::not_found("session token not found"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::testing::{MockConnection, MockConnector, MockReply};
    use crate::storage::StorageOptions;
    use common::StatusCode;

    fn repo_with(replies: Vec<MockReply>) -> SqlSessionRepository {
        let pool = ConnectionPool::new(
            Box::new(MockConnector::new(vec![MockConnection::new(replies)])),
            StorageOptions::default(),
        );
        SqlSessionRepository::new(pool)
    }

    #[test]
    fn test_find_decodes_row() {
        let repo = repo_with(vec![MockReply::Rows(vec![vec![
            Some("tok".to_string()),
            Some("5".to_string()),
            Some("user_5".to_string()),
            Some("1900000000".to_string()),
        ]])]);
        let record = repo.find_session("tok").unwrap();
        assert_eq!(record.user_id, 5);
        assert_eq!(record.user_uuid, "user_5");
        assert_eq!(record.expires_at, 1_900_000_000);
    }

    #[test]
    fn test_unknown_token_is_unauthenticated() {
        let repo = repo_with(vec![MockReply::Rows(vec![])]);
        assert_eq!(
            repo.find_session("nope").unwrap_err().code(),
            StatusCode::Unauthenticated
        );
    }

    #[test]
    fn test_delete_zero_rows_is_not_found() {
        let repo = repo_with(vec![MockReply::Affected(0)]);
        assert_eq!(
            repo.delete_session("nope").unwrap_err().code(),
            StatusCode::NotFound
        );
    }

    #[test]
    fn test_delete_success() {
        let repo = repo_with(vec![MockReply::Affected(1)]);
        repo.delete_session("tok").unwrap();
    }
}

//! SQL-backed user repository.

use std::sync::Arc;

use common::{Result, Status};

use crate::core::user::{UserData, UserRepository};

use super::connection::{quote, row_i64, row_str, row_u64, SqlRow};
use super::pool::{ConnectionPool, Lease};

const USER_COLUMNS: &str = "id, user_uuid, username, display_name, email, password_hash, salt, \
     UNIX_TIMESTAMP(created_at), IFNULL(UNIX_TIMESTAMP(last_login_at), 0)";

/// Users over the durable store.
pub struct SqlUserRepository {
    pool: Arc<ConnectionPool>,
}

impl SqlUserRepository {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    fn query_single(lease: &mut Lease, sql: &str) -> Result<UserData> {
        let rows = lease.conn().query(sql).map_err(|e| e.to_status())?;
        let Some(row) = rows.first() else {
            return Err(Status::not_found("user not found"));
        };
        Ok(decode_user(row))
    }
}

fn decode_user(row: &SqlRow) -> UserData {
    let user_name = row_str(row, 2);
    let display_name = row_str(row, 3);
    UserData {
        numeric_id: row_u64(row, 0),
        user_id: row_str(row, 1),
        display_name: if display_name.is_empty() {
            user_name.clone()
        } else {
            display_name
        },
        user_name,
        email: row_str(row, 4),
        password_hash: row_str(row, 5),
        salt: row_str(row, 6),
        created_at: row_i64(row, 7),
        last_login: row_i64(row, 8),
    }
}

impl UserRepository for SqlUserRepository {
    fn create_user(&self, data: &UserData) -> Result<()> {
        let mut lease = self.pool.acquire()?;
        let sql = format!(
            "INSERT INTO users (user_uuid, username, display_name, email, password_hash, salt, status) \
             VALUES ({}, {}, {}, {}, {}, {}, 1)",
            quote(&data.user_id),
            quote(&data.user_name),
            quote(if data.display_name.is_empty() {
                &data.user_name
            } else {
                &data.display_name
            }),
            quote(&data.email),
            quote(&data.password_hash),
            quote(&data.salt),
        );
        lease.conn().execute(&sql).map_err(|e| e.to_status())?;
        Ok(())
    }

    fn find_by_user_name(&self, user_name: &str) -> Result<UserData> {
        let mut lease = self.pool.acquire()?;
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = {} LIMIT 1",
            quote(user_name)
        );
        Self::query_single(&mut lease, &sql)
    }

    fn find_by_id(&self, user_id: &str) -> Result<UserData> {
        let mut lease = self.pool.acquire()?;
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_uuid = {} LIMIT 1",
            quote(user_id)
        );
        Self::query_single(&mut lease, &sql)
    }

    fn update_last_login(&self, user_id: &str, last_login: i64) -> Result<()> {
        let mut lease = self.pool.acquire()?;
        let sql = format!(
            "UPDATE users SET last_login_at = FROM_UNIXTIME({last_login}) WHERE user_uuid = {}",
            quote(user_id)
        );
        let affected = lease.conn().execute(&sql).map_err(|e| e.to_status())?;
        if affected == 0 {
            return Err(Status::not_found("user not found"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::testing::{MockConnection, MockConnector, MockReply};
    use crate::storage::{DriverError, StorageOptions};
    use common::StatusCode;

    fn repo_with(replies: Vec<MockReply>) -> (SqlUserRepository, Arc<parking_lot::Mutex<Vec<String>>>) {
        let connection = MockConnection::new(replies);
        let statements = Arc::clone(&connection.statements);
        let pool = ConnectionPool::new(
            Box::new(MockConnector::new(vec![connection])),
            StorageOptions::default(),
        );
        (SqlUserRepository::new(pool), statements)
    }

    fn user_row() -> SqlRow {
        vec![
            Some("12".to_string()),
            Some("user_abc".to_string()),
            Some("alice".to_string()),
            Some("Alice".to_string()),
            Some("alice@x".to_string()),
            Some("hash".to_string()),
            Some("salt".to_string()),
            Some("1700000000".to_string()),
            None,
        ]
    }

    #[test]
    fn test_create_escapes_values() {
        let (repo, statements) = repo_with(vec![MockReply::Affected(1)]);
        let user = UserData {
            user_id: "user_abc".to_string(),
            user_name: "o'brien".to_string(),
            email: "o@x".to_string(),
            password_hash: "hash".to_string(),
            salt: "salt".to_string(),
            ..UserData::default()
        };
        repo.create_user(&user).unwrap();
        let sql = statements.lock()[0].clone();
        assert!(sql.contains("'o\\'brien'"), "sql: {sql}");
    }

    #[test]
    fn test_duplicate_maps_to_already_exists() {
        let (repo, _) = repo_with(vec![MockReply::Fail(DriverError::duplicate(
            "Duplicate entry 'alice'",
        ))]);
        let user = UserData {
            user_id: "user_abc".to_string(),
            user_name: "alice".to_string(),
            ..UserData::default()
        };
        assert_eq!(
            repo.create_user(&user).unwrap_err().code(),
            StatusCode::AlreadyExists
        );
    }

    #[test]
    fn test_find_decodes_row() {
        let (repo, _) = repo_with(vec![MockReply::Rows(vec![user_row()])]);
        let user = repo.find_by_user_name("alice").unwrap();
        assert_eq!(user.numeric_id, 12);
        assert_eq!(user.user_id, "user_abc");
        assert_eq!(user.display_name, "Alice");
        assert_eq!(user.created_at, 1_700_000_000);
        // NULL last_login defaults to 0.
        assert_eq!(user.last_login, 0);
    }

    #[test]
    fn test_find_empty_result_is_not_found() {
        let (repo, _) = repo_with(vec![MockReply::Rows(vec![])]);
        assert_eq!(
            repo.find_by_user_name("ghost").unwrap_err().code(),
            StatusCode::NotFound
        );
    }

    #[test]
    fn test_update_zero_rows_is_not_found() {
        let (repo, _) = repo_with(vec![MockReply::Affected(0)]);
        assert_eq!(
            repo.update_last_login("user_ghost", 1).unwrap_err().code(),
            StatusCode::NotFound
        );
    }
}

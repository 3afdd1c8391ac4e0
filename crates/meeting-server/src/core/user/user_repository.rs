//! User data model and repository.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use common::{Result, Status};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A registered user.
///
/// `user_id` is the opaque public identifier; `numeric_id` is assigned by
/// the store at creation and is monotonic. The password hash is salted and
/// never empty for a stored user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserData {
    pub user_id: String,
    pub numeric_id: u64,
    pub user_name: String,
    pub display_name: String,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds; 0 until the first login.
    pub last_login: i64,
}

/// Storage contract for users.
pub trait UserRepository: Send + Sync {
    /// Persist a new user. The repository assigns `numeric_id`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` when the username is taken.
    fn create_user(&self, data: &UserData) -> Result<()>;

    fn find_by_user_name(&self, user_name: &str) -> Result<UserData>;

    fn find_by_id(&self, user_id: &str) -> Result<UserData>;

    /// Best-effort last-login stamp.
    fn update_last_login(&self, user_id: &str, last_login: i64) -> Result<()>;
}

#[derive(Default)]
struct UserTables {
    by_name: HashMap<String, UserData>,
    by_id: HashMap<String, UserData>,
}

/// In-process user store. Readers proceed in parallel; writers are
/// exclusive.
pub struct InMemoryUserRepository {
    tables: RwLock<UserTables>,
    next_numeric_id: AtomicU64,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(UserTables::default()),
            // Numeric ids are monotonic and start at 1; 0 means unassigned.
            next_numeric_id: AtomicU64::new(1),
        }
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl UserRepository for InMemoryUserRepository {
    fn create_user(&self, data: &UserData) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.by_name.contains_key(&data.user_name) {
            return Err(Status::already_exists("user name already exists"));
        }
        let mut stored = data.clone();
        stored.numeric_id = self.next_numeric_id.fetch_add(1, Ordering::Relaxed);
        tables
            .by_id
            .insert(stored.user_id.clone(), stored.clone());
        tables.by_name.insert(stored.user_name.clone(), stored);
        Ok(())
    }

    fn find_by_user_name(&self, user_name: &str) -> Result<UserData> {
        self.tables
            .read()
            .by_name
            .get(user_name)
            .cloned()
            .ok_or_else(|| Status::not_found("user not found"))
    }

    fn find_by_id(&self, user_id: &str) -> Result<UserData> {
        self.tables
            .read()
            .by_id
            .get(user_id)
            .cloned()
            .ok_or_else(|| Status::not_found("user not found"))
    }

    fn update_last_login(&self, user_id: &str, last_login: i64) -> Result<()> {
        let mut tables = self.tables.write();
        let Some(user) = tables.by_id.get_mut(user_id) else {
            return Err(Status::not_found("user not found"));
        };
        user.last_login = last_login;
        let user_name = user.user_name.clone();
        if let Some(by_name) = tables.by_name.get_mut(&user_name) {
            by_name.last_login = last_login;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::StatusCode;

    fn user(name: &str) -> UserData {
        UserData {
            user_id: format!("user_{name}"),
            user_name: name.to_string(),
            display_name: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "hash".to_string(),
            salt: "salt".to_string(),
            created_at: 1_700_000_000,
            ..UserData::default()
        }
    }

    #[test]
    fn test_create_and_find() {
        let repo = InMemoryUserRepository::new();
        repo.create_user(&user("alice")).unwrap();

        let by_name = repo.find_by_user_name("alice").unwrap();
        assert_eq!(by_name.email, "alice@example.com");
        let by_id = repo.find_by_id("user_alice").unwrap();
        assert_eq!(by_id.user_name, "alice");
    }

    #[test]
    fn test_duplicate_user_name_is_rejected() {
        let repo = InMemoryUserRepository::new();
        repo.create_user(&user("alice")).unwrap();
        let err = repo.create_user(&user("alice")).unwrap_err();
        assert_eq!(err.code(), StatusCode::AlreadyExists);
    }

    #[test]
    fn test_numeric_ids_are_monotonic() {
        let repo = InMemoryUserRepository::new();
        repo.create_user(&user("alice")).unwrap();
        repo.create_user(&user("bob")).unwrap();
        let alice = repo.find_by_user_name("alice").unwrap();
        let bob = repo.find_by_user_name("bob").unwrap();
        assert!(alice.numeric_id > 0);
        assert!(bob.numeric_id > alice.numeric_id);
    }

    #[test]
    fn test_update_last_login_touches_both_indexes() {
        let repo = InMemoryUserRepository::new();
        repo.create_user(&user("alice")).unwrap();
        repo.update_last_login("user_alice", 42).unwrap();
        assert_eq!(repo.find_by_user_name("alice").unwrap().last_login, 42);
        assert_eq!(repo.find_by_id("user_alice").unwrap().last_login, 42);
    }

    #[test]
    fn test_update_last_login_unknown_user() {
        let repo = InMemoryUserRepository::new();
        let err = repo.update_last_login("nope", 1).unwrap_err();
        assert_eq!(err.code(), StatusCode::NotFound);
    }
}

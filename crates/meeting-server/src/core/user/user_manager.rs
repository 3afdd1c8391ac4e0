//! User registration and authentication.
//!
//! Passwords are hashed with PBKDF2-HMAC-SHA256 (100 000 iterations,
//! 32-byte output, hex-encoded) over a per-user 32-byte salt drawn from the
//! system CSPRNG, falling back to a PRNG-generated hex string if the CSPRNG
//! is unavailable. Login compares hashes in constant time.

use std::num::NonZeroU32;
use std::sync::Arc;

use common::{Result, Status};
use rand::Rng;
use ring::rand::SecureRandom;
use tracing::{debug, warn};

use super::{UserData, UserRepository};

const MIN_PASSWORD_LENGTH: usize = 8;
const SALT_BYTES: usize = 32;
const PBKDF2_ITERATIONS: u32 = 100_000;
const HASH_BYTES: usize = 32;

/// Registration input.
#[derive(Debug, Clone, Default)]
pub struct RegisterCommand {
    pub user_name: String,
    pub password: String,
    pub email: String,
    pub display_name: String,
}

/// Registration, login, and lookups over a [`UserRepository`].
pub struct UserManager {
    repository: Arc<dyn UserRepository>,
}

impl UserManager {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self { repository }
    }

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for empty username/password/email or a password
    /// shorter than 8 characters; `AlreadyExists` for a taken username.
    pub fn register(&self, command: &RegisterCommand) -> Result<UserData> {
        if command.user_name.is_empty() || command.password.is_empty() || command.email.is_empty() {
            return Err(Status::invalid_argument(
                "user name, password, and email cannot be empty",
            ));
        }
        if command.password.len() < MIN_PASSWORD_LENGTH {
            return Err(Status::invalid_argument(
                "password must be at least 8 characters long",
            ));
        }

        let salt = generate_salt();
        let user = UserData {
            user_id: generate_user_id(),
            numeric_id: 0,
            user_name: command.user_name.clone(),
            display_name: if command.display_name.is_empty() {
                command.user_name.clone()
            } else {
                command.display_name.clone()
            },
            email: command.email.clone(),
            password_hash: hash_password(&command.password, &salt),
            salt,
            created_at: chrono::Utc::now().timestamp(),
            last_login: 0,
        };

        self.repository.create_user(&user)?;
        debug!(target: "meeting.user", user_name = %user.user_name, "user registered");
        self.repository.find_by_user_name(&user.user_name)
    }

    /// Authenticate a user by name and password.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown name, `Unauthenticated` for a wrong
    /// password.
    pub fn login(&self, user_name: &str, password: &str) -> Result<UserData> {
        let mut user = self.repository.find_by_user_name(user_name)?;

        let candidate = hash_password(password, &user.salt);
        let matches = ring::constant_time::verify_slices_are_equal(
            candidate.as_bytes(),
            user.password_hash.as_bytes(),
        )
        .is_ok();
        if !matches {
            return Err(Status::unauthenticated("invalid password"));
        }

        // Last-login stamping is best effort; a failed write does not fail
        // the login.
        let now = chrono::Utc::now().timestamp();
        if let Err(status) = self.repository.update_last_login(&user.user_id, now) {
            warn!(
                target: "meeting.user",
                user_name,
                error = %status,
                "failed to update last login"
            );
        } else {
            user.last_login = now;
        }
        Ok(user)
    }

    pub fn get_by_user_name(&self, user_name: &str) -> Result<UserData> {
        self.repository.find_by_user_name(user_name)
    }

    pub fn get_by_id(&self, user_id: &str) -> Result<UserData> {
        self.repository.find_by_id(user_id)
    }
}

fn generate_user_id() -> String {
    format!("user_{}", random_hex(16))
}

fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    let rng = ring::rand::SystemRandom::new();
    if rng.fill(&mut bytes).is_err() {
        warn!(target: "meeting.user", "CSPRNG unavailable, falling back to PRNG salt");
        return random_hex(SALT_BYTES);
    }
    to_hex(&bytes)
}

fn hash_password(password: &str, salt: &str) -> String {
    let mut out = [0u8; HASH_BYTES];
    ring::pbkdf2::derive(
        ring::pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or_else(|| unreachable!()),
        salt.as_bytes(),
        password.as_bytes(),
        &mut out,
    );
    to_hex(&out)
}

fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        hex.push(char::from_digit(u32::from(byte >> 4), 16).unwrap_or('0'));
        hex.push(char::from_digit(u32::from(byte & 0xf), 16).unwrap_or('0'));
    }
    hex
}

fn random_hex(length: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}

//! User-facing RPCs: register, login, logout, profile.

use std::sync::Arc;

use tracing::info;
use workpool::ThreadPool;

use crate::core::user::{RegisterCommand, SessionManager, UserManager};

use super::error_codes::RpcError;
use super::messages::{
    GetProfileRequest, GetProfileResponse, LoginRequest, LoginResponse, LogoutRequest,
    LogoutResponse, RegisterRequest, RegisterResponse, UserInfo,
};
use super::offload;

/// Register/login/logout/profile over the managers, with work off-loaded
/// to the executor.
pub struct UserService {
    pool: ThreadPool,
    users: Arc<UserManager>,
    sessions: Arc<SessionManager>,
}

impl UserService {
    pub fn new(pool: ThreadPool, users: Arc<UserManager>, sessions: Arc<SessionManager>) -> Self {
        Self {
            pool,
            users,
            sessions,
        }
    }

    pub fn register(&self, request: &RegisterRequest) -> RegisterResponse {
        info!(target: "meeting.rpc", user_name = %request.user_name, "Register");
        let users = Arc::clone(&self.users);
        let command = RegisterCommand {
            user_name: request.user_name.clone(),
            password: request.password.clone(),
            email: request.email.clone(),
            display_name: request.display_name.clone(),
        };

        match offload(&self.pool, move || users.register(&command)) {
            Ok(user) => RegisterResponse {
                user: Some(UserInfo::from(&user)),
                error: RpcError::ok(),
            },
            Err(status) => RegisterResponse {
                user: None,
                error: RpcError::user(&status),
            },
        }
    }

    pub fn login(&self, request: &LoginRequest) -> LoginResponse {
        info!(target: "meeting.rpc", user_name = %request.user_name, "Login");
        let users = Arc::clone(&self.users);
        let user_name = request.user_name.clone();
        let password = request.password.clone();

        let user = match offload(&self.pool, move || users.login(&user_name, &password)) {
            Ok(user) => user,
            Err(status) => {
                return LoginResponse {
                    user: None,
                    session_token: String::new(),
                    error: RpcError::user(&status),
                }
            }
        };

        let sessions = Arc::clone(&self.sessions);
        let numeric_id = user.numeric_id;
        let user_uuid = user.user_id.clone();
        match offload(&self.pool, move || {
            sessions.create_session(numeric_id, &user_uuid)
        }) {
            Ok(session) => LoginResponse {
                user: Some(UserInfo::from(&user)),
                session_token: session.token,
                error: RpcError::ok(),
            },
            Err(status) => LoginResponse {
                user: Some(UserInfo::from(&user)),
                session_token: String::new(),
                error: RpcError::session(&status),
            },
        }
    }

    pub fn logout(&self, request: &LogoutRequest) -> LogoutResponse {
        info!(
            target: "meeting.rpc",
            token_prefix = request
                .session_token
                .get(..request.session_token.len().min(6))
                .unwrap_or(""),
            "Logout"
        );
        let sessions = Arc::clone(&self.sessions);
        let token = request.session_token.clone();

        match offload(&self.pool, move || sessions.delete_session(&token)) {
            Ok(()) => LogoutResponse {
                error: RpcError::ok(),
            },
            Err(status) => {
                // An unknown token means the bearer was never (or is no
                // longer) authenticated.
                let status = common::Status::unauthenticated(status.message());
                LogoutResponse {
                    error: RpcError::session(&status),
                }
            }
        }
    }

    pub fn get_profile(&self, request: &GetProfileRequest) -> GetProfileResponse {
        let sessions = Arc::clone(&self.sessions);
        let token = request.session_token.clone();
        let session = match offload(&self.pool, move || sessions.validate_session(&token)) {
            Ok(session) => session,
            Err(status) => {
                return GetProfileResponse {
                    user: None,
                    error: RpcError::session(&status),
                }
            }
        };

        let users = Arc::clone(&self.users);
        match offload(&self.pool, move || users.get_by_id(&session.user_uuid)) {
            Ok(user) => GetProfileResponse {
                user: Some(UserInfo::from(&user)),
                error: RpcError::ok(),
            },
            Err(status) => GetProfileResponse {
                user: None,
                error: RpcError::user(&status),
            },
        }
    }
}

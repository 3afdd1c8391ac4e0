//! In-payload error codes.
//!
//! Responses carry the coarse wire [`common::StatusCode`] plus one of
//! these finer codes; clients branch on the fine code (`MeetingFull` vs
//! `MeetingNotFound`), the wire code is for generic middleware.

use common::{Status, StatusCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum UserErrorCode {
    Ok = 0,
    UserNameExists = 1001,
    UserNotFound = 1002,
    InvalidCredentials = 1003,
    InvalidPassword = 1004,
    SessionExpired = 1005,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MeetingErrorCode {
    Ok = 0,
    MeetingNotFound = 2001,
    ParticipantExists = 2002,
    MeetingFull = 2003,
    InvalidState = 2004,
    PermissionDenied = 2005,
}

/// Error block embedded in every response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    /// Fine-grained code ([`UserErrorCode`] / [`MeetingErrorCode`] value).
    pub code: i32,
    /// Wire-level status integer.
    pub status: i32,
    pub message: String,
}

impl RpcError {
    pub fn ok() -> Self {
        Self {
            code: 0,
            status: StatusCode::Ok.value(),
            message: String::new(),
        }
    }

    pub fn user(status: &Status) -> Self {
        let code = match status.code() {
            StatusCode::AlreadyExists => UserErrorCode::UserNameExists,
            StatusCode::NotFound => UserErrorCode::UserNotFound,
            StatusCode::Unauthenticated => UserErrorCode::InvalidCredentials,
            _ => UserErrorCode::InvalidPassword,
        };
        Self::from_status(code as i32, status)
    }

    pub fn session(status: &Status) -> Self {
        Self::from_status(UserErrorCode::SessionExpired as i32, status)
    }

    pub fn meeting(status: &Status) -> Self {
        let code = match status.code() {
            StatusCode::NotFound => MeetingErrorCode::MeetingNotFound,
            StatusCode::AlreadyExists => MeetingErrorCode::ParticipantExists,
            StatusCode::Unavailable => MeetingErrorCode::MeetingFull,
            StatusCode::Unauthenticated => MeetingErrorCode::PermissionDenied,
            _ => MeetingErrorCode::InvalidState,
        };
        Self::from_status(code as i32, status)
    }

    fn from_status(code: i32, status: &Status) -> Self {
        Self {
            code,
            status: status.code().value(),
            message: status.message().to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::Ok.value()
    }
}

impl Default for RpcError {
    fn default() -> Self {
        Self::ok()
    }
}

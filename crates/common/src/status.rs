//! Uniform outcome type used across the server.
//!
//! Every fallible operation returns a [`Status`] (or a value wrapped in
//! [`Result`]) instead of throwing across module boundaries. The code set
//! matches the wire-level integers clients see, so the facade can encode a
//! `Status` directly into a response without a second mapping table.

use thiserror::Error;

/// Wire-level status codes.
///
/// The numeric values are part of the client contract; do not renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    InvalidArgument = 3,
    NotFound = 5,
    AlreadyExists = 6,
    Internal = 13,
    Unavailable = 14,
    Unauthenticated = 16,
}

impl StatusCode {
    /// Human-readable name, used in log lines and `Display`.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::InvalidArgument => "Invalid Argument",
            StatusCode::NotFound => "Not Found",
            StatusCode::AlreadyExists => "Already Exists",
            StatusCode::Internal => "Internal",
            StatusCode::Unavailable => "Unavailable",
            StatusCode::Unauthenticated => "Unauthenticated",
        }
    }

    /// The integer carried on the wire.
    pub fn value(self) -> i32 {
        self as i32
    }
}

/// An error outcome: a [`StatusCode`] plus a human-readable message.
///
/// `Status` is only ever constructed for failures; successful operations
/// return `Ok(value)` through the [`Result`] alias. [`StatusCode::Ok`] still
/// exists so responses can carry `0` for success on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", .code.as_str())]
pub struct Status {
    code: StatusCode,
    message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(StatusCode::AlreadyExists, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unauthenticated, message)
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result alias used by every fallible operation in the workspace.
pub type Result<T> = std::result::Result<T, Status>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_values_are_stable() {
        assert_eq!(StatusCode::Ok.value(), 0);
        assert_eq!(StatusCode::InvalidArgument.value(), 3);
        assert_eq!(StatusCode::NotFound.value(), 5);
        assert_eq!(StatusCode::AlreadyExists.value(), 6);
        assert_eq!(StatusCode::Internal.value(), 13);
        assert_eq!(StatusCode::Unavailable.value(), 14);
        assert_eq!(StatusCode::Unauthenticated.value(), 16);
    }

    #[test]
    fn test_constructors_set_code_and_message() {
        let status = Status::not_found("meeting not found");
        assert_eq!(status.code(), StatusCode::NotFound);
        assert_eq!(status.message(), "meeting not found");

        let status = Status::unauthenticated("bad token");
        assert_eq!(status.code(), StatusCode::Unauthenticated);
    }

    #[test]
    fn test_display_includes_code_name_and_message() {
        let status = Status::unavailable("meeting is full");
        assert_eq!(format!("{status}"), "Unavailable: meeting is full");
    }

    #[test]
    fn test_status_is_an_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        let status = Status::internal("boom");
        takes_error(&status);
    }
}

//! Request and response payloads for the RPC surface.
//!
//! The transport layer owns the wire encoding; these are the decoded
//! shapes the services consume and produce.

use crate::core::meeting::MeetingData;
use crate::core::user::UserData;

use super::error_codes::RpcError;

/// Public view of a user (no credentials).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub user_id: String,
    pub user_name: String,
    pub display_name: String,
    pub email: String,
    pub created_at: i64,
    pub last_login: i64,
}

impl From<&UserData> for UserInfo {
    fn from(user: &UserData) -> Self {
        Self {
            user_id: user.user_id.clone(),
            user_name: user.user_name.clone(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

/// Public view of a meeting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeetingInfo {
    pub meeting_id: String,
    pub meeting_code: String,
    pub organizer_id: u64,
    pub topic: String,
    /// `SCHEDULED` | `RUNNING` | `ENDED`.
    pub state: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub participant_ids: Vec<u64>,
}

impl From<&MeetingData> for MeetingInfo {
    fn from(meeting: &MeetingData) -> Self {
        Self {
            meeting_id: meeting.meeting_id.clone(),
            meeting_code: meeting.meeting_code.clone(),
            organizer_id: meeting.organizer_id,
            topic: meeting.topic.clone(),
            state: meeting.state.as_str().to_string(),
            created_at: meeting.created_at,
            updated_at: meeting.updated_at,
            participant_ids: meeting.participants.clone(),
        }
    }
}

/// Serving endpoint hint returned on join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub region: String,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    pub user_name: String,
    pub password: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterResponse {
    pub user: Option<UserInfo>,
    pub error: RpcError,
}

#[derive(Debug, Clone, Default)]
pub struct LoginRequest {
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoginResponse {
    pub user: Option<UserInfo>,
    pub session_token: String,
    pub error: RpcError,
}

#[derive(Debug, Clone, Default)]
pub struct LogoutRequest {
    pub session_token: String,
}

#[derive(Debug, Clone, Default)]
pub struct LogoutResponse {
    pub error: RpcError,
}

#[derive(Debug, Clone, Default)]
pub struct GetProfileRequest {
    pub session_token: String,
}

#[derive(Debug, Clone, Default)]
pub struct GetProfileResponse {
    pub user: Option<UserInfo>,
    pub error: RpcError,
}

#[derive(Debug, Clone, Default)]
pub struct CreateMeetingRequest {
    pub session_token: String,
    pub topic: String,
}

#[derive(Debug, Clone, Default)]
pub struct CreateMeetingResponse {
    pub meeting: Option<MeetingInfo>,
    pub error: RpcError,
}

#[derive(Debug, Clone, Default)]
pub struct JoinMeetingRequest {
    pub session_token: String,
    pub meeting_id: String,
    /// Peer address as seen by the transport, for endpoint selection.
    pub client_ip: String,
}

#[derive(Debug, Clone, Default)]
pub struct JoinMeetingResponse {
    pub meeting: Option<MeetingInfo>,
    pub endpoint: Option<Endpoint>,
    pub error: RpcError,
}

#[derive(Debug, Clone, Default)]
pub struct LeaveMeetingRequest {
    pub session_token: String,
    pub meeting_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct LeaveMeetingResponse {
    pub error: RpcError,
}

#[derive(Debug, Clone, Default)]
pub struct EndMeetingRequest {
    pub session_token: String,
    pub meeting_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct EndMeetingResponse {
    pub error: RpcError,
}

#[derive(Debug, Clone, Default)]
pub struct GetMeetingRequest {
    pub meeting_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct GetMeetingResponse {
    pub meeting: Option<MeetingInfo>,
    pub error: RpcError,
}

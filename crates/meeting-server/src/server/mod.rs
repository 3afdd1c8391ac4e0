//! Transport-agnostic RPC facade.
//!
//! The wire codec belongs to the transport layer; these services consume
//! plain request structs, resolve session tokens to users, off-load the
//! work onto the executor, and produce responses that carry both the
//! coarse wire status and a finer in-payload error code (the clients'
//! source of truth).

mod error_codes;
mod meeting_service;
mod messages;
mod user_service;

pub use error_codes::{MeetingErrorCode, RpcError, UserErrorCode};
pub use meeting_service::MeetingService;
pub use messages::{
    CreateMeetingRequest, CreateMeetingResponse, EndMeetingRequest, EndMeetingResponse, Endpoint,
    GetMeetingRequest, GetMeetingResponse, GetProfileRequest, GetProfileResponse,
    JoinMeetingRequest, JoinMeetingResponse, LeaveMeetingRequest, LeaveMeetingResponse,
    LoginRequest, LoginResponse, LogoutRequest, LogoutResponse, MeetingInfo, RegisterRequest,
    RegisterResponse, UserInfo,
};
pub use user_service::UserService;

use common::{Result, Status};
use workpool::ThreadPool;

// Run a closure on the executor and join its outcome, folding executor
// failures into the status taxonomy.
fn offload<T, F>(pool: &ThreadPool, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match pool.submit(f).wait() {
        Ok(outcome) => outcome,
        Err(e) => Err(Status::unavailable(format!("executor unavailable: {e}"))),
    }
}

//! Users and sessions: data model, repositories, and managers.

mod cached_session_repository;
mod cached_user_repository;
mod session_manager;
mod session_repository;
mod user_manager;
mod user_repository;

pub use cached_session_repository::CachedSessionRepository;
pub use cached_user_repository::CachedUserRepository;
pub use session_manager::{SessionConfig, SessionManager};
pub use session_repository::{InMemorySessionRepository, SessionRecord, SessionRepository};
pub use user_manager::{RegisterCommand, UserManager};
pub use user_repository::{InMemoryUserRepository, UserData, UserRepository};

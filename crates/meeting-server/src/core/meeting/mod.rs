//! Meetings: data model, repositories, and lifecycle rules.

mod cached_meeting_repository;
mod meeting_manager;
mod meeting_repository;

pub use cached_meeting_repository::CachedMeetingRepository;
pub use meeting_manager::{MeetingConfig, MeetingManager};
pub use meeting_repository::{
    InMemoryMeetingRepository, MeetingData, MeetingRepository, MeetingState,
};

//! Meeting data model and repository.

use std::collections::HashMap;

use common::{Result, Status};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Meeting lifecycle state. Monotonic toward `Ended`; `Ended` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum MeetingState {
    #[default]
    Scheduled = 0,
    Running = 1,
    Ended = 2,
}

impl MeetingState {
    pub fn as_str(self) -> &'static str {
        match self {
            MeetingState::Scheduled => "SCHEDULED",
            MeetingState::Running => "RUNNING",
            MeetingState::Ended => "ENDED",
        }
    }
}

/// A meeting and its roster.
///
/// `meeting_id` and `meeting_code` are both unique. The organizer is a
/// participant for the whole non-ended lifetime; participants are an
/// ordered set of numeric user ids without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingData {
    pub meeting_id: String,
    pub meeting_code: String,
    pub organizer_id: u64,
    pub topic: String,
    pub state: MeetingState,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds; stamped on every transition.
    pub updated_at: i64,
    pub participants: Vec<u64>,
}

/// Storage contract for meetings. Uniqueness of `meeting_id` and
/// `meeting_code` and at-most-once membership are enforced here.
pub trait MeetingRepository: Send + Sync {
    /// Persist a new meeting (including any participants already present).
    ///
    /// # Errors
    ///
    /// `AlreadyExists` when the id or code collides.
    fn create_meeting(&self, data: &MeetingData) -> Result<MeetingData>;

    fn get_meeting(&self, meeting_id: &str) -> Result<MeetingData>;

    fn update_meeting_state(
        &self,
        meeting_id: &str,
        state: MeetingState,
        updated_at: i64,
    ) -> Result<()>;

    /// # Errors
    ///
    /// `AlreadyExists` when the participant is already on the roster.
    fn add_participant(&self, meeting_id: &str, participant_id: u64, is_organizer: bool)
        -> Result<()>;

    /// # Errors
    ///
    /// `NotFound` when the participant is not on the roster.
    fn remove_participant(&self, meeting_id: &str, participant_id: u64) -> Result<()>;

    fn list_participants(&self, meeting_id: &str) -> Result<Vec<u64>>;
}

#[derive(Default)]
struct MeetingTables {
    meetings: HashMap<String, MeetingData>,
    /// meeting_code -> meeting_id, for code uniqueness.
    code_index: HashMap<String, String>,
}

/// In-process meeting store. Readers proceed in parallel; writers are
/// exclusive.
#[derive(Default)]
pub struct InMemoryMeetingRepository {
    tables: RwLock<MeetingTables>,
}

impl InMemoryMeetingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeetingRepository for InMemoryMeetingRepository {
    fn create_meeting(&self, data: &MeetingData) -> Result<MeetingData> {
        let mut tables = self.tables.write();
        if tables.meetings.contains_key(&data.meeting_id) {
            return Err(Status::already_exists("meeting already exists"));
        }
        if tables.code_index.contains_key(&data.meeting_code) {
            return Err(Status::already_exists("meeting code already exists"));
        }
        tables
            .code_index
            .insert(data.meeting_code.clone(), data.meeting_id.clone());
        tables.meetings.insert(data.meeting_id.clone(), data.clone());
        Ok(data.clone())
    }

    fn get_meeting(&self, meeting_id: &str) -> Result<MeetingData> {
        self.tables
            .read()
            .meetings
            .get(meeting_id)
            .cloned()
            .ok_or_else(|| Status::not_found("meeting not found"))
    }

    fn update_meeting_state(
        &self,
        meeting_id: &str,
        state: MeetingState,
        updated_at: i64,
    ) -> Result<()> {
        let mut tables = self.tables.write();
        let Some(meeting) = tables.meetings.get_mut(meeting_id) else {
            return Err(Status::not_found("meeting not found"));
        };
        meeting.state = state;
        meeting.updated_at = updated_at;
        Ok(())
    }

    fn add_participant(
        &self,
        meeting_id: &str,
        participant_id: u64,
        _is_organizer: bool,
    ) -> Result<()> {
        let mut tables = self.tables.write();
        let Some(meeting) = tables.meetings.get_mut(meeting_id) else {
            return Err(Status::not_found("meeting not found"));
        };
        if meeting.participants.contains(&participant_id) {
            return Err(Status::already_exists("participant already in meeting"));
        }
        meeting.participants.push(participant_id);
        Ok(())
    }

    fn remove_participant(&self, meeting_id: &str, participant_id: u64) -> Result<()> {
        let mut tables = self.tables.write();
        let Some(meeting) = tables.meetings.get_mut(meeting_id) else {
            return Err(Status::not_found("meeting not found"));
        };
        let Some(position) = meeting
            .participants
            .iter()
            .position(|id| *id == participant_id)
        else {
            return Err(Status::not_found("participant not in meeting"));
        };
        meeting.participants.remove(position);
        Ok(())
    }

    fn list_participants(&self, meeting_id: &str) -> Result<Vec<u64>> {
        self.tables
            .read()
            .meetings
            .get(meeting_id)
            .map(|meeting| meeting.participants.clone())
            .ok_or_else(|| Status::not_found("meeting not found"))
    }
}

//! Meeting lifecycle rules.
//!
//! The manager owns the business rules; the repository owns uniqueness and
//! membership storage. Join persists the membership before the
//! Scheduled -> Running transition, so a concurrent reader never observes a
//! running meeting whose only participant is the organizer.

use std::sync::Arc;

use common::{Result, Status};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info};

use super::{MeetingData, MeetingRepository, MeetingState};

const MEETING_ID_SUFFIX_LENGTH: usize = 16;

#[derive(Debug, Clone)]
pub struct MeetingConfig {
    pub max_participants: usize,
    pub meeting_code_length: usize,
    /// End the meeting when the organizer leaves.
    pub end_when_organizer_leaves: bool,
    /// End the meeting when the roster empties.
    pub end_when_empty: bool,
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            max_participants: 100,
            meeting_code_length: 10,
            end_when_organizer_leaves: true,
            end_when_empty: true,
        }
    }
}

/// Create/join/leave/end operations over a [`MeetingRepository`].
pub struct MeetingManager {
    repository: Arc<dyn MeetingRepository>,
    config: MeetingConfig,
}

impl MeetingManager {
    pub fn new(repository: Arc<dyn MeetingRepository>, config: MeetingConfig) -> Self {
        Self { repository, config }
    }

    /// Create a meeting and seat the organizer.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero organizer or empty topic; a code
    /// collision surfaces as the repository's `AlreadyExists`.
    pub fn create_meeting(&self, organizer_id: u64, topic: &str) -> Result<MeetingData> {
        if organizer_id == 0 {
            return Err(Status::invalid_argument("organizer id cannot be zero"));
        }
        if topic.is_empty() {
            return Err(Status::invalid_argument("meeting topic cannot be empty"));
        }

        let now = chrono::Utc::now().timestamp();
        let meeting = MeetingData {
            meeting_id: generate_meeting_id(),
            meeting_code: random_alphanumeric(self.config.meeting_code_length),
            organizer_id,
            topic: topic.to_string(),
            state: MeetingState::Scheduled,
            created_at: now,
            updated_at: now,
            participants: Vec::new(),
        };

        let mut created = self.repository.create_meeting(&meeting)?;
        self.repository
            .add_participant(&created.meeting_id, organizer_id, true)?;
        created.participants.push(organizer_id);

        info!(
            target: "meeting.manager",
            meeting_id = %created.meeting_id,
            organizer_id,
            "meeting created"
        );
        Ok(created)
    }

    /// Add a participant.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on an ended meeting, `AlreadyExists` for a
    /// duplicate join, `Unavailable` when the meeting is full.
    pub fn join_meeting(&self, meeting_id: &str, participant_id: u64) -> Result<MeetingData> {
        if meeting_id.is_empty() {
            return Err(Status::invalid_argument("meeting id cannot be empty"));
        }
        if participant_id == 0 {
            return Err(Status::invalid_argument("participant id cannot be zero"));
        }

        let mut meeting = self.repository.get_meeting(meeting_id)?;
        if meeting.state == MeetingState::Ended {
            return Err(Status::invalid_argument("cannot join a meeting that has ended"));
        }
        if meeting.participants.contains(&participant_id) {
            return Err(Status::already_exists("participant already in the meeting"));
        }
        if meeting.participants.len() >= self.config.max_participants {
            return Err(Status::unavailable(
                "meeting has reached maximum participant limit",
            ));
        }

        self.repository
            .add_participant(meeting_id, participant_id, false)?;
        meeting.participants.push(participant_id);

        // Only a state transition stamps updated_at; a join into an
        // already-running meeting leaves the persisted record untouched,
        // and the returned copy must agree with it.
        if meeting.state == MeetingState::Scheduled && participant_id != meeting.organizer_id {
            let now = chrono::Utc::now().timestamp();
            self.repository
                .update_meeting_state(meeting_id, MeetingState::Running, now)?;
            meeting.state = MeetingState::Running;
            meeting.updated_at = now;
        }

        debug!(
            target: "meeting.manager",
            meeting_id,
            participant_id,
            participants = meeting.participants.len(),
            "participant joined"
        );
        Ok(meeting)
    }

    /// Remove a participant. Succeeds whenever the participant is present,
    /// regardless of how full the meeting is.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown meeting or an absent participant.
    pub fn leave_meeting(&self, meeting_id: &str, participant_id: u64) -> Result<()> {
        if meeting_id.is_empty() {
            return Err(Status::invalid_argument("meeting id cannot be empty"));
        }

        let meeting = self.repository.get_meeting(meeting_id)?;
        if !meeting.participants.contains(&participant_id) {
            return Err(Status::not_found("participant not in meeting"));
        }

        self.repository.remove_participant(meeting_id, participant_id)?;

        let now = chrono::Utc::now().timestamp();
        let remaining = meeting.participants.len() - 1;
        if meeting.state != MeetingState::Ended {
            if self.config.end_when_organizer_leaves && participant_id == meeting.organizer_id {
                self.repository
                    .update_meeting_state(meeting_id, MeetingState::Ended, now)?;
                info!(target: "meeting.manager", meeting_id, "meeting ended: organizer left");
            } else if self.config.end_when_empty && remaining == 0 {
                self.repository
                    .update_meeting_state(meeting_id, MeetingState::Ended, now)?;
                info!(target: "meeting.manager", meeting_id, "meeting ended: roster empty");
            }
        }

        debug!(target: "meeting.manager", meeting_id, participant_id, "participant left");
        Ok(())
    }

    /// End a meeting. Organizer only.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for a non-organizer, `InvalidArgument` when the
    /// meeting already ended.
    pub fn end_meeting(&self, meeting_id: &str, requester_id: u64) -> Result<()> {
        if meeting_id.is_empty() {
            return Err(Status::invalid_argument("meeting id cannot be empty"));
        }

        let meeting = self.repository.get_meeting(meeting_id)?;
        if requester_id != meeting.organizer_id {
            return Err(Status::unauthenticated("only the organizer can end the meeting"));
        }
        if meeting.state == MeetingState::Ended {
            return Err(Status::invalid_argument("meeting has already ended"));
        }

        self.repository.update_meeting_state(
            meeting_id,
            MeetingState::Ended,
            chrono::Utc::now().timestamp(),
        )?;
        info!(target: "meeting.manager", meeting_id, requester_id, "meeting ended");
        Ok(())
    }

    pub fn get_meeting(&self, meeting_id: &str) -> Result<MeetingData> {
        if meeting_id.is_empty() {
            return Err(Status::invalid_argument("meeting id cannot be empty"));
        }
        self.repository.get_meeting(meeting_id)
    }
}

fn generate_meeting_id() -> String {
    format!("meeting_-{}", random_alphanumeric(MEETING_ID_SUFFIX_LENGTH))
}

fn random_alphanumeric(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| rng.sample(Alphanumeric) as char)
        .collect()
}

//! Write-through / read-through cache around a meeting repository.
//!
//! Key: `meeting:info:<meeting_id>`. The participants list is serialized
//! inside the cached payload, so every operation that changes membership
//! (and every state update) invalidates instead of refreshing. Reads
//! backfill on a miss; `list_participants` always goes to the primary.

use std::sync::Arc;

use common::{Result, Status, StatusCode};
use tracing::warn;

use crate::cache::KvCache;

use super::{MeetingData, MeetingRepository, MeetingState};

const INFO_PREFIX: &str = "meeting:info:";

/// Caching decorator over a [`MeetingRepository`].
pub struct CachedMeetingRepository {
    primary: Arc<dyn MeetingRepository>,
    cache: Arc<dyn KvCache>,
    ttl_seconds: u64,
}

impl CachedMeetingRepository {
    pub fn new(
        primary: Arc<dyn MeetingRepository>,
        cache: Arc<dyn KvCache>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            primary,
            cache,
            ttl_seconds,
        }
    }

    fn key_for(meeting_id: &str) -> String {
        format!("{INFO_PREFIX}{meeting_id}")
    }

    fn cache_put(&self, meeting: &MeetingData) -> Result<()> {
        let payload = serde_json::to_string(meeting)
            .map_err(|e| Status::internal(format!("failed to encode meeting: {e}")))?;
        self.cache
            .set_ex(&Self::key_for(&meeting.meeting_id), &payload, self.ttl_seconds)
    }

    fn cache_get(&self, meeting_id: &str) -> Result<MeetingData> {
        let payload = self.cache.get(&Self::key_for(meeting_id))?;
        serde_json::from_str(&payload).map_err(|_| Status::unavailable("invalid cache payload"))
    }

    fn cache_invalidate(&self, meeting_id: &str) {
        if let Err(status) = self.cache.del(&Self::key_for(meeting_id)) {
            if status.code() != StatusCode::NotFound {
                warn!(target: "meeting.cache.meeting", error = %status, "invalidate failed");
            }
        }
    }
}

impl MeetingRepository for CachedMeetingRepository {
    fn create_meeting(&self, data: &MeetingData) -> Result<MeetingData> {
        let created = self.primary.create_meeting(data)?;
        if let Err(status) = self.cache_put(&created) {
            warn!(target: "meeting.cache.meeting", error = %status, "cache put failed");
        }
        Ok(created)
    }

    fn get_meeting(&self, meeting_id: &str) -> Result<MeetingData> {
        match self.cache_get(meeting_id) {
            Ok(meeting) => return Ok(meeting),
            Err(status) if status.code() != StatusCode::NotFound => {
                warn!(target: "meeting.cache.meeting", error = %status, "cache read failed");
            }
            Err(_) => {}
        }

        let meeting = self.primary.get_meeting(meeting_id)?;
        if let Err(status) = self.cache_put(&meeting) {
            warn!(target: "meeting.cache.meeting", error = %status, "cache backfill failed");
        }
        Ok(meeting)
    }

    fn update_meeting_state(
        &self,
        meeting_id: &str,
        state: MeetingState,
        updated_at: i64,
    ) -> Result<()> {
        let result = self.primary.update_meeting_state(meeting_id, state, updated_at);
        self.cache_invalidate(meeting_id);
        result
    }

    fn add_participant(
        &self,
        meeting_id: &str,
        participant_id: u64,
        is_organizer: bool,
    ) -> Result<()> {
        let result = self
            .primary
            .add_participant(meeting_id, participant_id, is_organizer);
        self.cache_invalidate(meeting_id);
        result
    }

    fn remove_participant(&self, meeting_id: &str, participant_id: u64) -> Result<()> {
        let result = self.primary.remove_participant(meeting_id, participant_id);
        self.cache_invalidate(meeting_id);
        result
    }

    fn list_participants(&self, meeting_id: &str) -> Result<Vec<u64>> {
        // The roster lives inside the cached meeting payload; list reads go
        // straight to the primary.
        self.primary.list_participants(meeting_id)
    }
}

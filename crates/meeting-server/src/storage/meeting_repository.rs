//! SQL-backed meeting repository.
//!
//! The meeting row and its participant join rows are written in one
//! transaction on create; membership operations address the join table via
//! the meeting row's internal id.

use std::sync::Arc;

use common::{Result, Status};

use crate::core::meeting::{MeetingData, MeetingRepository, MeetingState};

use super::connection::{quote, row_i64, row_str, row_u64, SqlConnection};
use super::pool::ConnectionPool;
use super::transaction::Transaction;

/// Meetings over the durable store.
pub struct SqlMeetingRepository {
    pool: Arc<ConnectionPool>,
}

impl SqlMeetingRepository {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    fn load_meeting(conn: &mut dyn SqlConnection, meeting_id: &str) -> Result<MeetingData> {
        let sql = format!(
            "SELECT meeting_id, meeting_code, organizer_id, topic, state, \
             UNIX_TIMESTAMP(created_at), UNIX_TIMESTAMP(updated_at) \
             FROM meetings WHERE meeting_id = {} LIMIT 1",
            quote(meeting_id)
        );
        let rows = conn.query(&sql).map_err(|e| e.to_status())?;
        let Some(row) = rows.first() else {
            return Err(Status::not_found("meeting not found"));
        };

        let mut meeting = MeetingData {
            meeting_id: row_str(row, 0),
            meeting_code: row_str(row, 1),
            organizer_id: row_u64(row, 2),
            topic: row_str(row, 3),
            state: decode_state(row_i64(row, 4)),
            created_at: row_i64(row, 5),
            updated_at: row_i64(row, 6),
            participants: Vec::new(),
        };

        let participants_sql = format!(
            "SELECT user_id FROM meeting_participants \
             WHERE meeting_id = (SELECT id FROM meetings WHERE meeting_id = {}) \
             ORDER BY joined_at, user_id",
            quote(meeting_id)
        );
        let rows = conn.query(&participants_sql).map_err(|e| e.to_status())?;
        meeting.participants = rows.iter().map(|row| row_u64(row, 0)).collect();
        Ok(meeting)
    }
}

fn decode_state(value: i64) -> MeetingState {
    match value {
        1 => MeetingState::Running,
        2 => MeetingState::Ended,
        _ => MeetingState::Scheduled,
    }
}

impl MeetingRepository for SqlMeetingRepository {
    fn create_meeting(&self, data: &MeetingData) -> Result<MeetingData> {
        let mut tx = Transaction::begin(&self.pool)?;

        let sql = format!(
            "INSERT INTO meetings (meeting_id, meeting_code, organizer_id, topic, state, created_at, updated_at) \
             VALUES ({}, {}, {}, {}, {}, FROM_UNIXTIME({}), FROM_UNIXTIME({}))",
            quote(&data.meeting_id),
            quote(&data.meeting_code),
            data.organizer_id,
            quote(&data.topic),
            data.state as i32,
            data.created_at.max(1),
            data.updated_at.max(data.created_at.max(1)),
        );
        if let Err(e) = tx.conn().execute(&sql) {
            tx.rollback()?;
            return Err(e.to_status());
        }

        for participant in &data.participants {
            let role = i32::from(*participant == data.organizer_id);
            let participant_sql = format!(
                "INSERT INTO meeting_participants (meeting_id, user_id, role, joined_at) \
                 VALUES ((SELECT id FROM meetings WHERE meeting_id = {}), {}, {}, NOW())",
                quote(&data.meeting_id),
                participant,
                role,
            );
            if let Err(e) = tx.conn().execute(&participant_sql) {
                tx.rollback()?;
                return Err(e.to_status());
            }
        }

        tx.commit()?;
        Ok(data.clone())
    }

    fn get_meeting(&self, meeting_id: &str) -> Result<MeetingData> {
        let mut lease = self.pool.acquire()?;
        Self::load_meeting(lease.conn(), meeting_id)
    }

    fn update_meeting_state(
        &self,
        meeting_id: &str,
        state: MeetingState,
        updated_at: i64,
    ) -> Result<()> {
        let mut lease = self.pool.acquire()?;
        let sql = format!(
            "UPDATE meetings SET state = {}, updated_at = FROM_UNIXTIME({}) WHERE meeting_id = {}",
            state as i32,
            updated_at.max(1),
            quote(meeting_id)
        );
        let affected = lease.conn().execute(&sql).map_err(|e| e.to_status())?;
        if affected == 0 {
            return Err(Status::not_found("meeting not found"));
        }
        Ok(())
    }

    fn add_participant(
        &self,
        meeting_id: &str,
        participant_id: u64,
        is_organizer: bool,
    ) -> Result<()> {
        let mut lease = self.pool.acquire()?;
        let sql = format!(
            "INSERT INTO meeting_participants (meeting_id, user_id, role, joined_at) \
             VALUES ((SELECT id FROM meetings WHERE meeting_id = {}), {}, {}, NOW())",
            quote(meeting_id),
            participant_id,
            i32::from(is_organizer),
        );
        lease.conn().execute(&sql).map_err(|e| e.to_status())?;
        Ok(())
    }

    fn remove_participant(&self, meeting_id: &str, participant_id: u64) -> Result<()> {
        let mut lease = self.pool.acquire()?;
        let sql = format!(
            "DELETE FROM meeting_participants \
             WHERE meeting_id = (SELECT id FROM meetings WHERE meeting_id = {}) AND user_id = {}",
            quote(meeting_id),
            participant_id,
        );
        let affected = lease.conn().execute(&sql).map_err(|e| e.to_status())?;
        if affected == 0 {
            return Err(Status::not_found("participant not found"));
        }
        Ok(())
    }

    fn list_participants(&self, meeting_id: &str) -> Result<Vec<u64>> {
        let mut lease = self.pool.acquire()?;
        let sql = format!(
            "SELECT user_id FROM meeting_participants \
             WHERE meeting_id = (SELECT id FROM meetings WHERE meeting_id = {})",
            quote(meeting_id)
        );
        let rows = lease.conn().query(&sql).map_err(|e| e.to_status())?;
        Ok(rows.iter().map(|row| row_u64(row, 0)).collect())
    }
}

//! End-to-end meeting lifecycle through the RPC facade, over the cached
//! repository stack.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use meeting_server::cache::{KvCache, MemoryCache};
use meeting_server::core::meeting::{
    CachedMeetingRepository, InMemoryMeetingRepository, MeetingConfig, MeetingManager,
    MeetingRepository,
};
use meeting_server::core::user::{
    InMemorySessionRepository, InMemoryUserRepository, SessionConfig, SessionManager, UserManager,
};
use meeting_server::server::{
    CreateMeetingRequest, EndMeetingRequest, GetMeetingRequest, JoinMeetingRequest, LoginRequest,
    MeetingService, RegisterRequest, UserService,
};
use meeting_server::server::LeaveMeetingRequest;
use workpool::{PoolConfig, StopMode, ThreadPool};

struct Harness {
    pool: ThreadPool,
    users: UserService,
    meetings: MeetingService,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.pool.stop(StopMode::Graceful);
    }
}

fn harness() -> Harness {
    let pool = ThreadPool::new(PoolConfig {
        queue_cap: 64,
        core_threads: 2,
        max_threads: 2,
        ..PoolConfig::default()
    });
    pool.start();

    let sessions = Arc::new(SessionManager::new(
        Arc::new(InMemorySessionRepository::new()),
        SessionConfig::default(),
    ));
    let user_manager = Arc::new(UserManager::new(Arc::new(InMemoryUserRepository::new())));

    // Meetings run through the cached stack to exercise the decorators in
    // the full flow.
    let cache = Arc::new(MemoryCache::new()) as Arc<dyn KvCache>;
    let meeting_repository = Arc::new(CachedMeetingRepository::new(
        Arc::new(InMemoryMeetingRepository::new()) as Arc<dyn MeetingRepository>,
        cache,
        60,
    ));
    let meeting_manager = Arc::new(MeetingManager::new(
        meeting_repository,
        MeetingConfig {
            max_participants: 4,
            ..MeetingConfig::default()
        },
    ));

    let users = UserService::new(pool.clone(), user_manager, Arc::clone(&sessions));
    let meetings = MeetingService::new(pool.clone(), meeting_manager, sessions, None, None);

    Harness {
        pool,
        users,
        meetings,
    }
}

fn login(harness: &Harness, name: &str) -> String {
    let register = harness.users.register(&RegisterRequest {
        user_name: name.to_string(),
        password: "Passw0rd!".to_string(),
        email: format!("{name}@x"),
        display_name: name.to_string(),
    });
    assert!(register.error.is_ok());

    let login = harness.users.login(&LoginRequest {
        user_name: name.to_string(),
        password: "Passw0rd!".to_string(),
    });
    assert!(login.error.is_ok());
    login.session_token
}

#[test]
fn full_meeting_lifecycle() {
    let harness = harness();
    let token_alice = login(&harness, "alice");
    let token_bob = login(&harness, "bob");

    let created = harness.meetings.create_meeting(&CreateMeetingRequest {
        session_token: token_alice.clone(),
        topic: "Daily".to_string(),
    });
    assert!(created.error.is_ok(), "create failed: {:?}", created.error);
    let meeting = created.meeting.unwrap();
    assert_eq!(meeting.state, "SCHEDULED");
    assert_eq!(meeting.participant_ids.len(), 1);

    let joined = harness.meetings.join_meeting(&JoinMeetingRequest {
        session_token: token_bob.clone(),
        meeting_id: meeting.meeting_id.clone(),
        client_ip: String::new(),
    });
    assert!(joined.error.is_ok(), "join failed: {:?}", joined.error);
    let joined_meeting = joined.meeting.unwrap();
    assert_eq!(joined_meeting.state, "RUNNING");
    assert_eq!(joined_meeting.participant_ids.len(), 2);

    let left = harness.meetings.leave_meeting(&LeaveMeetingRequest {
        session_token: token_bob,
        meeting_id: meeting.meeting_id.clone(),
    });
    assert!(left.error.is_ok());

    let ended = harness.meetings.end_meeting(&EndMeetingRequest {
        session_token: token_alice,
        meeting_id: meeting.meeting_id.clone(),
    });
    assert!(ended.error.is_ok());

    let fetched = harness.meetings.get_meeting(&GetMeetingRequest {
        meeting_id: meeting.meeting_id,
    });
    assert_eq!(fetched.meeting.unwrap().state, "ENDED");
}

#[test]
fn end_by_non_organizer_is_rejected_and_state_unchanged() {
    let harness = harness();
    let token_alice = login(&harness, "alice");
    let token_bob = login(&harness, "bob");

    let created = harness.meetings.create_meeting(&CreateMeetingRequest {
        session_token: token_alice,
        topic: "Planning".to_string(),
    });
    let meeting = created.meeting.unwrap();

    let ended = harness.meetings.end_meeting(&EndMeetingRequest {
        session_token: token_bob,
        meeting_id: meeting.meeting_id.clone(),
    });
    assert_eq!(ended.error.status, 16);

    let fetched = harness.meetings.get_meeting(&GetMeetingRequest {
        meeting_id: meeting.meeting_id,
    });
    assert_eq!(fetched.meeting.unwrap().state, "SCHEDULED");
}

#[test]
fn join_full_meeting_reports_meeting_full() {
    let harness = harness();
    let organizer = login(&harness, "host");

    let created = harness.meetings.create_meeting(&CreateMeetingRequest {
        session_token: organizer,
        topic: "All hands".to_string(),
    });
    let meeting = created.meeting.unwrap();

    // Capacity is 4; the organizer holds one seat.
    for name in ["u1", "u2", "u3"] {
        let token = login(&harness, name);
        let joined = harness.meetings.join_meeting(&JoinMeetingRequest {
            session_token: token,
            meeting_id: meeting.meeting_id.clone(),
            client_ip: String::new(),
        });
        assert!(joined.error.is_ok());
    }

    let overflow = login(&harness, "u4");
    let joined = harness.meetings.join_meeting(&JoinMeetingRequest {
        session_token: overflow,
        meeting_id: meeting.meeting_id.clone(),
        client_ip: String::new(),
    });
    assert_eq!(joined.error.status, 14);
    assert_eq!(joined.error.code, 2003);
}

#[test]
fn join_ended_meeting_is_invalid_argument() {
    let harness = harness();
    let token_alice = login(&harness, "alice");
    let token_bob = login(&harness, "bob");

    let created = harness.meetings.create_meeting(&CreateMeetingRequest {
        session_token: token_alice.clone(),
        topic: "One-off".to_string(),
    });
    let meeting = created.meeting.unwrap();

    harness.meetings.end_meeting(&EndMeetingRequest {
        session_token: token_alice,
        meeting_id: meeting.meeting_id.clone(),
    });

    let joined = harness.meetings.join_meeting(&JoinMeetingRequest {
        session_token: token_bob,
        meeting_id: meeting.meeting_id,
        client_ip: String::new(),
    });
    assert_eq!(joined.error.status, 3);
}

#[test]
fn join_into_running_meeting_does_not_touch_updated_at() {
    let harness = harness();
    let token_alice = login(&harness, "alice");
    let token_bob = login(&harness, "bob");
    let token_cara = login(&harness, "cara");

    let created = harness.meetings.create_meeting(&CreateMeetingRequest {
        session_token: token_alice,
        topic: "Standup".to_string(),
    });
    let meeting = created.meeting.unwrap();

    // Bob's join is the Scheduled -> Running transition.
    let first = harness.meetings.join_meeting(&JoinMeetingRequest {
        session_token: token_bob,
        meeting_id: meeting.meeting_id.clone(),
        client_ip: String::new(),
    });
    let running = first.meeting.unwrap();
    assert_eq!(running.state, "RUNNING");

    // Cara joins an already-running meeting: no transition, no stamp.
    let second = harness.meetings.join_meeting(&JoinMeetingRequest {
        session_token: token_cara,
        meeting_id: meeting.meeting_id.clone(),
        client_ip: String::new(),
    });
    let joined = second.meeting.unwrap();
    assert_eq!(joined.state, "RUNNING");
    assert_eq!(joined.participant_ids.len(), 3);
    assert_eq!(joined.updated_at, running.updated_at);

    let fetched = harness.meetings.get_meeting(&GetMeetingRequest {
        meeting_id: meeting.meeting_id,
    });
    let stored = fetched.meeting.unwrap();
    assert_eq!(stored.updated_at, running.updated_at);
    assert_eq!(stored.participant_ids.len(), 3);
}

#[test]
fn duplicate_join_reports_participant_exists() {
    let harness = harness();
    let token_alice = login(&harness, "alice");
    let token_bob = login(&harness, "bob");

    let created = harness.meetings.create_meeting(&CreateMeetingRequest {
        session_token: token_alice,
        topic: "Sync".to_string(),
    });
    let meeting = created.meeting.unwrap();

    let first = harness.meetings.join_meeting(&JoinMeetingRequest {
        session_token: token_bob.clone(),
        meeting_id: meeting.meeting_id.clone(),
        client_ip: String::new(),
    });
    assert!(first.error.is_ok());

    let second = harness.meetings.join_meeting(&JoinMeetingRequest {
        session_token: token_bob,
        meeting_id: meeting.meeting_id,
        client_ip: String::new(),
    });
    assert_eq!(second.error.status, 6);
    assert_eq!(second.error.code, 2002);
}

#[test]
fn stale_token_is_rejected() {
    let harness = harness();
    let created = harness.meetings.create_meeting(&CreateMeetingRequest {
        session_token: "not-a-token".to_string(),
        topic: "Ghost".to_string(),
    });
    assert_eq!(created.error.status, 16);
    assert!(created.meeting.is_none());
}

#[test]
fn unknown_meeting_is_not_found() {
    let harness = harness();
    let fetched = harness.meetings.get_meeting(&GetMeetingRequest {
        meeting_id: "meeting_-missing".to_string(),
    });
    assert_eq!(fetched.error.status, 5);
    assert_eq!(fetched.error.code, 2001);
}

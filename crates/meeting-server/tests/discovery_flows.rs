//! Discovery fallback: a standalone process serves its own endpoint.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use meeting_server::core::meeting::{InMemoryMeetingRepository, MeetingConfig, MeetingManager};
use meeting_server::core::user::{
    InMemorySessionRepository, InMemoryUserRepository, SessionConfig, SessionManager, UserManager,
};
use meeting_server::geo::GeoLocationService;
use meeting_server::registry::{CoordError, Coordinator, NodeInfo, ServerRegistry};
use meeting_server::scheduler::LoadBalancer;
use meeting_server::server::{
    CreateMeetingRequest, JoinMeetingRequest, LoginRequest, MeetingService, RegisterRequest,
    UserService,
};
use workpool::{PoolConfig, StopMode, ThreadPool};

/// A coordination backend that is down.
struct UnreachableCoordinator;

impl Coordinator for UnreachableCoordinator {
    fn ensure_node(&self, _path: &str, _data: &str, _ephemeral: bool) -> Result<(), CoordError> {
        Err(CoordError::connection_loss("connection refused"))
    }

    fn delete_node(&self, _path: &str) -> Result<(), CoordError> {
        Err(CoordError::connection_loss("connection refused"))
    }

    fn children(&self, _path: &str) -> Result<Vec<String>, CoordError> {
        Err(CoordError::connection_loss("connection refused"))
    }
}

#[test]
fn standalone_process_routes_to_itself() {
    let pool = ThreadPool::new(PoolConfig {
        queue_cap: 64,
        core_threads: 2,
        max_threads: 2,
        ..PoolConfig::default()
    });
    pool.start();

    // Registration against an unreachable backend disables the registry
    // but keeps the self node.
    let registry = Arc::new(ServerRegistry::new(Some(Box::new(UnreachableCoordinator))));
    let self_node = NodeInfo::new("10.1.2.3", 50051, "default");
    registry.register(&self_node);
    assert!(!registry.enabled());
    assert_eq!(registry.list("default"), vec![self_node.clone()]);

    let sessions = Arc::new(SessionManager::new(
        Arc::new(InMemorySessionRepository::new()),
        SessionConfig::default(),
    ));
    let users = UserService::new(
        pool.clone(),
        Arc::new(UserManager::new(Arc::new(InMemoryUserRepository::new()))),
        Arc::clone(&sessions),
    );
    let meetings = MeetingService::new(
        pool.clone(),
        Arc::new(MeetingManager::new(
            Arc::new(InMemoryMeetingRepository::new()),
            MeetingConfig::default(),
        )),
        sessions,
        Some(Arc::new(GeoLocationService::disabled())),
        Some(Arc::new(LoadBalancer::new(Arc::clone(&registry)))),
    );

    // Two users; the joiner is handed this instance's endpoint.
    for name in ["alice", "bob"] {
        let response = users.register(&RegisterRequest {
            user_name: name.to_string(),
            password: "Passw0rd!".to_string(),
            email: format!("{name}@x"),
            display_name: String::new(),
        });
        assert!(response.error.is_ok());
    }
    let token_alice = users
        .login(&LoginRequest {
            user_name: "alice".to_string(),
            password: "Passw0rd!".to_string(),
        })
        .session_token;
    let token_bob = users
        .login(&LoginRequest {
            user_name: "bob".to_string(),
            password: "Passw0rd!".to_string(),
        })
        .session_token;

    let created = meetings.create_meeting(&CreateMeetingRequest {
        session_token: token_alice,
        topic: "Standalone".to_string(),
    });
    let meeting = created.meeting.unwrap();

    let joined = meetings.join_meeting(&JoinMeetingRequest {
        session_token: token_bob,
        meeting_id: meeting.meeting_id,
        // A private client address resolves through the default region.
        client_ip: "192.168.1.50".to_string(),
    });
    assert!(joined.error.is_ok());
    let endpoint = joined.endpoint.unwrap();
    assert_eq!(endpoint.host, "10.1.2.3");
    assert_eq!(endpoint.port, 50051);
    assert_eq!(endpoint.region, "default");

    pool.stop(StopMode::Graceful);
}

#[test]
fn unregister_withdraws_the_endpoint() {
    let registry = ServerRegistry::new(None);
    let node = NodeInfo::new("10.1.2.3", 50051, "eu");
    registry.register(&node);
    assert_eq!(registry.list("eu").len(), 1);

    registry.unregister(&node);
    assert!(registry.list("eu").is_empty());
}

//! Meeting-facing RPCs: create, join, leave, end, get.

use std::sync::Arc;

use tracing::{debug, info};
use workpool::ThreadPool;

use crate::core::meeting::MeetingManager;
use crate::core::user::SessionManager;
use crate::geo::{GeoInfo, GeoLocationService};
use crate::scheduler::LoadBalancer;

use super::error_codes::RpcError;
use super::messages::{
    CreateMeetingRequest, CreateMeetingResponse, EndMeetingRequest, EndMeetingResponse, Endpoint,
    GetMeetingRequest, GetMeetingResponse, JoinMeetingRequest, JoinMeetingResponse,
    LeaveMeetingRequest, LeaveMeetingResponse, MeetingInfo,
};
use super::offload;

/// Meeting lifecycle RPCs. Join additionally resolves an endpoint hint
/// from the client's IP via geo lookup and the registry.
pub struct MeetingService {
    pool: ThreadPool,
    meetings: Arc<MeetingManager>,
    sessions: Arc<SessionManager>,
    geo: Option<Arc<GeoLocationService>>,
    balancer: Option<Arc<LoadBalancer>>,
}

impl MeetingService {
    pub fn new(
        pool: ThreadPool,
        meetings: Arc<MeetingManager>,
        sessions: Arc<SessionManager>,
        geo: Option<Arc<GeoLocationService>>,
        balancer: Option<Arc<LoadBalancer>>,
    ) -> Self {
        Self {
            pool,
            meetings,
            sessions,
            geo,
            balancer,
        }
    }

    // Resolve the caller's numeric user id from the session token.
    fn resolve_user(&self, session_token: &str) -> Result<u64, common::Status> {
        let sessions = Arc::clone(&self.sessions);
        let token = session_token.to_string();
        offload(&self.pool, move || sessions.validate_session(&token))
            .map(|session| session.user_id)
    }

    pub fn create_meeting(&self, request: &CreateMeetingRequest) -> CreateMeetingResponse {
        let organizer_id = match self.resolve_user(&request.session_token) {
            Ok(id) => id,
            Err(status) => {
                return CreateMeetingResponse {
                    meeting: None,
                    error: RpcError::meeting(&status),
                }
            }
        };
        info!(target: "meeting.rpc", topic = %request.topic, organizer_id, "CreateMeeting");

        let meetings = Arc::clone(&self.meetings);
        let topic = request.topic.clone();
        match offload(&self.pool, move || {
            meetings.create_meeting(organizer_id, &topic)
        }) {
            Ok(meeting) => CreateMeetingResponse {
                meeting: Some(MeetingInfo::from(&meeting)),
                error: RpcError::ok(),
            },
            Err(status) => CreateMeetingResponse {
                meeting: None,
                error: RpcError::meeting(&status),
            },
        }
    }

    pub fn join_meeting(&self, request: &JoinMeetingRequest) -> JoinMeetingResponse {
        let participant_id = match self.resolve_user(&request.session_token) {
            Ok(id) => id,
            Err(status) => {
                return JoinMeetingResponse {
                    meeting: None,
                    endpoint: None,
                    error: RpcError::meeting(&status),
                }
            }
        };
        info!(
            target: "meeting.rpc",
            meeting_id = %request.meeting_id,
            participant_id,
            "JoinMeeting"
        );

        let meetings = Arc::clone(&self.meetings);
        let meeting_id = request.meeting_id.clone();
        match offload(&self.pool, move || {
            meetings.join_meeting(&meeting_id, participant_id)
        }) {
            Ok(meeting) => JoinMeetingResponse {
                meeting: Some(MeetingInfo::from(&meeting)),
                endpoint: self.select_endpoint(&request.client_ip),
                error: RpcError::ok(),
            },
            Err(status) => JoinMeetingResponse {
                meeting: None,
                endpoint: None,
                error: RpcError::meeting(&status),
            },
        }
    }

    // Client IP -> region -> registry listing -> first node. Private or
    // unresolvable addresses route through the default region.
    fn select_endpoint(&self, client_ip: &str) -> Option<Endpoint> {
        let balancer = self.balancer.as_ref()?;

        let geo = match self.geo.as_ref() {
            Some(service) => match service.lookup(client_ip) {
                Ok(info) if !info.is_private => info,
                Ok(_) => GeoInfo::default(),
                Err(status) => {
                    debug!(
                        target: "meeting.rpc",
                        client_ip,
                        error = %status,
                        "geo lookup failed, using default region"
                    );
                    GeoInfo::default()
                }
            },
            None => GeoInfo::default(),
        };

        balancer.select(&geo).map(|node| Endpoint {
            host: node.host,
            port: node.port,
            region: node.region,
        })
    }

    pub fn leave_meeting(&self, request: &LeaveMeetingRequest) -> LeaveMeetingResponse {
        let participant_id = match self.resolve_user(&request.session_token) {
            Ok(id) => id,
            Err(status) => {
                return LeaveMeetingResponse {
                    error: RpcError::meeting(&status),
                }
            }
        };
        info!(
            target: "meeting.rpc",
            meeting_id = %request.meeting_id,
            participant_id,
            "LeaveMeeting"
        );

        let meetings = Arc::clone(&self.meetings);
        let meeting_id = request.meeting_id.clone();
        match offload(&self.pool, move || {
            meetings.leave_meeting(&meeting_id, participant_id)
        }) {
            Ok(()) => LeaveMeetingResponse {
                error: RpcError::ok(),
            },
            Err(status) => LeaveMeetingResponse {
                error: RpcError::meeting(&status),
            },
        }
    }

    pub fn end_meeting(&self, request: &EndMeetingRequest) -> EndMeetingResponse {
        let requester_id = match self.resolve_user(&request.session_token) {
            Ok(id) => id,
            Err(status) => {
                return EndMeetingResponse {
                    error: RpcError::meeting(&status),
                }
            }
        };
        info!(
            target: "meeting.rpc",
            meeting_id = %request.meeting_id,
            requester_id,
            "EndMeeting"
        );

        let meetings = Arc::clone(&self.meetings);
        let meeting_id = request.meeting_id.clone();
        match offload(&self.pool, move || {
            meetings.end_meeting(&meeting_id, requester_id)
        }) {
            Ok(()) => EndMeetingResponse {
                error: RpcError::ok(),
            },
            Err(status) => EndMeetingResponse {
                error: RpcError::meeting(&status),
            },
        }
    }

    pub fn get_meeting(&self, request: &GetMeetingRequest) -> GetMeetingResponse {
        info!(target: "meeting.rpc", meeting_id = %request.meeting_id, "GetMeeting");
        let meetings = Arc::clone(&self.meetings);
        let meeting_id = request.meeting_id.clone();
        match offload(&self.pool, move || meetings.get_meeting(&meeting_id)) {
            Ok(meeting) => GetMeetingResponse {
                meeting: Some(MeetingInfo::from(&meeting)),
                error: RpcError::ok(),
            },
            Err(status) => GetMeetingResponse {
                meeting: None,
                error: RpcError::meeting(&status),
            },
        }
    }
}

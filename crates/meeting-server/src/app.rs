//! Component wiring.
//!
//! Builds the full graph from configuration: repositories (SQL-bound when
//! the durable store is enabled and reachable, in-memory otherwise), cache
//! wrapping, managers, the executor, discovery, geo lookup, and the RPC
//! facade. Everything is passed explicitly; the only process-wide state is
//! the logger installed at the entry point.

use std::sync::Arc;
use std::time::Duration;

use common::config::{AppConfig, QueuePolicy};
use tracing::{info, warn};
use workpool::{PoolConfig, QueueFullPolicy, ShutdownOption, ThreadPool};

use crate::cache::{KvCache, RedisCache};
use crate::core::meeting::{
    CachedMeetingRepository, InMemoryMeetingRepository, MeetingConfig, MeetingManager,
    MeetingRepository,
};
use crate::core::user::{
    CachedSessionRepository, CachedUserRepository, InMemorySessionRepository,
    InMemoryUserRepository, SessionConfig, SessionManager, SessionRepository, UserManager,
    UserRepository,
};
use crate::geo::GeoLocationService;
use crate::registry::{Coordinator, NodeInfo, ServerRegistry, ZkCoordinator};
use crate::scheduler::LoadBalancer;
use crate::server::{MeetingService, UserService};
use crate::storage::{
    ConnectionPool, SqlConnector, SqlMeetingRepository, SqlSessionRepository, SqlUserRepository,
    StorageOptions,
};

/// Cache TTL for user and meeting payloads.
const CACHE_TTL_SECONDS: u64 = 300;

/// Coordination session timeout.
const ZK_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// The assembled server.
pub struct App {
    pub pool: ThreadPool,
    pub registry: Arc<ServerRegistry>,
    pub user_service: UserService,
    pub meeting_service: MeetingService,
    self_node: NodeInfo,
}

impl App {
    /// Build and start every component, with in-memory repositories or the
    /// durable store depending on configuration. The concrete SQL driver is
    /// injected by the deployment's entry point.
    pub fn build(config: &AppConfig) -> Self {
        Self::build_with_connector(config, None)
    }

    /// Build with an explicit durable-store connector.
    pub fn build_with_connector(
        config: &AppConfig,
        connector: Option<Box<dyn SqlConnector>>,
    ) -> Self {
        let pool = ThreadPool::new(pool_config(config));
        pool.start();

        let cache = build_cache(config);

        // Repositories: durable store when enabled and reachable,
        // in-process otherwise; then the cache decorators when a cache is
        // configured.
        let mut user_repository: Arc<dyn UserRepository> = Arc::new(InMemoryUserRepository::new());
        let mut session_repository: Arc<dyn SessionRepository> =
            Arc::new(InMemorySessionRepository::new());
        let mut meeting_repository: Arc<dyn MeetingRepository> =
            Arc::new(InMemoryMeetingRepository::new());
        match (config.storage.mysql.enabled, connector) {
            (true, Some(connector)) => {
                let storage_pool = ConnectionPool::new(
                    connector,
                    StorageOptions {
                        pool_size: config.storage.mysql.pool_size,
                        acquire_timeout: Duration::from_millis(
                            config.storage.mysql.connection_timeout_ms,
                        ),
                    },
                );
                // Probe once so a dead store degrades to in-memory now
                // rather than on the first request.
                match storage_pool.acquire() {
                    Ok(_lease) => {
                        user_repository =
                            Arc::new(SqlUserRepository::new(Arc::clone(&storage_pool)));
                        session_repository =
                            Arc::new(SqlSessionRepository::new(Arc::clone(&storage_pool)));
                        meeting_repository =
                            Arc::new(SqlMeetingRepository::new(storage_pool));
                        info!(target: "meeting.app", "durable store attached");
                    }
                    Err(status) => {
                        warn!(
                            target: "meeting.app",
                            error = %status,
                            "durable store unreachable, using in-memory repositories"
                        );
                    }
                }
            }
            (true, None) => {
                warn!(
                    target: "meeting.app",
                    "durable store enabled but no driver connector provided, using in-memory repositories"
                );
            }
            (false, _) => {}
        }
        if let Some(cache) = cache.as_ref() {
            user_repository = Arc::new(CachedUserRepository::new(
                user_repository,
                Arc::clone(cache),
                CACHE_TTL_SECONDS,
            ));
            session_repository = Arc::new(CachedSessionRepository::new(
                session_repository,
                Arc::clone(cache),
            ));
            meeting_repository = Arc::new(CachedMeetingRepository::new(
                meeting_repository,
                Arc::clone(cache),
                CACHE_TTL_SECONDS,
            ));
        }

        let users = Arc::new(UserManager::new(user_repository));
        let sessions = Arc::new(SessionManager::new(
            session_repository,
            SessionConfig::default(),
        ));
        let meetings = Arc::new(MeetingManager::new(
            meeting_repository,
            MeetingConfig::default(),
        ));

        let registry = Arc::new(ServerRegistry::new(build_coordinator(config)));
        let balancer = Arc::new(LoadBalancer::new(Arc::clone(&registry)));
        let geo = if config.geoip.db_path.is_empty() {
            Arc::new(GeoLocationService::disabled())
        } else {
            Arc::new(GeoLocationService::new(&config.geoip.db_path))
        };

        let user_service = UserService::new(pool.clone(), users, Arc::clone(&sessions));
        let meeting_service = MeetingService::new(
            pool.clone(),
            meetings,
            sessions,
            Some(geo),
            Some(balancer),
        );

        let mut self_node =
            NodeInfo::new(config.server.host.clone(), config.server.port, "default");
        self_node.meta = serde_json::json!({
            "instance_id": instance_id(),
            "weight": self_node.weight,
        })
        .to_string();

        Self {
            pool,
            registry,
            user_service,
            meeting_service,
            self_node,
        }
    }

    /// Publish this instance's endpoint.
    pub fn register_self(&self) {
        self.registry.register(&self.self_node);
        info!(
            target: "meeting.app",
            host = %self.self_node.host,
            port = self.self_node.port,
            "serving"
        );
    }

    /// Withdraw the endpoint and drain the executor.
    pub fn shutdown(&self, timeout: Duration) {
        self.registry.unregister(&self.self_node);
        self.pool.shutdown(ShutdownOption::Timeout(timeout));
        info!(target: "meeting.app", "shutdown complete");
    }
}

// Unique-per-process identifier carried in the registry record.
fn instance_id() -> String {
    let uuid = uuid::Uuid::new_v4().to_string();
    let suffix = uuid.get(..8).unwrap_or("00000000");
    format!("ms-{suffix}")
}

fn pool_config(config: &AppConfig) -> PoolConfig {
    let tp = &config.thread_pool;
    PoolConfig {
        queue_cap: tp.queue_cap,
        core_threads: tp.core_threads,
        max_threads: tp.max_threads,
        load_check_interval: Duration::from_millis(tp.load_check_interval_ms),
        keep_alive: Duration::from_millis(tp.keep_alive_ms),
        scale_up_threshold: tp.scale_up_threshold,
        scale_down_threshold: tp.scale_down_threshold,
        pending_hi: tp.pending_hi,
        pending_low: tp.pending_low,
        debounce_hits: tp.debounce_hits,
        cooldown: Duration::from_millis(tp.cooldown_ms),
        queue_policy: match tp.queue_policy {
            QueuePolicy::Block => QueueFullPolicy::Block,
            QueuePolicy::Discard => QueueFullPolicy::Discard,
            QueuePolicy::Overwrite => QueueFullPolicy::Overwrite,
        },
    }
}

fn build_cache(config: &AppConfig) -> Option<Arc<dyn KvCache>> {
    if !config.cache.redis.enabled {
        return None;
    }
    match RedisCache::new(&config.cache.redis) {
        Ok(cache) => Some(Arc::new(cache) as Arc<dyn KvCache>),
        Err(status) => {
            warn!(target: "meeting.app", error = %status, "cache disabled");
            None
        }
    }
}

fn build_coordinator(config: &AppConfig) -> Option<Box<dyn Coordinator>> {
    if config.zookeeper.hosts.is_empty() {
        return None;
    }
    match ZkCoordinator::connect(&config.zookeeper.hosts, ZK_SESSION_TIMEOUT) {
        Ok(coordinator) => Some(Box::new(coordinator) as Box<dyn Coordinator>),
        Err(e) => {
            warn!(
                target: "meeting.app",
                error = %e,
                "coordination service unreachable, discovery disabled"
            );
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_defaults_is_standalone() {
        let config = AppConfig::default();
        let app = App::build(&config);
        app.register_self();

        // Discovery is disabled, so the instance serves itself.
        let nodes = app.registry.list("default");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].port, config.server.port);

        app.shutdown(Duration::from_millis(500));
    }

    #[test]
    fn test_pool_config_mapping() {
        let mut config = AppConfig::default();
        config.thread_pool.queue_cap = 32;
        config.thread_pool.queue_policy = QueuePolicy::Overwrite;
        let pool = pool_config(&config);
        assert_eq!(pool.queue_cap, 32);
        assert_eq!(pool.queue_policy, QueueFullPolicy::Overwrite);
    }
}

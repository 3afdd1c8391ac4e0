//! ZooKeeper-backed coordinator.

use std::time::Duration;

use tracing::{debug, warn};
use zookeeper::{Acl, CreateMode, WatchedEvent, Watcher, ZkError, ZooKeeper};

use super::coordinator::{CoordError, Coordinator};

struct SessionWatcher;

impl Watcher for SessionWatcher {
    fn handle(&self, event: WatchedEvent) {
        debug!(target: "meeting.registry.zk", ?event, "session event");
    }
}

fn map_zk_error(e: ZkError) -> CoordError {
    match e {
        ZkError::NoNode => CoordError::no_node("no node"),
        ZkError::ConnectionLoss | ZkError::SessionExpired | ZkError::OperationTimeout => {
            CoordError::connection_loss(format!("{e:?}"))
        }
        other => CoordError::other(format!("{other:?}")),
    }
}

/// [`Coordinator`] over a ZooKeeper ensemble.
pub struct ZkCoordinator {
    client: ZooKeeper,
}

impl ZkCoordinator {
    /// Connect to the ensemble; the client owns the session keeping
    /// ephemeral nodes alive.
    pub fn connect(hosts: &str, session_timeout: Duration) -> Result<Self, CoordError> {
        let client = ZooKeeper::connect(hosts, session_timeout, SessionWatcher)
            .map_err(map_zk_error)?;
        debug!(target: "meeting.registry.zk", hosts, "connected");
        Ok(Self { client })
    }
}

impl Coordinator for ZkCoordinator {
    fn ensure_node(&self, path: &str, data: &str, ephemeral: bool) -> Result<(), CoordError> {
        match self.client.exists(path, false) {
            Ok(Some(_)) => return Ok(()),
            Ok(None) => {}
            Err(e) => return Err(map_zk_error(e)),
        }

        let mode = if ephemeral {
            CreateMode::Ephemeral
        } else {
            CreateMode::Persistent
        };
        match self.client.create(
            path,
            data.as_bytes().to_vec(),
            Acl::open_unsafe().clone(),
            mode,
        ) {
            Ok(_) | Err(ZkError::NodeExists) => Ok(()),
            Err(e) => {
                warn!(target: "meeting.registry.zk", path, error = ?e, "create failed");
                Err(map_zk_error(e))
            }
        }
    }

    fn delete_node(&self, path: &str) -> Result<(), CoordError> {
        match self.client.delete(path, None) {
            Ok(()) | Err(ZkError::NoNode) => Ok(()),
            Err(e) => Err(map_zk_error(e)),
        }
    }

    fn children(&self, path: &str) -> Result<Vec<String>, CoordError> {
        self.client.get_children(path, false).map_err(map_zk_error)
    }
}

//! Node registration and region-scoped listing.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::coordinator::Coordinator;

const ROOT_PATH: &str = "/meeting";
const SERVERS_PATH: &str = "/meeting/servers";

/// A serving endpoint. Identity is `(host, port, region)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInfo {
    pub host: String,
    pub port: u16,
    pub region: String,
    pub weight: u32,
    /// Opaque metadata, published as the registry record's value.
    pub meta: String,
}

impl NodeInfo {
    pub fn new(host: impl Into<String>, port: u16, region: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            host: host.into(),
            port,
            region: if region.is_empty() {
                "default".to_string()
            } else {
                region
            },
            weight: 1,
            meta: String::new(),
        }
    }

    fn same_endpoint(&self, other: &NodeInfo) -> bool {
        self.host == other.host && self.port == other.port && self.region == other.region
    }
}

struct RegistryState {
    coordinator: Option<Box<dyn Coordinator>>,
    /// Nodes known to this process, served when the backend is unavailable
    /// or returns nothing.
    nodes: Vec<NodeInfo>,
}

/// Ephemeral presence records under `/meeting/servers/<region>/<host>:<port>`.
///
/// A coordination failure during registration disables the backend for the
/// rest of the process; the in-process list keeps serving (so a standalone
/// instance still returns itself).
pub struct ServerRegistry {
    state: Mutex<RegistryState>,
}

impl ServerRegistry {
    /// Build a registry over an optional backend. `None` means discovery is
    /// disabled (no coordination hosts configured).
    pub fn new(coordinator: Option<Box<dyn Coordinator>>) -> Self {
        if coordinator.is_none() {
            warn!(target: "meeting.registry", "no coordination backend, registry disabled");
        }
        Self {
            state: Mutex::new(RegistryState {
                coordinator,
                nodes: Vec::new(),
            }),
        }
    }

    fn node_path(node: &NodeInfo) -> String {
        format!("{SERVERS_PATH}/{}/{}:{}", node.region, node.host, node.port)
    }

    fn remember(nodes: &mut Vec<NodeInfo>, node: &NodeInfo) {
        if !nodes.iter().any(|known| known.same_endpoint(node)) {
            nodes.push(node.clone());
        }
    }

    /// Publish this node. Idempotent; a backend failure disables the
    /// registry but the node is still remembered locally.
    pub fn register(&self, node: &NodeInfo) {
        let mut state = self.state.lock();
        Self::remember(&mut state.nodes, node);

        let Some(coordinator) = state.coordinator.as_deref() else {
            return;
        };

        let result = coordinator
            .ensure_node(ROOT_PATH, "", false)
            .and_then(|()| coordinator.ensure_node(SERVERS_PATH, "", false))
            .and_then(|()| {
                coordinator.ensure_node(&format!("{SERVERS_PATH}/{}", node.region), "", false)
            })
            .and_then(|()| {
                let meta = serde_json::to_string(node).unwrap_or_default();
                coordinator.ensure_node(&Self::node_path(node), &meta, true)
            });

        match result {
            Ok(()) => {
                info!(
                    target: "meeting.registry",
                    host = %node.host,
                    port = node.port,
                    region = %node.region,
                    "node registered"
                );
            }
            Err(e) => {
                warn!(
                    target: "meeting.registry",
                    error = %e,
                    "registration failed, disabling registry for this process"
                );
                state.coordinator = None;
            }
        }
    }

    /// Remove this node from the backend and the in-process list.
    pub fn unregister(&self, node: &NodeInfo) {
        let mut state = self.state.lock();
        if let Some(coordinator) = state.coordinator.as_deref() {
            if let Err(e) = coordinator.delete_node(&Self::node_path(node)) {
                warn!(target: "meeting.registry", error = %e, "unregister failed");
            }
        }
        state.nodes.retain(|known| !known.same_endpoint(node));
        info!(
            target: "meeting.registry",
            host = %node.host,
            port = node.port,
            region = %node.region,
            "node unregistered"
        );
    }

    /// Live endpoints for a region (empty region means `default`).
    ///
    /// An empty backend result, or a disabled backend, falls back to the
    /// in-process list: region-matching nodes first, then all known nodes.
    pub fn list(&self, region: &str) -> Vec<NodeInfo> {
        let region = if region.is_empty() { "default" } else { region };
        let state = self.state.lock();

        if let Some(coordinator) = state.coordinator.as_deref() {
            match coordinator.children(&format!("{SERVERS_PATH}/{region}")) {
                Ok(children) => {
                    let nodes: Vec<NodeInfo> = children
                        .iter()
                        .filter_map(|name| parse_endpoint(name, region))
                        .collect();
                    if !nodes.is_empty() {
                        return nodes;
                    }
                }
                Err(e) => {
                    warn!(target: "meeting.registry", region, error = %e, "list failed");
                }
            }
        }

        let matching: Vec<NodeInfo> = state
            .nodes
            .iter()
            .filter(|node| node.region == region)
            .cloned()
            .collect();
        if matching.is_empty() {
            state.nodes.clone()
        } else {
            matching
        }
    }

    /// Whether the coordination backend is still in use.
    pub fn enabled(&self) -> bool {
        self.state.lock().coordinator.is_some()
    }
}

fn parse_endpoint(name: &str, region: &str) -> Option<NodeInfo> {
    let (host, port) = name.split_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some(NodeInfo::new(host, port, region))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::coordinator::{CoordError, Coordinator};
    use parking_lot::Mutex as PlMutex;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// In-memory coordination tree for tests.
    #[derive(Default)]
    struct FakeCoordinator {
        nodes: Arc<PlMutex<BTreeMap<String, (String, bool)>>>,
        fail_all: bool,
    }

    impl FakeCoordinator {
        fn failing() -> Self {
            Self {
                fail_all: true,
                ..Self::default()
            }
        }
    }

    impl Coordinator for FakeCoordinator {
        fn ensure_node(&self, path: &str, data: &str, ephemeral: bool) -> Result<(), CoordError> {
            if self.fail_all {
                return Err(CoordError::connection_loss("unreachable"));
            }
            self.nodes
                .lock()
                .entry(path.to_string())
                .or_insert_with(|| (data.to_string(), ephemeral));
            Ok(())
        }

        fn delete_node(&self, path: &str) -> Result<(), CoordError> {
            if self.fail_all {
                return Err(CoordError::connection_loss("unreachable"));
            }
            self.nodes.lock().remove(path);
            Ok(())
        }

        fn children(&self, path: &str) -> Result<Vec<String>, CoordError> {
            if self.fail_all {
                return Err(CoordError::connection_loss("unreachable"));
            }
            let prefix = format!("{path}/");
            Ok(self
                .nodes
                .lock()
                .keys()
                .filter_map(|key| key.strip_prefix(&prefix))
                .filter(|rest| !rest.contains('/'))
                .map(ToString::to_string)
                .collect())
        }
    }

    fn node(host: &str, port: u16, region: &str) -> NodeInfo {
        NodeInfo::new(host, port, region)
    }

    #[test]
    fn test_register_creates_the_expected_paths() {
        let fake = FakeCoordinator::default();
        let tree = Arc::clone(&fake.nodes);
        let registry = ServerRegistry::new(Some(Box::new(fake)));

        registry.register(&node("10.0.0.5", 50051, "eu"));

        let tree = tree.lock();
        assert!(tree.contains_key("/meeting"));
        assert!(tree.contains_key("/meeting/servers"));
        assert!(tree.contains_key("/meeting/servers/eu"));
        let (meta, ephemeral) = tree.get("/meeting/servers/eu/10.0.0.5:50051").unwrap();
        assert!(*ephemeral);
        let decoded: NodeInfo = serde_json::from_str(meta).unwrap();
        assert_eq!(decoded.host, "10.0.0.5");
        // Parents are persistent.
        assert!(!tree.get("/meeting/servers").unwrap().1);
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = ServerRegistry::new(Some(Box::new(FakeCoordinator::default())));
        let n = node("10.0.0.5", 50051, "eu");
        registry.register(&n);
        registry.register(&n);
        assert_eq!(registry.list("eu").len(), 1);
        assert!(registry.enabled());
    }

    #[test]
    fn test_list_parses_host_and_port() {
        let registry = ServerRegistry::new(Some(Box::new(FakeCoordinator::default())));
        registry.register(&node("10.0.0.5", 50051, "eu"));
        registry.register(&node("10.0.0.6", 50052, "eu"));

        let nodes = registry.list("eu");
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().any(|n| n.host == "10.0.0.6" && n.port == 50052));
    }

    #[test]
    fn test_backend_failure_disables_and_serves_self() {
        let registry = ServerRegistry::new(Some(Box::new(FakeCoordinator::failing())));
        let me = node("127.0.0.1", 50051, "default");
        registry.register(&me);

        assert!(!registry.enabled());
        let nodes = registry.list("default");
        assert_eq!(nodes, vec![me]);
    }

    #[test]
    fn test_disabled_registry_serves_local_list() {
        let registry = ServerRegistry::new(None);
        let me = node("127.0.0.1", 50051, "default");
        registry.register(&me);
        assert_eq!(registry.list("default"), vec![me]);
    }

    #[test]
    fn test_empty_region_result_falls_back_to_all_known_nodes() {
        let registry = ServerRegistry::new(None);
        let me = node("127.0.0.1", 50051, "default");
        registry.register(&me);
        // No node matches "ap", so every known node is returned.
        assert_eq!(registry.list("ap"), vec![me]);
    }

    #[test]
    fn test_unregister_removes_node_everywhere() {
        let fake = FakeCoordinator::default();
        let tree = Arc::clone(&fake.nodes);
        let registry = ServerRegistry::new(Some(Box::new(fake)));
        let n = node("10.0.0.5", 50051, "eu");

        registry.register(&n);
        registry.unregister(&n);

        assert!(!tree.lock().contains_key("/meeting/servers/eu/10.0.0.5:50051"));
        assert!(registry.list("eu").is_empty());
    }

    #[test]
    fn test_empty_region_defaults() {
        let registry = ServerRegistry::new(None);
        registry.register(&node("127.0.0.1", 50051, ""));
        let nodes = registry.list("");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].region, "default");
    }
}

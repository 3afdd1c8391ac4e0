//! Region-aware endpoint selection.

use std::sync::Arc;

use crate::geo::GeoInfo;
use crate::registry::{NodeInfo, ServerRegistry};

/// Picks a serving endpoint for a client location.
///
/// The selection rule is intentionally the simplest thing that works -
/// first node in the client's region (or `default`) - so callers stay
/// decoupled from the policy; a richer strategy slots in here without
/// touching them.
pub struct LoadBalancer {
    registry: Arc<ServerRegistry>,
}

impl LoadBalancer {
    pub fn new(registry: Arc<ServerRegistry>) -> Self {
        Self { registry }
    }

    pub fn select(&self, geo: &GeoInfo) -> Option<NodeInfo> {
        let region = if geo.region.is_empty() {
            "default"
        } else {
            &geo.region
        };
        self.registry.list(region).into_iter().next()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_select_prefers_region_nodes() {
        let registry = Arc::new(ServerRegistry::new(None));
        registry.register(&NodeInfo::new("10.0.0.1", 50051, "eu"));
        registry.register(&NodeInfo::new("10.0.0.2", 50051, "ap"));

        let balancer = LoadBalancer::new(registry);
        let geo = GeoInfo {
            region: "ap".to_string(),
            ..GeoInfo::default()
        };
        assert_eq!(balancer.select(&geo).unwrap().host, "10.0.0.2");
    }

    #[test]
    fn test_empty_region_uses_default() {
        let registry = Arc::new(ServerRegistry::new(None));
        registry.register(&NodeInfo::new("127.0.0.1", 50051, "default"));

        let balancer = LoadBalancer::new(registry);
        let selected = balancer.select(&GeoInfo::default()).unwrap();
        assert_eq!(selected.host, "127.0.0.1");
    }

    #[test]
    fn test_empty_registry_selects_nothing() {
        let balancer = LoadBalancer::new(Arc::new(ServerRegistry::new(None)));
        assert!(balancer.select(&GeoInfo::default()).is_none());
    }
}

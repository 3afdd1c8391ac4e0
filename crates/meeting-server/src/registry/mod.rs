//! Service registration and discovery.
//!
//! Nodes publish an ephemeral presence record in a hierarchical
//! coordination service under `/meeting/servers/<region>/<host>:<port>`;
//! the record's lifetime is bound to the owning session, so a crashed
//! process disappears from listings on its own. When the coordination
//! backend is unreachable the registry disables itself and serves from an
//! in-process node list, so a standalone process still routes to itself.

mod coordinator;
mod server_registry;
mod zk;

pub use coordinator::{CoordError, CoordErrorKind, Coordinator};
pub use server_registry::{NodeInfo, ServerRegistry};
pub use zk::ZkCoordinator;

//! Distribution controller seam.

use std::collections::BTreeMap;

use cluster_types::{Server, ServerSymbolicName, Topology};

use crate::error::ServerError;
use crate::handle::{ProcessSpawn, ServerProcessHandle};

/// Per peer, the local relay port a server must dial instead of the peer's
/// real group port.
pub type ProxiedPorts = BTreeMap<ServerSymbolicName, u16>;

/// Product-specific process management.
///
/// The controller knows how to install, configure, launch and kill one
/// product. It publishes the server's observed state on the watch channel it
/// returns from [`create`](Self::create).
pub trait DistributionController: Send + Sync {
    /// Spawn `server`.
    ///
    /// `proxied_ports` is empty unless the topology enables proxy-based
    /// disruption; when present, the server must be configured to reach
    /// each listed peer on its own host at the given port.
    fn create(
        &self,
        server: &Server,
        topology: &Topology,
        proxied_ports: &ProxiedPorts,
    ) -> Result<ProcessSpawn, ServerError>;

    /// Stop the process behind `handle`.
    fn stop(&self, server: &Server, handle: &ServerProcessHandle) -> Result<(), ServerError>;
}

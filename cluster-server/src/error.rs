//! Error types for cluster-server.

use std::fmt;
use std::io;
use std::time::Duration;

use cluster_disrupt::DisruptionError;
use cluster_ports::PortError;
use cluster_types::{ServerState, ServerSymbolicName, TopologyError};

use crate::process::Pid;

/// Main error type for server lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Topology lookup or validation failed.
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    /// Proxy port reservation failed.
    #[error("port error: {0}")]
    Ports(#[from] PortError),

    /// Link creation or transition failed.
    #[error("disruption error: {0}")]
    Disruption(#[from] DisruptionError),

    /// The process died before reaching the awaited state.
    #[error("server {server} died while waiting (last state: {last_state})")]
    ProcessDied {
        /// The server.
        server: ServerSymbolicName,
        /// Last state published before death.
        last_state: ServerState,
    },

    /// The awaited state was not reached in time.
    #[error("server {server} still {last_state} after {waited:?}")]
    StateTimeout {
        /// The server.
        server: ServerSymbolicName,
        /// State when giving up.
        last_state: ServerState,
        /// How long the caller waited.
        waited: Duration,
    },

    /// A live process is already bound to this instance.
    #[error("server {0} is already running")]
    AlreadyRunning(ServerSymbolicName),

    /// No process has been created for this instance.
    #[error("server {0} has no process")]
    NotCreated(ServerSymbolicName),

    /// The topology was built without network disruption.
    #[error("network disruption is not enabled for the topology of {0}")]
    DisruptionNotEnabled(ServerSymbolicName),

    /// The target has no outbound link from this server.
    #[error("server {server} has no disruption link to {peer}")]
    UnknownPeer {
        /// The server owning the links.
        server: ServerSymbolicName,
        /// The requested target.
        peer: ServerSymbolicName,
    },

    /// The instance was closed.
    #[error("server instance {0} is closed")]
    Closed(ServerSymbolicName),

    /// Terminating one or more processes failed.
    #[error("failed to terminate {}: {}", .failures.len(), summarize(.failures))]
    Terminate {
        /// Every pid that could not be terminated.
        failures: Vec<PidFailure>,
    },

    /// The distribution controller reported a failure.
    #[error("controller error: {0}")]
    Controller(String),
}

/// One process that could not be terminated.
#[derive(Debug)]
pub struct PidFailure {
    /// The process.
    pub pid: Pid,
    /// Why termination failed.
    pub source: io::Error,
}

impl fmt::Display for PidFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}: {}", self.pid, self.source)
    }
}

fn summarize(failures: &[PidFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

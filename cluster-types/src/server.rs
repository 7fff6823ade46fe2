//! Identity and addressing types for a single cluster member.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TopologyError;

/// Symbolic name of a server, unique within its topology.
///
/// This is the identity of a server: two [`Server`] values with the same
/// symbolic name in one topology describe the same member.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerSymbolicName(String);

impl ServerSymbolicName {
    /// Create a symbolic name, rejecting blank names.
    pub fn new(name: impl Into<String>) -> Result<Self, TopologyError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TopologyError::InvalidServer(
                "symbolic name must not be blank".into(),
            ));
        }
        Ok(Self(name))
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServerSymbolicName {
    type Error = TopologyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServerSymbolicName> for String {
    fn from(name: ServerSymbolicName) -> Self {
        name.0
    }
}

impl fmt::Display for ServerSymbolicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ServerSymbolicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerSymbolicName({})", self.0)
    }
}

/// The four ports a clustered server listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerPorts {
    /// Client-facing port.
    pub tsa_port: u16,
    /// Server-to-server (stripe replication) port.
    pub group_port: u16,
    /// Management port.
    pub management_port: u16,
    /// JMX port.
    pub jmx_port: u16,
}

impl ServerPorts {
    /// Build a port set from four consecutive ports starting at `base`.
    ///
    /// Handy together with a four-port reservation.
    pub fn consecutive(base: u16) -> Self {
        Self {
            tsa_port: base,
            group_port: base.saturating_add(1),
            management_port: base.saturating_add(2),
            jmx_port: base.saturating_add(3),
        }
    }

    /// All ports in declaration order.
    pub fn all(&self) -> [u16; 4] {
        [
            self.tsa_port,
            self.group_port,
            self.management_port,
            self.jmx_port,
        ]
    }
}

/// A cluster member: symbolic name, host and ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Server {
    symbolic_name: ServerSymbolicName,
    hostname: String,
    #[serde(flatten)]
    ports: ServerPorts,
}

impl Server {
    /// Create a new server description.
    pub fn new(
        symbolic_name: ServerSymbolicName,
        hostname: impl Into<String>,
        ports: ServerPorts,
    ) -> Self {
        Self {
            symbolic_name,
            hostname: hostname.into(),
            ports,
        }
    }

    /// Get the symbolic name.
    pub fn symbolic_name(&self) -> &ServerSymbolicName {
        &self.symbolic_name
    }

    /// Get the hostname.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Get the port set.
    pub fn ports(&self) -> &ServerPorts {
        &self.ports
    }

    /// Client-facing port.
    pub fn tsa_port(&self) -> u16 {
        self.ports.tsa_port
    }

    /// Server-to-server port; this is what disruption links stand in for.
    pub fn group_port(&self) -> u16 {
        self.ports.group_port
    }

    /// Host and group port, ready for socket address resolution.
    pub fn group_address(&self) -> (&str, u16) {
        (&self.hostname, self.ports.group_port)
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}",
            self.symbolic_name, self.hostname, self.ports.tsa_port
        )
    }
}

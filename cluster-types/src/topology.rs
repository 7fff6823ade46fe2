//! Stripes, topologies and the disruption peer-selection policy.
//!
//! A [`Topology`] is the full description of a cluster under test. It is
//! built once, optionally reconfigured at runtime (servers added to or removed
//! from stripes), and consulted by each server instance when it builds its
//! outbound disruption links.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::{Server, ServerSymbolicName, TopologyError};

/// Opaque description of the clustered product under test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Distribution {
    /// Product name, e.g. `terracotta`.
    pub product: String,
    /// Product version.
    pub version: String,
}

impl Distribution {
    /// Create a new distribution descriptor.
    pub fn new(product: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.product, self.version)
    }
}

/// Which peers a server builds outbound disruption links to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeerPolicy {
    /// Every other member of the server's own stripe.
    ///
    /// Replication traffic only flows inside a stripe, so this is the
    /// smallest set that can partition a stripe.
    #[default]
    StripePeers,
    /// Every other server in the topology, across stripes.
    AllPeers,
}

/// An ordered replica set of servers.
///
/// Never empty and never contains two servers with the same symbolic name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStripe", into = "RawStripe")]
pub struct Stripe {
    servers: Vec<Server>,
}

#[derive(Serialize, Deserialize)]
struct RawStripe {
    servers: Vec<Server>,
}

impl TryFrom<RawStripe> for Stripe {
    type Error = TopologyError;

    fn try_from(raw: RawStripe) -> Result<Self, Self::Error> {
        Stripe::new(raw.servers)
    }
}

impl From<Stripe> for RawStripe {
    fn from(stripe: Stripe) -> Self {
        RawStripe {
            servers: stripe.servers,
        }
    }
}

impl Stripe {
    /// Create a stripe from an ordered list of servers.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::EmptyStripe`] for an empty list and
    /// [`TopologyError::DuplicateServer`] if two servers share a symbolic name.
    pub fn new(servers: Vec<Server>) -> Result<Self, TopologyError> {
        if servers.is_empty() {
            return Err(TopologyError::EmptyStripe);
        }
        let mut seen = HashSet::new();
        for server in &servers {
            if !seen.insert(server.symbolic_name()) {
                return Err(TopologyError::DuplicateServer(
                    server.symbolic_name().to_string(),
                ));
            }
        }
        Ok(Self { servers })
    }

    /// Servers in stripe order.
    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    /// Number of servers.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Always false once constructed; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Look up a member by symbolic name.
    pub fn find(&self, name: &ServerSymbolicName) -> Option<&Server> {
        self.servers.iter().find(|s| s.symbolic_name() == name)
    }

    /// Whether a member with this symbolic name exists.
    pub fn contains(&self, name: &ServerSymbolicName) -> bool {
        self.find(name).is_some()
    }

    /// Append a server at the end of the stripe.
    pub fn add_server(&mut self, server: Server) -> Result<(), TopologyError> {
        if self.contains(server.symbolic_name()) {
            return Err(TopologyError::DuplicateServer(
                server.symbolic_name().to_string(),
            ));
        }
        self.servers.push(server);
        Ok(())
    }

    /// Remove a server, returning it.
    ///
    /// The last member of a stripe cannot be removed.
    pub fn remove_server(&mut self, name: &ServerSymbolicName) -> Result<Server, TopologyError> {
        let index = self
            .servers
            .iter()
            .position(|s| s.symbolic_name() == name)
            .ok_or_else(|| TopologyError::UnknownServer(name.to_string()))?;
        if self.servers.len() == 1 {
            return Err(TopologyError::LastServerInStripe(name.to_string()));
        }
        Ok(self.servers.remove(index))
    }
}

/// Full description of a cluster under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTopology", into = "RawTopology")]
pub struct Topology {
    distribution: Distribution,
    stripes: Vec<Stripe>,
    net_disruption_enabled: bool,
    peer_policy: PeerPolicy,
}

#[derive(Serialize, Deserialize)]
struct RawTopology {
    #[serde(default)]
    net_disruption_enabled: bool,
    #[serde(default)]
    peer_policy: PeerPolicy,
    distribution: Distribution,
    stripes: Vec<Stripe>,
}

impl TryFrom<RawTopology> for Topology {
    type Error = TopologyError;

    fn try_from(raw: RawTopology) -> Result<Self, Self::Error> {
        Ok(Topology::new(raw.distribution, raw.stripes)?
            .with_net_disruption(raw.net_disruption_enabled)
            .with_peer_policy(raw.peer_policy))
    }
}

impl From<Topology> for RawTopology {
    fn from(topology: Topology) -> Self {
        RawTopology {
            net_disruption_enabled: topology.net_disruption_enabled,
            peer_policy: topology.peer_policy,
            distribution: topology.distribution,
            stripes: topology.stripes,
        }
    }
}

impl Topology {
    /// Create a topology with network disruption disabled.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::NoStripes`] for an empty stripe list and
    /// [`TopologyError::DuplicateServer`] if a symbolic name appears twice
    /// anywhere in the topology.
    pub fn new(distribution: Distribution, stripes: Vec<Stripe>) -> Result<Self, TopologyError> {
        if stripes.is_empty() {
            return Err(TopologyError::NoStripes);
        }
        let mut seen = HashSet::new();
        for server in stripes.iter().flat_map(|s| s.servers()) {
            if !seen.insert(server.symbolic_name()) {
                return Err(TopologyError::DuplicateServer(
                    server.symbolic_name().to_string(),
                ));
            }
        }
        Ok(Self {
            distribution,
            stripes,
            net_disruption_enabled: false,
            peer_policy: PeerPolicy::default(),
        })
    }

    /// Parse a topology from its TOML description.
    pub fn from_toml_str(content: &str) -> Result<Self, TopologyError> {
        Ok(toml::from_str(content)?)
    }

    /// Enable or disable network disruption.
    pub fn with_net_disruption(mut self, enabled: bool) -> Self {
        self.net_disruption_enabled = enabled;
        self
    }

    /// Set the peer-selection policy for disruption links.
    pub fn with_peer_policy(mut self, policy: PeerPolicy) -> Self {
        self.peer_policy = policy;
        self
    }

    /// Whether server instances must build disruption links.
    pub fn net_disruption_enabled(&self) -> bool {
        self.net_disruption_enabled
    }

    /// Peer-selection policy.
    pub fn peer_policy(&self) -> PeerPolicy {
        self.peer_policy
    }

    /// Distribution descriptor.
    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    /// Stripes in order.
    pub fn stripes(&self) -> &[Stripe] {
        &self.stripes
    }

    /// Every server, stripe by stripe.
    pub fn servers(&self) -> impl Iterator<Item = &Server> {
        self.stripes.iter().flat_map(|s| s.servers())
    }

    /// Look up a server by symbolic name.
    pub fn find_server(&self, name: &ServerSymbolicName) -> Option<&Server> {
        self.servers().find(|s| s.symbolic_name() == name)
    }

    /// Index of the stripe containing this server.
    pub fn stripe_index_of(&self, name: &ServerSymbolicName) -> Option<usize> {
        self.stripes.iter().position(|s| s.contains(name))
    }

    /// Server at a (stripe, position) coordinate.
    pub fn server_at(&self, stripe: usize, index: usize) -> Option<&Server> {
        self.stripes.get(stripe)?.servers().get(index)
    }

    /// Append a stripe.
    pub fn add_stripe(&mut self, stripe: Stripe) -> Result<(), TopologyError> {
        for server in stripe.servers() {
            self.ensure_unknown(server.symbolic_name())?;
        }
        self.stripes.push(stripe);
        Ok(())
    }

    /// Add a server to an existing stripe.
    pub fn add_server(&mut self, stripe: usize, server: Server) -> Result<(), TopologyError> {
        self.ensure_unknown(server.symbolic_name())?;
        let count = self.stripes.len();
        self.stripes
            .get_mut(stripe)
            .ok_or(TopologyError::StripeOutOfRange {
                index: stripe,
                count,
            })?
            .add_server(server)
    }

    /// Remove a server from whichever stripe holds it.
    pub fn remove_server(&mut self, name: &ServerSymbolicName) -> Result<Server, TopologyError> {
        let index = self
            .stripe_index_of(name)
            .ok_or_else(|| TopologyError::UnknownServer(name.to_string()))?;
        self.stripes[index].remove_server(name)
    }

    /// Peers the named server must be able to disrupt, per [`PeerPolicy`].
    ///
    /// Order is deterministic: stripe order, then position within the stripe.
    /// The server itself is never included.
    pub fn disruption_peers(&self, name: &ServerSymbolicName) -> Result<Vec<&Server>, TopologyError> {
        let stripe = self
            .stripe_index_of(name)
            .ok_or_else(|| TopologyError::UnknownServer(name.to_string()))?;

        let candidates: Box<dyn Iterator<Item = &Server> + '_> = match self.peer_policy {
            PeerPolicy::StripePeers => Box::new(self.stripes[stripe].servers().iter()),
            PeerPolicy::AllPeers => Box::new(self.servers()),
        };

        Ok(candidates.filter(|s| s.symbolic_name() != name).collect())
    }

    fn ensure_unknown(&self, name: &ServerSymbolicName) -> Result<(), TopologyError> {
        if self.find_server(name).is_some() {
            return Err(TopologyError::DuplicateServer(name.to_string()));
        }
        Ok(())
    }
}

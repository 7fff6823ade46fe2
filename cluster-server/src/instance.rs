//! One topology member under test.
//!
//! A [`ServerInstance`] binds a [`Server`] of a [`Topology`] to at most one
//! live process and, when the topology enables disruption, owns one outbound
//! link to every peer the topology's [`PeerPolicy`](cluster_types::PeerPolicy)
//! selects.
//!
//! With a proxy-based provider each link is a relay on the server's own host:
//! `(own hostname, reserved port) -> (peer hostname, peer group port)`. The
//! server is told to dial the reserved port instead of the peer, so cutting
//! the relay cuts that direction of traffic.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use cluster_disrupt::{
    DisruptionError, DisruptionProvider, Disruptor, Endpoint, LinkState, ProxyDisruptionProvider,
};
use cluster_ports::{LockingPortChooser, MuxPortLock};
use cluster_types::{Server, ServerState, ServerSymbolicName, Topology, TopologyError};

use crate::config::Config;
use crate::controller::{DistributionController, ProxiedPorts};
use crate::error::ServerError;
use crate::handle::{PollSettings, ServerProcessHandle};
use crate::process::{ProcessProbe, SysinfoProbe};

/// Collaborators shared by every instance of a test run.
#[derive(Clone)]
pub struct InstanceContext {
    /// Spawns and stops processes.
    pub controller: Arc<dyn DistributionController>,
    /// Creates and removes disruption links.
    pub provider: Arc<dyn DisruptionProvider>,
    /// Reserves relay ports.
    pub ports: Arc<LockingPortChooser>,
    /// Answers process liveness.
    pub probe: Arc<dyn ProcessProbe>,
    /// Default polling for `wait_for_state`.
    pub poll: PollSettings,
}

impl std::fmt::Debug for InstanceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceContext")
            .field("ports", &self.ports)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl InstanceContext {
    /// Context with the OS process probe and default polling.
    pub fn new(
        controller: Arc<dyn DistributionController>,
        provider: Arc<dyn DisruptionProvider>,
        ports: Arc<LockingPortChooser>,
    ) -> Self {
        Self {
            controller,
            provider,
            ports,
            probe: Arc::new(SysinfoProbe::new()),
            poll: PollSettings::default(),
        }
    }

    /// Build the standard stack from configuration: three-layer port
    /// chooser, relay provider on its own runtime, OS process probe.
    pub fn from_config(
        config: &Config,
        controller: Arc<dyn DistributionController>,
    ) -> Result<Self, ServerError> {
        let ports = LockingPortChooser::from_config(&config.ports)?;
        let provider = ProxyDisruptionProvider::new(config.disruption.clone())?;
        Ok(Self::new(controller, Arc::new(provider), Arc::new(ports))
            .with_poll_settings(config.lifecycle.poll_settings()))
    }

    /// Replace the process probe.
    pub fn with_probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Replace the default polling.
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }
}

/// Lifecycle and disruption control for one server.
pub struct ServerInstance {
    server: Server,
    topology: Topology,
    context: InstanceContext,
    disruptors: BTreeMap<ServerSymbolicName, Arc<dyn Disruptor>>,
    proxied_ports: ProxiedPorts,
    relay_ports: Option<MuxPortLock>,
    handle: Option<ServerProcessHandle>,
    closed: bool,
}

impl std::fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerInstance")
            .field("server", &self.server)
            .field("state", &self.state())
            .field("proxied_ports", &self.proxied_ports)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl ServerInstance {
    /// Resolve `server_name` in `topology` and build its outbound links.
    ///
    /// # Errors
    ///
    /// Fails if the server is not in the topology, relay ports cannot be
    /// reserved, or a link cannot be created. Nothing is left behind on
    /// failure.
    pub fn new(
        server_name: &ServerSymbolicName,
        topology: Topology,
        context: InstanceContext,
    ) -> Result<Self, ServerError> {
        let server = topology
            .find_server(server_name)
            .cloned()
            .ok_or_else(|| TopologyError::UnknownServer(server_name.to_string()))?;

        let mut instance = Self {
            server,
            topology,
            context,
            disruptors: BTreeMap::new(),
            proxied_ports: ProxiedPorts::new(),
            relay_ports: None,
            handle: None,
            closed: false,
        };

        if instance.topology.net_disruption_enabled() {
            // Drop runs close(), which removes any link already created
            instance.build_links()?;
        }
        Ok(instance)
    }

    fn build_links(&mut self) -> Result<(), ServerError> {
        let peers: Vec<Server> = self
            .topology
            .disruption_peers(self.server.symbolic_name())?
            .into_iter()
            .cloned()
            .collect();
        if peers.is_empty() {
            return Ok(());
        }

        let provider = Arc::clone(&self.context.provider);
        if !provider.is_proxy_based() {
            let source = Endpoint::from(self.server.group_address());
            for peer in &peers {
                let link = provider.create_link(&source, &Endpoint::from(peer.group_address()))?;
                self.disruptors.insert(peer.symbolic_name().clone(), link);
            }
            return Ok(());
        }

        let count = u16::try_from(peers.len()).unwrap_or(u16::MAX);
        let block = self.context.ports.reserve(count)?;
        let ports: Vec<u16> = block.ports().collect();
        self.relay_ports = Some(block);

        for (peer, port) in peers.iter().zip(ports) {
            let source = Endpoint::new(self.server.hostname(), port);
            let destination = Endpoint::from(peer.group_address());
            let link = provider.create_link(&source, &destination)?;

            tracing::info!(
                "Server {} reaches {} through relay port {}",
                self.server.symbolic_name(),
                peer.symbolic_name(),
                port
            );
            self.disruptors.insert(peer.symbolic_name().clone(), link);
            self.proxied_ports.insert(peer.symbolic_name().clone(), port);
        }
        Ok(())
    }

    /// The server description.
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// The topology this instance was built against.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// The bound process, if any.
    pub fn handle(&self) -> Option<&ServerProcessHandle> {
        self.handle.as_ref()
    }

    /// Per peer, the relay port this server dials instead of the peer.
    pub fn proxied_ports(&self) -> &ProxiedPorts {
        &self.proxied_ports
    }

    /// Outbound link to `peer`.
    pub fn disruptor(&self, peer: &ServerSymbolicName) -> Option<&Arc<dyn Disruptor>> {
        self.disruptors.get(peer)
    }

    /// Every outbound link, by peer.
    pub fn disruptors(&self) -> impl Iterator<Item = (&ServerSymbolicName, &Arc<dyn Disruptor>)> {
        self.disruptors.iter()
    }

    /// Observed state; `Stopped` without a process.
    pub fn state(&self) -> ServerState {
        self.handle
            .as_ref()
            .map_or(ServerState::Stopped, ServerProcessHandle::state)
    }

    /// Spawn the server through the controller and bind its process.
    ///
    /// # Errors
    ///
    /// [`ServerError::AlreadyRunning`] while a live process is bound.
    pub fn create(&mut self) -> Result<(), ServerError> {
        self.ensure_open()?;
        if self.handle.as_ref().is_some_and(ServerProcessHandle::is_alive) {
            return Err(ServerError::AlreadyRunning(self.name().clone()));
        }

        let spawn = self
            .context
            .controller
            .create(&self.server, &self.topology, &self.proxied_ports)?;
        let handle = ServerProcessHandle::new(
            self.name().clone(),
            spawn,
            Arc::clone(&self.context.probe),
        );

        tracing::info!(
            "Created server {} (supervisor pid {}, worker pid {:?})",
            self.name(),
            handle.supervisor(),
            handle.worker().map(|p| p.get())
        );
        self.handle = Some(handle);
        Ok(())
    }

    /// Create the server and wait until it is active or passive.
    pub fn start(&mut self) -> Result<ServerState, ServerError> {
        self.create()?;
        let state = self.wait_for_state(|s| s.is_started())?;
        tracing::info!("Server {} started as {}", self.name(), state);
        Ok(state)
    }

    /// Block until `predicate` holds, using the context's polling.
    pub fn wait_for_state<F>(&self, predicate: F) -> Result<ServerState, ServerError>
    where
        F: Fn(ServerState) -> bool,
    {
        self.wait_for_state_with(predicate, &self.context.poll)
    }

    /// Block until `predicate` holds, polling per `settings`.
    ///
    /// Without a process the state is `Stopped`: the wait succeeds at once if
    /// `predicate(Stopped)` holds and fails with [`ServerError::NotCreated`]
    /// otherwise.
    pub fn wait_for_state_with<F>(
        &self,
        predicate: F,
        settings: &PollSettings,
    ) -> Result<ServerState, ServerError>
    where
        F: Fn(ServerState) -> bool,
    {
        match &self.handle {
            Some(handle) => handle.wait_for_state(predicate, settings),
            None if predicate(ServerState::Stopped) => Ok(ServerState::Stopped),
            None => Err(ServerError::NotCreated(self.name().clone())),
        }
    }

    /// Stop the server through the controller. A no-op without a process.
    pub fn stop(&mut self) -> Result<(), ServerError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        if let Err(e) = self.context.controller.stop(&self.server, &handle) {
            self.handle = Some(handle);
            return Err(e);
        }
        tracing::info!("Stopped server {}", self.name());
        Ok(())
    }

    /// Cut this server's outbound links to `targets`.
    ///
    /// Every target is checked before any link changes: an unknown peer, an
    /// already disrupted link or a closed one fails the whole call.
    pub fn disrupt(&self, targets: &[ServerSymbolicName]) -> Result<(), ServerError> {
        let links = self.links_to(targets)?;
        for link in &links {
            match link.state() {
                LinkState::Undisrupted => {}
                state @ LinkState::Disrupted => {
                    return Err(DisruptionError::IllegalState {
                        key: link.key(),
                        state,
                        operation: "disrupt",
                    }
                    .into())
                }
                LinkState::Closed => return Err(DisruptionError::LinkClosed(link.key()).into()),
            }
        }

        for link in links {
            link.disrupt()?;
        }
        Ok(())
    }

    /// Restore this server's outbound links to `targets`.
    ///
    /// Checked like [`disrupt`](Self::disrupt); links already undisrupted
    /// are left alone.
    pub fn undisrupt(&self, targets: &[ServerSymbolicName]) -> Result<(), ServerError> {
        let links = self.links_to(targets)?;
        if let Some(closed) = links.iter().find(|l| l.state() == LinkState::Closed) {
            return Err(DisruptionError::LinkClosed(closed.key()).into());
        }

        for link in links {
            link.undisrupt()?;
        }
        Ok(())
    }

    /// Links to `targets`, each peer once.
    fn links_to(&self, targets: &[ServerSymbolicName]) -> Result<Vec<&Arc<dyn Disruptor>>, ServerError> {
        self.ensure_open()?;
        if !self.topology.net_disruption_enabled() {
            return Err(ServerError::DisruptionNotEnabled(self.name().clone()));
        }

        let peers: BTreeSet<&ServerSymbolicName> = targets.iter().collect();
        peers
            .into_iter()
            .map(|peer| {
                self.disruptors
                    .get(peer)
                    .ok_or_else(|| ServerError::UnknownPeer {
                        server: self.name().clone(),
                        peer: peer.clone(),
                    })
            })
            .collect()
    }

    /// Remove every outbound link and release the relay ports.
    ///
    /// Runs on drop; calling it again does nothing. The process, if any, is
    /// left to the caller.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for (peer, link) in std::mem::take(&mut self.disruptors) {
            tracing::debug!("Removing link from {} to {}", self.server.symbolic_name(), peer);
            self.context.provider.remove_link(link.as_ref());
        }
        self.proxied_ports.clear();

        if let Some(ports) = self.relay_ports.take() {
            if let Err(e) = ports.close() {
                tracing::warn!(
                    "Failed to release relay ports of {}: {}",
                    self.server.symbolic_name(),
                    e
                );
            }
        }
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn name(&self) -> &ServerSymbolicName {
        self.server.symbolic_name()
    }

    fn ensure_open(&self) -> Result<(), ServerError> {
        if self.closed {
            return Err(ServerError::Closed(self.name().clone()));
        }
        Ok(())
    }
}

impl Drop for ServerInstance {
    fn drop(&mut self) {
        self.close();
    }
}

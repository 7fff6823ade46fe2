//! Scenario harness: one isolated clusterkit stack per test.
//!
//! Each harness gets a unique run id and its own lock-file directory, so
//! scenarios running in parallel only meet through the ports they actually
//! hold.

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cluster_disrupt::DisruptionError;
use cluster_ports::{MuxPortLock, PortConfig, PortError};
use cluster_server::{
    Config, InstanceContext, LifecycleConfig, ServerError, ServerInstance,
};
use cluster_types::{
    Distribution, Server, ServerPorts, ServerSymbolicName, Stripe, Topology, TopologyError,
};
use tempfile::TempDir;
use thiserror::Error;

use crate::controller::LocalProcessController;

/// Errors that can occur during harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Server lifecycle error.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// Port reservation error.
    #[error("port error: {0}")]
    Ports(#[from] PortError),

    /// Disruption error.
    #[error("disruption error: {0}")]
    Disruption(#[from] DisruptionError),

    /// Topology error.
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    /// General I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// An isolated clusterkit stack backed by local processes.
pub struct ClusterHarness {
    run_id: String,
    lock_dir: TempDir,
    config: Config,
    controller: Arc<LocalProcessController>,
    context: InstanceContext,
    /// Server port blocks handed out by [`topology`](Self::topology).
    server_ports: Mutex<Vec<MuxPortLock>>,
}

impl ClusterHarness {
    /// Create a harness with a private lock file and fast polling.
    pub fn new() -> Result<Self, HarnessError> {
        let run_id = uuid::Uuid::new_v4().as_simple().to_string();
        let lock_dir = tempfile::Builder::new()
            .prefix(&format!("clusterkit-{}-", &run_id[..8]))
            .tempdir()?;

        let config = Config {
            ports: PortConfig {
                lock_file: lock_dir.path().join("port-lock"),
                probe_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                ..PortConfig::default()
            },
            lifecycle: LifecycleConfig {
                poll_interval_ms: 50,
                state_timeout_secs: Some(30),
            },
            ..Config::default()
        };

        let controller = Arc::new(LocalProcessController::new());
        let context = InstanceContext::from_config(&config, controller.clone())?;

        tracing::info!("Harness {} using {}", run_id, lock_dir.path().display());
        Ok(Self {
            run_id,
            lock_dir,
            config,
            controller,
            context,
            server_ports: Mutex::new(Vec::new()),
        })
    }

    /// Unique id of this run.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Directory holding this run's lock file.
    pub fn lock_dir(&self) -> &std::path::Path {
        self.lock_dir.path()
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The process controller.
    pub fn controller(&self) -> &LocalProcessController {
        &self.controller
    }

    /// Collaborators for building instances.
    pub fn context(&self) -> &InstanceContext {
        &self.context
    }

    /// Build a localhost topology with `stripe_sizes[i]` servers in stripe `i`.
    ///
    /// Servers are named `stripe{i}-server{j}` and each gets four reserved
    /// consecutive ports, held until the harness is dropped.
    pub fn topology(&self, stripe_sizes: &[usize], disruption: bool) -> Result<Topology, HarnessError> {
        let mut stripes = Vec::with_capacity(stripe_sizes.len());
        for (i, &size) in stripe_sizes.iter().enumerate() {
            let mut servers = Vec::with_capacity(size);
            for j in 0..size {
                let block = self.context.ports.reserve(4)?;
                let name = ServerSymbolicName::new(format!("stripe{}-server{}", i, j))?;
                servers.push(Server::new(
                    name,
                    "127.0.0.1",
                    ServerPorts::consecutive(block.base()),
                ));
                self.server_ports
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(block);
            }
            stripes.push(Stripe::new(servers)?);
        }

        let topology = Topology::new(Distribution::new("stand-in", "1.0"), stripes)?
            .with_net_disruption(disruption);
        Ok(topology)
    }

    /// Build the instance for `name`.
    pub fn instance(&self, name: &str, topology: &Topology) -> Result<ServerInstance, HarnessError> {
        let name = ServerSymbolicName::new(name)?;
        Ok(ServerInstance::new(&name, topology.clone(), self.context.clone())?)
    }
}

impl std::fmt::Debug for ClusterHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterHarness")
            .field("run_id", &self.run_id)
            .field("lock_dir", &self.lock_dir.path())
            .finish_non_exhaustive()
    }
}

/// Echo server on an ephemeral loopback port. Runs until the process exits.
pub fn spawn_echo_server() -> Result<SocketAddr, HarnessError> {
    spawn_echo_server_at(0)
}

/// Echo server on loopback `port`, standing in for a server's group port.
pub fn spawn_echo_server_at(port: u16) -> Result<SocketAddr, HarnessError> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))?;
    let addr = listener.local_addr()?;
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            std::thread::spawn(move || {
                let mut buf = [0u8; 1024];
                while let Ok(n) = stream.read(&mut buf) {
                    if n == 0 || stream.write_all(&buf[..n]).is_err() {
                        break;
                    }
                }
            });
        }
    });
    Ok(addr)
}

/// Send `payload` over `stream` and wait up to `timeout` for the echo.
///
/// Returns `Ok(false)` if the echo did not arrive in time.
pub fn echo_round_trip(stream: &mut TcpStream, payload: &[u8], timeout: Duration) -> Result<bool, HarnessError> {
    stream.set_read_timeout(Some(timeout))?;
    stream.write_all(payload)?;

    let mut buf = vec![0u8; payload.len()];
    match stream.read_exact(&mut buf) {
        Ok(()) => Ok(buf == payload),
        Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

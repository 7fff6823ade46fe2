//! Handle on a running server process.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cluster_types::{ServerState, ServerSymbolicName};
use tokio::sync::watch;

use crate::error::{PidFailure, ServerError};
use crate::process::{Pid, ProcessProbe};

/// How `wait_for_state` polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Sleep between checks.
    pub interval: Duration,
    /// Overall limit; `None` waits until the state is reached or the
    /// process dies.
    pub timeout: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            timeout: None,
        }
    }
}

/// What a distribution controller returns after spawning a server.
#[derive(Debug)]
pub struct ProcessSpawn {
    /// The supervising (launcher) process.
    pub supervisor: Pid,
    /// The inner worker process, if the product forks one.
    pub worker: Option<Pid>,
    /// State published by the controller as it observes the server.
    pub state: watch::Receiver<ServerState>,
}

/// Process ids and observed state of one running server.
///
/// The server counts as alive while either process is alive: a supervisor
/// may restart its worker, and a worker may outlive a detached supervisor.
pub struct ServerProcessHandle {
    server: ServerSymbolicName,
    supervisor: Pid,
    worker: Option<Pid>,
    state: watch::Receiver<ServerState>,
    probe: Arc<dyn ProcessProbe>,
}

impl std::fmt::Debug for ServerProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerProcessHandle")
            .field("server", &self.server)
            .field("supervisor", &self.supervisor)
            .field("worker", &self.worker)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ServerProcessHandle {
    /// Bind a spawned process to `server`.
    pub fn new(server: ServerSymbolicName, spawn: ProcessSpawn, probe: Arc<dyn ProcessProbe>) -> Self {
        Self {
            server,
            supervisor: spawn.supervisor,
            worker: spawn.worker,
            state: spawn.state,
            probe,
        }
    }

    /// The server this process runs.
    pub fn server(&self) -> &ServerSymbolicName {
        &self.server
    }

    /// Supervising process id.
    pub fn supervisor(&self) -> Pid {
        self.supervisor
    }

    /// Worker process id, if any.
    pub fn worker(&self) -> Option<Pid> {
        self.worker
    }

    /// Latest state published by the controller.
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Whether either tracked process is alive, asked of the OS right now.
    pub fn is_alive(&self) -> bool {
        self.probe.is_alive(self.supervisor)
            || self.worker.is_some_and(|worker| self.probe.is_alive(worker))
    }

    /// Kill both processes, worker first.
    ///
    /// Every pid is attempted; failures are reported together.
    pub fn terminate(&self) -> Result<(), ServerError> {
        let failures: Vec<PidFailure> = self
            .worker
            .into_iter()
            .chain(std::iter::once(self.supervisor))
            .filter_map(|pid| {
                self.probe
                    .terminate(pid)
                    .err()
                    .map(|source| PidFailure { pid, source })
            })
            .collect();

        if failures.is_empty() {
            tracing::debug!("Terminated server {}", self.server);
            Ok(())
        } else {
            Err(ServerError::Terminate { failures })
        }
    }

    /// Block until `predicate` holds for the published state.
    ///
    /// Fails with [`ServerError::ProcessDied`] on the first check that finds
    /// the process dead, and with [`ServerError::StateTimeout`] once
    /// `settings.timeout` elapses.
    pub fn wait_for_state<F>(&self, predicate: F, settings: &PollSettings) -> Result<ServerState, ServerError>
    where
        F: Fn(ServerState) -> bool,
    {
        let started = Instant::now();
        loop {
            let state = self.state();
            if predicate(state) {
                return Ok(state);
            }

            if !self.is_alive() {
                return Err(ServerError::ProcessDied {
                    server: self.server.clone(),
                    last_state: state,
                });
            }

            let waited = started.elapsed();
            if settings.timeout.is_some_and(|timeout| waited >= timeout) {
                return Err(ServerError::StateTimeout {
                    server: self.server.clone(),
                    last_state: state,
                    waited,
                });
            }

            std::thread::sleep(settings.interval);
        }
    }
}

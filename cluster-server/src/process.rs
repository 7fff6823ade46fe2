//! OS process ids and liveness.

use std::fmt;
use std::io;
use std::num::NonZeroU32;

use sysinfo::{ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

/// An OS process id. Always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(NonZeroU32);

impl Pid {
    /// `None` for 0, which never names a real process.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// The raw id.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Pid> for sysinfo::Pid {
    fn from(pid: Pid) -> Self {
        sysinfo::Pid::from_u32(pid.get())
    }
}

/// Liveness and termination of OS processes.
///
/// Implementations must answer from the OS every time; callers rely on
/// `is_alive` never being cached.
pub trait ProcessProbe: Send + Sync {
    /// Whether `pid` names a live (non-zombie) process.
    fn is_alive(&self, pid: Pid) -> bool;

    /// Forcibly terminate `pid`. Terminating a dead process succeeds.
    fn terminate(&self, pid: Pid) -> io::Result<()>;
}

/// [`ProcessProbe`] backed by `sysinfo`.
///
/// Each call refreshes only the queried pid in a fresh process table, so no
/// stale entry can outlive its process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoProbe;

impl SysinfoProbe {
    /// Create a probe.
    pub fn new() -> Self {
        Self
    }

    fn snapshot(pid: sysinfo::Pid) -> System {
        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), ProcessRefreshKind::new());
        system
    }
}

impl ProcessProbe for SysinfoProbe {
    fn is_alive(&self, pid: Pid) -> bool {
        let pid = sysinfo::Pid::from(pid);
        let system = Self::snapshot(pid);
        system
            .process(pid)
            .is_some_and(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
    }

    fn terminate(&self, pid: Pid) -> io::Result<()> {
        let raw = sysinfo::Pid::from(pid);
        let system = Self::snapshot(raw);
        let Some(process) = system.process(raw) else {
            return Ok(());
        };
        if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
            return Ok(());
        }

        if process.kill() {
            tracing::debug!("Sent kill to pid {}", pid);
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("failed to signal pid {}", pid),
            ))
        }
    }
}

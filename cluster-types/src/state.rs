//! Observed lifecycle state of a clustered server process.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a server as observed by the harness.
///
/// ```text
/// NotInstalled → Stopped → Starting → { StartedAsActive | StartedAsPassive } ↔ Paused
///                   ▲                                  │
///                   └──────────── stop / death ────────┘
/// ```
///
/// The harness never computes these transitions itself: the distribution
/// controller observes the real process and publishes the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerState {
    /// Kit not installed on the host yet.
    NotInstalled,
    /// Installed, no process running.
    Stopped,
    /// Process spawned, role not elected yet.
    Starting,
    /// Running and elected active for its stripe.
    StartedAsActive,
    /// Running as a passive replica.
    StartedAsPassive,
    /// Process frozen (e.g. SIGSTOP or debugger).
    Paused,
}

impl ServerState {
    /// True for both started roles.
    pub fn is_started(&self) -> bool {
        matches!(self, Self::StartedAsActive | Self::StartedAsPassive)
    }

    /// True while a process is expected to exist.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Self::Starting | Self::StartedAsActive | Self::StartedAsPassive | Self::Paused
        )
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotInstalled => "NOT_INSTALLED",
            Self::Stopped => "STOPPED",
            Self::Starting => "STARTING",
            Self::StartedAsActive => "STARTED_AS_ACTIVE",
            Self::StartedAsPassive => "STARTED_AS_PASSIVE",
            Self::Paused => "PAUSED",
        };
        f.write_str(name)
    }
}

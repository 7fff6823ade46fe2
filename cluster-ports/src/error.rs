//! Error types for port reservation.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reserving or releasing ports.
///
/// A port that is merely taken is never an error: lockers report it as a
/// negative admission signal and the chooser retries.
#[derive(Debug, Error)]
pub enum PortError {
    /// Requested block size is zero or larger than the port range.
    #[error("cannot reserve {count} ports in range [{min_port}, {max_port}]")]
    InvalidCount {
        /// Requested number of ports.
        count: u16,
        /// Lowest allowed port.
        min_port: u16,
        /// Highest allowed port.
        max_port: u16,
    },

    /// Port range bounds are inverted or include port 0.
    #[error("invalid port range [{min_port}, {max_port}]")]
    InvalidRange {
        /// Lowest allowed port.
        min_port: u16,
        /// Highest allowed port.
        max_port: u16,
    },

    /// Manipulating the port-lock file failed.
    #[error("port-lock file {path}: {source}")]
    LockFile {
        /// Path of the lock file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// One or more layers failed to release. Every layer was still attempted.
    #[error("failed to release {} port lock(s): {}", .failures.len(), summarize(.failures))]
    Release {
        /// Every individual failure, in release order.
        failures: Vec<ReleaseFailure>,
    },

    /// A bounded reservation ran out of attempts.
    #[error("no free block of {count} ports after {attempts} attempts")]
    Exhausted {
        /// Requested number of ports.
        count: u16,
        /// Attempts made.
        attempts: u32,
    },
}

/// One failed release of one port-lock layer.
#[derive(Debug)]
pub struct ReleaseFailure {
    /// Port whose lock could not be released.
    pub port: u16,
    /// Underlying I/O error.
    pub source: io::Error,
}

impl fmt::Display for ReleaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {}: {}", self.port, self.source)
    }
}

fn summarize(failures: &[ReleaseFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

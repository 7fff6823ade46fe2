//! Admission checks for a single port.
//!
//! Each [`PortLocker`] is one independent layer of evidence that a port is
//! free. Lockers answer with a lock (admitted), `None` (taken: a negative
//! admission signal, never an error) or an error (the check itself broke).
//!
//! # Layers
//!
//! - [`InProcessPortLocker`] closes the window between two reservations in
//!   the same process, before anything is visible to the OS.
//! - [`SocketPortLocker`] skips ports some process is already listening on.
//! - [`FilePortLocker`] is the only layer that excludes other processes
//!   running the same protocol, including ones that have not bound yet.

mod in_process;
mod socket;
#[cfg(unix)]
mod file;

#[cfg(unix)]
pub use file::FilePortLocker;
pub use in_process::InProcessPortLocker;
pub use socket::SocketPortLocker;

use crate::error::PortError;
use crate::lock::PortLock;

/// One admission check for one port.
pub trait PortLocker: Send + Sync {
    /// Try to claim `port`.
    ///
    /// Returns `Ok(None)` when the port is taken.
    fn try_lock(&self, port: u16) -> Result<Option<PortLock>, PortError>;
}

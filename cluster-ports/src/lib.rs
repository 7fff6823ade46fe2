//! # cluster-ports
//!
//! Host-wide TCP port reservation for cluster tests.
//!
//! Many test processes on one host race for free ports. A reservation is only
//! granted when three independent admission checks agree for every port of a
//! contiguous block:
//!
//! 1. [`InProcessPortLocker`] - a reservation set shared inside this process
//! 2. [`SocketPortLocker`] - a transient bind probe (advisory, racy)
//! 3. [`FilePortLocker`] - an exclusive byte-range lock on a well-known file,
//!    visible to every process on the host and dropped by the kernel when the
//!    holder dies
//!
//! [`LockingPortChooser`] draws candidate blocks from a [`PortAllocator`] and
//! retries until every check passes, returning a [`MuxPortLock`] that releases
//! every layer of every port in reverse order.
//!
//! ```ignore
//! let chooser = LockingPortChooser::from_config(&PortConfig::default())?;
//! let ports = chooser.reserve(4)?;
//! let server_ports = ServerPorts::consecutive(ports.base());
//! // ... run the server ...
//! ports.close()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod chooser;
pub mod config;
pub mod error;
pub mod lock;
pub mod locker;

pub use allocator::{PortAllocator, RandomPortAllocator, HIGHEST_PORT, LOWEST_PORT};
pub use chooser::LockingPortChooser;
pub use config::PortConfig;
pub use error::{PortError, ReleaseFailure};
pub use lock::{MuxPortLock, PortLock};
#[cfg(unix)]
pub use locker::FilePortLocker;
pub use locker::{InProcessPortLocker, PortLocker, SocketPortLocker};

//! Transient bind probe.

use std::net::{IpAddr, Ipv4Addr, TcpListener};

use super::PortLocker;
use crate::error::PortError;
use crate::lock::PortLock;

/// Checks that nothing is listening on a port by binding and closing it.
///
/// Advisory only: another process can bind the port right after the probe.
#[derive(Debug, Clone, Copy)]
pub struct SocketPortLocker {
    address: IpAddr,
}

impl SocketPortLocker {
    /// Probe on the given local address.
    pub fn new(address: IpAddr) -> Self {
        Self { address }
    }

    /// Address probes bind to.
    pub fn address(&self) -> IpAddr {
        self.address
    }
}

impl Default for SocketPortLocker {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

impl PortLocker for SocketPortLocker {
    fn try_lock(&self, port: u16) -> Result<Option<PortLock>, PortError> {
        match TcpListener::bind((self.address, port)) {
            Ok(listener) => {
                drop(listener);
                Ok(Some(PortLock::unguarded(port)))
            }
            Err(e) => {
                tracing::debug!(port, error = %e, "Bind probe refused");
                Ok(None)
            }
        }
    }
}

//! Port lock handles.
//!
//! A [`PortLock`] proves one port is claimed by its holder. It is either a
//! leaf (one release action from one locker) or a composition of layers for
//! the same port. A [`MuxPortLock`] aggregates the per-port locks of a
//! contiguous block.
//!
//! Both release on `close()` or on drop. Release always walks every layer in
//! reverse acquisition order, even after a failure, and reports all failures
//! together.

use std::fmt;
use std::io;

use crate::error::{PortError, ReleaseFailure};

type ReleaseAction = Box<dyn FnOnce() -> io::Result<()> + Send>;

enum Release {
    Action(ReleaseAction),
    Layers(Vec<PortLock>),
}

/// A claim on exactly one TCP port.
pub struct PortLock {
    port: u16,
    release: Option<Release>,
}

impl PortLock {
    /// Create a lock whose release runs `release` exactly once.
    pub fn new<F>(port: u16, release: F) -> Self
    where
        F: FnOnce() -> io::Result<()> + Send + 'static,
    {
        Self {
            port,
            release: Some(Release::Action(Box::new(release))),
        }
    }

    /// Create a lock with nothing to release (e.g. a passed bind probe).
    pub fn unguarded(port: u16) -> Self {
        Self::new(port, || Ok(()))
    }

    /// Merge several layers guarding the same port into one lock.
    ///
    /// Layers are released in reverse order.
    pub fn compose(port: u16, layers: Vec<PortLock>) -> Self {
        debug_assert!(layers.iter().all(|l| l.port == port));
        Self {
            port,
            release: Some(Release::Layers(layers)),
        }
    }

    /// The locked port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Release the port.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Release`] listing every layer that failed.
    pub fn close(mut self) -> Result<(), PortError> {
        let mut failures = Vec::new();
        self.release_into(&mut failures);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PortError::Release { failures })
        }
    }

    fn release_into(&mut self, failures: &mut Vec<ReleaseFailure>) {
        match self.release.take() {
            None => {}
            Some(Release::Action(action)) => {
                if let Err(source) = action() {
                    failures.push(ReleaseFailure {
                        port: self.port,
                        source,
                    });
                }
            }
            Some(Release::Layers(mut layers)) => {
                for layer in layers.iter_mut().rev() {
                    layer.release_into(failures);
                }
            }
        }
    }
}

impl Drop for PortLock {
    fn drop(&mut self) {
        let mut failures = Vec::new();
        self.release_into(&mut failures);
        for failure in failures {
            tracing::warn!("Port lock release on drop failed: {}", failure);
        }
    }
}

impl fmt::Debug for PortLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortLock")
            .field("port", &self.port)
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// Locks on a contiguous block of ports `[base, base + len)`.
pub struct MuxPortLock {
    base: u16,
    locks: Vec<PortLock>,
}

impl MuxPortLock {
    /// Aggregate per-port locks; `locks[i]` must guard `base + i`.
    pub fn new(base: u16, locks: Vec<PortLock>) -> Self {
        debug_assert!(locks
            .iter()
            .enumerate()
            .all(|(i, l)| u32::from(l.port()) == u32::from(base) + i as u32));
        Self { base, locks }
    }

    /// First port of the block.
    pub fn base(&self) -> u16 {
        self.base
    }

    /// Number of ports.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True for an empty block.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// The `index`-th port of the block.
    pub fn port(&self, index: usize) -> Option<u16> {
        self.locks.get(index).map(PortLock::port)
    }

    /// All ports in ascending order.
    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.locks.iter().map(PortLock::port)
    }

    /// Whether `port` belongs to this block.
    pub fn contains(&self, port: u16) -> bool {
        self.locks.iter().any(|l| l.port() == port)
    }

    /// Release every port, last to first.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Release`] listing every failure; ports after a
    /// failing one are still released.
    pub fn close(mut self) -> Result<(), PortError> {
        let failures = self.release_all();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PortError::Release { failures })
        }
    }

    fn release_all(&mut self) -> Vec<ReleaseFailure> {
        let mut failures = Vec::new();
        while let Some(mut lock) = self.locks.pop() {
            lock.release_into(&mut failures);
        }
        failures
    }
}

impl Drop for MuxPortLock {
    fn drop(&mut self) {
        for failure in self.release_all() {
            tracing::warn!("Port block release on drop failed: {}", failure);
        }
    }
}

impl fmt::Debug for MuxPortLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxPortLock")
            .field("base", &self.base)
            .field("len", &self.locks.len())
            .finish()
    }
}

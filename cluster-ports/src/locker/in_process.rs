//! In-process reservation set.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::PortLocker;
use crate::error::PortError;
use crate::lock::PortLock;

/// Ports reserved by this process.
///
/// Clones share the same set, so every chooser that must exclude the others
/// has to be built with a clone of one locker.
#[derive(Debug, Clone, Default)]
pub struct InProcessPortLocker {
    reserved: Arc<Mutex<BTreeSet<u16>>>,
}

impl InProcessPortLocker {
    /// Create an empty reservation set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the currently reserved ports.
    pub fn reserved(&self) -> Vec<u16> {
        lock_set(&self.reserved).iter().copied().collect()
    }
}

impl PortLocker for InProcessPortLocker {
    fn try_lock(&self, port: u16) -> Result<Option<PortLock>, PortError> {
        if !lock_set(&self.reserved).insert(port) {
            tracing::trace!(port, "Port already reserved in-process");
            return Ok(None);
        }

        let reserved = Arc::clone(&self.reserved);
        Ok(Some(PortLock::new(port, move || {
            lock_set(&reserved).remove(&port);
            Ok(())
        })))
    }
}

// Each critical section is one insert or remove, so a poisoned set is
// still consistent.
fn lock_set(set: &Mutex<BTreeSet<u16>>) -> MutexGuard<'_, BTreeSet<u16>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

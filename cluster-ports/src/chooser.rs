//! Retry-until-admitted port chooser.
//!
//! One attempt: ask the allocator for a base, then walk the block port by
//! port and layer by layer. The first negative admission signal releases
//! everything taken in this attempt and starts over with a fresh base. The
//! plain [`LockingPortChooser::reserve`] has no attempt cap and no backoff;
//! [`LockingPortChooser::reserve_with_limit`] bounds it.
//!
//! The whole attempt loop runs under one mutex, so two `reserve` calls in
//! one process never interleave. Across processes only the file layer
//! arbitrates; there is no fairness between them.

use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::allocator::{PortAllocator, RandomPortAllocator};
use crate::config::PortConfig;
use crate::error::PortError;
use crate::lock::{MuxPortLock, PortLock};
use crate::locker::{InProcessPortLocker, PortLocker, SocketPortLocker};

/// Reserves contiguous blocks of ports.
pub struct LockingPortChooser {
    allocator: Box<dyn PortAllocator>,
    lockers: Vec<Box<dyn PortLocker>>,
    attempt: Mutex<()>,
}

impl fmt::Debug for LockingPortChooser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockingPortChooser")
            .field("lockers", &self.lockers.len())
            .finish_non_exhaustive()
    }
}

impl LockingPortChooser {
    /// Create a chooser from an allocator and ordered admission layers.
    ///
    /// Layers are acquired in order and released in reverse.
    pub fn new(allocator: Box<dyn PortAllocator>, lockers: Vec<Box<dyn PortLocker>>) -> Self {
        Self {
            allocator,
            lockers,
            attempt: Mutex::new(()),
        }
    }

    /// Standard three-layer chooser: in-process set, bind probe, lock file.
    ///
    /// Every chooser built here shares one process-wide in-process set, so
    /// two of them never hand out the same port even where the lock file
    /// only excludes other processes.
    ///
    /// # Errors
    ///
    /// Fails if the port range is invalid or the lock file cannot be opened.
    pub fn from_config(config: &PortConfig) -> Result<Self, PortError> {
        Self::from_config_with(config, process_locker())
    }

    /// Like [`from_config`](Self::from_config) with a caller-chosen
    /// in-process set.
    pub fn from_config_with(
        config: &PortConfig,
        in_process: InProcessPortLocker,
    ) -> Result<Self, PortError> {
        let allocator = RandomPortAllocator::new(config.min_port, config.max_port)?;

        let mut lockers: Vec<Box<dyn PortLocker>> = vec![
            Box::new(in_process),
            Box::new(SocketPortLocker::new(config.probe_address)),
        ];
        #[cfg(unix)]
        lockers.push(Box::new(crate::locker::FilePortLocker::open(
            &config.lock_file,
        )?));

        Ok(Self::new(Box::new(allocator), lockers))
    }

    /// Reserve `count` contiguous ports, retrying until one block is admitted.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::InvalidCount`] for an impossible block size or an
    /// allocator base that runs the block past port 65535, and propagates
    /// lock-file I/O failures. Taken ports are never an error.
    pub fn reserve(&self, count: u16) -> Result<MuxPortLock, PortError> {
        self.reserve_inner(count, None)
    }

    /// Like [`reserve`](Self::reserve), giving up after `max_attempts`.
    pub fn reserve_with_limit(
        &self,
        count: u16,
        max_attempts: u32,
    ) -> Result<MuxPortLock, PortError> {
        self.reserve_inner(count, Some(max_attempts))
    }

    fn reserve_inner(&self, count: u16, limit: Option<u32>) -> Result<MuxPortLock, PortError> {
        let _attempt = self.attempt.lock().unwrap_or_else(PoisonError::into_inner);

        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            let base = self.allocator.propose(count)?;
            if count == 0 || u32::from(base) + u32::from(count) - 1 > u32::from(u16::MAX) {
                return Err(PortError::InvalidCount {
                    count,
                    min_port: base,
                    max_port: u16::MAX,
                });
            }

            if let Some(block) = self.try_block(base, count)? {
                tracing::debug!(
                    base,
                    count,
                    attempts,
                    "Reserved ports [{}, {})",
                    base,
                    u32::from(base) + u32::from(count)
                );
                return Ok(block);
            }

            if limit.is_some_and(|max| attempts >= max) {
                return Err(PortError::Exhausted { count, attempts });
            }
        }
    }

    /// One attempt at `[base, base + count)`; `None` on any negative signal.
    fn try_block(&self, base: u16, count: u16) -> Result<Option<MuxPortLock>, PortError> {
        let mut acquired = Vec::with_capacity(usize::from(count));

        for offset in 0..count {
            let port = base + offset;
            match self.try_port(port) {
                Ok(Some(lock)) => acquired.push(lock),
                Ok(None) => {
                    tracing::trace!(base, port, "Block rejected, retrying");
                    MuxPortLock::new(base, acquired).close()?;
                    return Ok(None);
                }
                Err(e) => {
                    release_after_failure(MuxPortLock::new(base, acquired).close());
                    return Err(e);
                }
            }
        }

        Ok(Some(MuxPortLock::new(base, acquired)))
    }

    /// Run every layer for one port; all must admit it.
    fn try_port(&self, port: u16) -> Result<Option<PortLock>, PortError> {
        let mut layers = Vec::with_capacity(self.lockers.len());

        for locker in &self.lockers {
            match locker.try_lock(port) {
                Ok(Some(lock)) => layers.push(lock),
                Ok(None) => {
                    PortLock::compose(port, layers).close()?;
                    return Ok(None);
                }
                Err(e) => {
                    release_after_failure(PortLock::compose(port, layers).close());
                    return Err(e);
                }
            }
        }

        Ok(Some(PortLock::compose(port, layers)))
    }
}

fn process_locker() -> InProcessPortLocker {
    static SHARED: OnceLock<InProcessPortLocker> = OnceLock::new();
    SHARED.get_or_init(InProcessPortLocker::new).clone()
}

// The acquisition error wins; release failures behind it are only logged.
fn release_after_failure(result: Result<(), PortError>) {
    if let Err(e) = result {
        tracing::warn!("Releasing partial reservation failed: {}", e);
    }
}

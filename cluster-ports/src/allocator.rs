//! Candidate base-port selection.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

use crate::error::PortError;

/// Lowest port handed out by default (first non-privileged port).
pub const LOWEST_PORT: u16 = 1024;

/// Highest port handed out by default (below the usual ephemeral range).
pub const HIGHEST_PORT: u16 = 32767;

/// Proposes the first port of a candidate block.
///
/// Proposals are only candidates: the chooser still runs every admission
/// check and asks again on failure.
pub trait PortAllocator: Send + Sync {
    /// Propose a base port such that `[base, base + count)` fits the range.
    fn propose(&self, count: u16) -> Result<u16, PortError>;
}

/// Uniformly random base ports within `[min_port, max_port]`.
#[derive(Debug)]
pub struct RandomPortAllocator {
    min_port: u16,
    max_port: u16,
    rng: Mutex<StdRng>,
}

impl RandomPortAllocator {
    /// Allocator over `[min_port, max_port]` seeded from OS entropy.
    pub fn new(min_port: u16, max_port: u16) -> Result<Self, PortError> {
        Self::with_rng(min_port, max_port, StdRng::from_entropy())
    }

    /// Deterministic allocator, for reproducible tests.
    pub fn seeded(min_port: u16, max_port: u16, seed: u64) -> Result<Self, PortError> {
        Self::with_rng(min_port, max_port, StdRng::seed_from_u64(seed))
    }

    fn with_rng(min_port: u16, max_port: u16, rng: StdRng) -> Result<Self, PortError> {
        if min_port == 0 || min_port > max_port {
            return Err(PortError::InvalidRange { min_port, max_port });
        }
        Ok(Self {
            min_port,
            max_port,
            rng: Mutex::new(rng),
        })
    }

    /// Lowest port of the range.
    pub fn min_port(&self) -> u16 {
        self.min_port
    }

    /// Highest port of the range.
    pub fn max_port(&self) -> u16 {
        self.max_port
    }
}

impl Default for RandomPortAllocator {
    fn default() -> Self {
        Self {
            min_port: LOWEST_PORT,
            max_port: HIGHEST_PORT,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl PortAllocator for RandomPortAllocator {
    fn propose(&self, count: u16) -> Result<u16, PortError> {
        let span = u32::from(self.max_port) - u32::from(self.min_port) + 1;
        if count == 0 || u32::from(count) > span {
            return Err(PortError::InvalidCount {
                count,
                min_port: self.min_port,
                max_port: self.max_port,
            });
        }

        // Highest base that keeps the whole block in range
        let highest_base = self.max_port - (count - 1);
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rng.gen_range(self.min_port..=highest_base))
    }
}

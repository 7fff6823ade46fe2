//! Relay configuration (`[disruption]` section).

use serde::Deserialize;

/// Disruption relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DisruptionConfig {
    /// Worker threads of the provider-owned runtime (default: 2).
    ///
    /// Ignored when the provider borrows an existing runtime.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Per-direction relay buffer in bytes (default: 16 KiB).
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_worker_threads() -> usize {
    2
}

fn default_buffer_size() -> usize {
    16 * 1024
}

impl Default for DisruptionConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            buffer_size: default_buffer_size(),
        }
    }
}

//! Port reservation configuration (`[ports]` section).

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::allocator::{HIGHEST_PORT, LOWEST_PORT};

/// Port reservation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PortConfig {
    /// Host-wide lock file shared by every test process
    /// (default: `<temp dir>/clusterkit-port-lock`).
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
    /// Address bind probes use (default: 0.0.0.0).
    #[serde(default = "default_probe_address")]
    pub probe_address: IpAddr,
    /// Lowest port handed out (default: 1024).
    #[serde(default = "default_min_port")]
    pub min_port: u16,
    /// Highest port handed out (default: 32767).
    #[serde(default = "default_max_port")]
    pub max_port: u16,
}

fn default_lock_file() -> PathBuf {
    std::env::temp_dir().join("clusterkit-port-lock")
}

fn default_probe_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_min_port() -> u16 {
    LOWEST_PORT
}

fn default_max_port() -> u16 {
    HIGHEST_PORT
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            lock_file: default_lock_file(),
            probe_address: default_probe_address(),
            min_port: default_min_port(),
            max_port: default_max_port(),
        }
    }
}

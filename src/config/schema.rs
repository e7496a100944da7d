use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Our node id in every session. Defaults to the host name.
    pub user_id: String,
    /// Multicast group of the info channel
    pub info_group: Ipv4Addr,
    /// Port of the info channel
    pub info_port: u16,
    /// Address prefix of every scene message
    pub osc_root: String,
    /// Node type of participants in the shared directory
    pub peer_node_type: String,
    /// JSON file describing our cameras
    pub cameras_config: PathBuf,
    /// Session to join as soon as it is announced
    pub default_session: Option<String>,
    /// Interval between presence pings while joined
    pub keepalive_interval_secs: u64,
    /// Interval between display snapshots
    pub snapshot_interval_secs: u64,
    /// TTL of outgoing multicast datagrams
    pub multicast_ttl: u32,
    /// Media pipeline program spawned per stream
    pub pipeline_program: String,
    /// Remove stale shared video files at startup
    pub clear_shared_memory: bool,
    /// Directory holding shared video files
    pub shared_memory_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            info_group: Ipv4Addr::new(239, 0, 0, 1),
            info_port: 54320,
            osc_root: "/SPIN".to_string(),
            peer_node_type: "Peer".to_string(),
            cameras_config: PathBuf::from("~/.peerview.json"),
            default_session: None,
            keepalive_interval_secs: 15,
            snapshot_interval_secs: 2,
            multicast_ttl: 3,
            pipeline_program: "milhouse".to_string(),
            clear_shared_memory: true,
            shared_memory_dir: PathBuf::from("/dev/shm"),
        }
    }
}

/// Host name, or a fixed id when it cannot be read
fn default_user_id() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "peerview".to_string())
}

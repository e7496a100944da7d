//! Network defaults shipped with an installed scene framework
//!
//! The framework's `spinDefaults.h` header carries lines such as
//! `#define INFO_UDP_PORT "54320"`. When present, its info-channel port and
//! multicast group take precedence over our built-in values.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

const HEADER: &str = "spinFramework/spinDefaults.h";
const PREFIXES: &[&str] = &["/usr/local", "/usr"];

/// Values read from the defaults header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameworkDefaults {
    pub info_port: Option<u16>,
    pub multicast_group: Option<Ipv4Addr>,
}

/// Locate the header under the standard prefixes
pub fn find_header() -> Option<PathBuf> {
    PREFIXES
        .iter()
        .map(|prefix| Path::new(prefix).join("include").join(HEADER))
        .find(|path| {
            debug!("Looking for {}", path.display());
            path.exists()
        })
}

/// Read the installed header, if any
pub fn read_installed() -> FrameworkDefaults {
    match find_header() {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(content) => {
                info!("Using network defaults from {}", path.display());
                parse(&content)
            }
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                FrameworkDefaults::default()
            }
        },
        None => {
            debug!("No {} header installed", HEADER);
            FrameworkDefaults::default()
        }
    }
}

/// Parse header content. Unparseable values are ignored.
pub fn parse(content: &str) -> FrameworkDefaults {
    let mut defaults = FrameworkDefaults::default();
    for line in content.lines() {
        let Some(value) = quoted(line) else {
            continue;
        };
        if line.contains("INFO_UDP_PORT") {
            defaults.info_port = value.parse().ok();
        } else if line.contains("MULTICAST_GROUP") {
            defaults.multicast_group = value.parse().ok();
        }
    }
    defaults
}

fn quoted(line: &str) -> Option<&str> {
    let start = line.find('"')? + 1;
    let len = line[start..].find('"')?;
    Some(&line[start..start + len])
}

//! Known sessions, accumulated from info-channel announcements

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::osc::OscMessage;

/// Address suffix of session announcements on the info channel
pub const SERVER_ANNOUNCE: &str = "__server__";

/// Address suffix of user announcements, which we do not track
pub const USER_ANNOUNCE: &str = "__user__";

/// Where to reach one remote session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    /// Where commands for the session are sent
    pub recv_addr: IpAddr,
    pub recv_port: u16,
    pub recv_tcp_port: u16,
    /// Multicast group the session broadcasts its scene on
    pub send_addr: Ipv4Addr,
    pub send_port: u16,
    pub sync_port: u16,
}

impl SessionInfo {
    /// Parse a `__server__` announcement:
    /// `(sessionId, recvAddr, recvPort, recvTcpPort, sendAddr, sendPort, syncPort)`
    pub fn from_announcement(msg: &OscMessage) -> Result<Self> {
        let session_id = msg.str_arg(0)?.to_string();
        if session_id.is_empty() {
            return Err(AppError::MalformedMessage(format!(
                "{}: empty session id",
                msg.address
            )));
        }

        let recv_addr = parse_addr::<IpAddr>(msg, 1)?;
        let recv_port = msg.port_arg(2)?;
        let recv_tcp_port = msg.port_arg(3)?;
        let send_addr = parse_addr::<Ipv4Addr>(msg, 4)?;
        let send_port = msg.port_arg(5)?;
        let sync_port = msg.port_arg(6)?;

        Ok(Self {
            session_id,
            recv_addr,
            recv_port,
            recv_tcp_port,
            send_addr,
            send_port,
            sync_port,
        })
    }

    /// Destination for commands addressed to this session
    pub fn command_addr(&self) -> SocketAddr {
        SocketAddr::new(self.recv_addr, self.recv_port)
    }
}

fn parse_addr<T: std::str::FromStr>(msg: &OscMessage, index: usize) -> Result<T> {
    let raw = msg.str_arg(index)?;
    raw.parse().map_err(|_| {
        AppError::MalformedMessage(format!(
            "{}: argument {} is not an IP address: {:?}",
            msg.address, index, raw
        ))
    })
}

/// What `observe` did with an announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Unchanged,
    Added,
    /// The session moved to a new receive address
    Replaced,
}

impl Observation {
    /// Whether collaborators should hear about the new session list
    pub fn is_change(self) -> bool {
        !matches!(self, Observation::Unchanged)
    }
}

/// Table of known sessions keyed by session id
///
/// Entries never expire.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<String, SessionInfo>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announcement
    ///
    /// An existing entry is replaced wholesale only when the receive address
    /// differs; other field changes are ignored.
    pub fn observe(&mut self, info: SessionInfo) -> Observation {
        match self.sessions.get(&info.session_id) {
            Some(existing) if existing.recv_addr == info.recv_addr => Observation::Unchanged,
            Some(existing) => {
                info!(
                    "Session {} changed its receiving address from {} to {}",
                    info.session_id, existing.recv_addr, info.recv_addr
                );
                self.sessions.insert(info.session_id.clone(), info);
                Observation::Replaced
            }
            None => {
                info!(
                    "Discovered session {} (commands to {}, scene on {}:{})",
                    info.session_id,
                    info.command_addr(),
                    info.send_addr,
                    info.send_port
                );
                self.sessions.insert(info.session_id.clone(), info);
                Observation::Added
            }
        }
    }

    /// Look up a session for joining
    pub fn select(&self, session_id: &str) -> Result<&SessionInfo> {
        self.sessions.get(session_id).ok_or_else(|| {
            debug!("Known sessions: {:?}", self.ids());
            AppError::UnknownSession(session_id.to_string())
        })
    }

    /// Known session ids, sorted
    pub fn ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osc_msg;

    fn announcement(id: &str, recv_addr: &str) -> OscMessage {
        osc_msg!(
            "/SPIN/__server__",
            id,
            recv_addr,
            54324,
            54324,
            "239.0.0.1",
            54323,
            54325
        )
    }

    #[test]
    fn test_parse_announcement() {
        let info = SessionInfo::from_announcement(&announcement("default", "239.0.0.1")).unwrap();
        assert_eq!(info.session_id, "default");
        assert_eq!(info.recv_port, 54324);
        assert_eq!(info.send_addr, Ipv4Addr::new(239, 0, 0, 1));
        assert_eq!(info.send_port, 54323);
        assert_eq!(info.sync_port, 54325);
        assert_eq!(info.command_addr(), "239.0.0.1:54324".parse().unwrap());
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        let short = osc_msg!("/SPIN/__server__", "default", "239.0.0.1", 54324);
        assert!(matches!(
            SessionInfo::from_announcement(&short),
            Err(AppError::MalformedMessage(_))
        ));

        let bad_addr = announcement("default", "not-an-address");
        assert!(SessionInfo::from_announcement(&bad_addr).is_err());

        let empty_id = announcement("", "239.0.0.1");
        assert!(SessionInfo::from_announcement(&empty_id).is_err());
    }

    #[test]
    fn test_observe_add_then_unchanged() {
        let mut registry = SessionRegistry::new();
        let info = SessionInfo::from_announcement(&announcement("a", "239.0.0.1")).unwrap();
        assert_eq!(registry.observe(info.clone()), Observation::Added);
        assert_eq!(registry.observe(info), Observation::Unchanged);
        assert_eq!(registry.ids(), vec!["a".to_string()]);
    }

    #[test]
    fn test_observe_replaces_on_address_change() {
        let mut registry = SessionRegistry::new();
        let first = SessionInfo::from_announcement(&announcement("a", "239.0.0.1")).unwrap();
        let moved = SessionInfo::from_announcement(&announcement("a", "192.168.1.10")).unwrap();
        registry.observe(first);
        assert_eq!(registry.observe(moved.clone()), Observation::Replaced);
        assert_eq!(registry.select("a").unwrap(), &moved);
    }

    #[test]
    fn test_select_unknown() {
        let mut registry = SessionRegistry::new();
        registry.observe(SessionInfo::from_announcement(&announcement("b", "239.0.0.1")).unwrap());
        registry.observe(SessionInfo::from_announcement(&announcement("a", "239.0.0.1")).unwrap());
        assert_eq!(registry.ids(), vec!["a".to_string(), "b".to_string()]);
        assert!(matches!(
            registry.select("c"),
            Err(AppError::UnknownSession(id)) if id == "c"
        ));
    }
}

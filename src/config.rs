//! External, not-parsed-by-the-core configuration (spec §6).
//!
//! The core never reads environment variables or argv; it only consumes a
//! `NodeConfig` the embedding application builds (from a TOML file, or, for
//! the demo binary, from `clap`-parsed flags — the same split
//! `flyingrobots-echo`'s `jitosd` daemon uses between a typed config and its
//! CLI entry point).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::appointment::NodeId;
use crate::error::{CalendarError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: NodeId,
    pub num_nodes: usize,
    pub listen_port: u16,
    pub host_names: Vec<String>,
    /// Directory the per-node snapshot file is written into (expansion;
    /// the spec only names the convention `<node_id>node_state.<ext>`).
    pub snapshot_dir: PathBuf,
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        if (self.node_id.0 as usize) >= self.num_nodes {
            return Err(CalendarError::Config(format!(
                "node_id {} out of range [0, {})",
                self.node_id, self.num_nodes
            )));
        }
        if self.host_names.len() != self.num_nodes {
            return Err(CalendarError::Config(format!(
                "expected {} host_names, got {}",
                self.num_nodes,
                self.host_names.len()
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: NodeConfig =
            toml::from_str(raw).map_err(|e| CalendarError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| CalendarError::Config(e.to_string()))?;
        Self::from_toml_str(&raw)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot_dir
            .join(format!("{}node_state.bin", self.node_id.0))
    }

    /// Resolves a peer's socket address. Returns an `io::Error` (rather than
    /// `CalendarError`) because the delivery loop treats an unresolvable
    /// host exactly like a connection-refused peer: set `sendFail`, retry.
    pub fn peer_addr(&self, peer: NodeId) -> std::io::Result<std::net::SocketAddr> {
        use std::io::{Error, ErrorKind};
        use std::net::ToSocketAddrs;

        let host = self.host_names.get(peer.0 as usize).ok_or_else(|| {
            Error::new(ErrorKind::NotFound, format!("no host_name for peer {peer}"))
        })?;
        format!("{host}:{}", self.listen_port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("could not resolve {host}")))
    }

    pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.num_nodes)
            .map(|i| NodeId(i as u16))
            .filter(move |&id| id != self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_node_id_range() {
        let cfg = NodeConfig {
            node_id: NodeId(3),
            num_nodes: 3,
            listen_port: 9000,
            host_names: vec!["a".into(), "b".into(), "c".into()],
            snapshot_dir: PathBuf::from("/tmp"),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validates_host_names_length() {
        let cfg = NodeConfig {
            node_id: NodeId(0),
            num_nodes: 3,
            listen_port: 9000,
            host_names: vec!["a".into()],
            snapshot_dir: PathBuf::from("/tmp"),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_toml() {
        let raw = r#"
            node_id = 0
            num_nodes = 2
            listen_port = 9001
            host_names = ["127.0.0.1", "127.0.0.1"]
            snapshot_dir = "/tmp/distcal"
        "#;
        let cfg = NodeConfig::from_toml_str(raw).unwrap();
        assert_eq!(cfg.node_id, NodeId(0));
        assert_eq!(cfg.peers().collect::<Vec<_>>(), vec![NodeId(1)]);
    }
}

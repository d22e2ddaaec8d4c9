// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use serde::Serialize;

use super::{query, xml::cli_output, ParseError};
use crate::{error::Result, remote::Executor};

/// One entry of `gluster peer status` or `gluster pool list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerStatus {
    pub uuid: String,
    pub hostname: String,
    /// Other names the peer is known by.
    pub hostnames: Vec<String>,
    /// `"1"` when connected, `"0"` otherwise.
    pub connected: String,
    pub state_str: String,
}

impl PeerStatus {
    pub fn is_connected(&self) -> bool {
        self.connected == "1"
    }

    pub fn in_cluster(&self) -> bool {
        self.state_str == "Peer in Cluster"
    }

    /// Whether `name` is one of the names this peer is known by.
    pub fn is_named(&self, name: &str) -> bool {
        self.hostname == name || self.hostnames.iter().any(|h| h == name)
    }
}

/// Parse `gluster peer status --xml` or `gluster pool list --xml`. Order is kept as printed.
pub fn parse_peer_status(document: &str) -> std::result::Result<Vec<PeerStatus>, ParseError> {
    let root = cli_output(document)?;
    let peers = root
        .child("peerStatus")
        .ok_or_else(|| ParseError::new("no <peerStatus> element"))?;
    peers
        .children_named("peer")
        .map(|peer| -> std::result::Result<PeerStatus, ParseError> {
            Ok(PeerStatus {
                uuid: peer.require_text("uuid")?.to_string(),
                hostname: peer.require_text("hostname")?.to_string(),
                hostnames: peer
                    .child("hostnames")
                    .map(|names| {
                        names
                            .children_named("hostname")
                            .map(|n| n.text.clone())
                            .collect()
                    })
                    .unwrap_or_default(),
                connected: peer.require_text("connected")?.to_string(),
                state_str: peer.text_of("stateStr").unwrap_or("").to_string(),
            })
        })
        .collect()
}

/// Parse the text form of `gluster peer status`:
///
/// ```text
/// Number of Peers: 1
///
/// Hostname: server2
/// Uuid: 3b3a1d43-...
/// State: Peer in Cluster (Connected)
/// Other names:
/// 10.70.1.2
/// ```
///
/// Trailing blank lines and extra whitespace are tolerated.
pub fn parse_peer_status_text(output: &str) -> std::result::Result<Vec<PeerStatus>, ParseError> {
    let mut peers = Vec::new();
    let mut current: Option<PeerStatus> = None;
    let mut in_other_names = false;

    for line in output.lines().map(str::trim) {
        if line.is_empty() {
            in_other_names = false;
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim();
            match key.trim() {
                "Number of Peers" => continue,
                "Hostname" => {
                    if let Some(done) = current.take() {
                        peers.push(done);
                    }
                    in_other_names = false;
                    current = Some(PeerStatus {
                        uuid: String::new(),
                        hostname: value.to_string(),
                        hostnames: Vec::new(),
                        connected: "0".to_string(),
                        state_str: String::new(),
                    });
                    continue;
                }
                "Uuid" => {
                    if let Some(peer) = current.as_mut() {
                        peer.uuid = value.to_string();
                    }
                    continue;
                }
                "State" => {
                    if let Some(peer) = current.as_mut() {
                        let (state, connection) = match value.rsplit_once('(') {
                            Some((state, conn)) => (state.trim(), conn.trim_end_matches(')')),
                            None => (value, ""),
                        };
                        peer.state_str = state.to_string();
                        peer.connected = if connection == "Connected" { "1" } else { "0" }.to_string();
                    }
                    continue;
                }
                "Other names" => {
                    in_other_names = true;
                    continue;
                }
                _ => {}
            }
        }
        if in_other_names {
            if let Some(peer) = current.as_mut() {
                peer.hostnames.push(line.to_string());
                continue;
            }
        }
        return Err(ParseError::new(format!("unexpected line in peer status: '{line}'")));
    }
    if let Some(done) = current.take() {
        peers.push(done);
    }
    Ok(peers)
}

/// Parse the text form of `gluster pool list`:
///
/// ```text
/// UUID                                    Hostname    State
/// 3b3a1d43-...                            server2     Connected
/// 6f1a5c1e-...                            localhost   Connected
/// ```
pub fn parse_pool_list_text(output: &str) -> std::result::Result<Vec<PeerStatus>, ParseError> {
    let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
    match lines.next() {
        Some(header) if header.starts_with("UUID") => {}
        Some(other) => {
            return Err(ParseError::new(format!("unexpected pool list header: '{other}'")))
        }
        None => return Ok(Vec::new()),
    }
    lines
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                return Err(ParseError::new(format!("short pool list line: '{line}'")));
            }
            Ok(PeerStatus {
                uuid: fields[0].to_string(),
                hostname: fields[1].to_string(),
                hostnames: Vec::new(),
                connected: if fields[2] == "Connected" { "1" } else { "0" }.to_string(),
                state_str: String::new(),
            })
        })
        .collect()
}

pub async fn get_peer_status(executor: &Executor, mnode: &str) -> Result<Option<Vec<PeerStatus>>> {
    query(executor, mnode, "gluster peer status --xml", parse_peer_status).await
}

/// The pool list includes the queried node itself, as `localhost`.
pub async fn get_pool_list(executor: &Executor, mnode: &str) -> Result<Option<Vec<PeerStatus>>> {
    query(executor, mnode, "gluster pool list --xml", parse_peer_status).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_status_text() {
        let out = "Number of Peers: 2\n\nHostname: server2\nUuid: u2\n\
                   State: Peer in Cluster (Connected)\n\n\
                   Hostname:   server3  \nUuid: u3\nState: Peer Rejected (Disconnected)\n\
                   Other names:\n10.0.0.3\nserver3.example.com\n\n\n";
        let peers = parse_peer_status_text(out).unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].hostname, "server2");
        assert!(peers[0].is_connected());
        assert!(peers[0].in_cluster());
        assert_eq!(peers[1].state_str, "Peer Rejected");
        assert!(!peers[1].is_connected());
        assert!(peers[1].is_named("10.0.0.3"));
    }

    #[test]
    fn peer_status_text_no_peers() {
        assert!(parse_peer_status_text("Number of Peers: 0\n").unwrap().is_empty());
        assert!(parse_peer_status_text("garbage\n").is_err());
    }

    #[test]
    fn pool_list_text() {
        let out = "UUID\t\t\t\t\tHostname \tState\nu2\tserver2  \tConnected \n\
                   u1\tlocalhost\tDisconnected\n";
        let peers = parse_pool_list_text(out).unwrap();
        assert_eq!(peers.len(), 2);
        assert!(peers[0].is_connected());
        assert_eq!(peers[1].hostname, "localhost");
        assert!(!peers[1].is_connected());
    }
}

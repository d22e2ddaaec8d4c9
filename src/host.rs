// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::collections::BTreeSet;
use std::fmt;

use crate::config::Config;
use crate::error::{Error, Result};

/// The part a host plays in the test bed. A host may hold several roles at once, for example a
/// server that is also used as a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum Role {
    Server,
    Client,
    GeoRepSlave,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HostAddress {
    name: String,
    port: Option<u16>,
}

/// An addressable endpoint in the test bed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    address: HostAddress,
    user: Option<String>,
    roles: BTreeSet<Role>,
}

impl Host {
    pub fn new(name: &str) -> Self {
        Host {
            address: HostAddress {
                name: name.to_string(),
                port: None,
            },
            user: None,
            roles: BTreeSet::new(),
        }
    }

    /// Parse a host string of the form `[user@]name[:port]` as it appears in the config file.
    pub fn parse(host_str: &str) -> Result<Self> {
        let (user, rest) = match host_str.split_once('@') {
            Some((user, rest)) => (Some(user.to_string()), rest),
            None => (None, host_str),
        };
        let (name, port) = Self::get_host_port(rest)?;
        if name.is_empty() {
            return Err(Error::Config(format!("empty hostname in '{host_str}'")));
        }
        Ok(Host {
            address: HostAddress {
                name: name.to_string(),
                port,
            },
            user,
            roles: BTreeSet::new(),
        })
    }

    /// Given a string that may be of the form "<address>:<port number>", split it out into the
    /// address and port number portions.
    fn get_host_port(host_str: &str) -> Result<(&str, Option<u16>)> {
        match host_str.split_once(':') {
            None => Ok((host_str, None)),
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| Error::Config(format!("bad port in '{host_str}': {e}")))?;
                Ok((host, Some(port)))
            }
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.insert(role);
        self
    }

    pub fn name(&self) -> &str {
        &self.address.name
    }

    pub fn port(&self) -> Option<u16> {
        self.address.port
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.iter()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Build the deduplicated list of hosts named in the config, with their roles merged.
pub fn hosts_from_config(config: &Config) -> Result<Vec<Host>> {
    let mut hosts: Vec<Host> = Vec::new();
    let groups = [
        (&config.servers, Role::Server),
        (&config.clients, Role::Client),
        (&config.slaves, Role::GeoRepSlave),
    ];
    for (names, role) in groups {
        for name in names {
            let host = Host::parse(name)?;
            match hosts.iter_mut().find(|h| h.name() == host.name()) {
                Some(existing) => {
                    existing.roles.insert(role);
                }
                None => hosts.push(host.with_role(role)),
            }
        }
    }
    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_strings() {
        let h = Host::parse("admin@server1:2222").unwrap();
        assert_eq!(h.name(), "server1");
        assert_eq!(h.user(), Some("admin"));
        assert_eq!(h.port(), Some(2222));

        let h = Host::parse("client1").unwrap();
        assert_eq!(h.name(), "client1");
        assert_eq!(h.user(), None);
        assert_eq!(h.port(), None);

        assert!(Host::parse("server1:notaport").is_err());
        assert!(Host::parse("root@").is_err());
    }

    #[test]
    fn roles_are_merged() {
        let config = Config::from_yaml("servers: [s1, s2]\nclients: [s1, c1]\nslaves: [g1]\n")
            .unwrap();
        let hosts = hosts_from_config(&config).unwrap();
        assert_eq!(hosts.len(), 4);
        let s1 = hosts.iter().find(|h| h.name() == "s1").unwrap();
        assert!(s1.has_role(Role::Server));
        assert!(s1.has_role(Role::Client));
        let g1 = hosts.iter().find(|h| h.name() == "g1").unwrap();
        assert_eq!(g1.roles().collect::<Vec<_>>(), vec![&Role::GeoRepSlave]);
    }
}

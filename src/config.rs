// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Config is the model of the test bed described by the YAML configuration file: which hosts
/// exist, what role they play, where bricks may be created on each server, and the templates for
/// each volume layout and access protocol.
///
/// The config file is consumed once at process start and is read-only afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub servers: Vec<String>,

    #[serde(default)]
    pub clients: Vec<String>,

    #[serde(default)]
    pub slaves: Vec<String>,

    #[serde(default)]
    pub servers_info: BTreeMap<String, ServerInfo>,

    #[serde(default)]
    pub clients_info: BTreeMap<String, ClientInfo>,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default)]
    pub io: IoConfig,

    #[serde(default)]
    pub gluster: GlusterConfig,
}

/// Where bricks for a server may be created.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    pub brick_root: Option<String>,

    #[serde(default)]
    pub devices: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClientInfo {
    #[serde(default = "default_mount_root")]
    pub mount_root: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        ClientInfo {
            mount_root: default_mount_root(),
        }
    }
}

fn default_mount_root() -> String {
    "/mnt".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SshConfig {
    pub user: String,
    pub identity_file: Option<String>,
    pub port: u16,
    pub connect_timeout: u64,
    pub control_persist: u64,
    /// Hosts that are driven with a local shell instead of ssh.
    pub local_hosts: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        SshConfig {
            user: "root".to_string(),
            identity_file: None,
            port: 22,
            connect_timeout: 10,
            control_persist: 60,
            local_hosts: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct IoConfig {
    pub script_dir: String,
    pub tarball: String,
}

impl Default for IoConfig {
    fn default() -> Self {
        IoConfig {
            script_dir: "/usr/share/glusto/io".to_string(),
            tarball: "/root/linux-5.4.54.tar.xz".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GlusterConfig {
    pub volume_types: BTreeMap<String, VolumeTypeConfig>,
    pub mount_types: BTreeMap<String, MountTypeConfig>,
    /// Options set on every fixture volume once it is started.
    pub volume_options: BTreeMap<String, String>,
    pub rebalance_timeout: u64,
    pub online_timeout: u64,
    pub heal_timeout: u64,
    pub cluster_config: ClusterConfig,
}

impl Default for GlusterConfig {
    fn default() -> Self {
        GlusterConfig {
            volume_types: BTreeMap::new(),
            mount_types: BTreeMap::new(),
            volume_options: BTreeMap::new(),
            rebalance_timeout: 1200,
            online_timeout: 600,
            heal_timeout: 1200,
            cluster_config: ClusterConfig::default(),
        }
    }
}

/// A layout template. Every field is optional so that a config entry can override a single field
/// of the built-in template with the same name.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct VolumeTypeConfig {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub dist_count: Option<u32>,
    pub replica_count: Option<u32>,
    pub arbiter_count: Option<u32>,
    pub disperse_count: Option<u32>,
    pub redundancy_count: Option<u32>,
    pub transport: Option<String>,
}

impl VolumeTypeConfig {
    /// Overlay the fields that are set in `other` on top of `self`.
    pub fn merge(&self, other: &VolumeTypeConfig) -> VolumeTypeConfig {
        VolumeTypeConfig {
            kind: other.kind.clone().or_else(|| self.kind.clone()),
            dist_count: other.dist_count.or(self.dist_count),
            replica_count: other.replica_count.or(self.replica_count),
            arbiter_count: other.arbiter_count.or(self.arbiter_count),
            disperse_count: other.disperse_count.or(self.disperse_count),
            redundancy_count: other.redundancy_count.or(self.redundancy_count),
            transport: other.transport.clone().or_else(|| self.transport.clone()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MountTypeConfig {
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    pub smb: SmbConfig,
    pub nfs_ganesha: GaneshaConfig,
    pub geo_rep: GeoRepConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SmbConfig {
    pub ctdb_vips: Vec<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct GaneshaConfig {
    pub enable: bool,
    pub vips: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct GeoRepConfig {
    pub slave_volume: Option<String>,
}

/// The built-in layout templates, keyed by layout name.
pub fn default_volume_type(name: &str) -> Option<VolumeTypeConfig> {
    let t = |kind: &str,
             dist: u32,
             replica: Option<u32>,
             arbiter: Option<u32>,
             disperse: Option<u32>,
             redundancy: Option<u32>| VolumeTypeConfig {
        kind: Some(kind.to_string()),
        dist_count: Some(dist),
        replica_count: replica,
        arbiter_count: arbiter,
        disperse_count: disperse,
        redundancy_count: redundancy,
        transport: Some("tcp".to_string()),
    };
    Some(match name {
        "distributed" => t("distributed", 4, None, None, None, None),
        "replicated" => t("replicated", 1, Some(3), None, None, None),
        "distributed-replicated" => t("distributed-replicated", 2, Some(3), None, None, None),
        "dispersed" => t("dispersed", 1, None, None, Some(6), Some(2)),
        "distributed-dispersed" => t("distributed-dispersed", 2, None, None, Some(6), Some(2)),
        "arbiter" => t("arbiter", 1, Some(3), Some(1), None, None),
        "distributed-arbiter" => t("distributed-arbiter", 2, Some(3), Some(1), None, None),
        _ => return None,
    })
}

/// The protocols a mount can use, and the names they go by in the config file.
pub const MOUNT_TYPES: [&str; 4] = ["glusterfs", "nfs", "nfs-ganesha", "cifs"];

impl Config {
    /// Load the config from the file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("could not read config file '{path}': {e}")))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)
            .map_err(|e| Error::Config(format!("could not parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that do not depend on any particular test.
    fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::Config("no servers configured".to_string()));
        }
        for name in self.gluster.volume_types.keys() {
            if default_volume_type(name).is_none()
                && self.gluster.volume_types[name].kind.is_none()
            {
                return Err(Error::Config(format!(
                    "volume type '{name}' is not a built-in layout and does not name a 'type'"
                )));
            }
        }
        for name in self.gluster.mount_types.keys() {
            if !MOUNT_TYPES.contains(&name.as_str()) {
                return Err(Error::Config(format!("unknown mount type '{name}'")));
            }
        }
        Ok(())
    }

    /// The layout template for `name`: the built-in template overlaid with the config file entry.
    pub fn volume_type(&self, name: &str) -> Result<VolumeTypeConfig> {
        let builtin = default_volume_type(name);
        let configured = self.gluster.volume_types.get(name);
        match (builtin, configured) {
            (Some(b), Some(c)) => Ok(b.merge(c)),
            (Some(b), None) => Ok(b),
            (None, Some(c)) => match c.kind.as_deref().and_then(default_volume_type) {
                Some(base) => Ok(base.merge(c)),
                None => Ok(c.clone()),
            },
            (None, None) => Err(Error::Fixture(format!("unknown volume type '{name}'"))),
        }
    }

    pub fn mount_type(&self, name: &str) -> Result<MountTypeConfig> {
        if !MOUNT_TYPES.contains(&name) {
            return Err(Error::Fixture(format!("unknown mount type '{name}'")));
        }
        Ok(self
            .gluster
            .mount_types
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    pub fn server_info(&self, server: &str) -> Option<&ServerInfo> {
        self.servers_info.get(server)
    }

    pub fn mount_root(&self, client: &str) -> String {
        self.clients_info
            .get(client)
            .map(|info| info.mount_root.clone())
            .unwrap_or_else(default_mount_root)
    }

    pub fn log_dir(&self) -> String {
        self.log_dir.clone().unwrap_or_else(crate::default_log_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
servers: [server1, server2, server3]
clients: [client1]
servers_info:
  server1: {brick_root: /bricks, devices: [/dev/vdb, /dev/vdc]}
  server2: {brick_root: /bricks}
gluster:
  volume_types:
    distributed-replicated: {dist_count: 3}
    custom: {type: dispersed, disperse_count: 4, redundancy_count: 1}
  mount_types:
    cifs: {user: root, password: foo}
"#;

    #[test]
    fn load_and_merge() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.servers.len(), 3);
        assert_eq!(config.ssh.user, "root");
        assert_eq!(config.gluster.rebalance_timeout, 1200);

        let dr = config.volume_type("distributed-replicated").unwrap();
        assert_eq!(dr.dist_count, Some(3));
        assert_eq!(dr.replica_count, Some(3));

        let custom = config.volume_type("custom").unwrap();
        assert_eq!(custom.disperse_count, Some(4));
        assert_eq!(custom.redundancy_count, Some(1));
        assert_eq!(custom.dist_count, Some(1));

        assert!(config.volume_type("nonsense").is_err());
        assert_eq!(
            config.mount_type("cifs").unwrap().password.as_deref(),
            Some("foo")
        );
        assert_eq!(config.mount_root("client1"), "/mnt");
    }

    #[test]
    fn rejects_unknown_mount_type() {
        let bad = "servers: [a]\ngluster:\n  mount_types:\n    smbfs: {}\n";
        assert!(matches!(Config::from_yaml(bad), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_empty_servers() {
        assert!(Config::from_yaml("servers: []\n").is_err());
    }
}

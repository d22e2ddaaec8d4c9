// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Mounting volumes on clients.

use std::{collections::BTreeMap, fmt};

use {
    log::{info, warn},
    serde::Serialize,
};

use crate::{
    cluster::Cluster,
    error::{Error, Result},
    remote::{quote, Executor},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MountProtocol {
    /// The native FUSE client.
    Glusterfs,
    Nfs,
    NfsGanesha,
    Cifs,
}

impl MountProtocol {
    /// The protocol called `name` in the config file.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "glusterfs" | "fuse" => Ok(MountProtocol::Glusterfs),
            "nfs" => Ok(MountProtocol::Nfs),
            "nfs-ganesha" => Ok(MountProtocol::NfsGanesha),
            "cifs" | "smb" => Ok(MountProtocol::Cifs),
            other => Err(Error::Fixture(format!("unknown mount type '{other}'"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MountProtocol::Glusterfs => "glusterfs",
            MountProtocol::Nfs => "nfs",
            MountProtocol::NfsGanesha => "nfs-ganesha",
            MountProtocol::Cifs => "cifs",
        }
    }
}

impl fmt::Display for MountProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A volume mounted (or to be mounted) on a client.
///
/// A mount point belongs to at most one `Mount` at a time; the names handed out by
/// [`Mount::new`] include the volume, the protocol and an index to keep them apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mount {
    pub client: String,
    pub volname: String,
    /// The server or virtual IP the volume is mounted from.
    pub server: String,
    pub mountpoint: String,
    pub protocol: MountProtocol,
    /// Mount options; a key with an empty value is passed as a bare flag, e.g. `acl`.
    pub options: BTreeMap<String, String>,
    pub user: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
}

impl Mount {
    /// Describe a mount of `volname` on `client`, using the protocol defaults from the config.
    /// Mount points are `<mount_root>/<volname>_<protocol>`, suffixed with `_<index>` when given.
    pub fn new(
        cluster: &Cluster,
        client: &str,
        volname: &str,
        protocol: MountProtocol,
        index: Option<usize>,
    ) -> Result<Self> {
        let config = cluster.config();
        let defaults = config.mount_type(protocol.name())?;
        let cluster_config = &config.gluster.cluster_config;

        let server = match protocol {
            MountProtocol::Glusterfs | MountProtocol::Nfs => cluster.mnode().to_string(),
            MountProtocol::NfsGanesha => cluster_config
                .nfs_ganesha
                .vips
                .first()
                .cloned()
                .unwrap_or_else(|| cluster.mnode().to_string()),
            MountProtocol::Cifs => cluster_config
                .smb
                .ctdb_vips
                .first()
                .cloned()
                .unwrap_or_else(|| cluster.mnode().to_string()),
        };

        let (user, password) = match protocol {
            MountProtocol::Cifs => (
                defaults
                    .user
                    .or_else(|| cluster_config.smb.user.clone())
                    .or_else(|| Some("root".to_string())),
                defaults
                    .password
                    .or_else(|| cluster_config.smb.password.clone()),
            ),
            _ => (defaults.user, defaults.password),
        };

        let suffix = index.map(|i| format!("_{i}")).unwrap_or_default();
        let protocol_tag = protocol.name().replace('-', "_");
        Ok(Mount {
            client: client.to_string(),
            volname: volname.to_string(),
            server,
            mountpoint: format!(
                "{}/{volname}_{protocol_tag}{suffix}",
                config.mount_root(client).trim_end_matches('/')
            ),
            protocol,
            options: defaults.options,
            user,
            password,
        })
    }

    fn option_list(&self, leading: &[String]) -> String {
        leading
            .iter()
            .cloned()
            .chain(self.options.iter().map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            }))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The command that mounts this volume on the client.
    pub fn mount_command(&self) -> String {
        let mountpoint = quote(&self.mountpoint);
        match self.protocol {
            MountProtocol::Glusterfs => {
                let options = self.option_list(&[]);
                let options = if options.is_empty() {
                    String::new()
                } else {
                    format!(" -o {}", quote(&options))
                };
                format!(
                    "mount -t glusterfs{options} {}:/{} {mountpoint}",
                    self.server,
                    quote(&self.volname)
                )
            }
            MountProtocol::Nfs | MountProtocol::NfsGanesha => {
                let mut leading = Vec::new();
                if !self.options.contains_key("vers") {
                    let vers = if self.protocol == MountProtocol::Nfs { 3 } else { 4 };
                    leading.push(format!("vers={vers}"));
                }
                format!(
                    "mount -t nfs -o {} {}:/{} {mountpoint}",
                    quote(&self.option_list(&leading)),
                    self.server,
                    quote(&self.volname)
                )
            }
            MountProtocol::Cifs => {
                // The password travels in a credentials file, so that it stays out of the logs.
                let leading = match &self.password {
                    Some(_) => vec![format!("credentials={}", self.credentials_path())],
                    None => vec![format!("user={}", self.user.as_deref().unwrap_or("root"))],
                };
                format!(
                    "mount.cifs //{}/{} {mountpoint} -o {}",
                    self.server,
                    quote(&self.volname),
                    quote(&self.option_list(&leading))
                )
            }
        }
    }

    /// Where the CIFS credentials file is kept on the client while mounting.
    pub fn credentials_path(&self) -> String {
        format!("{}.credentials", self.mountpoint)
    }

    /// The contents of the CIFS credentials file, when there is a password to hide.
    fn credentials(&self) -> Option<String> {
        let password = self.password.as_deref()?;
        Some(format!(
            "username={}\npassword={password}\n",
            self.user.as_deref().unwrap_or("root")
        ))
    }

    /// Whether the kernel lists the mount point as mounted. Nothing is remembered between calls.
    pub async fn is_mounted(&self, executor: &Executor) -> Result<bool> {
        let command = format!(
            "awk -v mp={} '$2 == mp {{ found = 1 }} END {{ exit !found }}' /proc/mounts",
            quote(&self.mountpoint)
        );
        Ok(executor.run(&self.client, &command).await?.success())
    }

    /// Create the mount point and mount the volume. True when the kernel reports the path as
    /// mounted afterwards.
    pub async fn mount(&self, executor: &Executor) -> Result<bool> {
        if self.is_mounted(executor).await? {
            info!("{} is already mounted on {}", self.mountpoint, self.client);
            return Ok(true);
        }
        let mkdir = format!("mkdir -p {}", quote(&self.mountpoint));
        if !executor.run(&self.client, &mkdir).await?.success() {
            return Ok(false);
        }
        let credentials = match self.credentials() {
            Some(contents) if self.protocol == MountProtocol::Cifs => {
                let path = self.credentials_path();
                if !executor
                    .upload(&self.client, contents.as_bytes(), &path, 0o600)
                    .await?
                {
                    warn!("could not write {path} on {}", self.client);
                    return Ok(false);
                }
                Some(path)
            }
            _ => None,
        };
        let result = executor.run(&self.client, &self.mount_command()).await;
        if let Some(path) = credentials {
            let removed = executor
                .run(&self.client, &format!("rm -f {}", quote(&path)))
                .await?;
            if !removed.success() {
                warn!("could not remove {path} from {}", self.client);
            }
        }
        let result = result?;
        if !result.success() {
            warn!(
                "could not mount {} on {}:{}: {}",
                self.volname,
                self.client,
                self.mountpoint,
                result.stderr.trim()
            );
            return Ok(false);
        }
        self.is_mounted(executor).await
    }

    /// Unmount the volume. Unmounting a path that is not mounted succeeds; a busy mount is
    /// unmounted lazily.
    pub async fn unmount(&self, executor: &Executor) -> Result<bool> {
        if !self.is_mounted(executor).await? {
            return Ok(true);
        }
        let mountpoint = quote(&self.mountpoint);
        let result = executor
            .run(&self.client, &format!("umount {mountpoint}"))
            .await?;
        if !result.success() {
            warn!(
                "umount of {}:{} failed ({}), retrying lazily",
                self.client,
                self.mountpoint,
                result.stderr.trim()
            );
            executor
                .run(&self.client, &format!("umount -l {mountpoint}"))
                .await?;
        }
        Ok(!self.is_mounted(executor).await?)
    }

    /// Remove the mount point directory, unless something is still mounted on it.
    pub async fn remove_mountpoint(&self, executor: &Executor) -> Result<bool> {
        if self.is_mounted(executor).await? {
            warn!("not removing {}:{}, it is still mounted", self.client, self.mountpoint);
            return Ok(false);
        }
        let command = format!("rmdir {0} 2>/dev/null || test ! -e {0}", quote(&self.mountpoint));
        Ok(executor.run(&self.client, &command).await?.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, MountTypeConfig},
        remote::CommandLog,
    };

    fn cluster(config: Config) -> Cluster {
        let executor = Executor::new(&config, CommandLog::disabled()).unwrap();
        Cluster::from_config(config, executor).unwrap()
    }

    fn base_config() -> Config {
        let mut config = Config {
            servers: vec!["server1".into(), "server2".into()],
            clients: vec!["client1".into()],
            ..Default::default()
        };
        config.gluster.cluster_config.smb.ctdb_vips = vec!["10.0.0.100".into()];
        config
    }

    #[test]
    fn fuse_with_acl() {
        let mut config = base_config();
        config.gluster.mount_types.insert(
            "glusterfs".into(),
            MountTypeConfig {
                options: BTreeMap::from([("acl".to_string(), String::new())]),
                ..Default::default()
            },
        );
        let cluster = cluster(config);
        let mount = Mount::new(&cluster, "client1", "vol", MountProtocol::Glusterfs, None).unwrap();
        assert_eq!(mount.mountpoint, "/mnt/vol_glusterfs");
        assert_eq!(
            mount.mount_command(),
            "mount -t glusterfs -o acl server1:/vol /mnt/vol_glusterfs"
        );
    }

    #[test]
    fn nfs_versions() {
        let cluster = cluster(base_config());
        let nfs = Mount::new(&cluster, "client1", "vol", MountProtocol::Nfs, Some(2)).unwrap();
        assert_eq!(
            nfs.mount_command(),
            "mount -t nfs -o vers=3 server1:/vol /mnt/vol_nfs_2"
        );
        let ganesha = Mount::new(&cluster, "client1", "vol", MountProtocol::NfsGanesha, None).unwrap();
        assert!(ganesha.mount_command().starts_with("mount -t nfs -o vers=4 "));
    }

    #[test]
    fn cifs_uses_vip_and_credentials() {
        let mut config = base_config();
        config.gluster.cluster_config.smb.password = Some("secret".into());
        let cluster = cluster(config);
        let mount = Mount::new(&cluster, "client1", "vol", MountProtocol::Cifs, None).unwrap();
        assert_eq!(
            mount.mount_command(),
            "mount.cifs //10.0.0.100/vol /mnt/vol_cifs -o credentials=/mnt/vol_cifs.credentials"
        );
        assert!(!mount.mount_command().contains("secret"));
        assert_eq!(
            mount.credentials().as_deref(),
            Some("username=root\npassword=secret\n")
        );

        let mut guest = mount.clone();
        guest.password = None;
        assert_eq!(
            guest.mount_command(),
            "mount.cifs //10.0.0.100/vol /mnt/vol_cifs -o user=root"
        );
    }

    #[test]
    fn protocol_names() {
        for name in crate::config::MOUNT_TYPES {
            assert_eq!(MountProtocol::from_name(name).unwrap().name(), name);
        }
        assert!(MountProtocol::from_name("9p").is_err());
    }
}

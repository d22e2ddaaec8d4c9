// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::{fmt, time::Duration};

use {futures::future, log::warn, serde::Serialize};

use super::{Cluster, VolumeLayout};
use crate::{
    config::Config,
    error::{Error, Result},
    parse::volume::{get_one_volume_info, get_volume_status, VolumeInfo},
    remote::{quote, Executor},
    wait::{try_wait_until, DEFAULT_INTERVAL},
};

/// A server-local directory exported as one storage unit of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Brick {
    pub host: String,
    pub path: String,
    /// The block device the brick directory lives on, when the server lists devices.
    pub device: Option<String>,
}

impl Brick {
    /// Parse the CLI form `host:path`.
    pub fn parse(brick: &str) -> Result<Self> {
        match brick.split_once(':') {
            Some((host, path)) if !host.is_empty() && path.starts_with('/') => Ok(Brick {
                host: host.to_string(),
                path: path.to_string(),
                device: None,
            }),
            _ => Err(Error::Fixture(format!("'{brick}' is not a host:/path brick"))),
        }
    }
}

impl fmt::Display for Brick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.path)
    }
}

/// The allocation index of a brick named `<volname>_brick<N>`, if it is one.
pub(crate) fn brick_index(volname: &str, path: &str) -> Option<usize> {
    let name = path.rsplit('/').next()?;
    name.strip_prefix(volname)?
        .strip_prefix("_brick")?
        .parse()
        .ok()
}

/// Allocate `n` new bricks for `volname` on `servers`, round-robin.
///
/// Bricks are named `<brick_root>/<volname>_brick<N>`; when a server lists devices, each brick of
/// the volume on that server gets its own device, mounted at `<brick_root>/brick<D>`. Indices and
/// devices used by `existing` bricks of the same volume are never handed out again, and neither
/// is any index below `min_index`, the high-water mark of earlier allocations. Consecutive
/// bricks of the result land on different servers, so that the members of a subvolume are spread
/// out whenever there are enough servers.
pub fn allocate_bricks(
    volname: &str,
    n: usize,
    servers: &[String],
    config: &Config,
    existing: &[Brick],
    min_index: usize,
) -> Result<Vec<Brick>> {
    if servers.is_empty() {
        return Err(Error::Fixture("no servers to allocate bricks on".to_string()));
    }

    // Brick root and still-free devices of each server, in configured order.
    let mut slots = Vec::with_capacity(servers.len());
    for server in servers {
        let info = config.server_info(server).ok_or_else(|| {
            Error::Fixture(format!("server '{server}' has no entry in servers_info"))
        })?;
        let root = info
            .brick_root
            .as_deref()
            .ok_or_else(|| Error::Fixture(format!("server '{server}' has no brick_root")))?;
        let free: Vec<(usize, &String)> = info
            .devices
            .iter()
            .enumerate()
            .filter(|(d, _)| {
                let mount_dir = format!("{root}/brick{d}/");
                !existing
                    .iter()
                    .any(|b| &b.host == server && b.path.starts_with(&mount_dir))
            })
            .collect();
        slots.push((server, root, !info.devices.is_empty(), free));
    }

    let mut next_index = existing
        .iter()
        .filter_map(|b| brick_index(volname, &b.path))
        .max()
        .map_or(0, |i| i + 1)
        .max(min_index);

    let mut bricks = Vec::with_capacity(n);
    for i in 0..n {
        let (server, root, has_devices, free) = &mut slots[i % servers.len()];
        let name = format!("{volname}_brick{next_index}");
        next_index += 1;

        let brick = if !*has_devices {
            Brick {
                host: server.to_string(),
                path: format!("{root}/{name}"),
                device: None,
            }
        } else {
            if free.is_empty() {
                return Err(Error::Fixture(format!(
                    "asked for {n} bricks but server '{server}' has no usable device left"
                )));
            }
            let (d, device) = free.remove(0);
            Brick {
                host: server.to_string(),
                path: format!("{root}/brick{d}/{name}"),
                device: Some(device.clone()),
            }
        };
        bricks.push(brick);
    }
    Ok(bricks)
}

/// Allocate the bricks for a whole layout.
pub fn allocate_layout(
    cluster: &Cluster,
    volname: &str,
    layout: &VolumeLayout,
) -> Result<Vec<Brick>> {
    cluster.allocate_bricks(volname, layout.brick_count(), cluster.servers(), &[])
}

pub async fn get_all_bricks(
    executor: &Executor,
    mnode: &str,
    volname: &str,
) -> Result<Option<Vec<String>>> {
    Ok(get_one_volume_info(executor, mnode, volname)
        .await?
        .map(|info| info.brick_names()))
}

/// The bricks of `info` grouped into subvolumes.
pub fn subvols_of(info: &VolumeInfo) -> Vec<Vec<String>> {
    info.brick_names()
        .chunks(info.subvol_size())
        .map(<[String]>::to_vec)
        .collect()
}

pub async fn get_subvols(
    executor: &Executor,
    mnode: &str,
    volname: &str,
) -> Result<Option<Vec<Vec<String>>>> {
    Ok(get_one_volume_info(executor, mnode, volname)
        .await?
        .map(|info| subvols_of(&info)))
}

/// Split the bricks of `volname` into (online, offline) according to `volume status`.
async fn partition_bricks(
    executor: &Executor,
    mnode: &str,
    volname: &str,
) -> Result<Option<(Vec<String>, Vec<String>)>> {
    let Some(bricks) = get_all_bricks(executor, mnode, volname).await? else {
        return Ok(None);
    };
    let Some(mut status) = get_volume_status(executor, mnode, Some(volname)).await? else {
        return Ok(None);
    };
    let Some(status) = status.remove(volname) else {
        return Ok(None);
    };
    Ok(Some(bricks.into_iter().partition(|b| {
        status.brick(b).is_some_and(|p| p.is_online())
    })))
}

pub async fn get_online_bricks_list(
    executor: &Executor,
    mnode: &str,
    volname: &str,
) -> Result<Option<Vec<String>>> {
    Ok(partition_bricks(executor, mnode, volname)
        .await?
        .map(|(online, _)| online))
}

pub async fn get_offline_bricks_list(
    executor: &Executor,
    mnode: &str,
    volname: &str,
) -> Result<Option<Vec<String>>> {
    Ok(partition_bricks(executor, mnode, volname)
        .await?
        .map(|(_, offline)| offline))
}

/// Whether every brick in `bricks` is online. `false` if the status cannot be read.
pub async fn are_bricks_online(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
) -> Result<bool> {
    Ok(match get_online_bricks_list(executor, mnode, volname).await? {
        Some(online) => bricks.iter().all(|b| online.contains(b)),
        None => false,
    })
}

/// Whether every brick in `bricks` is offline.
///
/// When glusterd itself is down on `mnode` the status cannot be read at all, and the answer is
/// taken from whether the brick processes still exist on their hosts.
pub async fn are_bricks_offline(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
) -> Result<bool> {
    if let Some(offline) = get_offline_bricks_list(executor, mnode, volname).await? {
        return Ok(bricks.iter().all(|b| offline.contains(b)));
    }
    for brick in bricks {
        let brick = Brick::parse(brick)?;
        let pattern = format!("glusterfsd.*{}", brick.path);
        let result = executor
            .run(&brick.host, &format!("pgrep -f {}", quote(&pattern)))
            .await?;
        if result.success() {
            return Ok(false);
        }
    }
    Ok(true)
}

pub async fn wait_for_bricks_to_be_online(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    timeout: Duration,
) -> Result<bool> {
    try_wait_until(timeout, DEFAULT_INTERVAL, || {
        are_bricks_online(executor, mnode, volname, bricks)
    })
    .await
}

/// Kill the brick processes of `bricks` and wait until the volume status shows them offline.
pub async fn bring_bricks_offline(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
) -> Result<bool> {
    let Some(mut status) = get_volume_status(executor, mnode, Some(volname)).await? else {
        return Ok(false);
    };
    let Some(status) = status.remove(volname) else {
        return Ok(false);
    };

    let kills = bricks.iter().map(|name| {
        let status = &status;
        async move {
            let brick = Brick::parse(name)?;
            match status.brick(name).and_then(|p| p.pid) {
                Some(pid) => Ok::<bool, Error>(
                    executor
                        .run(&brick.host, &format!("kill -9 {pid}"))
                        .await?
                        .success(),
                ),
                None => {
                    warn!("brick {name} of {volname} has no running process");
                    Ok(true)
                }
            }
        }
    });
    let mut killed = true;
    for result in future::join_all(kills).await {
        killed &= result?;
    }
    if !killed {
        return Ok(false);
    }

    try_wait_until(Duration::from_secs(60), DEFAULT_INTERVAL, || {
        are_bricks_offline(executor, mnode, volname, bricks)
    })
    .await
}

/// Restart the offline bricks of `volname` with `volume start force` and wait for `bricks` to come
/// back.
pub async fn bring_bricks_online(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    timeout: Duration,
) -> Result<bool> {
    let command = format!("gluster volume start {} force", quote(volname));
    if !executor.run(mnode, &command).await?.success() {
        return Ok(false);
    }
    wait_for_bricks_to_be_online(executor, mnode, volname, bricks, timeout).await
}

/// Pick bricks that can be taken offline together without making any data unavailable: at most
/// one per subvolume, none when the layout tolerates no failures, and never an arbiter brick.
/// Members are picked at a different position in each subvolume so that the load spreads over
/// servers.
pub fn select_bricks_to_bring_offline(info: &VolumeInfo) -> Vec<String> {
    let tolerated = if info.disperse_count > 0 {
        info.redundancy_count as usize
    } else if info.replica_count > 1 {
        info.replica_count.saturating_sub(info.arbiter_count + 1) as usize
    } else {
        0
    };
    if tolerated == 0 {
        return Vec::new();
    }

    let size = info.subvol_size();
    info.bricks
        .chunks(size)
        .enumerate()
        .filter_map(|(i, subvol)| {
            let candidates: Vec<_> = subvol.iter().filter(|b| !b.is_arbiter).collect();
            if candidates.is_empty() {
                return None;
            }
            Some(candidates[i % candidates.len()].name.clone())
        })
        .collect()
}

/// The index of the subvolume that holds the data of `relpath` (a path relative to the volume
/// root), found by looking for a regular, non-link file on each brick.
pub async fn find_hashed_subvol(
    executor: &Executor,
    subvols: &[Vec<String>],
    relpath: &str,
) -> Result<Option<usize>> {
    let relpath = relpath.trim_start_matches('/');
    for (index, subvol) in subvols.iter().enumerate() {
        for name in subvol {
            let brick = Brick::parse(name)?;
            let path = quote(&format!("{}/{relpath}", brick.path));
            // DHT link files are empty and carry only the sticky bit.
            let command = format!("test -f {path} && test \"$(stat -c %A {path})\" != ---------T");
            if executor.run(&brick.host, &command).await?.success() {
                return Ok(Some(index));
            }
        }
    }
    Ok(None)
}

/// Remove brick directories from their hosts.
pub async fn remove_brick_dirs(executor: &Executor, bricks: &[String]) -> Result<bool> {
    let removals = bricks.iter().map(|name| async move {
        let brick = Brick::parse(name)?;
        Ok::<bool, Error>(
            executor
                .run(&brick.host, &format!("rm -rf {}", quote(&brick.path)))
                .await?
                .success(),
        )
    });
    let mut all = true;
    for result in future::join_all(removals).await {
        all &= result?;
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        cluster::VolumeLayout,
        config::{default_volume_type, ServerInfo},
        parse::volume::BrickInfo,
    };

    fn config(servers: usize, devices: usize) -> (Config, Vec<String>) {
        let names: Vec<String> = (1..=servers).map(|i| format!("server{i}")).collect();
        let mut config = Config {
            servers: names.clone(),
            ..Default::default()
        };
        for name in &names {
            config.servers_info.insert(
                name.clone(),
                ServerInfo {
                    brick_root: Some("/bricks".into()),
                    devices: (0..devices).map(|d| format!("/dev/vd{d}")).collect(),
                },
            );
        }
        (config, names)
    }

    #[test]
    fn round_robin_naming() {
        let (config, servers) = config(3, 0);
        let bricks = allocate_bricks("vol", 4, &servers, &config, &[], 0).unwrap();
        let names: Vec<String> = bricks.iter().map(Brick::to_string).collect();
        assert_eq!(
            names,
            vec![
                "server1:/bricks/vol_brick0",
                "server2:/bricks/vol_brick1",
                "server3:/bricks/vol_brick2",
                "server1:/bricks/vol_brick3",
            ]
        );
    }

    #[test]
    fn expansion_does_not_reuse_paths_or_devices() {
        let (config, servers) = config(2, 2);
        let first = allocate_bricks("vol", 2, &servers, &config, &[], 0).unwrap();
        assert_eq!(first[0].path, "/bricks/brick0/vol_brick0");
        let more = allocate_bricks("vol", 2, &servers, &config, &first, 0).unwrap();
        assert_eq!(more[0].path, "/bricks/brick1/vol_brick2");
        assert_eq!(more[1].device.as_deref(), Some("/dev/vd1"));

        let mut all = first;
        all.extend(more);
        assert!(matches!(
            allocate_bricks("vol", 1, &servers, &config, &all, 0),
            Err(Error::Fixture(_))
        ));
    }

    #[test]
    fn high_water_mark_survives_a_shrink() {
        let (config, servers) = config(3, 0);
        let all = allocate_bricks("vol", 6, &servers, &config, &[], 0).unwrap();
        // The last subvolume was removed, so only the first three bricks are left.
        let again = allocate_bricks("vol", 3, &servers, &config, &all[..3], 6).unwrap();
        let paths: Vec<&str> = again.iter().map(|b| b.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/bricks/vol_brick6", "/bricks/vol_brick7", "/bricks/vol_brick8"]
        );
    }

    #[test]
    fn missing_brick_root_is_fixture_error() {
        let (mut config, servers) = config(2, 0);
        config.servers_info.get_mut("server2").unwrap().brick_root = None;
        assert!(matches!(
            allocate_bricks("vol", 2, &servers, &config, &[], 0),
            Err(Error::Fixture(_))
        ));
    }

    /// Every layout groups an allocation into subvolumes of distinct servers when there are
    /// enough servers.
    #[test]
    fn layouts_group_allocations() {
        let (config, servers) = config(6, 0);
        for name in [
            "distributed",
            "replicated",
            "distributed-replicated",
            "dispersed",
            "distributed-dispersed",
            "arbiter",
            "distributed-arbiter",
        ] {
            let layout = VolumeLayout::from_config(name, &default_volume_type(name).unwrap()).unwrap();
            for extra in 0..3 {
                let layout = layout.with_dist_count(layout.dist_count + extra);
                let bricks =
                    allocate_bricks("v", layout.brick_count(), &servers, &config, &[], 0).unwrap();
                assert_eq!(bricks.len(), layout.brick_count());
                let subvols = layout.subvolumes(&bricks).unwrap();
                assert_eq!(subvols.len(), layout.dist_count as usize);
                for subvol in subvols {
                    let mut hosts: Vec<&str> = subvol.iter().map(|b| b.host.as_str()).collect();
                    hosts.sort();
                    hosts.dedup();
                    assert_eq!(hosts.len(), subvol.len(), "{name}");
                }
            }
        }
    }

    fn info(
        replica: u32,
        arbiter: u32,
        disperse: u32,
        redundancy: u32,
        bricks: usize,
    ) -> VolumeInfo {
        let size = (if disperse > 0 { disperse } else { replica.max(1) }) as usize;
        VolumeInfo {
            name: "v".into(),
            id: String::new(),
            type_str: String::new(),
            status: "Started".into(),
            brick_count: bricks,
            dist_count: (bricks / size) as u32,
            replica_count: replica,
            arbiter_count: arbiter,
            disperse_count: disperse,
            redundancy_count: redundancy,
            snapshot_count: 0,
            transport: "tcp".into(),
            bricks: (0..bricks)
                .map(|i| BrickInfo {
                    name: format!("s{}:/b/v_brick{i}", i % size),
                    host_uuid: String::new(),
                    is_arbiter: arbiter > 0 && i % size == size - 1,
                })
                .collect(),
            options: BTreeMap::new(),
        }
    }

    #[test]
    fn offline_selection_respects_layout() {
        assert!(select_bricks_to_bring_offline(&info(1, 0, 0, 0, 4)).is_empty());
        assert_eq!(
            select_bricks_to_bring_offline(&info(3, 0, 0, 0, 6)),
            vec!["s0:/b/v_brick0", "s1:/b/v_brick4"]
        );
        assert_eq!(
            select_bricks_to_bring_offline(&info(3, 1, 0, 0, 6)),
            vec!["s0:/b/v_brick0", "s1:/b/v_brick4"]
        );
        assert_eq!(select_bricks_to_bring_offline(&info(0, 0, 6, 2, 6)).len(), 1);
    }

    #[test]
    fn brick_index_ignores_other_names() {
        assert_eq!(brick_index("vol", "/bricks/brick0/vol_brick12"), Some(12));
        assert_eq!(brick_index("vol", "/run/gluster/snaps/abc/brick1"), None);
        assert_eq!(brick_index("vol", "/bricks/vol2_brick1"), None);
    }
}

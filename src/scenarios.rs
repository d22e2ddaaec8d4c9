// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! The end-to-end test cases that `glusto run` executes.

use std::time::Duration;

use {async_trait::async_trait, log::info};

use crate::{
    cluster::{
        brick::{are_bricks_offline, find_hashed_subvol, get_all_bricks, get_subvols},
        glusterd::{
            is_glusterd_running, restart_glusterd, start_glusterd, stop_glusterd,
            wait_for_glusterd_to_start, GlusterdState,
        },
        peer::wait_for_peers_to_connect,
        quota::{enable_quota_deem_statfs, quota_disable, quota_enable, quota_limit_usage, quota_remove},
        rebalance::{rebalance_start, rebalance_status, wait_for_rebalance_to_complete},
        snapshot::{get_snap_info_by_snapname, snapshot_create},
        volume::{expand_volume, shrink_volume},
    },
    config::VolumeTypeConfig,
    error::{check, check_eq, Error, Result},
    fixture::{Cell, SetupLevel, TestCase},
    io::{collect_mounts_arequal, file_md5, get_statvfs, validate_io_procs, Recipe},
    remote::quote,
    wait::{try_wait_until, DEFAULT_INTERVAL},
};

/// Every registered test case, in the order `glusto run` runs them.
pub fn all() -> Vec<Box<dyn TestCase>> {
    vec![
        Box::new(ExpandWithoutDataLoss),
        Box::new(ShrinkWithOpenFd),
        Box::new(ServerQuorumNotMet),
        Box::new(SnapInfoSurvivesRestart),
        Box::new(ReadOnlyHonoured),
        Box::new(QuotaDeemStatfs),
    ]
}

fn two_by_three() -> VolumeTypeConfig {
    VolumeTypeConfig {
        dist_count: Some(2),
        replica_count: Some(3),
        ..Default::default()
    }
}

/// Expanding a 2x3 volume to 3x3 and rebalancing keeps every file intact.
pub struct ExpandWithoutDataLoss;

#[async_trait]
impl TestCase for ExpandWithoutDataLoss {
    fn name(&self) -> &str {
        "expand-rebalance"
    }

    fn volume_types(&self) -> Vec<&'static str> {
        vec!["distributed-replicated"]
    }

    fn overrides(&self) -> VolumeTypeConfig {
        two_by_three()
    }

    async fn run(&self, cell: &mut Cell) -> Result<()> {
        let mount = cell.mount()?.clone();
        let recipe = Recipe::CreateFiles {
            count: 500,
            size: "10M".to_string(),
            base_name: "file".to_string(),
            dir: String::new(),
        };
        let io = cell.run_io(&mount, &recipe).await?;
        check(validate_io_procs(&[io]).await, "creating files failed")?;

        let mounts = [mount];
        let before = collect_mounts_arequal(cell.cluster(), &mounts).await?;
        check(before.is_some(), "arequal before expansion failed")?;

        let (executor, mnode, volname) = (cell.executor(), cell.mnode(), cell.volname());
        check(
            expand_volume(cell.cluster(), mnode, volname, 1, false, None).await?,
            "expanding the volume failed",
        )?;
        let started = rebalance_start(executor, mnode, volname, false, false).await?;
        check(started.success(), format!("rebalance start failed: {}", started.stderr.trim()))?;
        check(
            wait_for_rebalance_to_complete(executor, mnode, volname, cell.cluster().rebalance_timeout())
                .await?,
            "rebalance did not complete",
        )?;
        let status = rebalance_status(executor, mnode, volname)
            .await?
            .ok_or_else(|| Error::Assertion("no rebalance status".to_string()))?;
        check_eq(status.aggregate.failures, 0, "rebalance failures")?;

        let after = collect_mounts_arequal(cell.cluster(), &mounts).await?;
        check_eq(before, after, "arequal across expand and rebalance")
    }
}

/// Removing the subvolume that holds a file which is open for appending loses none of the
/// appended data.
pub struct ShrinkWithOpenFd;

const APPEND_FILE: &str = "appendfile";

#[async_trait]
impl TestCase for ShrinkWithOpenFd {
    fn name(&self) -> &str {
        "shrink-open-fd"
    }

    fn volume_types(&self) -> Vec<&'static str> {
        vec!["distributed-replicated"]
    }

    fn overrides(&self) -> VolumeTypeConfig {
        two_by_three()
    }

    async fn run(&self, cell: &mut Cell) -> Result<()> {
        let mount = cell.mount()?.clone();
        let path = format!("{}/{APPEND_FILE}", mount.mountpoint);
        let writer = format!(
            "exec 3>>{0}; while IFS= read -r line; do printf '%s\\n' \"$line\" >&3; sleep 10; done < /etc/passwd; exec 3>&-",
            quote(&path)
        );
        let process = cell.executor().run_async(&mount.client, &writer)?;
        let process = cell.track(process);

        let (executor, mnode, volname) = (cell.executor(), cell.mnode(), cell.volname());
        let exists = format!("test -f {}", quote(&path));
        let exists = exists.as_str();
        let client = mount.client.as_str();
        let created = try_wait_until(
            Duration::from_secs(30),
            Duration::from_secs(1),
            move || async move { Ok::<bool, Error>(executor.run(client, exists).await?.success()) },
        )
        .await?;
        check(created, "the append file was not created")?;

        let subvols = get_subvols(executor, mnode, volname)
            .await?
            .ok_or_else(|| Error::Assertion(format!("no subvolumes for {volname}")))?;
        let hashed = find_hashed_subvol(executor, &subvols, APPEND_FILE)
            .await?
            .ok_or_else(|| Error::Assertion(format!("{APPEND_FILE} is on no subvolume")))?;
        info!("{APPEND_FILE} hashes to subvolume {hashed}");
        check(
            shrink_volume(executor, mnode, volname, Some(hashed), cell.cluster().rebalance_timeout())
                .await?,
            "removing the hashed subvolume failed",
        )?;

        check(validate_io_procs(&[process]).await, "the appending writer failed")?;
        let written = file_md5(executor, client, &path).await?;
        let source = file_md5(executor, client, "/etc/passwd").await?;
        check(written.is_some(), "could not checksum the append file")?;
        check_eq(written, source, "md5 of the append file and /etc/passwd")
    }
}

/// Bricks stay down while glusterd runs on at most half of the servers with server quorum enforced.
pub struct ServerQuorumNotMet;

impl ServerQuorumNotMet {
    /// The servers whose glusterd is stopped: enough of them that at most half of the pool stays
    /// active, which loses server quorum at the default ratio of more than half. The management
    /// node, first in the list, keeps running so that the volume can still be queried.
    fn servers_to_stop(servers: &[String]) -> &[String] {
        let count = servers.len().div_ceil(2).min(servers.len().saturating_sub(1));
        &servers[servers.len() - count..]
    }

    async fn bricks_down(cell: &Cell, stopped: &[String]) -> Result<()> {
        let (executor, mnode, volname) = (cell.executor(), cell.mnode(), cell.volname());
        let cluster = cell.cluster();

        check(stop_glusterd(executor, stopped).await?, "stopping glusterd failed")?;
        for server in stopped {
            check_eq(
                is_glusterd_running(executor, server).await?,
                GlusterdState::Inactive,
                &format!("glusterd state on {server}"),
            )?;
        }

        let first = get_all_bricks(executor, mnode, volname)
            .await?
            .and_then(|bricks| bricks.into_iter().next())
            .ok_or_else(|| Error::Assertion(format!("no bricks for {volname}")))?;
        let first = std::slice::from_ref(&first);
        let offline = try_wait_until(Duration::from_secs(60), DEFAULT_INTERVAL, || {
            are_bricks_offline(executor, mnode, volname, first)
        })
        .await?;
        check(offline, format!("brick {} is still online without quorum", first[0]))?;

        check(
            restart_glusterd(executor, &[mnode.to_string()]).await?,
            "restarting glusterd failed",
        )?;
        check(
            wait_for_glusterd_to_start(executor, &[mnode.to_string()], cluster.online_timeout())
                .await?,
            "glusterd did not come back",
        )?;
        check(
            are_bricks_offline(executor, mnode, volname, first).await?,
            format!("brick {} came back without quorum", first[0]),
        )
    }
}

#[async_trait]
impl TestCase for ServerQuorumNotMet {
    fn name(&self) -> &str {
        "server-quorum"
    }

    fn volume_types(&self) -> Vec<&'static str> {
        vec!["distributed-replicated"]
    }

    fn setup_level(&self) -> SetupLevel {
        SetupLevel::Volume
    }

    async fn run(&self, cell: &mut Cell) -> Result<()> {
        let servers = cell.cluster().servers().to_vec();
        if servers.len() < 2 {
            return Err(Error::skip("server quorum needs at least 2 servers"));
        }
        let volname = cell.volname().to_string();
        check(
            cell.set_option(&volname, "cluster.server-quorum-type", "server").await?,
            "enabling server quorum failed",
        )?;

        let stopped = Self::servers_to_stop(&servers).to_vec();
        let outcome = Self::bricks_down(cell, &stopped).await;

        let executor = cell.executor();
        start_glusterd(executor, &stopped).await?;
        wait_for_glusterd_to_start(executor, &stopped, cell.cluster().online_timeout()).await?;
        let reconnected =
            wait_for_peers_to_connect(executor, cell.mnode(), &servers, cell.cluster().online_timeout())
                .await?;
        outcome?;
        check(reconnected, "peers did not reconnect after glusterd restart")
    }
}

/// Snapshot metadata, including a description full of shell metacharacters, is the same after
/// glusterd restarts on every server.
pub struct SnapInfoSurvivesRestart;

const SNAP_DESCRIPTION: &str = "$p3C!@l C#@R@cT#R$";

#[async_trait]
impl TestCase for SnapInfoSurvivesRestart {
    fn name(&self) -> &str {
        "snap-info-restart"
    }

    fn volume_types(&self) -> Vec<&'static str> {
        vec!["distributed-replicated", "dispersed"]
    }

    fn setup_level(&self) -> SetupLevel {
        SetupLevel::Volume
    }

    async fn run(&self, cell: &mut Cell) -> Result<()> {
        let (executor, mnode, volname) = (cell.executor(), cell.mnode(), cell.volname());
        let cluster = cell.cluster();
        let snaps: Vec<String> = (1..=2).map(|i| format!("{volname}_snap{i}")).collect();

        let mut before = Vec::new();
        for snap in &snaps {
            check(
                snapshot_create(executor, mnode, volname, snap, Some(SNAP_DESCRIPTION), false).await?,
                format!("creating snapshot {snap} failed"),
            )?;
            let info = get_snap_info_by_snapname(executor, mnode, snap).await?;
            check(info.is_some(), format!("no info for snapshot {snap}"))?;
            before.push(info);
        }

        check(restart_glusterd(executor, cluster.servers()).await?, "restarting glusterd failed")?;
        check(
            wait_for_glusterd_to_start(executor, cluster.servers(), cluster.online_timeout()).await?,
            "glusterd did not come back",
        )?;
        check(
            wait_for_peers_to_connect(executor, mnode, cluster.servers(), cluster.online_timeout())
                .await?,
            "peers did not reconnect",
        )?;

        for (snap, before) in snaps.iter().zip(before) {
            let after = get_snap_info_by_snapname(executor, mnode, snap).await?;
            check_eq(before, after, &format!("info of snapshot {snap}"))?;
        }
        Ok(())
    }
}

/// Writes fail on a volume with `read-only` on, and succeed again once it is off.
pub struct ReadOnlyHonoured;

#[async_trait]
impl TestCase for ReadOnlyHonoured {
    fn name(&self) -> &str {
        "read-only"
    }

    fn volume_types(&self) -> Vec<&'static str> {
        vec!["distributed-replicated", "dispersed"]
    }

    async fn run(&self, cell: &mut Cell) -> Result<()> {
        let volname = cell.volname().to_string();
        let mount = cell.mount()?.clone();

        check(cell.set_option(&volname, "read-only", "on").await?, "setting read-only failed")?;
        let io = cell
            .run_io(&mount, &Recipe::create_deep_dirs_with_files(1, 2, 2, 2, 5))
            .await?;
        check(!validate_io_procs(&[io]).await, "writes succeeded on a read-only volume")?;

        check(cell.set_option(&volname, "read-only", "off").await?, "clearing read-only failed")?;
        let io = cell
            .run_io(&mount, &Recipe::create_deep_dirs_with_files(10, 2, 2, 2, 5))
            .await?;
        check(validate_io_procs(&[io]).await, "writes failed after clearing read-only")
    }
}

/// With quota-deem-statfs, `statvfs` reports the quota limit on the root as the capacity, and the
/// real capacity once the limit is removed.
pub struct QuotaDeemStatfs;

const GIB: u64 = 1024 * 1024 * 1024;

#[async_trait]
impl TestCase for QuotaDeemStatfs {
    fn name(&self) -> &str {
        "quota-deem-statfs"
    }

    fn volume_types(&self) -> Vec<&'static str> {
        vec!["dispersed"]
    }

    async fn run(&self, cell: &mut Cell) -> Result<()> {
        let (executor, mnode, volname) = (cell.executor(), cell.mnode(), cell.volname());
        let mount = cell.mount()?;
        let capacity = move || async move {
            get_statvfs(executor, mount)
                .await
                .map(|s| s.map(|s| s.capacity()))
        };
        let capacity = &capacity;

        let real = capacity()
            .await?
            .ok_or_else(|| Error::Assertion("statvfs of the mount failed".to_string()))?;

        check(quota_enable(executor, mnode, volname).await?, "enabling quota failed")?;
        check(
            quota_limit_usage(executor, mnode, volname, "/", "1GB", None).await?,
            "setting the quota limit failed",
        )?;
        check(
            enable_quota_deem_statfs(executor, mnode, volname).await?,
            "enabling quota-deem-statfs failed",
        )?;
        let limited = try_wait_until(Duration::from_secs(30), DEFAULT_INTERVAL, move || async move {
            Ok::<bool, Error>(capacity().await? == Some(GIB))
        })
        .await?;
        check(limited, format!("capacity is not the 1 GiB limit: {:?}", capacity().await?))?;

        check(quota_remove(executor, mnode, volname, "/").await?, "removing the quota limit failed")?;
        let restored = try_wait_until(Duration::from_secs(30), DEFAULT_INTERVAL, move || async move {
            Ok::<bool, Error>(capacity().await? == Some(real))
        })
        .await?;
        check(restored, format!("capacity did not return to {real}"))?;
        check(quota_disable(executor, mnode, volname).await?, "disabling quota failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::expand_matrix;

    #[test]
    fn registered_cases_expand() {
        let cases = all();
        let mut ids = Vec::new();
        for case in &cases {
            ids.extend(expand_matrix(case.as_ref()).unwrap().iter().map(|c| c.id()));
        }
        assert_eq!(ids.len(), 8);
        assert!(ids.contains(&"quota-deem-statfs-dispersed-glusterfs".to_string()));
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn quorum_is_lost_but_mnode_survives() {
        let servers: Vec<String> = (1..=5).map(|i| format!("server{i}")).collect();
        for n in 2..=5 {
            let stopped = ServerQuorumNotMet::servers_to_stop(&servers[..n]);
            assert!(!stopped.contains(&servers[0]), "{n} servers");
            // Server quorum needs strictly more than half of the pool active.
            assert!(2 * (n - stopped.len()) <= n, "{n} servers");
        }
        assert_eq!(
            ServerQuorumNotMet::servers_to_stop(&servers[..3]),
            &servers[1..3]
        );
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::{collections::BTreeMap, fmt, time::Duration};

use {
    log::{debug, error, info, warn},
    serde::Serialize,
};

use super::{
    brick::{
        allocate_layout, remove_brick_dirs, subvols_of, wait_for_bricks_to_be_online, Brick,
    },
    rebalance::{
        rebalance_start, remove_brick, wait_for_rebalance_to_complete,
        wait_for_remove_brick_to_complete,
    },
    Cluster, VolumeLayout,
};
use crate::{
    error::Result,
    parse::volume::{get_one_volume_info, get_volume_status, VolumeInfo},
    remote::{quote, quote::join, CmdResult, Executor},
    wait::{try_wait_until, DEFAULT_INTERVAL},
};

pub use crate::parse::volume::{get_volume_list, get_volume_options};

/// The states a volume moves through.
///
/// ```text
///   (create) -> Created -> (start) -> Started -> (stop) -> Stopped -> (delete) -> Gone
///                  |                     ^                   |
///                  +-----> (delete)      +----- (start) -----+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VolumeState {
    Created,
    Started,
    Stopped,
    Gone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeOp {
    Start,
    Stop,
    Delete,
}

impl VolumeState {
    /// The state the CLI reports as `statusStr` in `volume info`.
    pub fn from_status(status: &str) -> Option<Self> {
        match status {
            "Created" => Some(VolumeState::Created),
            "Started" => Some(VolumeState::Started),
            "Stopped" => Some(VolumeState::Stopped),
            _ => None,
        }
    }

    /// The state after `op`, or `None` when the CLI refuses `op` in this state.
    pub fn after(self, op: VolumeOp) -> Option<Self> {
        use {VolumeOp::*, VolumeState::*};
        match (self, op) {
            (Created | Stopped, Start) => Some(Started),
            (Started, Stop) => Some(Stopped),
            (Created | Stopped, Delete) => Some(Gone),
            _ => None,
        }
    }
}

impl fmt::Display for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The state of `volname` as `mnode` sees it; `Gone` when the volume does not exist.
pub async fn volume_state(executor: &Executor, mnode: &str, volname: &str) -> Result<VolumeState> {
    Ok(get_one_volume_info(executor, mnode, volname)
        .await?
        .and_then(|info| VolumeState::from_status(&info.status))
        .unwrap_or(VolumeState::Gone))
}

pub async fn volume_exists(executor: &Executor, mnode: &str, volname: &str) -> Result<bool> {
    Ok(get_volume_list(executor, mnode)
        .await?
        .is_some_and(|volumes| volumes.iter().any(|v| v == volname)))
}

/// `gluster volume create`. The volume is in `Created` when this succeeds.
pub async fn create_volume(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    layout: &VolumeLayout,
    force: bool,
) -> Result<CmdResult> {
    let mut command = format!(
        "gluster volume create {} {} {}",
        quote(volname),
        join(layout.create_args()),
        join(bricks)
    );
    if force {
        command.push_str(" force");
    }
    executor.run(mnode, &command).await
}

pub async fn volume_start(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    force: bool,
) -> Result<CmdResult> {
    let force = if force { " force" } else { "" };
    let command = format!("gluster volume start {}{force}", quote(volname));
    executor.run(mnode, &command).await
}

pub async fn volume_stop(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    force: bool,
) -> Result<CmdResult> {
    let force = if force { " force" } else { "" };
    let command = format!("gluster --mode=script volume stop {}{force}", quote(volname));
    executor.run(mnode, &command).await
}

pub async fn volume_delete(executor: &Executor, mnode: &str, volname: &str) -> Result<CmdResult> {
    let command = format!("gluster --mode=script volume delete {}", quote(volname));
    executor.run(mnode, &command).await
}

/// Start `volname` and wait until every brick process is online.
pub async fn start_volume(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    force: bool,
    timeout: Duration,
) -> Result<bool> {
    let result = volume_start(executor, mnode, volname, force).await?;
    if !result.success() {
        error!("could not start volume {volname}: {}", result.stderr.trim());
        return Ok(false);
    }
    wait_for_volume_process_to_be_online(executor, mnode, volname, timeout).await
}

pub async fn set_volume_option(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    key: &str,
    value: &str,
) -> Result<bool> {
    let command = format!(
        "gluster --mode=script volume set {} {} {}",
        quote(volname),
        quote(key),
        quote(value)
    );
    let result = executor.run(mnode, &command).await?;
    if !result.success() {
        warn!("could not set {key}={value} on {volname}: {}", result.stderr.trim());
    }
    Ok(result.success())
}

/// Set every option in `options`, stopping at the first that is rejected.
pub async fn set_volume_options(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    options: &BTreeMap<String, String>,
) -> Result<bool> {
    for (key, value) in options {
        if !set_volume_option(executor, mnode, volname, key, value).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Reset `option` (or every option, when `None`) on `volname` to its default.
pub async fn reset_volume_option(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    option: Option<&str>,
    force: bool,
) -> Result<bool> {
    let mut command = format!("gluster --mode=script volume reset {}", quote(volname));
    if let Some(option) = option {
        command.push(' ');
        command.push_str(&quote(option));
    }
    if force {
        command.push_str(" force");
    }
    Ok(executor.run(mnode, &command).await?.success())
}

/// Whether every brick listed in `volume info` shows as online with a pid in `volume status`.
async fn all_bricks_online(executor: &Executor, mnode: &str, volname: &str) -> Result<bool> {
    let Some(info) = get_one_volume_info(executor, mnode, volname).await? else {
        return Ok(false);
    };
    let Some(mut status) = get_volume_status(executor, mnode, Some(volname)).await? else {
        return Ok(false);
    };
    let Some(status) = status.remove(volname) else {
        return Ok(false);
    };
    let offline: Vec<&str> = info
        .bricks
        .iter()
        .filter(|b| !status.brick(&b.name).is_some_and(|p| p.is_online()))
        .map(|b| b.name.as_str())
        .collect();
    if !offline.is_empty() {
        debug!("bricks of {volname} not online yet: {}", offline.join(", "));
    }
    Ok(offline.is_empty())
}

/// Poll `volume status` every two seconds until every brick of `volname` is online, for at most
/// `timeout`.
pub async fn wait_for_volume_process_to_be_online(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    timeout: Duration,
) -> Result<bool> {
    let online = try_wait_until(timeout, DEFAULT_INTERVAL, || {
        all_bricks_online(executor, mnode, volname)
    })
    .await?;
    if online {
        info!("all brick processes of {volname} are online");
    } else {
        error!(
            "brick processes of {volname} are not online after {}s",
            timeout.as_secs()
        );
    }
    Ok(online)
}

/// Whether the bricks of `volname`, and for replicated and dispersed volumes the self-heal daemon
/// on every server that holds a brick, are online.
pub async fn verify_all_process_of_volume_are_online(
    executor: &Executor,
    mnode: &str,
    volname: &str,
) -> Result<bool> {
    if !all_bricks_online(executor, mnode, volname).await? {
        return Ok(false);
    }
    let Some(info) = get_one_volume_info(executor, mnode, volname).await? else {
        return Ok(false);
    };
    if info.subvol_size() == 1 {
        return Ok(true);
    }
    let Some(mut status) = get_volume_status(executor, mnode, Some(volname)).await? else {
        return Ok(false);
    };
    let Some(status) = status.remove(volname) else {
        return Ok(false);
    };
    let Some(shd) = status.nodes.get("Self-heal Daemon") else {
        warn!("no self-heal daemon is listed for {volname}");
        return Ok(false);
    };
    let mut hosts: Vec<&str> = info
        .bricks
        .iter()
        .filter_map(|b| b.name.split_once(':').map(|(h, _)| h))
        .collect();
    hosts.sort();
    hosts.dedup();
    // Daemons are listed by the host they run on, which `localhost` means for the queried node.
    Ok(hosts.iter().all(|h| {
        shd.get(*h)
            .or_else(|| if *h == mnode { shd.get("localhost") } else { None })
            .is_some_and(|p| p.is_online())
    }))
}

/// Create and start `volname` with `layout`, then apply the configured default options.
///
/// An existing volume of that name is reused, and started when it is not running. Structural
/// problems in the configuration are returned as errors; a CLI step that fails makes the result
/// `false`.
pub async fn setup_volume(
    cluster: &Cluster,
    mnode: &str,
    volname: &str,
    layout: &VolumeLayout,
    force: bool,
) -> Result<bool> {
    let executor = cluster.executor();
    if volume_exists(executor, mnode, volname).await? {
        let state = volume_state(executor, mnode, volname).await?;
        info!("volume {volname} already exists and is {state}");
        return match state {
            VolumeState::Started => Ok(true),
            state if state.after(VolumeOp::Start).is_some() => {
                start_volume(executor, mnode, volname, false, cluster.online_timeout()).await
            }
            _ => {
                error!("volume {volname} is listed but its state cannot be read");
                Ok(false)
            }
        };
    }

    let bricks: Vec<String> = allocate_layout(cluster, volname, layout)?
        .iter()
        .map(Brick::to_string)
        .collect();
    let result = create_volume(executor, mnode, volname, &bricks, layout, force).await?;
    if !result.success() {
        error!("could not create volume {volname}: {}", result.stderr.trim());
        return Ok(false);
    }
    if !start_volume(executor, mnode, volname, false, cluster.online_timeout()).await? {
        return Ok(false);
    }
    set_volume_options(executor, mnode, volname, &cluster.config().gluster.volume_options).await
}

/// Stop and delete `volname` and remove its brick directories. A volume that does not exist is
/// already clean.
pub async fn cleanup_volume(executor: &Executor, mnode: &str, volname: &str) -> Result<bool> {
    let Some(info) = get_one_volume_info(executor, mnode, volname).await? else {
        return Ok(!volume_exists(executor, mnode, volname).await?);
    };

    let Some(state) = VolumeState::from_status(&info.status) else {
        error!("volume {volname} is in unknown state '{}'", info.status);
        return Ok(false);
    };
    if state.after(VolumeOp::Stop).is_some() {
        let result = volume_stop(executor, mnode, volname, true).await?;
        if !result.success() {
            error!("could not stop volume {volname}: {}", result.stderr.trim());
            return Ok(false);
        }
    }
    let result = volume_delete(executor, mnode, volname).await?;
    if !result.success() {
        error!("could not delete volume {volname}: {}", result.stderr.trim());
        return Ok(false);
    }
    remove_brick_dirs(executor, &info.brick_names()).await
}

/// The brick list of `info` as [`Brick`] values.
fn bricks_of(info: &VolumeInfo) -> Result<Vec<Brick>> {
    info.bricks.iter().map(|b| Brick::parse(&b.name)).collect()
}

/// Add `subvols` subvolumes to `volname`. When `rebalance_timeout` is set, a rebalance is started
/// afterwards and waited for.
pub async fn expand_volume(
    cluster: &Cluster,
    mnode: &str,
    volname: &str,
    subvols: usize,
    force: bool,
    rebalance_timeout: Option<Duration>,
) -> Result<bool> {
    let executor = cluster.executor();
    let Some(info) = get_one_volume_info(executor, mnode, volname).await? else {
        return Ok(false);
    };
    let existing = bricks_of(&info)?;
    let new: Vec<String> = cluster
        .allocate_bricks(
            volname,
            subvols * info.subvol_size(),
            cluster.servers(),
            &existing,
        )?
        .iter()
        .map(Brick::to_string)
        .collect();

    let mut command = format!("gluster volume add-brick {} {}", quote(volname), join(&new));
    if force {
        command.push_str(" force");
    }
    let result = executor.run(mnode, &command).await?;
    if !result.success() {
        error!("could not add bricks to {volname}: {}", result.stderr.trim());
        return Ok(false);
    }
    if !wait_for_bricks_to_be_online(executor, mnode, volname, &new, cluster.online_timeout())
        .await?
    {
        return Ok(false);
    }

    match rebalance_timeout {
        Some(timeout) => {
            if !rebalance_start(executor, mnode, volname, false, false)
                .await?
                .success()
            {
                return Ok(false);
            }
            wait_for_rebalance_to_complete(executor, mnode, volname, timeout).await
        }
        None => Ok(true),
    }
}

/// Remove subvolume `subvol` (the last one when `None`) from `volname`, migrating its data away
/// first and waiting up to `timeout` for the migration.
pub async fn shrink_volume(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    subvol: Option<usize>,
    timeout: Duration,
) -> Result<bool> {
    let Some(info) = get_one_volume_info(executor, mnode, volname).await? else {
        return Ok(false);
    };
    let subvols = subvols_of(&info);
    if subvols.len() < 2 {
        error!("volume {volname} has a single subvolume and cannot shrink");
        return Ok(false);
    }
    let index = subvol.unwrap_or(subvols.len() - 1);
    let Some(bricks) = subvols.get(index) else {
        error!("volume {volname} has no subvolume {index}");
        return Ok(false);
    };

    let result = remove_brick(executor, mnode, volname, bricks, "start").await?;
    if !result.success() {
        error!("could not start removing bricks from {volname}: {}", result.stderr.trim());
        return Ok(false);
    }
    if !wait_for_remove_brick_to_complete(executor, mnode, volname, bricks, timeout).await? {
        return Ok(false);
    }
    let result = remove_brick(executor, mnode, volname, bricks, "commit").await?;
    if !result.success() {
        error!("could not commit brick removal on {volname}: {}", result.stderr.trim());
        return Ok(false);
    }
    remove_brick_dirs(executor, bricks).await
}

/// Replace `source` with `target` (a newly allocated brick on the same server when `None`) and wait
/// for the volume's bricks to come online.
pub async fn replace_brick(
    cluster: &Cluster,
    mnode: &str,
    volname: &str,
    source: &str,
    target: Option<&str>,
) -> Result<bool> {
    let executor = cluster.executor();
    let target = match target {
        Some(t) => t.to_string(),
        None => {
            let Some(info) = get_one_volume_info(executor, mnode, volname).await? else {
                return Ok(false);
            };
            let source_host = Brick::parse(source)?.host;
            let existing = bricks_of(&info)?;
            let mut brick = cluster.allocate_bricks(volname, 1, &[source_host], &existing)?;
            brick.remove(0).to_string()
        }
    };

    let command = format!(
        "gluster volume replace-brick {} {} {} commit force",
        quote(volname),
        quote(source),
        quote(&target)
    );
    let result = executor.run(mnode, &command).await?;
    if !result.success() {
        error!("could not replace {source} in {volname}: {}", result.stderr.trim());
        return Ok(false);
    }
    wait_for_volume_process_to_be_online(executor, mnode, volname, cluster.online_timeout()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine() {
        use {VolumeOp::*, VolumeState::*};
        assert_eq!(Created.after(Start), Some(Started));
        assert_eq!(Started.after(Stop), Some(Stopped));
        assert_eq!(Stopped.after(Start), Some(Started));
        assert_eq!(Stopped.after(Delete), Some(Gone));
        assert_eq!(Created.after(Delete), Some(Gone));
        assert_eq!(Started.after(Delete), None);
        assert_eq!(Gone.after(Start), None);
        assert_eq!(Created.after(Stop), None);
        assert_eq!(VolumeState::from_status("Started"), Some(Started));
        assert_eq!(VolumeState::from_status("bogus"), None);
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use log::{error, warn};

use crate::{
    error::Result,
    remote::{quote, Executor},
};

pub use crate::parse::snapshot::{
    get_snap_info, get_snap_info_by_snapname, get_snap_info_by_volname, get_snap_list,
    get_snap_list as snapshot_list,
};

/// Run a snapshot command and report whether it succeeded, logging the CLI's complaint if not.
async fn snap_command(executor: &Executor, mnode: &str, command: &str, what: &str) -> Result<bool> {
    let result = executor.run(mnode, command).await?;
    if !result.success() {
        error!("could not {what}: {}", result.stderr.trim());
    }
    Ok(result.success())
}

async fn snapshot_exists(executor: &Executor, mnode: &str, snapname: &str) -> Result<Option<bool>> {
    Ok(get_snap_list(executor, mnode, None)
        .await?
        .map(|snaps| snaps.iter().any(|s| s == snapname)))
}

/// Create snapshot `snapname` of `volname`, without the timestamp suffix the CLI adds by default.
/// Snapshot names are cluster-wide unique: `false` if one of that name exists already.
pub async fn snapshot_create(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    snapname: &str,
    description: Option<&str>,
    force: bool,
) -> Result<bool> {
    if snapshot_exists(executor, mnode, snapname).await? == Some(true) {
        warn!("snapshot {snapname} already exists");
        return Ok(false);
    }
    let mut command = format!(
        "gluster snapshot create {} {} no-timestamp",
        quote(snapname),
        quote(volname)
    );
    if let Some(description) = description {
        command.push_str(" description ");
        command.push_str(&quote(description));
    }
    if force {
        command.push_str(" force");
    }
    snap_command(executor, mnode, &command, &format!("create snapshot {snapname}")).await
}

pub async fn snapshot_activate(
    executor: &Executor,
    mnode: &str,
    snapname: &str,
    force: bool,
) -> Result<bool> {
    let force = if force { " force" } else { "" };
    let command = format!("gluster snapshot activate {}{force}", quote(snapname));
    snap_command(executor, mnode, &command, &format!("activate snapshot {snapname}")).await
}

pub async fn snapshot_deactivate(executor: &Executor, mnode: &str, snapname: &str) -> Result<bool> {
    let command = format!("gluster --mode=script snapshot deactivate {}", quote(snapname));
    snap_command(executor, mnode, &command, &format!("deactivate snapshot {snapname}")).await
}

/// Delete `snapname`. A snapshot that does not exist cannot be deleted: `false`.
pub async fn snapshot_delete(executor: &Executor, mnode: &str, snapname: &str) -> Result<bool> {
    if snapshot_exists(executor, mnode, snapname).await? != Some(true) {
        warn!("snapshot {snapname} does not exist");
        return Ok(false);
    }
    let command = format!("gluster --mode=script snapshot delete {}", quote(snapname));
    snap_command(executor, mnode, &command, &format!("delete snapshot {snapname}")).await
}

/// Delete every snapshot of `volname`, or every snapshot in the cluster when `None`. Having
/// nothing to delete counts as success.
pub async fn snapshot_delete_all(
    executor: &Executor,
    mnode: &str,
    volname: Option<&str>,
) -> Result<bool> {
    match get_snap_list(executor, mnode, volname).await? {
        Some(snaps) if snaps.is_empty() => return Ok(true),
        None if volname.is_some() => return Ok(true),
        _ => {}
    }
    let command = match volname {
        Some(v) => format!("gluster --mode=script snapshot delete volume {}", quote(v)),
        None => "gluster --mode=script snapshot delete all".to_string(),
    };
    snap_command(executor, mnode, &command, "delete snapshots").await
}

/// Restore the origin volume of `snapname` to it. The volume has to be stopped.
pub async fn snapshot_restore(executor: &Executor, mnode: &str, snapname: &str) -> Result<bool> {
    let command = format!("gluster --mode=script snapshot restore {}", quote(snapname));
    snap_command(executor, mnode, &command, &format!("restore snapshot {snapname}")).await
}

/// `gluster snapshot config <key> <value>`, e.g. `activate-on-create enable`.
pub async fn set_snap_config(
    executor: &Executor,
    mnode: &str,
    key: &str,
    value: &str,
) -> Result<bool> {
    let command = format!(
        "gluster --mode=script snapshot config {} {}",
        quote(key),
        quote(value)
    );
    snap_command(executor, mnode, &command, &format!("set snapshot config {key}")).await
}

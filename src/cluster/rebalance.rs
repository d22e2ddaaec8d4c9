// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use log::{info, warn};

use crate::{
    error::{Error, Result},
    parse::rebalance::{get_rebalance_status, get_remove_brick_status, MigrationStatus},
    remote::{quote, quote::join, CmdResult, Executor},
    wait::{try_wait_until, DEFAULT_INTERVAL},
};

pub async fn rebalance_start(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    fix_layout: bool,
    force: bool,
) -> Result<CmdResult> {
    let mut command = format!("gluster volume rebalance {}", quote(volname));
    command.push_str(if fix_layout { " fix-layout start" } else { " start" });
    if force {
        command.push_str(" force");
    }
    executor.run(mnode, &command).await
}

pub async fn rebalance_stop(executor: &Executor, mnode: &str, volname: &str) -> Result<CmdResult> {
    let command = format!("gluster volume rebalance {} stop", quote(volname));
    executor.run(mnode, &command).await
}

pub async fn rebalance_status(
    executor: &Executor,
    mnode: &str,
    volname: &str,
) -> Result<Option<MigrationStatus>> {
    get_rebalance_status(executor, mnode, volname).await
}

/// Poll a migration job until `done` holds for its aggregate status, it fails, or `timeout`
/// passes. Returns whether the job finished.
async fn wait_for_migration<F, Fut>(
    what: &str,
    volname: &str,
    timeout: Duration,
    done: fn(&str) -> bool,
    status: F,
) -> Result<bool>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Option<MigrationStatus>>>,
{
    let failed = AtomicBool::new(false);
    let failed = &failed;
    let status = &status;
    let finished = try_wait_until(timeout, DEFAULT_INTERVAL, move || async move {
        match status().await? {
            Some(s) if done(&s.aggregate.status_str) => Ok(true),
            Some(s) if s.is_failed() => {
                failed.store(true, Ordering::Relaxed);
                Ok(true)
            }
            _ => Ok::<bool, Error>(false),
        }
    })
    .await?;

    if failed.load(Ordering::Relaxed) {
        warn!("{what} of {volname} failed");
        return Ok(false);
    }
    if finished {
        info!("{what} of {volname} completed");
    } else {
        warn!("{what} of {volname} did not complete within {}s", timeout.as_secs());
    }
    Ok(finished)
}

/// Wait for `rebalance status` to report `completed`. `false` on failure or timeout.
pub async fn wait_for_rebalance_to_complete(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    timeout: Duration,
) -> Result<bool> {
    wait_for_migration(
        "rebalance",
        volname,
        timeout,
        |s| s == "completed",
        || get_rebalance_status(executor, mnode, volname),
    )
    .await
}

pub async fn wait_for_fix_layout_to_complete(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    timeout: Duration,
) -> Result<bool> {
    wait_for_migration(
        "fix-layout",
        volname,
        timeout,
        |s| s == "fix-layout completed" || s == "completed",
        || get_rebalance_status(executor, mnode, volname),
    )
    .await
}

/// `gluster volume remove-brick <vol> <bricks> <action>`, where `action` is `start`, `stop`,
/// `commit` or `force`.
pub async fn remove_brick(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    action: &str,
) -> Result<CmdResult> {
    let command = format!(
        "gluster --mode=script volume remove-brick {} {} {action}",
        quote(volname),
        join(bricks)
    );
    executor.run(mnode, &command).await
}

pub async fn remove_brick_status(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
) -> Result<Option<MigrationStatus>> {
    get_remove_brick_status(executor, mnode, volname, bricks).await
}

pub async fn wait_for_remove_brick_to_complete(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    timeout: Duration,
) -> Result<bool> {
    wait_for_migration(
        "remove-brick",
        volname,
        timeout,
        |s| s == "completed",
        || get_remove_brick_status(executor, mnode, volname, bricks),
    )
    .await
}

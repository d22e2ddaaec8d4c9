// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::time::Duration;

use log::{info, warn};

use crate::{
    error::Result,
    parse::heal::{get_heal_info_split_brain, heal_complete},
    remote::{quote, Executor},
    wait::{try_wait_until, DEFAULT_INTERVAL},
};

pub use crate::parse::heal::get_heal_info;

pub async fn trigger_heal(executor: &Executor, mnode: &str, volname: &str) -> Result<bool> {
    let command = format!("gluster volume heal {}", quote(volname));
    Ok(executor.run(mnode, &command).await?.success())
}

pub async fn trigger_heal_full(executor: &Executor, mnode: &str, volname: &str) -> Result<bool> {
    let command = format!("gluster volume heal {} full", quote(volname));
    Ok(executor.run(mnode, &command).await?.success())
}

/// Whether every brick of `volname` answered `heal info` with no pending entries.
pub async fn is_heal_complete(executor: &Executor, mnode: &str, volname: &str) -> Result<bool> {
    Ok(get_heal_info(executor, mnode, volname)
        .await?
        .is_some_and(|bricks| heal_complete(&bricks)))
}

/// Wait up to `timeout` for pending heals on `volname` to drain.
pub async fn monitor_heal_completion(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    timeout: Duration,
) -> Result<bool> {
    let healed = try_wait_until(timeout, DEFAULT_INTERVAL, || {
        is_heal_complete(executor, mnode, volname)
    })
    .await?;
    if healed {
        info!("heal of {volname} completed");
    } else {
        warn!("heal of {volname} not complete after {}s", timeout.as_secs());
    }
    Ok(healed)
}

/// Whether any brick of `volname` reports files in split-brain.
pub async fn is_volume_in_split_brain(
    executor: &Executor,
    mnode: &str,
    volname: &str,
) -> Result<bool> {
    Ok(get_heal_info_split_brain(executor, mnode, volname)
        .await?
        .is_some_and(|bricks| bricks.iter().any(|b| b.number_of_entries.unwrap_or(0) > 0)))
}

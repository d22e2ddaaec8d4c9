// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use log::error;

use super::volume::set_volume_option;
use crate::{
    error::Result,
    parse::volume::get_volume_options,
    remote::{quote, Executor},
};

pub use crate::parse::quota::get_quota_list as quota_fetch_list;

async fn quota_command(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    args: &str,
) -> Result<bool> {
    let command = format!("gluster --mode=script volume quota {} {args}", quote(volname));
    let result = executor.run(mnode, &command).await?;
    if !result.success() {
        error!("quota {args} on {volname} failed: {}", result.stderr.trim());
    }
    Ok(result.success())
}

/// Whether `features.quota` is on for `volname`.
pub async fn is_quota_enabled(executor: &Executor, mnode: &str, volname: &str) -> Result<bool> {
    Ok(get_volume_options(executor, mnode, volname, Some("features.quota"))
        .await?
        .and_then(|opts| opts.get("features.quota").cloned())
        .is_some_and(|v| v == "on"))
}

/// Enable quota on `volname`. Enabling it again is not an error.
pub async fn quota_enable(executor: &Executor, mnode: &str, volname: &str) -> Result<bool> {
    if is_quota_enabled(executor, mnode, volname).await? {
        return Ok(true);
    }
    quota_command(executor, mnode, volname, "enable").await
}

/// Disable quota on `volname`. Disabling it again is not an error.
pub async fn quota_disable(executor: &Executor, mnode: &str, volname: &str) -> Result<bool> {
    if !is_quota_enabled(executor, mnode, volname).await? {
        return Ok(true);
    }
    quota_command(executor, mnode, volname, "disable").await
}

/// Limit usage of `path` (relative to the volume root) to `limit`, e.g. `1GB`, with an optional
/// soft limit such as `80%`.
pub async fn quota_limit_usage(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    path: &str,
    limit: &str,
    soft_limit: Option<&str>,
) -> Result<bool> {
    let mut args = format!("limit-usage {} {}", quote(path), quote(limit));
    if let Some(soft) = soft_limit {
        args.push(' ');
        args.push_str(&quote(soft));
    }
    quota_command(executor, mnode, volname, &args).await
}

pub async fn quota_remove(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    path: &str,
) -> Result<bool> {
    quota_command(executor, mnode, volname, &format!("remove {}", quote(path))).await
}

pub async fn quota_set_soft_timeout(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    seconds: u64,
) -> Result<bool> {
    quota_command(executor, mnode, volname, &format!("soft-timeout {seconds}")).await
}

pub async fn quota_set_hard_timeout(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    seconds: u64,
) -> Result<bool> {
    quota_command(executor, mnode, volname, &format!("hard-timeout {seconds}")).await
}

/// Make `statvfs` on mounts of `volname` report the quota limit of the root as the capacity.
pub async fn enable_quota_deem_statfs(
    executor: &Executor,
    mnode: &str,
    volname: &str,
) -> Result<bool> {
    set_volume_option(executor, mnode, volname, "features.quota-deem-statfs", "on").await
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::time::Duration;

use {futures::future, serde::Serialize};

use crate::{
    error::{Error, Result},
    remote::Executor,
    wait::{try_wait_until, DEFAULT_INTERVAL},
};

/// Whether the management daemon runs on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GlusterdState {
    Active,
    Inactive,
    /// The service is not active but a glusterd process is still around.
    StaleProcess,
}

pub async fn is_glusterd_running(executor: &Executor, host: &str) -> Result<GlusterdState> {
    if executor
        .run(host, "systemctl is-active glusterd")
        .await?
        .success()
    {
        return Ok(GlusterdState::Active);
    }
    if executor.run(host, "pgrep -x glusterd").await?.success() {
        return Ok(GlusterdState::StaleProcess);
    }
    Ok(GlusterdState::Inactive)
}

/// Run `command` on every host at once; true when it succeeded everywhere.
async fn on_all(executor: &Executor, hosts: &[String], command: &str) -> Result<bool> {
    Ok(executor
        .run_parallel(hosts, command)
        .await?
        .values()
        .all(|r| r.success()))
}

pub async fn start_glusterd(executor: &Executor, hosts: &[String]) -> Result<bool> {
    on_all(executor, hosts, "systemctl start glusterd").await
}

pub async fn stop_glusterd(executor: &Executor, hosts: &[String]) -> Result<bool> {
    on_all(executor, hosts, "systemctl stop glusterd").await
}

/// Restart glusterd, clearing systemd's start rate limit first so that repeated restarts in one
/// test are not refused.
pub async fn restart_glusterd(executor: &Executor, hosts: &[String]) -> Result<bool> {
    on_all(
        executor,
        hosts,
        "systemctl reset-failed glusterd; systemctl restart glusterd",
    )
    .await
}

pub async fn wait_for_glusterd_to_start(
    executor: &Executor,
    hosts: &[String],
    timeout: Duration,
) -> Result<bool> {
    try_wait_until(timeout, DEFAULT_INTERVAL, move || async move {
        let states = future::join_all(hosts.iter().map(|h| is_glusterd_running(executor, h))).await;
        let mut all_active = true;
        for state in states {
            all_active &= state? == GlusterdState::Active;
        }
        Ok::<bool, Error>(all_active)
    })
    .await
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::time::Duration;

use log::{error, info};

use crate::{
    error::{Error, Result},
    parse::peer::{get_peer_status, get_pool_list},
    remote::{quote, CmdResult, Executor},
    wait::{try_wait_until, DEFAULT_INTERVAL},
};

/// How long [`probe_peers`] keeps re-probing.
pub const PROBE_BUDGET: Duration = Duration::from_secs(50);

pub async fn peer_probe(executor: &Executor, mnode: &str, server: &str) -> Result<CmdResult> {
    let command = format!("gluster peer probe {}", quote(server));
    executor.run(mnode, &command).await
}

pub async fn peer_detach(
    executor: &Executor,
    mnode: &str,
    server: &str,
    force: bool,
) -> Result<CmdResult> {
    let force = if force { " force" } else { "" };
    let command = format!("gluster --mode=script peer detach {}{force}", quote(server));
    executor.run(mnode, &command).await
}

/// The servers among `servers` that `mnode` does not see as connected members of its pool.
async fn unconnected_peers(
    executor: &Executor,
    mnode: &str,
    servers: &[String],
) -> Result<Option<Vec<String>>> {
    let Some(peers) = get_peer_status(executor, mnode).await? else {
        return Ok(None);
    };
    Ok(Some(
        servers
            .iter()
            .filter(|s| s.as_str() != mnode)
            .filter(|s| {
                !peers
                    .iter()
                    .any(|p| p.is_named(s) && p.is_connected() && p.in_cluster())
            })
            .cloned()
            .collect(),
    ))
}

/// Whether every server in `servers` is in the cluster and connected, as seen from `mnode`.
pub async fn is_peer_connected(
    executor: &Executor,
    mnode: &str,
    servers: &[String],
) -> Result<bool> {
    Ok(unconnected_peers(executor, mnode, servers)
        .await?
        .is_some_and(|missing| missing.is_empty()))
}

/// Probe every server in `servers` from `mnode` and wait until all are connected. Servers that are
/// not yet connected are probed again on each tick, for up to [`PROBE_BUDGET`].
pub async fn probe_peers(executor: &Executor, mnode: &str, servers: &[String]) -> Result<bool> {
    let connected = try_wait_until(PROBE_BUDGET, DEFAULT_INTERVAL, move || async move {
        let missing = match unconnected_peers(executor, mnode, servers).await? {
            Some(missing) => missing,
            None => servers.iter().filter(|s| s.as_str() != mnode).cloned().collect(),
        };
        if missing.is_empty() {
            return Ok(true);
        }
        for server in &missing {
            peer_probe(executor, mnode, server).await?;
        }
        Ok::<bool, Error>(false)
    })
    .await?;

    if connected {
        info!("peers {} are connected to {mnode}", servers.join(", "));
    } else {
        error!("could not bring every peer into the cluster within {}s", PROBE_BUDGET.as_secs());
    }
    Ok(connected)
}

pub async fn wait_for_peers_to_connect(
    executor: &Executor,
    mnode: &str,
    servers: &[String],
    timeout: Duration,
) -> Result<bool> {
    try_wait_until(timeout, DEFAULT_INTERVAL, || {
        is_peer_connected(executor, mnode, servers)
    })
    .await
}

/// The names of every node in `mnode`'s pool, `mnode` itself included.
pub async fn nodes_from_pool_list(executor: &Executor, mnode: &str) -> Result<Option<Vec<String>>> {
    Ok(get_pool_list(executor, mnode).await?.map(|pool| {
        pool.into_iter()
            .map(|p| {
                if p.hostname == "localhost" {
                    mnode.to_string()
                } else {
                    p.hostname
                }
            })
            .collect()
    }))
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use clap::{Args, ValueEnum};

use crate::{
    commands::{handled_error, load_cluster, Cli, Handle, HandledResult},
    error::Result,
    parse::{
        heal::get_heal_info,
        peer::{get_peer_status, get_pool_list},
        quota::get_quota_list,
        rebalance::get_rebalance_status,
        snapshot::{get_snap_info, get_snap_list},
        volume::{get_volume_info, get_volume_list, get_volume_options, get_volume_status},
    },
    remote::Executor,
};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    VolumeInfo,
    VolumeStatus,
    PeerStatus,
    PoolList,
    VolumeList,
    SnapshotList,
    SnapshotInfo,
    QuotaList,
    HealInfo,
    RebalanceStatus,
    VolumeOptions,
}

impl Surface {
    fn needs_volume(&self) -> bool {
        matches!(
            self,
            Surface::QuotaList | Surface::HealInfo | Surface::RebalanceStatus | Surface::VolumeOptions
        )
    }
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    pub surface: Surface,

    /// The node to query (defaults to the first server).
    #[arg(long)]
    pub mnode: Option<String>,

    #[arg(long)]
    pub volume: Option<String>,
}

fn json<T: serde::Serialize>(value: Option<T>) -> Option<serde_json::Value> {
    value.and_then(|v| serde_json::to_value(v).ok())
}

async fn fetch(
    executor: &Executor,
    mnode: &str,
    surface: Surface,
    volume: Option<&str>,
) -> Result<Option<serde_json::Value>> {
    let vol = volume.unwrap_or_default();
    Ok(match surface {
        Surface::VolumeInfo => json(get_volume_info(executor, mnode, volume).await?),
        Surface::VolumeStatus => json(get_volume_status(executor, mnode, volume).await?),
        Surface::PeerStatus => json(get_peer_status(executor, mnode).await?),
        Surface::PoolList => json(get_pool_list(executor, mnode).await?),
        Surface::VolumeList => json(get_volume_list(executor, mnode).await?),
        Surface::SnapshotList => json(get_snap_list(executor, mnode, volume).await?),
        Surface::SnapshotInfo => json(get_snap_info(executor, mnode).await?),
        Surface::QuotaList => json(get_quota_list(executor, mnode, vol, None).await?),
        Surface::HealInfo => json(get_heal_info(executor, mnode, vol).await?),
        Surface::RebalanceStatus => json(get_rebalance_status(executor, mnode, vol).await?),
        Surface::VolumeOptions => json(get_volume_options(executor, mnode, vol, None).await?),
    })
}

pub async fn query(cli: &Cli, args: &QueryArgs) -> HandledResult<()> {
    if args.surface.needs_volume() && args.volume.is_none() {
        eprintln!("{:?} needs --volume", args.surface);
        return handled_error();
    }
    let cluster = load_cluster(cli)?;
    let mnode = args.mnode.as_deref().unwrap_or(cluster.mnode());

    let value = fetch(cluster.executor(), mnode, args.surface, args.volume.as_deref())
        .await
        .handle_err(|e| eprintln!("{e}"))?;
    let Some(value) = value else {
        eprintln!("{:?} could not be read from {mnode}", args.surface);
        return handled_error();
    };
    let text = serde_json::to_string_pretty(&value)
        .handle_err(|e| eprintln!("Could not format result: {e}"))?;
    println!("{text}");
    Ok(())
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Geo-replication and glusterfind sessions.

use std::collections::BTreeSet;

use log::{error, info};

use crate::{
    error::Result,
    parse::session::{get_all_geo_rep_status, get_glusterfind_list},
    remote::{quote, CmdResult, Executor},
};

pub use crate::parse::session::{get_geo_rep_status, slave_endpoint};

/// `gluster volume geo-replication <master> <slave> <action>`.
async fn geo_rep(
    executor: &Executor,
    mnode: &str,
    master: &str,
    slave: &str,
    action: &str,
) -> Result<CmdResult> {
    let command = format!(
        "gluster --mode=script volume geo-replication {} {} {action}",
        quote(master),
        quote(slave)
    );
    executor.run(mnode, &command).await
}

pub async fn georep_create(
    executor: &Executor,
    mnode: &str,
    master: &str,
    slave: &str,
    push_pem: bool,
    force: bool,
) -> Result<CmdResult> {
    let mut action = "create".to_string();
    if push_pem {
        action.push_str(" push-pem");
    }
    if force {
        action.push_str(" force");
    }
    geo_rep(executor, mnode, master, slave, &action).await
}

pub async fn georep_start(
    executor: &Executor,
    mnode: &str,
    master: &str,
    slave: &str,
) -> Result<CmdResult> {
    geo_rep(executor, mnode, master, slave, "start").await
}

pub async fn georep_pause(
    executor: &Executor,
    mnode: &str,
    master: &str,
    slave: &str,
) -> Result<CmdResult> {
    geo_rep(executor, mnode, master, slave, "pause").await
}

pub async fn georep_resume(
    executor: &Executor,
    mnode: &str,
    master: &str,
    slave: &str,
) -> Result<CmdResult> {
    geo_rep(executor, mnode, master, slave, "resume").await
}

pub async fn georep_stop(
    executor: &Executor,
    mnode: &str,
    master: &str,
    slave: &str,
    force: bool,
) -> Result<CmdResult> {
    let action = if force { "stop force" } else { "stop" };
    geo_rep(executor, mnode, master, slave, action).await
}

pub async fn georep_delete(
    executor: &Executor,
    mnode: &str,
    master: &str,
    slave: &str,
) -> Result<CmdResult> {
    geo_rep(executor, mnode, master, slave, "delete").await
}

pub async fn glusterfind_create(
    executor: &Executor,
    mnode: &str,
    session: &str,
    volname: &str,
    force: bool,
) -> Result<CmdResult> {
    let force = if force { " --force" } else { "" };
    let command = format!(
        "glusterfind create {} {}{force}",
        quote(session),
        quote(volname)
    );
    executor.run(mnode, &command).await
}

pub async fn glusterfind_delete(
    executor: &Executor,
    mnode: &str,
    session: &str,
    volname: &str,
) -> Result<CmdResult> {
    let command = format!("glusterfind delete {} {}", quote(session), quote(volname));
    executor.run(mnode, &command).await
}

pub use crate::parse::session::get_glusterfind_list as glusterfind_list;

/// Stop and delete every geo-replication session and delete every glusterfind session whose
/// source is `volname`. Every session is attempted; the result says whether all went away.
pub async fn cleanup_sessions(executor: &Executor, mnode: &str, volname: &str) -> Result<bool> {
    let mut clean = true;

    let slaves: BTreeSet<String> = get_all_geo_rep_status(executor, mnode)
        .await?
        .unwrap_or_default()
        .into_iter()
        .filter(|pair| pair.master_volume == volname)
        .map(|pair| pair.slave)
        .collect();
    for slave in &slaves {
        // The status column may carry an ssh:// prefix that the CLI does not accept back.
        let slave = slave.trim_start_matches("ssh://");
        georep_stop(executor, mnode, volname, slave, true).await?;
        let result = georep_delete(executor, mnode, volname, slave).await?;
        if result.success() {
            info!("deleted geo-replication session {volname} -> {slave}");
        } else {
            error!(
                "could not delete geo-replication session {volname} -> {slave}: {}",
                result.stderr.trim()
            );
            clean = false;
        }
    }

    let sessions = get_glusterfind_list(executor, mnode, Some(volname))
        .await?
        .unwrap_or_default();
    for session in sessions.iter().filter(|s| s.volume == volname) {
        let result = glusterfind_delete(executor, mnode, &session.session, volname).await?;
        if !result.success() {
            error!(
                "could not delete glusterfind session {}: {}",
                session.session,
                result.stderr.trim()
            );
            clean = false;
        }
    }
    Ok(clean)
}

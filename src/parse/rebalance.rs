// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{query, xml::cli_output, ParseError, XmlElement};
use crate::{
    error::Result,
    remote::{quote, Executor},
};

/// Progress counters of a data-migration job on one node, or aggregated over all nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationNode {
    pub node_name: String,
    pub id: String,
    pub files: u64,
    pub size: u64,
    pub scanned: u64,
    pub failures: u64,
    pub skipped: u64,
    pub status: i64,
    /// `not started`, `in progress`, `completed`, `stopped`, `failed`, ...
    pub status_str: String,
    pub runtime: String,
}

/// `gluster volume rebalance <vol> status --xml`, or the identical report of
/// `gluster volume remove-brick <vol> <bricks> status --xml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub task_id: String,
    pub aggregate: MigrationNode,
    /// Keyed by node name.
    pub nodes: BTreeMap<String, MigrationNode>,
}

impl MigrationStatus {
    pub fn is_completed(&self) -> bool {
        self.aggregate.status_str == "completed"
    }

    pub fn is_failed(&self) -> bool {
        self.aggregate.status_str == "failed"
    }
}

fn counter(element: &XmlElement, name: &str) -> std::result::Result<u64, ParseError> {
    Ok(element.int_of(name)?.unwrap_or(0).max(0) as u64)
}

fn node_from(element: &XmlElement) -> std::result::Result<MigrationNode, ParseError> {
    Ok(MigrationNode {
        node_name: element.text_of("nodeName").unwrap_or("aggregate").to_string(),
        id: element.text_of("id").unwrap_or("").to_string(),
        files: counter(element, "files")?,
        size: counter(element, "size")?,
        scanned: counter(element, "lookups")?,
        failures: counter(element, "failures")?,
        skipped: counter(element, "skipped")?,
        status: element.int_of("status")?.unwrap_or(-1),
        status_str: element.require_text("statusStr")?.to_string(),
        runtime: element.text_of("runtime").unwrap_or("").to_string(),
    })
}

/// Parse a rebalance or remove-brick status report.
pub fn parse_migration_status(
    document: &str,
) -> std::result::Result<MigrationStatus, ParseError> {
    let root = cli_output(document)?;
    let report = root
        .child("volRebalance")
        .or_else(|| root.child("volRemoveBrick"))
        .ok_or_else(|| ParseError::new("no <volRebalance> or <volRemoveBrick> element"))?;

    let aggregate = node_from(
        report
            .child("aggregate")
            .ok_or_else(|| ParseError::new("no <aggregate> element"))?,
    )?;
    let mut nodes = BTreeMap::new();
    for node in report.children_named("node") {
        let node = node_from(node)?;
        nodes.insert(node.node_name.clone(), node);
    }
    Ok(MigrationStatus {
        task_id: report.text_of("task-id").unwrap_or("").to_string(),
        aggregate,
        nodes,
    })
}

pub async fn get_rebalance_status(
    executor: &Executor,
    mnode: &str,
    volname: &str,
) -> Result<Option<MigrationStatus>> {
    let command = format!("gluster volume rebalance {} status --xml", quote(volname));
    query(executor, mnode, &command, parse_migration_status).await
}

pub async fn get_remove_brick_status(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
) -> Result<Option<MigrationStatus>> {
    let command = format!(
        "gluster volume remove-brick {} {} status --xml",
        quote(volname),
        crate::remote::quote::join(bricks)
    );
    query(executor, mnode, &command, parse_migration_status).await
}

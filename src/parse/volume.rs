// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{query, xml::cli_output, ParseError, XmlElement};
use crate::{
    error::Result,
    remote::{quote, Executor},
};

/// One volume as reported by `gluster volume info --xml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    pub name: String,
    pub id: String,
    #[serde(rename = "type")]
    pub type_str: String,
    /// `Created`, `Started` or `Stopped`.
    pub status: String,
    pub brick_count: usize,
    pub dist_count: u32,
    pub replica_count: u32,
    pub arbiter_count: u32,
    pub disperse_count: u32,
    pub redundancy_count: u32,
    pub snapshot_count: u32,
    pub transport: String,
    pub bricks: Vec<BrickInfo>,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrickInfo {
    /// `host:path`
    pub name: String,
    pub host_uuid: String,
    pub is_arbiter: bool,
}

impl VolumeInfo {
    /// The number of bricks in each subvolume.
    pub fn subvol_size(&self) -> usize {
        if self.disperse_count > 0 {
            self.disperse_count as usize
        } else if self.replica_count > 1 {
            self.replica_count as usize
        } else {
            1
        }
    }

    pub fn brick_names(&self) -> Vec<String> {
        self.bricks.iter().map(|b| b.name.clone()).collect()
    }
}

fn count(element: &XmlElement, name: &str) -> std::result::Result<u32, ParseError> {
    Ok(element.int_of(name)?.unwrap_or(0).max(0) as u32)
}

fn transport_name(code: &str) -> String {
    match code {
        "0" => "tcp",
        "1" => "rdma",
        "2" => "tcp,rdma",
        other => other,
    }
    .to_string()
}

fn volume_info_from(volume: &XmlElement) -> std::result::Result<VolumeInfo, ParseError> {
    let name = volume.require_text("name")?.to_string();

    let bricks = match volume.child("bricks") {
        Some(bricks) => bricks
            .children_named("brick")
            .map(|b| {
                let brick_name = match b.text_of("name") {
                    Some(n) => n.to_string(),
                    None => b.text.clone(),
                };
                BrickInfo {
                    name: brick_name,
                    host_uuid: b
                        .text_of("hostUuid")
                        .or(b.attributes.get("uuid").map(|s| s.as_str()))
                        .unwrap_or("")
                        .to_string(),
                    is_arbiter: b.text_of("isArbiter") == Some("1"),
                }
            })
            .collect(),
        None => Vec::new(),
    };

    let brick_count = volume.int_of("brickCount")?.unwrap_or(0) as usize;
    if brick_count != bricks.len() {
        return Err(ParseError::new(format!(
            "volume {name}: brickCount is {brick_count} but {} bricks are listed",
            bricks.len()
        )));
    }

    let options = match volume.child("options") {
        Some(options) => options
            .children_named("option")
            .filter_map(|o| Some((o.text_of("name")?.to_string(), o.text_of("value")?.to_string())))
            .collect(),
        None => BTreeMap::new(),
    };

    Ok(VolumeInfo {
        id: volume.text_of("id").unwrap_or("").to_string(),
        type_str: volume.text_of("typeStr").unwrap_or("").to_string(),
        status: volume.text_of("statusStr").unwrap_or("").to_string(),
        brick_count,
        dist_count: count(volume, "distCount")?,
        replica_count: count(volume, "replicaCount")?,
        arbiter_count: count(volume, "arbiterCount")?,
        disperse_count: count(volume, "disperseCount")?,
        redundancy_count: count(volume, "redundancyCount")?,
        snapshot_count: count(volume, "snapshotCount")?,
        transport: transport_name(volume.text_of("transport").unwrap_or("0")),
        bricks,
        options,
        name,
    })
}

/// Parse `gluster volume info [<vol>|all] --xml` into a map keyed by volume name.
pub fn parse_volume_info(
    document: &str,
) -> std::result::Result<BTreeMap<String, VolumeInfo>, ParseError> {
    let root = cli_output(document)?;
    let volumes = root
        .path("volInfo/volumes")
        .ok_or_else(|| ParseError::new("no <volInfo><volumes> element"))?;
    volumes
        .children_named("volume")
        .map(|v| volume_info_from(v).map(|info| (info.name.clone(), info)))
        .collect()
}

pub async fn get_volume_info(
    executor: &Executor,
    mnode: &str,
    volname: Option<&str>,
) -> Result<Option<BTreeMap<String, VolumeInfo>>> {
    let target = volname.map(quote).unwrap_or_else(|| "all".to_string());
    let command = format!("gluster volume info {target} --xml");
    query(executor, mnode, &command, parse_volume_info).await
}

/// Info for a single volume, or `None` if it does not exist.
pub async fn get_one_volume_info(
    executor: &Executor,
    mnode: &str,
    volname: &str,
) -> Result<Option<VolumeInfo>> {
    Ok(get_volume_info(executor, mnode, Some(volname))
        .await?
        .and_then(|mut all| all.remove(volname)))
}

/// The status of one process (brick or daemon) in `gluster volume status --xml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    pub hostname: String,
    pub path: String,
    pub peer_id: String,
    /// `"1"` when online.
    pub status: String,
    pub port: Option<String>,
    /// `None` when the CLI reports no live process.
    pub pid: Option<i64>,
}

impl ProcessStatus {
    pub fn is_online(&self) -> bool {
        self.status == "1" && self.pid.is_some()
    }
}

/// `gluster volume status` for one volume. Processes are keyed first by host (or by daemon name,
/// e.g. `"Self-heal Daemon"`, `"Snapshot Daemon"`) and then by brick path (or, for daemons, by the
/// host they run on).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeStatus {
    pub name: String,
    pub nodes: BTreeMap<String, BTreeMap<String, ProcessStatus>>,
}

impl VolumeStatus {
    /// The status of brick `host:path`.
    pub fn brick(&self, brick: &str) -> Option<&ProcessStatus> {
        let (host, path) = brick.split_once(':')?;
        self.nodes.get(host)?.get(path)
    }
}

fn process_status_from(node: &XmlElement) -> std::result::Result<ProcessStatus, ParseError> {
    let pid = node.int_of("pid")?.filter(|pid| *pid > 0);
    let port = match node.text_of("port") {
        None | Some("") | Some("N/A") => None,
        Some(p) => Some(p.to_string()),
    };
    Ok(ProcessStatus {
        hostname: node.require_text("hostname")?.to_string(),
        path: node.require_text("path")?.to_string(),
        peer_id: node.text_of("peerid").unwrap_or("").to_string(),
        status: node.text_of("status").unwrap_or("0").to_string(),
        port,
        pid,
    })
}

/// Parse `gluster volume status [<vol>|all] --xml` into a map keyed by volume name.
pub fn parse_volume_status(
    document: &str,
) -> std::result::Result<BTreeMap<String, VolumeStatus>, ParseError> {
    let root = cli_output(document)?;
    let volumes = root
        .path("volStatus/volumes")
        .ok_or_else(|| ParseError::new("no <volStatus><volumes> element"))?;

    let mut statuses = BTreeMap::new();
    for volume in volumes.children_named("volume") {
        let name = volume.require_text("volName")?.to_string();
        let mut nodes: BTreeMap<String, BTreeMap<String, ProcessStatus>> = BTreeMap::new();
        for node in volume.children_named("node") {
            let process = process_status_from(node)?;
            nodes
                .entry(process.hostname.clone())
                .or_default()
                .insert(process.path.clone(), process);
        }
        statuses.insert(name.clone(), VolumeStatus { name, nodes });
    }
    Ok(statuses)
}

pub async fn get_volume_status(
    executor: &Executor,
    mnode: &str,
    volname: Option<&str>,
) -> Result<Option<BTreeMap<String, VolumeStatus>>> {
    let target = volname.map(quote).unwrap_or_else(|| "all".to_string());
    let command = format!("gluster volume status {target} --xml");
    query(executor, mnode, &command, parse_volume_status).await
}

/// Parse `gluster volume get <vol> <option|all> --xml`. Values are kept as the CLI prints them,
/// including suffixes such as `"51 (DEFAULT)"`.
pub fn parse_volume_options(
    document: &str,
) -> std::result::Result<BTreeMap<String, String>, ParseError> {
    let root = cli_output(document)?;
    let opts = root
        .child("volGetopts")
        .ok_or_else(|| ParseError::new("no <volGetopts> element"))?;
    opts.children_named("Opt")
        .map(|opt| -> std::result::Result<(String, String), ParseError> {
            Ok((
                opt.require_text("Option")?.to_string(),
                opt.text_of("Value").unwrap_or("").to_string(),
            ))
        })
        .collect()
}

pub async fn get_volume_options(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    option: Option<&str>,
) -> Result<Option<BTreeMap<String, String>>> {
    let option = option.map(quote).unwrap_or_else(|| "all".to_string());
    let command = format!("gluster volume get {} {option} --xml", quote(volname));
    query(executor, mnode, &command, parse_volume_options).await
}

/// Parse the plain-text output of `gluster volume list`.
pub fn parse_volume_list(output: &str) -> std::result::Result<Vec<String>, ParseError> {
    Ok(output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("No volumes present"))
        .map(str::to_string)
        .collect())
}

pub async fn get_volume_list(executor: &Executor, mnode: &str) -> Result<Option<Vec<String>>> {
    query(executor, mnode, "gluster volume list", parse_volume_list).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_list_text() {
        let out = "testvol\nother\n\n";
        assert_eq!(parse_volume_list(out).unwrap(), vec!["testvol", "other"]);
        assert!(parse_volume_list("No volumes present in cluster\n")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn brick_count_mismatch_is_an_error() {
        let doc = "<cliOutput><opRet>0</opRet><volInfo><volumes><volume><name>v</name>\
                   <brickCount>2</brickCount><bricks><brick><name>h:/b0</name></brick></bricks>\
                   </volume></volumes></volInfo></cliOutput>";
        assert!(parse_volume_info(doc).is_err());
    }

    #[test]
    fn offline_process_has_no_pid() {
        let doc = "<cliOutput><opRet>0</opRet><volStatus><volumes><volume><volName>v</volName>\
                   <node><hostname>h1</hostname><path>/b0</path><peerid>u</peerid>\
                   <status>0</status><port>N/A</port><pid>-1</pid></node>\
                   </volume></volumes></volStatus></cliOutput>";
        let status = parse_volume_status(doc).unwrap();
        let brick = status["v"].brick("h1:/b0").unwrap();
        assert_eq!(brick.pid, None);
        assert_eq!(brick.port, None);
        assert!(!brick.is_online());
    }
}

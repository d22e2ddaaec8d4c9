// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use serde::Serialize;

use super::{query, xml::cli_output, ParseError, XmlElement};
use crate::{
    error::Result,
    remote::{quote, Executor},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginVolume {
    pub name: String,
    pub snap_count: Option<u64>,
    pub snap_remaining: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapVolume {
    /// The internal name of the snapshot volume.
    pub name: String,
    /// `Started` when the snapshot is activated, `Stopped` otherwise.
    pub status: String,
    pub origin_volume: OriginVolume,
}

/// One snapshot from `gluster snapshot info --xml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapInfo {
    pub name: String,
    pub uuid: String,
    pub description: Option<String>,
    pub create_time: String,
    pub vol_count: u64,
    pub snap_volume: Option<SnapVolume>,
}

impl SnapInfo {
    pub fn origin_volume(&self) -> Option<&str> {
        self.snap_volume
            .as_ref()
            .map(|v| v.origin_volume.name.as_str())
    }

    pub fn is_activated(&self) -> bool {
        self.snap_volume
            .as_ref()
            .is_some_and(|v| v.status == "Started")
    }
}

fn snap_info_from(snapshot: &XmlElement) -> std::result::Result<SnapInfo, ParseError> {
    let snap_volume = match snapshot.child("snapVolume") {
        Some(sv) => {
            let origin = sv
                .child("originVolume")
                .ok_or_else(|| ParseError::new("<snapVolume> has no <originVolume>"))?;
            Some(SnapVolume {
                name: sv.text_of("name").unwrap_or("").to_string(),
                status: sv.text_of("status").unwrap_or("").to_string(),
                origin_volume: OriginVolume {
                    name: origin.require_text("name")?.to_string(),
                    snap_count: origin.int_of("snapCount")?.map(|n| n.max(0) as u64),
                    snap_remaining: origin.int_of("snapRemaining")?.map(|n| n.max(0) as u64),
                },
            })
        }
        None => None,
    };
    Ok(SnapInfo {
        name: snapshot.require_text("name")?.to_string(),
        uuid: snapshot.text_of("uuid").unwrap_or("").to_string(),
        description: snapshot.text_of("description").map(str::to_string),
        create_time: snapshot.text_of("createTime").unwrap_or("").to_string(),
        vol_count: snapshot.int_of("volCount")?.unwrap_or(0).max(0) as u64,
        snap_volume,
    })
}

/// Find the first `<snapshots>` element below `element`, depth first. Its position differs
/// between `snapshot info <snap>` and `snapshot info volume <vol>`.
fn find_snapshots(element: &XmlElement) -> Option<&XmlElement> {
    if element.name == "snapshots" {
        return Some(element);
    }
    element.children.iter().find_map(find_snapshots)
}

/// Parse `gluster snapshot info [<snap>|volume <vol>] --xml`, in the order the CLI lists them.
pub fn parse_snap_info(document: &str) -> std::result::Result<Vec<SnapInfo>, ParseError> {
    let root = cli_output(document)?;
    let info = root
        .child("snapInfo")
        .ok_or_else(|| ParseError::new("no <snapInfo> element"))?;
    match find_snapshots(info) {
        Some(snapshots) => snapshots
            .children_named("snapshot")
            .map(snap_info_from)
            .collect(),
        None => Ok(Vec::new()),
    }
}

/// Parse `gluster snapshot list [<vol>] --xml`. Creation order is kept.
pub fn parse_snap_list(document: &str) -> std::result::Result<Vec<String>, ParseError> {
    let root = cli_output(document)?;
    let list = root
        .child("snapList")
        .ok_or_else(|| ParseError::new("no <snapList> element"))?;
    // Per-volume listings nest the names one level deeper.
    let names: Vec<String> = list
        .children_named("snapshot")
        .chain(
            list.children_named("volume")
                .flat_map(|v| v.children_named("snapshot")),
        )
        .map(|s| s.text.clone())
        .collect();
    Ok(names)
}

pub async fn get_snap_list(
    executor: &Executor,
    mnode: &str,
    volname: Option<&str>,
) -> Result<Option<Vec<String>>> {
    let command = match volname {
        Some(v) => format!("gluster snapshot list {} --xml", quote(v)),
        None => "gluster snapshot list --xml".to_string(),
    };
    query(executor, mnode, &command, parse_snap_list).await
}

pub async fn get_snap_info(executor: &Executor, mnode: &str) -> Result<Option<Vec<SnapInfo>>> {
    query(executor, mnode, "gluster snapshot info --xml", parse_snap_info).await
}

pub async fn get_snap_info_by_snapname(
    executor: &Executor,
    mnode: &str,
    snapname: &str,
) -> Result<Option<SnapInfo>> {
    let command = format!("gluster snapshot info {} --xml", quote(snapname));
    Ok(query(executor, mnode, &command, parse_snap_info)
        .await?
        .and_then(|snaps| snaps.into_iter().find(|s| s.name == snapname)))
}

pub async fn get_snap_info_by_volname(
    executor: &Executor,
    mnode: &str,
    volname: &str,
) -> Result<Option<Vec<SnapInfo>>> {
    let command = format!("gluster snapshot info volume {} --xml", quote(volname));
    query(executor, mnode, &command, parse_snap_info).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_volume_list() {
        let doc = "<cliOutput><opRet>0</opRet><snapList><volume><name>v</name>\
                   <snapshot>s1</snapshot><snapshot>s0</snapshot></volume></snapList></cliOutput>";
        assert_eq!(parse_snap_list(doc).unwrap(), vec!["s1", "s0"]);
    }

    #[test]
    fn empty_info() {
        let doc = "<cliOutput><opRet>0</opRet><snapInfo><count>0</count></snapInfo></cliOutput>";
        assert!(parse_snap_info(doc).unwrap().is_empty());
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use serde::Serialize;

use super::{optional_number, query, xml::cli_output, ParseError};
use crate::{
    error::Result,
    remote::{quote, Executor},
};

/// Pending heal entries on one brick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealBrick {
    /// `host:path`
    pub name: String,
    pub host_uuid: String,
    /// `Connected`, or the reason the brick could not be queried.
    pub status: String,
    /// `None` when the brick could not be queried.
    pub number_of_entries: Option<u64>,
    pub entries: Vec<String>,
}

/// Parse `gluster volume heal <vol> info [split-brain] --xml`, one entry per brick in brick order.
pub fn parse_heal_info(document: &str) -> std::result::Result<Vec<HealBrick>, ParseError> {
    let root = cli_output(document)?;
    let bricks = root
        .path("healInfo/bricks")
        .ok_or_else(|| ParseError::new("no <healInfo><bricks> element"))?;
    bricks
        .children_named("brick")
        .map(|brick| -> std::result::Result<HealBrick, ParseError> {
            Ok(HealBrick {
                name: brick.require_text("name")?.to_string(),
                host_uuid: brick
                    .attributes
                    .get("hostUuid")
                    .cloned()
                    .unwrap_or_default(),
                status: brick.text_of("status").unwrap_or("").to_string(),
                number_of_entries: brick.text_of("numberOfEntries").and_then(optional_number),
                entries: brick.children_named("file").map(|f| f.text.clone()).collect(),
            })
        })
        .collect()
}

/// Whether every brick answered and has nothing left to heal.
pub fn heal_complete(bricks: &[HealBrick]) -> bool {
    bricks.iter().all(|b| b.number_of_entries == Some(0))
}

pub async fn get_heal_info(
    executor: &Executor,
    mnode: &str,
    volname: &str,
) -> Result<Option<Vec<HealBrick>>> {
    let command = format!("gluster volume heal {} info --xml", quote(volname));
    query(executor, mnode, &command, parse_heal_info).await
}

pub async fn get_heal_info_split_brain(
    executor: &Executor,
    mnode: &str,
    volname: &str,
) -> Result<Option<Vec<HealBrick>>> {
    let command = format!("gluster volume heal {} info split-brain --xml", quote(volname));
    query(executor, mnode, &command, parse_heal_info).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnected_brick_is_not_complete() {
        let doc = "<cliOutput><opRet>0</opRet><healInfo><bricks>\
                   <brick hostUuid=\"u1\"><name>h1:/b0</name><status>Connected</status>\
                   <numberOfEntries>0</numberOfEntries></brick>\
                   <brick hostUuid=\"u2\"><name>h2:/b1</name>\
                   <status>Transport endpoint is not connected</status>\
                   <numberOfEntries>-</numberOfEntries></brick>\
                   </bricks></healInfo></cliOutput>";
        let bricks = parse_heal_info(doc).unwrap();
        assert_eq!(bricks.len(), 2);
        assert_eq!(bricks[1].number_of_entries, None);
        assert!(!heal_complete(&bricks));
        assert!(heal_complete(&bricks[..1]));
    }
}

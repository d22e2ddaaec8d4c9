// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{optional_number, query, xml::cli_output, ParseError};
use crate::{
    error::Result,
    remote::{quote, Executor},
};

/// One limit from `gluster volume quota <vol> list --xml`. Sizes are in bytes; the soft limit is
/// kept as the CLI prints it (e.g. `"80%"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaLimit {
    pub path: String,
    pub hard_limit: u64,
    pub soft_limit_percent: String,
    pub soft_limit_value: Option<u64>,
    pub used_space: Option<u64>,
    pub avail_space: Option<u64>,
    pub sl_exceeded: String,
    pub hl_exceeded: String,
}

/// Parse a quota listing into a map keyed by path.
pub fn parse_quota_list(
    document: &str,
) -> std::result::Result<BTreeMap<String, QuotaLimit>, ParseError> {
    let root = cli_output(document)?;
    let quota = root
        .child("volQuota")
        .ok_or_else(|| ParseError::new("no <volQuota> element"))?;
    let mut limits = BTreeMap::new();
    for limit in quota.children_named("limit") {
        let fields = limit.leaf_map();
        let field = |name: &str| fields.get(name).map(String::as_str).unwrap_or("");
        let path = field("path").to_string();
        if path.is_empty() {
            return Err(ParseError::new("quota <limit> without <path>"));
        }
        let hard_limit = optional_number(field("hard_limit"))
            .ok_or_else(|| ParseError::new(format!("no hard limit for quota path {path}")))?;
        limits.insert(
            path.clone(),
            QuotaLimit {
                hard_limit,
                soft_limit_percent: field("soft_limit_percent").to_string(),
                soft_limit_value: optional_number(field("soft_limit_value")),
                used_space: optional_number(field("used_space")),
                avail_space: optional_number(field("avail_space")),
                sl_exceeded: field("sl_exceeded").to_string(),
                hl_exceeded: field("hl_exceeded").to_string(),
                path,
            },
        );
    }
    Ok(limits)
}

pub async fn get_quota_list(
    executor: &Executor,
    mnode: &str,
    volname: &str,
    path: Option<&str>,
) -> Result<Option<BTreeMap<String, QuotaLimit>>> {
    let path = path.map(quote).unwrap_or_default();
    let command = format!("gluster volume quota {} list {path} --xml", quote(volname));
    query(executor, mnode, &command, parse_quota_list).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_usage_is_absent() {
        let doc = "<cliOutput><opRet>0</opRet><volQuota><limit><path>/dir</path>\
                   <hard_limit>1024</hard_limit><soft_limit_percent>80%</soft_limit_percent>\
                   <soft_limit_value>819</soft_limit_value><used_space>N/A</used_space>\
                   <avail_space>N/A</avail_space><sl_exceeded>N/A</sl_exceeded>\
                   <hl_exceeded>N/A</hl_exceeded></limit></volQuota></cliOutput>";
        let limits = parse_quota_list(doc).unwrap();
        let dir = &limits["/dir"];
        assert_eq!(dir.hard_limit, 1024);
        assert_eq!(dir.used_space, None);
        assert_eq!(dir.soft_limit_percent, "80%");
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use serde::Serialize;

use super::{query, ParseError};
use crate::{
    error::Result,
    remote::{quote, Executor},
};

/// Split a fixed-width table, as printed by the geo-replication and glusterfind CLIs, into rows of
/// cells. Column boundaries are taken from where each of `columns` starts in the header line, so
/// cells may contain single spaces (`Changelog Crawl`, timestamps).
///
/// Returns an empty list when the header is not found, which is how both CLIs report that there are
/// no sessions.
fn parse_table(
    output: &str,
    columns: &[&str],
) -> std::result::Result<Vec<Vec<String>>, ParseError> {
    let mut lines = output.lines();
    let header = loop {
        match lines.next() {
            Some(line) if line.trim_start().starts_with(columns[0]) => break line,
            Some(_) => continue,
            None => return Ok(Vec::new()),
        }
    };

    let mut offsets = Vec::with_capacity(columns.len());
    let mut from = 0;
    for column in columns {
        let at = header[from..]
            .find(column)
            .map(|i| i + from)
            .ok_or_else(|| ParseError::new(format!("table header has no column '{column}'")))?;
        offsets.push(at);
        from = at + column.len();
    }

    let mut rows = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.chars().all(|c| c == '-') {
            continue;
        }
        let cells = offsets
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = offsets.get(i + 1).map_or(line.len(), |&next| next.min(line.len()));
                line.get(start.min(end)..end).unwrap_or("").trim().to_string()
            })
            .collect::<Vec<_>>();
        if cells[0].is_empty() {
            return Err(ParseError::new(format!("table row without a first cell: '{line}'")));
        }
        rows.push(cells);
    }
    Ok(rows)
}

/// One master brick's view of a geo-replication session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoRepPair {
    pub master_node: String,
    pub master_volume: String,
    pub master_brick: String,
    pub slave_user: String,
    pub slave: String,
    pub slave_node: String,
    /// `Active`, `Passive`, `Initializing...`, `Created`, `Paused`, `Stopped`, `Faulty`.
    pub status: String,
    pub crawl_status: String,
    pub last_synced: String,
}

const GEO_REP_COLUMNS: [&str; 9] = [
    "MASTER NODE",
    "MASTER VOL",
    "MASTER BRICK",
    "SLAVE USER",
    "SLAVE",
    "SLAVE NODE",
    "STATUS",
    "CRAWL STATUS",
    "LAST_SYNCED",
];

/// Parse `gluster volume geo-replication [<master> <slave>] status`.
pub fn parse_geo_rep_status(output: &str) -> std::result::Result<Vec<GeoRepPair>, ParseError> {
    Ok(parse_table(output, &GEO_REP_COLUMNS)?
        .into_iter()
        .map(|mut row| {
            let mut take = |i: usize| std::mem::take(&mut row[i]);
            GeoRepPair {
                master_node: take(0),
                master_volume: take(1),
                master_brick: take(2),
                slave_user: take(3),
                slave: take(4),
                slave_node: take(5),
                status: take(6),
                crawl_status: take(7),
                last_synced: take(8),
            }
        })
        .collect())
}

/// The slave endpoint as the geo-replication CLI spells it: `[user@]host::volume`.
pub fn slave_endpoint(slave_host: &str, slave_volume: &str, user: Option<&str>) -> String {
    match user {
        Some(user) if user != "root" => format!("{user}@{slave_host}::{slave_volume}"),
        _ => format!("{slave_host}::{slave_volume}"),
    }
}

pub async fn get_geo_rep_status(
    executor: &Executor,
    mnode: &str,
    master_volume: &str,
    slave: &str,
) -> Result<Option<Vec<GeoRepPair>>> {
    let command = format!(
        "gluster volume geo-replication {} {} status",
        quote(master_volume),
        quote(slave)
    );
    query(executor, mnode, &command, parse_geo_rep_status).await
}

/// Every geo-replication session known to `mnode`.
pub async fn get_all_geo_rep_status(
    executor: &Executor,
    mnode: &str,
) -> Result<Option<Vec<GeoRepPair>>> {
    query(executor, mnode, "gluster volume geo-replication status", parse_geo_rep_status).await
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlusterfindSession {
    pub session: String,
    pub volume: String,
    /// Empty until the first `pre` of the session.
    pub session_time: String,
}

/// Parse `glusterfind list [--session S] [--volume V]`.
pub fn parse_glusterfind_list(
    output: &str,
) -> std::result::Result<Vec<GlusterfindSession>, ParseError> {
    Ok(parse_table(output, &["SESSION", "VOLUME", "SESSION TIME"])?
        .into_iter()
        .map(|mut row| GlusterfindSession {
            session_time: std::mem::take(&mut row[2]),
            volume: std::mem::take(&mut row[1]),
            session: std::mem::take(&mut row[0]),
        })
        .collect())
}

pub async fn get_glusterfind_list(
    executor: &Executor,
    mnode: &str,
    volname: Option<&str>,
) -> Result<Option<Vec<GlusterfindSession>>> {
    let command = match volname {
        Some(v) => format!("glusterfind list --volume {}", quote(v)),
        None => "glusterfind list".to_string(),
    };
    query(executor, mnode, &command, parse_glusterfind_list).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const GEO_REP: &str = "
MASTER NODE    MASTER VOL    MASTER BRICK    SLAVE USER    SLAVE                SLAVE NODE    STATUS     CRAWL STATUS       LAST_SYNCED
-----------------------------------------------------------------------------------------------------------------------------------------
server1        master        /bricks/b0      root          slave1::slavevol     slave1        Active     Changelog Crawl    2024-05-01 10:00:00
server2        master        /bricks/b1      root          slave1::slavevol     slave2        Passive    N/A                N/A
";

    #[test]
    fn geo_rep_columns_with_spaces() {
        let pairs = parse_geo_rep_status(GEO_REP).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].master_brick, "/bricks/b0");
        assert_eq!(pairs[0].slave, "slave1::slavevol");
        assert_eq!(pairs[0].crawl_status, "Changelog Crawl");
        assert_eq!(pairs[0].last_synced, "2024-05-01 10:00:00");
        assert_eq!(pairs[1].status, "Passive");
        assert_eq!(pairs[1].slave_node, "slave2");
    }

    #[test]
    fn no_sessions() {
        assert!(parse_geo_rep_status("No active geo-replication sessions\n")
            .unwrap()
            .is_empty());
        assert!(parse_glusterfind_list("No sessions found.\n").unwrap().is_empty());
    }

    #[test]
    fn glusterfind_sessions() {
        let out = "SESSION                   VOLUME                    SESSION TIME             \n\
                   ---------------------------------------------------------------------------\n\
                   sess1                     testvol                   2024-05-01 10:00:00      \n\
                   sess2                     testvol                                            \n";
        let sessions = parse_glusterfind_list(out).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_time, "2024-05-01 10:00:00");
        assert_eq!(sessions[1].session, "sess2");
        assert_eq!(sessions[1].session_time, "");
    }

    #[test]
    fn slave_endpoint_spelling() {
        assert_eq!(slave_endpoint("s1", "sv", None), "s1::sv");
        assert_eq!(slave_endpoint("s1", "sv", Some("root")), "s1::sv");
        assert_eq!(slave_endpoint("s1", "sv", Some("geo")), "geo@s1::sv");
    }
}

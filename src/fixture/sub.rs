// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Sub-fixtures: setup and teardown that only some cells need, registered on a
//! [`super::Fixture`] and run after the volume exists and before it is mounted.

use std::time::Duration;

use {
    async_trait::async_trait,
    log::{info, warn},
};

use crate::{
    cluster::{
        session::{georep_create, georep_delete, georep_start, georep_stop, slave_endpoint},
        volume::{get_volume_options, set_volume_option},
    },
    error::{Error, Result},
    fixture::{Cell, TestCase},
    mount::MountProtocol,
    remote::Executor,
    wait::{try_wait_until, DEFAULT_INTERVAL},
};

#[async_trait]
pub trait SubFixture: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this sub-fixture takes part in `cell`.
    fn applies(&self, case: &dyn TestCase, cell: &Cell) -> bool;

    /// Returning a skip error (see [`Error::skip`]) skips the cell.
    async fn setup(&self, cell: &mut Cell) -> Result<()>;

    async fn teardown(&self, cell: &mut Cell) -> Result<bool>;
}

/// Exports the cell volume through the NFS-Ganesha HA cluster.
pub struct GaneshaFixture;

const EXPORT_TIMEOUT: Duration = Duration::from_secs(60);

async fn is_exported(executor: &Executor, mnode: &str, volname: &str) -> Result<bool> {
    let result = executor.run(mnode, "showmount -e localhost").await?;
    let export = format!("/{volname}");
    Ok(result.success()
        && result
            .stdout
            .lines()
            .any(|line| line.split_whitespace().next() == Some(export.as_str())))
}

#[async_trait]
impl SubFixture for GaneshaFixture {
    fn name(&self) -> &'static str {
        "nfs-ganesha"
    }

    fn applies(&self, _case: &dyn TestCase, cell: &Cell) -> bool {
        cell.protocol() == MountProtocol::NfsGanesha
    }

    async fn setup(&self, cell: &mut Cell) -> Result<()> {
        if !cell.cluster().config().gluster.cluster_config.nfs_ganesha.enable {
            return Err(Error::skip("nfs-ganesha is not enabled in the configuration"));
        }
        let executor = cell.executor();
        let mnode = cell.mnode();

        let enabled = get_volume_options(executor, mnode, "all", Some("nfs-ganesha"))
            .await?
            .and_then(|opts| opts.get("nfs-ganesha").cloned())
            .is_some_and(|v| v.starts_with("enable"));
        if !enabled {
            let result = executor
                .run(mnode, "gluster --mode=script nfs-ganesha enable")
                .await?;
            if !result.success() {
                return Err(Error::Fixture(format!(
                    "could not enable the nfs-ganesha cluster: {}",
                    result.stderr.trim()
                )));
            }
        }

        let volname = cell.volname().to_string();
        if !cell.set_option(&volname, "ganesha.enable", "on").await? {
            return Err(Error::Fixture(format!("could not export {volname} via nfs-ganesha")));
        }
        let executor = cell.executor();
        let mnode = cell.mnode();
        let volname = volname.as_str();
        let exported = try_wait_until(EXPORT_TIMEOUT, DEFAULT_INTERVAL, move || {
            is_exported(executor, mnode, volname)
        })
        .await?;
        if !exported {
            return Err(Error::Fixture(format!("{volname} did not show up as an nfs export")));
        }
        Ok(())
    }

    async fn teardown(&self, cell: &mut Cell) -> Result<bool> {
        set_volume_option(cell.executor(), cell.mnode(), cell.volname(), "ganesha.enable", "off")
            .await
    }
}

/// Makes sure the CTDB cluster fronting the CIFS virtual IPs is healthy.
pub struct CtdbFixture;

/// A node line of `ctdb status`, e.g. `pnn:1 10.70.46.6     OK (THIS NODE)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtdbNode {
    pub pnn: u32,
    pub address: String,
    pub status: String,
}

pub fn parse_ctdb_status(output: &str) -> Vec<CtdbNode> {
    output
        .lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            let pnn = words.next()?.strip_prefix("pnn:")?.parse().ok()?;
            let address = words.next()?.to_string();
            let status = words.next()?.to_string();
            Some(CtdbNode {
                pnn,
                address,
                status,
            })
        })
        .collect()
}

async fn ctdb_healthy(executor: &Executor, mnode: &str) -> Result<bool> {
    let result = executor.run(mnode, "ctdb status").await?;
    if !result.success() {
        return Ok(false);
    }
    let nodes = parse_ctdb_status(&result.stdout);
    for node in nodes.iter().filter(|n| n.status != "OK") {
        info!("ctdb node {} ({}) is {}", node.pnn, node.address, node.status);
    }
    Ok(!nodes.is_empty() && nodes.iter().all(|n| n.status == "OK"))
}

#[async_trait]
impl SubFixture for CtdbFixture {
    fn name(&self) -> &'static str {
        "ctdb"
    }

    fn applies(&self, _case: &dyn TestCase, cell: &Cell) -> bool {
        cell.protocol() == MountProtocol::Cifs
    }

    async fn setup(&self, cell: &mut Cell) -> Result<()> {
        let cluster = cell.cluster();
        if cluster.config().gluster.cluster_config.smb.ctdb_vips.is_empty() {
            return Err(Error::skip("no ctdb_vips configured"));
        }
        let executor = cluster.executor();
        let mnode = cluster.mnode();
        let healthy = try_wait_until(cluster.online_timeout(), DEFAULT_INTERVAL, move || {
            ctdb_healthy(executor, mnode)
        })
        .await?;
        if !healthy {
            return Err(Error::Fixture("ctdb reports nodes that are not OK".to_string()));
        }
        Ok(())
    }

    async fn teardown(&self, _cell: &mut Cell) -> Result<bool> {
        Ok(true)
    }
}

/// A geo-replication session from the cell volume to the configured slave volume on the first
/// slave host.
pub struct GeoRepFixture;

impl GeoRepFixture {
    fn slave(cell: &Cell) -> Option<String> {
        let cluster = cell.cluster();
        let volume = cluster.config().gluster.cluster_config.geo_rep.slave_volume.as_deref()?;
        let host = cluster.slaves().first()?;
        Some(slave_endpoint(host, volume, None))
    }
}

#[async_trait]
impl SubFixture for GeoRepFixture {
    fn name(&self) -> &'static str {
        "geo-replication"
    }

    fn applies(&self, case: &dyn TestCase, _cell: &Cell) -> bool {
        case.needs_geo_rep()
    }

    async fn setup(&self, cell: &mut Cell) -> Result<()> {
        let Some(slave) = Self::slave(cell) else {
            return Err(Error::skip("no geo-replication slave configured"));
        };
        let executor = cell.executor();
        let mnode = cell.mnode();
        let volname = cell.volname();

        let keys = executor.run(mnode, "gluster-georep-sshkey generate").await?;
        if !keys.success() {
            warn!("gluster-georep-sshkey generate failed: {}", keys.stderr.trim());
        }
        let result = georep_create(executor, mnode, volname, &slave, true, false).await?;
        if !result.success() {
            return Err(Error::Fixture(format!(
                "could not create geo-replication session {volname} -> {slave}: {}",
                result.stderr.trim()
            )));
        }
        let result = georep_start(executor, mnode, volname, &slave).await?;
        if !result.success() {
            return Err(Error::Fixture(format!(
                "could not start geo-replication session {volname} -> {slave}: {}",
                result.stderr.trim()
            )));
        }
        Ok(())
    }

    async fn teardown(&self, cell: &mut Cell) -> Result<bool> {
        let Some(slave) = Self::slave(cell) else {
            return Ok(true);
        };
        let executor = cell.executor();
        let mnode = cell.mnode();
        let volname = cell.volname();
        georep_stop(executor, mnode, volname, &slave, true).await?;
        Ok(georep_delete(executor, mnode, volname, &slave)
            .await?
            .success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctdb_status_lines() {
        let output = "\
Number of nodes:2
pnn:0 10.70.46.5       OK
pnn:1 10.70.46.6       UNHEALTHY (THIS NODE)
Generation:1386412637
Size:2
hash:0 lmaster:0
Recovery mode:NORMAL (0)
Recovery master:0
";
        let nodes = parse_ctdb_status(output);
        assert_eq!(nodes.len(), 2);
        assert_eq!(
            nodes[1],
            CtdbNode {
                pnn: 1,
                address: "10.70.46.6".into(),
                status: "UNHEALTHY".into(),
            }
        );
    }
}

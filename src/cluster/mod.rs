// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Shaping the storage cluster into the topology a test wants, and undoing it.
//!
//! Helpers that only need to run commands take an [`Executor`]; helpers that also need the test
//! bed description (brick roots, timeouts, default options) take the [`Cluster`].

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    time::Duration,
};

use self::brick::{brick_index, Brick};
use crate::{
    config::Config,
    error::{Error, Result},
    host::{Host, Role},
    remote::{CommandLog, Executor},
};

pub mod brick;
pub mod glusterd;
pub mod heal;
pub mod layout;
pub mod peer;
pub mod quota;
pub mod rebalance;
pub mod session;
pub mod snapshot;
pub mod volume;

pub use layout::{InnerLayout, Transport, VolumeLayout};

/// Cluster is the context threaded through every harness operation: the configuration of the test
/// bed and the executor that reaches its hosts. It is created once per process and is read-only
/// afterwards, apart from the record of which clients already have the I/O scripts and the highest
/// brick index handed out per volume.
#[derive(Debug)]
pub struct Cluster {
    config: Config,
    executor: Executor,
    servers: Vec<String>,
    clients: Vec<String>,
    slaves: Vec<String>,
    scripts_uploaded: Mutex<HashSet<String>>,
    brick_marks: Mutex<HashMap<String, usize>>,
}

impl Cluster {
    /// Load the config at `path` (or the default config path) and open the command log in the
    /// configured log directory.
    pub fn new(path: Option<&str>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_string(),
            None => crate::default_config_path(),
        };
        let config = Config::load(&path)?;
        let log_dir = config.log_dir();
        let log = CommandLog::new(&log_dir).map_err(|e| {
            Error::Config(format!("could not open command log in '{log_dir}': {e}"))
        })?;
        let executor = Executor::new(&config, log)?;
        Self::from_config(config, executor)
    }

    pub fn from_config(config: Config, executor: Executor) -> Result<Self> {
        let names = |hosts: &[String]| -> Result<Vec<String>> {
            hosts
                .iter()
                .map(|h| Host::parse(h).map(|h| h.name().to_string()))
                .collect()
        };
        Ok(Cluster {
            servers: names(&config.servers)?,
            clients: names(&config.clients)?,
            slaves: names(&config.slaves)?,
            config,
            executor,
            scripts_uploaded: Mutex::new(HashSet::new()),
            brick_marks: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// The node management commands are sent to.
    pub fn mnode(&self) -> &str {
        &self.servers[0]
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn clients(&self) -> &[String] {
        &self.clients
    }

    pub fn slaves(&self) -> &[String] {
        &self.slaves
    }

    pub fn hosts_with_role(&self, role: Role) -> &[String] {
        match role {
            Role::Server => &self.servers,
            Role::Client => &self.clients,
            Role::GeoRepSlave => &self.slaves,
        }
    }

    pub fn rebalance_timeout(&self) -> Duration {
        Duration::from_secs(self.config.gluster.rebalance_timeout)
    }

    pub fn online_timeout(&self) -> Duration {
        Duration::from_secs(self.config.gluster.online_timeout)
    }

    pub fn heal_timeout(&self) -> Duration {
        Duration::from_secs(self.config.gluster.heal_timeout)
    }

    /// Whether the I/O scripts were already uploaded to `client` during this run.
    pub(crate) fn scripts_uploaded(&self, client: &str) -> bool {
        self.scripts_uploaded.lock().unwrap().contains(client)
    }

    pub(crate) fn mark_scripts_uploaded(&self, client: &str) {
        self.scripts_uploaded
            .lock()
            .unwrap()
            .insert(client.to_string());
    }

    /// Clients the I/O scripts were uploaded to, forgetting them.
    pub(crate) fn take_scripts_uploaded(&self) -> Vec<String> {
        let mut uploaded: Vec<String> = self.scripts_uploaded.lock().unwrap().drain().collect();
        uploaded.sort();
        uploaded
    }

    /// Allocate `n` new bricks for `volname` on `servers`. Paths handed out earlier in this run are
    /// never handed out again, even after the bricks holding them were removed from the volume.
    pub fn allocate_bricks(
        &self,
        volname: &str,
        n: usize,
        servers: &[String],
        existing: &[Brick],
    ) -> Result<Vec<Brick>> {
        let mut marks = self.brick_marks.lock().unwrap();
        let mark = marks.get(volname).copied().unwrap_or(0);
        let bricks = brick::allocate_bricks(volname, n, servers, &self.config, existing, mark)?;
        let next = bricks
            .iter()
            .filter_map(|b| brick_index(volname, &b.path))
            .max()
            .map_or(mark, |i| (i + 1).max(mark));
        marks.insert(volname.to_string(), next);
        Ok(bricks)
    }

    /// Print a summary of the test bed, as `glusto validate` shows it.
    pub fn print_summary(&self) {
        println!("servers: {}", self.servers.join(", "));
        for server in &self.servers {
            match self.config.server_info(server) {
                Some(info) => println!(
                    "  {server}: brick_root={} devices=[{}]",
                    info.brick_root.as_deref().unwrap_or("<none>"),
                    info.devices.join(", ")
                ),
                None => println!("  {server}: <no servers_info>"),
            }
        }
        println!("clients: {}", self.clients.join(", "));
        for client in &self.clients {
            println!("  {client}: mount_root={}", self.config.mount_root(client));
        }
        if !self.slaves.is_empty() {
            println!("slaves: {}", self.slaves.join(", "));
        }
        println!("log_dir: {}", self.config.log_dir());
    }
}

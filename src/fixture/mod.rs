// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Test cases parameterised over a matrix of volume layouts and mount protocols, and the per-cell
//! setup and teardown that shapes the cluster for each of them.
//!
//! A [`TestCase`] names the layouts and protocols it runs on. [`expand_matrix`] turns that into one
//! [`CellSpec`] per combination; [`Fixture::prepare`] resolves the layout of a cell (or decides to
//! skip it); [`Fixture::setup`] creates the volume and mounts; [`Fixture::teardown`] undoes all of
//! it, whatever state setup or the test body left behind.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    log::{error, info, warn},
};

use crate::{
    cluster::{
        peer::probe_peers,
        session::cleanup_sessions,
        snapshot::snapshot_delete_all,
        volume::{
            cleanup_volume, get_volume_options, reset_volume_option, set_volume_option,
            setup_volume,
        },
        Cluster, VolumeLayout,
    },
    config::VolumeTypeConfig,
    error::{Error, Result},
    io::{self, Recipe},
    mount::{Mount, MountProtocol},
    remote::{Executor, IoProcess},
    wait::wait_until,
};

pub mod sub;

pub use sub::{CtdbFixture, GaneshaFixture, GeoRepFixture, SubFixture};

/// How long teardown waits for workloads the test body left running before terminating them.
pub const IO_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// How much of the cluster a test case wants prepared before its body runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupLevel {
    /// Create and start the volume, but do not mount it.
    Volume,
    VolumeAndMount,
}

/// A test of the storage product, run once per cell of its layout x protocol matrix.
#[async_trait]
pub trait TestCase: Send + Sync {
    fn name(&self) -> &str;

    /// The layout names this case runs on, as found under `gluster.volume_types`.
    fn volume_types(&self) -> Vec<&'static str>;

    /// The protocols this case runs on, as found under `gluster.mount_types`.
    fn mount_types(&self) -> Vec<&'static str> {
        vec!["glusterfs"]
    }

    /// Layout fields that this case fixes regardless of the configured template, e.g. a replica
    /// count of 3.
    fn overrides(&self) -> VolumeTypeConfig {
        VolumeTypeConfig::default()
    }

    fn setup_level(&self) -> SetupLevel {
        SetupLevel::VolumeAndMount
    }

    /// Whether the case needs a geo-replication session from the cell volume to the configured
    /// slave volume.
    fn needs_geo_rep(&self) -> bool {
        false
    }

    async fn run(&self, cell: &mut Cell) -> Result<()>;
}

/// One combination of a test case's matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSpec {
    pub case: String,
    pub layout: String,
    pub protocol: MountProtocol,
}

impl CellSpec {
    /// `<case>-<layout>-<protocol>`.
    pub fn id(&self) -> String {
        format!("{}-{}-{}", self.case, self.layout, self.protocol)
    }

    /// A volume name derived from the cell id, restricted to the characters the CLI accepts.
    pub fn volname(&self) -> String {
        self.id()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .map(|c| if c == '-' { '_' } else { c })
            .collect()
    }
}

/// The cartesian product of `case`'s layouts and protocols, layouts varying slowest.
pub fn expand_matrix(case: &dyn TestCase) -> Result<Vec<CellSpec>> {
    let protocols = case
        .mount_types()
        .into_iter()
        .map(MountProtocol::from_name)
        .collect::<Result<Vec<_>>>()?;
    Ok(case
        .volume_types()
        .into_iter()
        .flat_map(|layout| {
            protocols.iter().map(move |&protocol| CellSpec {
                case: case.name().to_string(),
                layout: layout.to_string(),
                protocol,
            })
        })
        .collect())
}

/// Resolve the layout of `spec` against the configuration and the case's overrides. A layout that
/// needs more servers than the test bed has is a skip, not an error.
pub fn resolve_layout(
    cluster: &Cluster,
    case: &dyn TestCase,
    spec: &CellSpec,
) -> Result<VolumeLayout> {
    let template = cluster.config().volume_type(&spec.layout)?.merge(&case.overrides());
    let layout = VolumeLayout::from_config(&spec.layout, &template)?;
    let servers = cluster.servers().len();
    if servers < layout.inner_count() {
        return Err(Error::skip(format!(
            "layout {} needs {} servers, the test bed has {servers}",
            spec.layout,
            layout.inner_count()
        )));
    }
    Ok(layout)
}

/// An option a test changed, and the value it had before.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChangedOption {
    volume: String,
    key: String,
    previous: Option<String>,
}

/// The state of one running cell: its volume, mounts, and everything the test body did that
/// teardown has to undo.
pub struct Cell {
    cluster: Arc<Cluster>,
    spec: CellSpec,
    layout: VolumeLayout,
    volname: String,
    mounts: Vec<Mount>,
    io: Vec<Arc<IoProcess>>,
    changed_options: Vec<ChangedOption>,
}

impl Cell {
    pub fn new(cluster: Arc<Cluster>, spec: CellSpec, layout: VolumeLayout) -> Self {
        Cell {
            volname: spec.volname(),
            cluster,
            spec,
            layout,
            mounts: Vec::new(),
            io: Vec::new(),
            changed_options: Vec::new(),
        }
    }

    pub fn id(&self) -> String {
        self.spec.id()
    }

    pub fn spec(&self) -> &CellSpec {
        &self.spec
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn executor(&self) -> &Executor {
        self.cluster.executor()
    }

    pub fn mnode(&self) -> &str {
        self.cluster.mnode()
    }

    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    pub fn volname(&self) -> &str {
        &self.volname
    }

    pub fn protocol(&self) -> MountProtocol {
        self.spec.protocol
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// The first mount, which test bodies run their workloads on by default.
    pub fn mount(&self) -> Result<&Mount> {
        self.mounts
            .first()
            .ok_or_else(|| Error::Fixture(format!("cell {} has no mounts", self.id())))
    }

    /// Start `recipe` on `mount` and keep the handle, so that teardown can reap it if the test
    /// body does not.
    pub async fn run_io(&mut self, mount: &Mount, recipe: &Recipe) -> Result<Arc<IoProcess>> {
        let process = io::run_io(&self.cluster, mount, recipe).await?;
        Ok(self.track(process))
    }

    /// Hand a background command started outside [`Cell::run_io`] to teardown.
    pub fn track(&mut self, process: IoProcess) -> Arc<IoProcess> {
        let process = Arc::new(process);
        self.io.push(process.clone());
        process
    }

    /// Set `key` on `volume` (`all` for cluster-wide options), remembering its previous value the
    /// first time it is changed so that teardown can put it back.
    pub async fn set_option(&mut self, volume: &str, key: &str, value: &str) -> Result<bool> {
        let executor = self.cluster.executor();
        let mnode = self.cluster.mnode();
        if !self
            .changed_options
            .iter()
            .any(|o| o.volume == volume && o.key == key)
        {
            let previous = get_volume_options(executor, mnode, volume, Some(key))
                .await?
                .and_then(|mut opts| opts.remove(key));
            self.changed_options.push(ChangedOption {
                volume: volume.to_string(),
                key: key.to_string(),
                previous,
            });
        }
        set_volume_option(executor, mnode, volume, key, value).await
    }

    /// Put back every option changed through [`Cell::set_option`] on volumes other than the cell
    /// volume, which does not outlive the cell. An option whose previous value was the default, or
    /// unknown, is reset.
    async fn restore_options(&mut self) -> Result<bool> {
        let executor = self.cluster.executor();
        let mnode = self.cluster.mnode();
        let mut restored = true;
        for option in self.changed_options.drain(..).rev() {
            if option.volume == self.volname {
                continue;
            }
            let ok = match option.previous.as_deref().and_then(explicit_value) {
                Some(value) => {
                    set_volume_option(executor, mnode, &option.volume, &option.key, value).await?
                }
                None => {
                    reset_volume_option(executor, mnode, &option.volume, Some(&option.key), false)
                        .await?
                }
            };
            if !ok {
                error!("could not restore {} on {}", option.key, option.volume);
            }
            restored &= ok;
        }
        Ok(restored)
    }
}

/// The value of an option as `volume get` prints it, or `None` when it is at its default.
fn explicit_value(value: &str) -> Option<&str> {
    if value.ends_with("(DEFAULT)") || value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Runs the setup and teardown shared by every cell, composed with the sub-fixtures that only some
/// cells need.
pub struct Fixture {
    cluster: Arc<Cluster>,
    subs: Vec<Box<dyn SubFixture>>,
}

impl Fixture {
    /// A fixture with the standard sub-fixtures registered.
    pub fn new(cluster: Arc<Cluster>) -> Self {
        Fixture {
            cluster,
            subs: vec![
                Box::new(GaneshaFixture),
                Box::new(CtdbFixture),
                Box::new(GeoRepFixture),
            ],
        }
    }

    pub fn with_subs(cluster: Arc<Cluster>, subs: Vec<Box<dyn SubFixture>>) -> Self {
        Fixture { cluster, subs }
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    /// Resolve `spec` into a cell. Errors here mean the cell never touched the cluster.
    pub fn prepare(&self, case: &dyn TestCase, spec: &CellSpec) -> Result<Cell> {
        let layout = resolve_layout(&self.cluster, case, spec)?;
        Ok(Cell::new(self.cluster.clone(), spec.clone(), layout))
    }

    /// Probe the peers, create and start the volume, run the applicable sub-fixtures, mount the
    /// volume on every client and upload the I/O scripts.
    ///
    /// Whatever this managed to do before failing is recorded in `cell`; call
    /// [`Fixture::teardown`] regardless of the result.
    pub async fn setup(&self, case: &dyn TestCase, cell: &mut Cell) -> Result<()> {
        let cluster = self.cluster.clone();
        let executor = cluster.executor();
        let mnode = cluster.mnode();

        if !probe_peers(executor, mnode, cluster.servers()).await? {
            return Err(Error::Fixture("peers are not connected".to_string()));
        }
        let volname = cell.volname().to_string();
        if !setup_volume(&cluster, mnode, &volname, cell.layout(), false).await? {
            return Err(Error::Fixture(format!("could not set up volume {volname}")));
        }

        for sub in &self.subs {
            if sub.applies(case, cell) {
                info!("{}: setting up {}", cell.id(), sub.name());
                sub.setup(cell).await?;
            }
        }

        if case.setup_level() == SetupLevel::Volume {
            return Ok(());
        }
        for client in cluster.clients() {
            let mount = Mount::new(&cluster, client, &volname, cell.protocol(), None)?;
            // Recorded before mounting so that a half-done mount is still cleaned up.
            cell.mounts.push(mount.clone());
            if !mount.mount(executor).await? {
                return Err(Error::Fixture(format!(
                    "could not mount {volname} on {client}:{}",
                    mount.mountpoint
                )));
            }
        }
        if !io::upload_scripts(&cluster, cluster.clients()).await? {
            return Err(Error::Fixture("could not upload I/O scripts".to_string()));
        }
        Ok(())
    }

    /// Undo everything `cell` records, in reverse order of setup. Every step is attempted even when
    /// an earlier one fails; the failures are collected into one error.
    pub async fn teardown(&self, case: &dyn TestCase, cell: &mut Cell) -> Result<()> {
        let cluster = self.cluster.clone();
        let executor = cluster.executor();
        let mnode = cluster.mnode();
        let volname = cell.volname().to_string();
        let mut failures: Vec<String> = Vec::new();
        let mut record = |step: &str, outcome: Result<bool>| match outcome {
            Ok(true) => {}
            Ok(false) => failures.push(step.to_string()),
            Err(e) => failures.push(format!("{step}: {e}")),
        };

        record("reap I/O", reap_io(executor, &cell.io).await);
        cell.io.clear();

        for mount in cell.mounts.clone().iter().rev() {
            let step = format!("unmount {}:{}", mount.client, mount.mountpoint);
            record(&step, mount.unmount(executor).await);
            let step = format!("remove {}:{}", mount.client, mount.mountpoint);
            record(&step, mount.remove_mountpoint(executor).await);
        }
        cell.mounts.clear();
        record("remove I/O scripts", io::remove_scripts(&cluster).await);

        for sub in self.subs.iter().rev() {
            if sub.applies(case, cell) {
                let step = format!("tear down {}", sub.name());
                record(&step, sub.teardown(cell).await);
            }
        }

        // The CLI refuses to delete a volume that still has sessions or snapshots.
        record("clean up sessions", cleanup_sessions(executor, mnode, &volname).await);
        record(
            "delete snapshots",
            snapshot_delete_all(executor, mnode, Some(&volname)).await,
        );
        record(
            &format!("clean up volume {volname}"),
            cleanup_volume(executor, mnode, &volname).await,
        );
        record("restore options", cell.restore_options().await);

        if failures.is_empty() {
            Ok(())
        } else {
            for failure in &failures {
                error!("{}: teardown step failed: {failure}", cell.id());
            }
            Err(Error::Fixture(format!(
                "teardown of {} failed: {}",
                cell.id(),
                failures.join("; ")
            )))
        }
    }
}

/// Wait out the grace period for workloads that are still running, then terminate the survivors
/// and wait for them to exit.
async fn reap_io(executor: &Executor, procs: &[Arc<IoProcess>]) -> Result<bool> {
    let running = procs.iter().filter(|p| !p.is_complete()).count();
    if running == 0 {
        return Ok(io::wait_for_io_to_complete(procs).await);
    }
    warn!(
        "{running} workload(s) still running at teardown, waiting up to {}s",
        IO_GRACE_PERIOD.as_secs()
    );
    let finished = wait_until(IO_GRACE_PERIOD, Duration::from_secs(1), move || async move {
        procs.iter().all(|p| p.is_complete())
    })
    .await;
    if !finished {
        for proc in procs.iter().filter(|p| !p.is_complete()) {
            warn!("terminating '{}' on {}", proc.command(), proc.host());
            proc.terminate(executor).await?;
        }
    }
    Ok(io::wait_for_io_to_complete(procs).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        remote::{CommandLog, Executor},
    };

    struct Matrix;

    #[async_trait]
    impl TestCase for Matrix {
        fn name(&self) -> &str {
            "matrix"
        }

        fn volume_types(&self) -> Vec<&'static str> {
            vec!["distributed-replicated", "dispersed"]
        }

        fn mount_types(&self) -> Vec<&'static str> {
            vec!["glusterfs", "nfs"]
        }

        async fn run(&self, _cell: &mut Cell) -> Result<()> {
            Ok(())
        }
    }

    struct ReplicaThree;

    #[async_trait]
    impl TestCase for ReplicaThree {
        fn name(&self) -> &str {
            "replica-three"
        }

        fn volume_types(&self) -> Vec<&'static str> {
            vec!["replicated"]
        }

        fn overrides(&self) -> VolumeTypeConfig {
            VolumeTypeConfig {
                replica_count: Some(2),
                ..Default::default()
            }
        }

        async fn run(&self, _cell: &mut Cell) -> Result<()> {
            Ok(())
        }
    }

    fn cluster(servers: usize) -> Cluster {
        let config = Config {
            servers: (1..=servers).map(|i| format!("server{i}")).collect(),
            clients: vec!["client1".into()],
            ..Default::default()
        };
        let executor = Executor::new(&config, CommandLog::disabled()).unwrap();
        Cluster::from_config(config, executor).unwrap()
    }

    #[test]
    fn matrix_is_the_cartesian_product() {
        let cells = expand_matrix(&Matrix).unwrap();
        let ids: Vec<String> = cells.iter().map(CellSpec::id).collect();
        assert_eq!(
            ids,
            vec![
                "matrix-distributed-replicated-glusterfs",
                "matrix-distributed-replicated-nfs",
                "matrix-dispersed-glusterfs",
                "matrix-dispersed-nfs",
            ]
        );
        assert_eq!(cells[0].volname(), "matrix_distributed_replicated_glusterfs");
    }

    #[test]
    fn too_few_servers_is_a_skip() {
        let cluster = cluster(4);
        let cells = expand_matrix(&Matrix).unwrap();
        // dispersed needs 6 bricks per subvolume
        let err = resolve_layout(&cluster, &Matrix, &cells[2]).unwrap_err();
        assert!(err.is_skip(), "{err}");
        let layout = resolve_layout(&cluster, &Matrix, &cells[0]).unwrap();
        assert_eq!(layout.brick_count(), 6);
    }

    #[test]
    fn overrides_win_over_templates() {
        let cluster = cluster(2);
        let spec = expand_matrix(&ReplicaThree).unwrap().remove(0);
        let layout = resolve_layout(&cluster, &ReplicaThree, &spec).unwrap();
        assert_eq!(layout.inner_count(), 2);
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        struct Bad;

        #[async_trait]
        impl TestCase for Bad {
            fn name(&self) -> &str {
                "bad"
            }

            fn volume_types(&self) -> Vec<&'static str> {
                vec!["distributed"]
            }

            fn mount_types(&self) -> Vec<&'static str> {
                vec!["9p"]
            }

            async fn run(&self, _cell: &mut Cell) -> Result<()> {
                Ok(())
            }
        }

        assert!(expand_matrix(&Bad).is_err());
    }

    #[test]
    fn default_values_are_not_restored_verbatim() {
        assert_eq!(explicit_value("off (DEFAULT)"), None);
        assert_eq!(explicit_value(""), None);
        assert_eq!(explicit_value("on"), Some("on"));
    }
}

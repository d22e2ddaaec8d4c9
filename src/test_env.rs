// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cluster::Cluster;
use crate::config::Config;
use crate::remote::{CommandLog, Executor};

/// Given a relative `path` in the test directory, prepend the
/// full path to the test directory.
pub fn test_path(path: &str) -> String {
    std::env::var("CARGO_MANIFEST_DIR").unwrap() + "/tests/" + path
}

trait IgnoreEexist {
    fn ignore_eexist(self) -> Self;
}

impl IgnoreEexist for io::Result<()> {
    fn ignore_eexist(self) -> Self {
        match self {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// The server names of the test bed built by [`TestEnvironment::config`]. All of them, and the
/// client, are driven with a local shell.
pub const SERVERS: [&str; 3] = ["server1", "server2", "server3"];
pub const CLIENT: &str = "client1";

/// A TestEnvironment holds all the information needed to access a test's runtime state. This
/// includes a "private" working directory in which the command log, brick and mount directories,
/// and the state of the fake storage CLI are kept.
///
/// Commands run through a cluster built here find `tests/fake_bin` first on their `PATH`, so the
/// storage CLI they reach is the fake one. Tests tell it what to answer with [`Self::respond`] and
/// check what it was asked with [`Self::invocations`].
pub struct TestEnvironment {
    /// The name of the test, used to determine its private directory for holding test state.
    test_id: String,

    /// The path to this test's private working directory.
    private_dir_path: String,

    /// Where the fake CLI keeps its responses and records its invocations.
    fake_dir_path: String,

    responses: AtomicUsize,
}

impl TestEnvironment {
    /// Set up an environment for a test named `test_id`.
    ///
    /// Creates a specific unique subdirectory for the test, emptying out whatever a previous run
    /// left there.
    pub fn new(test_id: &str) -> Self {
        // Each test gets a "private" directory named after its test_id.
        let private_dir_path = test_path(&format!("test_output/{test_id}"));
        match fs::remove_dir_all(&private_dir_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => panic!("Could not clean up test directory: {e}"),
        };

        fs::create_dir(test_path("test_output"))
            .ignore_eexist()
            .unwrap();
        fs::create_dir(&private_dir_path).unwrap();

        let fake_dir_path = format!("{private_dir_path}/fake");
        fs::create_dir_all(format!("{fake_dir_path}/responses")).unwrap();
        fs::File::create(format!("{fake_dir_path}/invocations")).unwrap();

        // The executable bit does not always survive a checkout.
        let fake = test_path("fake_bin/gluster");
        fs::set_permissions(&fake, fs::Permissions::from_mode(0o755)).unwrap();

        Self {
            test_id: test_id.to_string(),
            private_dir_path,
            fake_dir_path,
            responses: AtomicUsize::new(0),
        }
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    /// The path of `name` inside this test's private directory.
    pub fn path(&self, name: &str) -> String {
        format!("{}/{name}", self.private_dir_path)
    }

    /// A test bed of three servers and one client, all of them local. Bricks, mounts, the I/O
    /// scripts and the command log all live in the private directory.
    pub fn config(&self) -> Config {
        let hosts = SERVERS
            .iter()
            .copied()
            .chain([CLIENT])
            .collect::<Vec<_>>()
            .join(", ");
        let servers_info: String = SERVERS
            .iter()
            .map(|s| format!("  {s}: {{brick_root: {}}}\n", self.path("bricks")))
            .collect();
        let yaml = format!(
            "servers: [{servers}]
clients: [{CLIENT}]
servers_info:
{servers_info}clients_info:
  {CLIENT}: {{mount_root: {mount_root}}}
ssh:
  local_hosts: [{hosts}]
log_dir: {log_dir}
io:
  script_dir: {script_dir}
gluster:
  online_timeout: 6
  rebalance_timeout: 6
  heal_timeout: 6
",
            servers = SERVERS.join(", "),
            mount_root = self.path("mnt"),
            log_dir = self.path("logs"),
            script_dir = self.path("scripts"),
        );
        Config::from_yaml(&yaml).unwrap()
    }

    /// Build a Cluster for [`Self::config`].
    pub fn cluster(&self) -> Cluster {
        self.cluster_from(self.config())
    }

    /// Build a Cluster for `config`, with the fake CLI on the path of every local command.
    pub fn cluster_from(&self, config: Config) -> Cluster {
        let log = CommandLog::new(&config.log_dir()).unwrap();
        let path = format!(
            "{}:{}",
            test_path("fake_bin"),
            std::env::var("PATH").unwrap_or_default()
        );
        let executor = Executor::new(&config, log)
            .unwrap()
            .with_local_env("PATH", &path)
            .with_local_env("GLUSTO_FAKE_DIR", &self.fake_dir_path);
        Cluster::from_config(config, executor).unwrap()
    }

    /// Make the fake CLI answer invocations matching the glob `pattern` with `stdout` and exit
    /// status `status`. Later responses win over earlier ones.
    pub fn respond(&self, pattern: &str, status: i32, stdout: &str) {
        self.respond_full(pattern, status, stdout, "");
    }

    /// Make the fake CLI fail invocations matching `pattern` with `stderr`.
    pub fn respond_error(&self, pattern: &str, status: i32, stderr: &str) {
        self.respond_full(pattern, status, "", stderr);
    }

    /// Like [`Self::respond`], but the response only takes effect after the fake CLI has been
    /// invoked with arguments matching `trigger`. Used to model state changes, e.g. the brick list
    /// growing once `add-brick` has run.
    pub fn respond_after(&self, trigger: &str, pattern: &str, status: i32, stdout: &str) {
        let base = self.write_reply(status, stdout, "");
        fs::write(format!("{base}.pending"), pattern).unwrap();
        fs::write(format!("{base}.trigger"), trigger).unwrap();
    }

    fn respond_full(&self, pattern: &str, status: i32, stdout: &str, stderr: &str) {
        let base = self.write_reply(status, stdout, stderr);
        // Written last, so the fake never sees a pattern without its reply.
        fs::write(format!("{base}.pattern"), pattern).unwrap();
    }

    fn write_reply(&self, status: i32, stdout: &str, stderr: &str) -> String {
        let n = self.responses.fetch_add(1, Ordering::SeqCst);
        let base = format!("{}/responses/{n:04}", self.fake_dir_path);
        fs::write(format!("{base}.out"), stdout).unwrap();
        fs::write(format!("{base}.status"), status.to_string()).unwrap();
        if !stderr.is_empty() {
            fs::write(format!("{base}.err"), stderr).unwrap();
        }
        base
    }

    /// Answer with the contents of `tests/xml/<name>`.
    pub fn respond_with_file(&self, pattern: &str, name: &str) {
        let contents = fs::read_to_string(test_path(&format!("xml/{name}"))).unwrap();
        self.respond(pattern, 0, &contents);
    }

    /// The argument strings the fake CLI was called with, oldest first.
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(format!("{}/invocations", self.fake_dir_path))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Asserts that the fake CLI was called with exactly `args` at least once.
    pub fn assert_invoked(&self, args: &str) {
        let invocations = self.invocations();
        assert!(
            invocations.iter().any(|i| i == args),
            "'{args}' was not invoked; invocations were:\n{}",
            invocations.join("\n")
        );
    }

    /// The index of the first invocation equal to `args`. Panics if there is none.
    pub fn position_of(&self, args: &str) -> usize {
        let invocations = self.invocations();
        invocations
            .iter()
            .position(|i| i == args)
            .unwrap_or_else(|| {
                panic!(
                    "'{args}' was not invoked; invocations were:\n{}",
                    invocations.join("\n")
                )
            })
    }

    /// The bricks [`Self::config`] allocates for a fresh volume of `n` bricks.
    pub fn bricks(&self, volname: &str, n: usize) -> Vec<String> {
        (0..n)
            .map(|i| {
                format!(
                    "{}:{}/{volname}_brick{i}",
                    SERVERS[i % SERVERS.len()],
                    self.path("bricks")
                )
            })
            .collect()
    }
}

/// `volume info --xml` for one volume made of `bricks` in subvolumes of `replica`.
pub fn volume_info_xml(volname: &str, status: &str, replica: u32, bricks: &[String]) -> String {
    let status_code = match status {
        "Created" => 0,
        "Started" => 1,
        _ => 2,
    };
    let type_str = if replica > 1 { "Replicate" } else { "Distribute" };
    let dist_count = bricks.len() as u32 / replica.max(1);
    let brick_xml: String = bricks
        .iter()
        .map(|b| {
            format!(
                "<brick uuid=\"00000000-0000-0000-0000-000000000001\"><name>{b}</name>\
                 <hostUuid>00000000-0000-0000-0000-000000000001</hostUuid>\
                 <isArbiter>0</isArbiter></brick>"
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>
<cliOutput><opRet>0</opRet><opErrno>0</opErrno><opErrstr/><volInfo><volumes><volume>\
<name>{volname}</name><id>8f3c3c0e-6c6b-4e62-9d4a-2f8f7a1f0b11</id>\
<status>{status_code}</status><statusStr>{status}</statusStr>\
<snapshotCount>0</snapshotCount><brickCount>{count}</brickCount><distCount>{dist_count}</distCount>\
<replicaCount>{replica}</replicaCount><arbiterCount>0</arbiterCount><disperseCount>0</disperseCount>\
<redundancyCount>0</redundancyCount><type>2</type><typeStr>{type_str}</typeStr><transport>0</transport>\
<bricks>{brick_xml}</bricks><optCount>0</optCount><options/></volume><count>1</count>\
</volumes></volInfo></cliOutput>",
        count = bricks.len(),
    )
}

/// `volume status --xml` for one volume with every brick in `bricks` online.
pub fn volume_status_xml(volname: &str, bricks: &[String]) -> String {
    let nodes: String = bricks
        .iter()
        .enumerate()
        .filter_map(|(i, b)| {
            let (host, path) = b.split_once(':')?;
            Some(format!(
                "<node><hostname>{host}</hostname><path>{path}</path>\
                 <peerid>00000000-0000-0000-0000-00000000000{}</peerid><status>1</status>\
                 <port>{}</port><ports><tcp>{}</tcp><rdma>N/A</rdma></ports><pid>{}</pid></node>",
                i % 10,
                49152 + i,
                49152 + i,
                3000 + i
            ))
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>
<cliOutput><opRet>0</opRet><opErrno>0</opErrno><opErrstr/><volStatus><volumes><volume>\
<volName>{volname}</volName><nodeCount>{}</nodeCount>{nodes}</volume></volumes></volStatus>\
</cliOutput>",
        bricks.len()
    )
}

/// `peer status --xml` with every host in `peers` connected and in the cluster.
pub fn peer_status_xml(peers: &[&str]) -> String {
    let peer_xml: String = peers
        .iter()
        .enumerate()
        .map(|(i, p)| {
            format!(
                "<peer><uuid>00000000-0000-0000-0000-00000000010{i}</uuid><hostname>{p}</hostname>\
                 <hostnames><hostname>{p}</hostname></hostnames><connected>1</connected>\
                 <state>3</state><stateStr>Peer in Cluster</stateStr></peer>"
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>
<cliOutput><opRet>0</opRet><opErrno>0</opErrno><opErrstr/><peerStatus>{peer_xml}</peerStatus>\
</cliOutput>"
    )
}

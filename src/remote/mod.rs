// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! The remote executor.
//!
//! Runs shell command strings on named hosts and returns the (exit status, stdout, stderr)
//! triple. Remote hosts are reached with the system `ssh` client, reusing one master connection
//! per host; hosts listed as local are run with `bash -c` directly.
//!
//! A non-zero exit status is not an error: it is returned in the [`CmdResult`] so that callers
//! can assert on it. Only failing to reach the host at all produces [`Error::Transport`].

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    os::unix::process::ExitStatusExt,
    process::{Output, Stdio},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use {futures::future, log::debug, tokio::io::AsyncWriteExt, tokio::process::Command};

use crate::{
    config::{Config, SshConfig},
    error::{Error, Result},
    host::{hosts_from_config, Host},
};

pub mod cmdlog;
pub mod process;
pub mod quote;

pub use cmdlog::CommandLog;
pub use process::IoProcess;
pub use quote::quote;

/// The result of running one command: exit status, stdout and stderr.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct CmdResult {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdResult {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    fn from_output(output: Output) -> Self {
        let status = match output.status.code() {
            Some(code) => code,
            None => 128 + output.status.signal().unwrap_or(0),
        };
        CmdResult {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// The most recent command that exited non-zero, kept so that a failing test cell can report it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailedCommand {
    pub host: String,
    pub command: String,
    pub result: CmdResult,
}

/// Substrings of ssh's own diagnostics that mean the command never ran.
const SSH_TRANSPORT_MARKERS: [&str; 6] = [
    "ssh:",
    "Permission denied",
    "Connection refused",
    "Connection timed out",
    "Host key verification failed",
    "Connection closed by",
];

#[derive(Debug)]
pub struct Executor {
    ssh: SshConfig,
    hosts: HashMap<String, Host>,
    local_hosts: HashSet<String>,
    /// Environment for locally executed commands.
    local_env: Vec<(String, String)>,
    log: Arc<CommandLog>,
    last_failure: Arc<Mutex<Option<FailedCommand>>>,
    async_counter: AtomicU64,
}

impl Executor {
    pub fn new(config: &Config, log: CommandLog) -> Result<Self> {
        let hosts = hosts_from_config(config)?
            .into_iter()
            .map(|h| (h.name().to_string(), h))
            .collect();
        let mut local_hosts: HashSet<String> = config.ssh.local_hosts.iter().cloned().collect();
        local_hosts.insert("localhost".to_string());
        local_hosts.insert("127.0.0.1".to_string());

        Ok(Executor {
            ssh: config.ssh.clone(),
            hosts,
            local_hosts,
            local_env: Vec::new(),
            log: Arc::new(log),
            last_failure: Arc::new(Mutex::new(None)),
            async_counter: AtomicU64::new(0),
        })
    }

    /// Add an environment variable to every locally executed command.
    pub fn with_local_env(mut self, key: &str, value: &str) -> Self {
        self.local_env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    pub fn default_user(&self) -> &str {
        &self.ssh.user
    }

    pub fn is_local(&self, host: &str) -> bool {
        self.local_hosts.contains(host)
    }

    pub fn last_failure(&self) -> Option<FailedCommand> {
        self.last_failure.lock().unwrap().clone()
    }

    pub fn clear_last_failure(&self) {
        *self.last_failure.lock().unwrap() = None;
    }

    /// The user a command on `host` runs as when the caller does not name one.
    fn user_for<'a>(&'a self, host: &str) -> &'a str {
        self.hosts
            .get(host)
            .and_then(|h| h.user())
            .unwrap_or(self.ssh.user.as_str())
    }

    /// Build the local process that carries `command` to `host`.
    fn build_command(&self, host: &str, user: &str, command: &str) -> Command {
        if self.is_local(host) {
            let mut cmd = Command::new("bash");
            cmd.arg("-c").arg(command);
            if let Ok(home) = std::env::var("HOME") {
                cmd.current_dir(home);
            }
            cmd.envs(self.local_env.iter().map(|(k, v)| (k, v)));
            return cmd;
        }

        let port = self
            .hosts
            .get(host)
            .and_then(|h| h.port())
            .unwrap_or(self.ssh.port);

        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes"])
            .args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", &format!("ConnectTimeout={}", self.ssh.connect_timeout)])
            .args(["-o", "ControlMaster=auto"])
            .args(["-o", "ControlPath=/tmp/glusto-ssh-%C"])
            .args(["-o", &format!("ControlPersist={}", self.ssh.control_persist)])
            .args(["-p", &port.to_string()])
            .args(["-l", user]);
        if let Some(key) = &self.ssh.identity_file {
            cmd.args(["-i", key]);
        }
        // ssh starts the remote command in $HOME through the user's shell; wrap it in bash so that
        // shell constructs behave the same on every host.
        cmd.arg(host).arg(format!("bash -c {}", quote(command)));
        cmd
    }

    /// Run `command` on `host` as the configured default user.
    pub async fn run(&self, host: &str, command: &str) -> Result<CmdResult> {
        let user = self.user_for(host).to_string();
        self.run_as(host, command, &user).await
    }

    /// Run `command` on `host` as `user` and wait for it to finish.
    pub async fn run_as(&self, host: &str, command: &str, user: &str) -> Result<CmdResult> {
        self.log.command(host, user, command);
        let output = self
            .build_command(host, user, command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::transport(host, format!("could not spawn command: {e}")))?;
        complete(
            &self.log,
            &self.last_failure,
            !self.is_local(host),
            host,
            command,
            output,
        )
    }

    /// Run `command` on every host in `hosts` at once and wait for all of them.
    ///
    /// No ordering is implied between the hosts. If any host cannot be reached, the first such
    /// transport error is returned.
    pub async fn run_parallel(
        &self,
        hosts: &[String],
        command: &str,
    ) -> Result<BTreeMap<String, CmdResult>> {
        let futures = hosts.iter().map(|host| async move {
            let result = self.run(host, command).await;
            (host.clone(), result)
        });
        let mut results = BTreeMap::new();
        for (host, result) in future::join_all(futures).await {
            results.insert(host, result?);
        }
        Ok(results)
    }

    /// Start `command` on `host` in the background and return a handle to it.
    ///
    /// Only spawning happens before this returns. The command runs in its own session on the host
    /// and records its process group in a pid file, so that [`IoProcess::terminate`] can signal the
    /// whole group.
    pub fn run_async(&self, host: &str, command: &str) -> Result<IoProcess> {
        let user = self.user_for(host).to_string();
        self.run_async_as(host, command, &user)
    }

    pub fn run_async_as(&self, host: &str, command: &str, user: &str) -> Result<IoProcess> {
        let n = self.async_counter.fetch_add(1, Ordering::SeqCst);
        let pidfile = format!("/tmp/glusto-async-{}-{n}.pid", std::process::id());
        let inner = format!("echo $$ > {pidfile}; {command}");
        let wrapped =
            format!("setsid -w bash -c {}; rc=$?; rm -f {pidfile}; exit $rc", quote(&inner));

        self.log.command(host, user, command);
        let child = self
            .build_command(host, user, &wrapped)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| Error::transport(host, format!("could not spawn command: {e}")))?;
        debug!("started async command on {host} (pid file {pidfile})");

        let log = Arc::clone(&self.log);
        let last_failure = Arc::clone(&self.last_failure);
        let is_ssh = !self.is_local(host);
        let task_host = host.to_string();
        let task_command = command.to_string();
        let local_pid = child.id();
        let task = tokio::spawn(async move {
            let output = child
                .wait_with_output()
                .await
                .map_err(|e| Error::transport(&task_host, format!("lost child process: {e}")))?;
            complete(&log, &last_failure, is_ssh, &task_host, &task_command, output)
        });

        Ok(IoProcess::new(
            host.to_string(),
            command.to_string(),
            pidfile,
            local_pid,
            task,
        ))
    }

    /// Write `contents` to `path` on `host`, creating parent directories, and set its mode.
    pub async fn upload(&self, host: &str, contents: &[u8], path: &str, mode: u32) -> Result<bool> {
        let user = self.user_for(host).to_string();
        let dir = match path.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => dir,
            _ => "/",
        };
        let command = format!(
            "mkdir -p {} && cat > {} && chmod {mode:o} {}",
            quote(dir),
            quote(path),
            quote(path)
        );
        self.log.command(host, &user, &command);

        let mut child = self
            .build_command(host, &user, &command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::transport(host, format!("could not spawn command: {e}")))?;

        let Some(mut stdin) = child.stdin.take() else {
            return Err(Error::transport(host, "stdin was not captured"));
        };
        stdin
            .write_all(contents)
            .await
            .map_err(|e| Error::transport(host, format!("could not send file contents: {e}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::transport(host, format!("lost child process: {e}")))?;
        let result = complete(
            &self.log,
            &self.last_failure,
            !self.is_local(host),
            host,
            &command,
            output,
        )?;
        Ok(result.success())
    }
}

/// Turn a finished process into a triple, logging it and classifying ssh's own failures as
/// transport errors.
fn complete(
    log: &CommandLog,
    last_failure: &Mutex<Option<FailedCommand>>,
    is_ssh: bool,
    host: &str,
    command: &str,
    output: Output,
) -> Result<CmdResult> {
    let result = CmdResult::from_output(output);
    log.result(host, &result);

    if is_ssh
        && result.status == 255
        && SSH_TRANSPORT_MARKERS
            .iter()
            .any(|marker| result.stderr.contains(marker))
    {
        return Err(Error::transport(host, result.stderr.trim().to_string()));
    }

    if !result.success() {
        *last_failure.lock().unwrap() = Some(FailedCommand {
            host: host.to_string(),
            command: command.to_string(),
            result: result.clone(),
        });
    }

    Ok(result)
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::time::Duration;

use {
    log::warn,
    nix::{sys::signal, unistd::Pid},
    tokio::{sync::OnceCell, task::JoinHandle},
};

use crate::{
    error::{Error, Result},
    remote::{quote, CmdResult, Executor},
    wait::wait_until,
};

/// A handle to a command running in the background on a host.
///
/// Handles are never awaited implicitly. [`IoProcess::await_completion`] may be called any number
/// of times; every call after the first returns the same triple.
#[derive(Debug)]
pub struct IoProcess {
    host: String,
    command: String,
    pidfile: String,
    local_pid: Option<u32>,
    task: tokio::sync::Mutex<Option<JoinHandle<Result<CmdResult>>>>,
    result: OnceCell<Result<CmdResult>>,
}

impl IoProcess {
    pub(crate) fn new(
        host: String,
        command: String,
        pidfile: String,
        local_pid: Option<u32>,
        task: JoinHandle<Result<CmdResult>>,
    ) -> Self {
        IoProcess {
            host,
            command,
            pidfile,
            local_pid,
            task: tokio::sync::Mutex::new(Some(task)),
            result: OnceCell::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Wait for the command to exit and return its triple.
    pub async fn await_completion(&self) -> Result<CmdResult> {
        self.result
            .get_or_init(|| async {
                let Some(task) = self.task.lock().await.take() else {
                    return Err(Error::transport(&self.host, "process handle already consumed"));
                };
                match task.await {
                    Ok(result) => result,
                    Err(e) => Err(Error::transport(
                        &self.host,
                        format!("background task failed: {e}"),
                    )),
                }
            })
            .await
            .clone()
    }

    /// Whether the command has exited. Does not block.
    pub fn is_complete(&self) -> bool {
        if self.result.initialized() {
            return true;
        }
        match self.task.try_lock() {
            Ok(guard) => guard.as_ref().map_or(true, |task| task.is_finished()),
            // Someone is awaiting the task right now, so it has not been reaped yet.
            Err(_) => false,
        }
    }

    /// Send SIGTERM to the command's process group on its host.
    ///
    /// Cancellation is cooperative: the handle becomes complete once the process actually exits.
    /// If the carrier process on the controller is still running after a grace period, it is
    /// signalled as well.
    pub async fn terminate(&self, executor: &Executor) -> Result<()> {
        if self.is_complete() {
            return Ok(());
        }
        let pidfile = quote(&self.pidfile);
        let kill = format!(
            "test -f {pidfile} && kill -TERM -- -$(cat {pidfile}); rm -f {pidfile}; true"
        );
        executor.run(&self.host, &kill).await?;

        let exited = wait_until(
            Duration::from_secs(10),
            Duration::from_millis(500),
            move || async move { self.is_complete() },
        )
        .await;

        if !exited {
            if let Some(pid) = self.local_pid {
                warn!(
                    "background command on {} did not exit after SIGTERM, signalling pid {pid}",
                    self.host
                );
                if let Err(e) = signal::kill(Pid::from_raw(pid as i32), signal::Signal::SIGTERM) {
                    warn!("could not signal pid {pid}: {e}");
                }
            }
        }
        Ok(())
    }
}

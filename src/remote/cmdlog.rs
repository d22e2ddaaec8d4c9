// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! The command log.
//!
//! Every command sent to a host, and the triple it returned, is appended to `glusto.log` in the
//! log directory and to a per-host `<host>.log` next to it. Lines are timestamped and carry the
//! current test id, and each test is bracketed by `START TEST <id>` / `END TEST <id>` markers so
//! that one test's commands can be cut out of the log afterwards with
//! `awk '/START TEST <id>/,/END TEST <id>/'`.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::Write,
    path::PathBuf,
    sync::Mutex,
};

use chrono::Local;
use log::{debug, info, warn};

use super::CmdResult;

#[derive(Debug, Clone, Copy)]
enum Level {
    Info,
    Debug,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        }
    }
}

#[derive(Debug)]
pub struct CommandLog {
    dir: Option<PathBuf>,
    main: Mutex<Option<File>>,
    per_host: Mutex<HashMap<String, File>>,
    test_id: Mutex<Option<String>>,
}

impl CommandLog {
    /// Open (creating if needed) the command log in `dir`.
    pub fn new(dir: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let dir = PathBuf::from(dir);
        let main = open_append(&dir.join("glusto.log"))?;
        Ok(CommandLog {
            dir: Some(dir),
            main: Mutex::new(Some(main)),
            per_host: Mutex::new(HashMap::new()),
            test_id: Mutex::new(None),
        })
    }

    /// A log that only forwards to the `log` facade.
    pub fn disabled() -> Self {
        CommandLog {
            dir: None,
            main: Mutex::new(None),
            per_host: Mutex::new(HashMap::new()),
            test_id: Mutex::new(None),
        }
    }

    pub fn test_id(&self) -> Option<String> {
        self.test_id.lock().unwrap().clone()
    }

    pub fn start_test(&self, id: &str) {
        *self.test_id.lock().unwrap() = Some(id.to_string());
        info!("START TEST {id}");
        self.write_marker(&format!("START TEST {id}"));
    }

    pub fn end_test(&self, id: &str) {
        info!("END TEST {id}");
        self.write_marker(&format!("END TEST {id}"));
        *self.test_id.lock().unwrap() = None;
    }

    /// Record that `command` is about to be executed on `host` as `user`.
    pub fn command(&self, host: &str, user: &str, command: &str) {
        info!("{user}@{host}: {command}");
        self.write(host, Level::Info, &format!("{user}@{host}: {command}"));
    }

    /// Record the triple that a command on `host` returned.
    pub fn result(&self, host: &str, result: &CmdResult) {
        info!("{host}: exit={}", result.status);
        self.write(host, Level::Info, &format!("{host}: exit={}", result.status));
        if !result.stdout.is_empty() {
            debug!("{host}: stdout:\n{}", result.stdout);
            self.write(host, Level::Debug, &format!("{host}: stdout:\n{}", result.stdout));
        }
        if !result.stderr.is_empty() {
            debug!("{host}: stderr:\n{}", result.stderr);
            self.write(host, Level::Debug, &format!("{host}: stderr:\n{}", result.stderr));
        }
    }

    fn format_line(&self, level: Level, message: &str) -> String {
        let tag = match self.test_id() {
            Some(id) => format!("[{id}]"),
            None => "[-]".to_string(),
        };
        format!(
            "{} {} {} {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level.as_str(),
            tag,
            message
        )
    }

    fn write(&self, host: &str, level: Level, message: &str) {
        let Some(dir) = &self.dir else {
            return;
        };
        let line = self.format_line(level, message);

        if let Some(main) = self.main.lock().unwrap().as_mut() {
            if let Err(e) = main.write_all(line.as_bytes()) {
                warn!("could not write to command log: {e}");
            }
        }

        let mut per_host = self.per_host.lock().unwrap();
        if !per_host.contains_key(host) {
            match open_append(&dir.join(format!("{host}.log"))) {
                Ok(mut file) => {
                    // A host first reached in the middle of a test still gets the test's start.
                    if let Some(id) = self.test_id() {
                        let marker = marker_line(&format!("START TEST {id}"));
                        if let Err(e) = file.write_all(marker.as_bytes()) {
                            warn!("could not write to command log for host '{host}': {e}");
                        }
                    }
                    per_host.insert(host.to_string(), file);
                }
                Err(e) => {
                    warn!("could not open command log for host '{host}': {e}");
                    return;
                }
            }
        }
        if let Some(file) = per_host.get_mut(host) {
            if let Err(e) = file.write_all(line.as_bytes()) {
                warn!("could not write to command log for host '{host}': {e}");
            }
        }
    }

    fn write_marker(&self, marker: &str) {
        if self.dir.is_none() {
            return;
        }
        let line = marker_line(marker);
        if let Some(main) = self.main.lock().unwrap().as_mut() {
            if let Err(e) = main.write_all(line.as_bytes()) {
                warn!("could not write to command log: {e}");
            }
        }
        for (host, file) in self.per_host.lock().unwrap().iter_mut() {
            if let Err(e) = file.write_all(line.as_bytes()) {
                warn!("could not write to command log for host '{host}': {e}");
            }
        }
    }
}

fn marker_line(marker: &str) -> String {
    format!(
        "{} INFO {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        marker
    )
}

fn open_append(path: &PathBuf) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

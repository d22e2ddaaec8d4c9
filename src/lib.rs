// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

pub mod cluster;
pub mod commands;
pub mod config;
pub mod error;
pub mod fixture;
pub mod host;
pub mod io;
pub mod mount;
pub mod parse;
pub mod remote;
pub mod report;
pub mod runner;
pub mod scenarios;
pub mod test_env;
pub mod wait;

pub use error::{Error, Result};

pub fn default_config_path() -> String {
    match std::env::var("GLUSTO_CONFIG") {
        Ok(conf) => conf,
        Err(_) => "/etc/glusto/glusto.yml".to_string(),
    }
}

pub fn default_log_dir() -> String {
    match std::env::var("GLUSTO_LOG_DIR") {
        Ok(dir) => dir,
        Err(_) => "/tmp/glusto_logs".to_string(),
    }
}

/// Where `glusto run` writes its report when no path is given on the command line.
pub fn default_report_path(log_dir: &str) -> String {
    match std::env::var("GLUSTO_REPORT") {
        Ok(report) => report,
        Err(_) => format!("{log_dir}/report.json"),
    }
}

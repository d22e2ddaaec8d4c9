// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::{path::Path, sync::Arc};

use clap::Args;

use crate::{
    commands::{handled_error, load_cluster, Cli, Handle, HandledResult},
    runner::{RunOptions, Runner},
    scenarios,
};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Stop after the first cell that fails.
    #[arg(long)]
    pub fail_fast: bool,

    /// Where to write the JSON report (defaults to $GLUSTO_REPORT, then <log_dir>/report.json).
    #[arg(long)]
    pub report: Option<String>,

    /// Only run cells whose id contains this string.
    #[arg(long)]
    pub filter: Option<String>,
}

pub async fn run(cli: &Cli, args: &RunArgs) -> HandledResult<()> {
    let cluster = Arc::new(load_cluster(cli)?);
    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| crate::default_report_path(&cluster.config().log_dir()));

    let runner = Runner::new(
        cluster,
        RunOptions {
            fail_fast: args.fail_fast,
            filter: args.filter.clone(),
        },
    );
    let report = runner.run(&scenarios::all()).await;

    report
        .write(Path::new(&report_path))
        .handle_err(|e| eprintln!("Could not write report to '{report_path}': {e}"))?;

    for cell in &report.cells {
        println!(
            "{:<8} {}-{}-{} ({:.0}s){}",
            cell.status,
            cell.test,
            cell.layout,
            cell.protocol,
            cell.duration_secs,
            cell.reason
                .as_deref()
                .map(|r| format!(": {r}"))
                .unwrap_or_default()
        );
    }
    println!("{}", report.summary());
    println!("report: {report_path}");

    if report.success() {
        Ok(())
    } else {
        handled_error()
    }
}

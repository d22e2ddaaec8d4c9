// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use clap::Args;

use crate::commands::{handled_error, load_cluster, Cli, Handle, HandledResult};

#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
    /// Hosts to run on (defaults to every server and client).
    #[arg(long, num_args = 1..)]
    pub hosts: Vec<String>,

    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

pub async fn exec(cli: &Cli, args: &ExecArgs) -> HandledResult<()> {
    let cluster = load_cluster(cli)?;
    let hosts = if args.hosts.is_empty() {
        let mut hosts: Vec<String> = cluster
            .servers()
            .iter()
            .chain(cluster.clients())
            .cloned()
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    } else {
        args.hosts.clone()
    };
    let command = args.command.join(" ");

    let results = cluster
        .executor()
        .run_parallel(&hosts, &command)
        .await
        .handle_err(|e| eprintln!("{e}"))?;

    let mut all_ok = true;
    for (host, result) in &results {
        println!("== {host} (exit={}) ==", result.status);
        print!("{}", result.stdout);
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
        }
        all_ok &= result.success();
    }

    if all_ok {
        Ok(())
    } else {
        handled_error()
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use clap::Parser;

use glusto_lib::commands::{self, Cli};

/// The glusto binary runs the test cases against the configured test bed, and offers a few
/// commands for poking at it by hand.
fn main() {
    let args = Cli::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("GLUSTO_LOG", default_filter))
        .init();

    if commands::main(&args).is_err() {
        std::process::exit(1);
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

pub mod exec;
pub mod query;
pub mod run;
pub mod validate;

use {exec::ExecArgs, query::QueryArgs, run::RunArgs};

use clap::{Parser, Subcommand};

use crate::cluster::Cluster;

/// A `HandledError` represents an error that has already been handled. When you call a function
/// that returns a `HandledError` or `HandledResult`, you don't need to do anything with that error,
/// other than just be aware that it happened, and return it on to your caller.
///
/// `main()` has a special responsibility: since its "caller" is, in a certain sense, the operating
/// system, `main()` must return a nonzero exit status when it gets a `HandledError`.
///
/// The primary way to construct a `HandledError` is with the `handle_err()` function, which turns a
/// generic error into a `HandledError`, and also runs some caller-provided code to handle the
/// error. That provided code would normally do something like report the error to stderr.
///
/// A `HandledError` intentionally has no data about what the specific error was; the process of
/// handling the error "consumes" that information, and it is no longer needed as the error was
/// already appropriately handled.
#[derive(Debug, PartialEq)]
pub struct HandledError {}

pub type HandledResult<T> = std::result::Result<T, HandledError>;

pub fn handled_error() -> HandledResult<()> {
    HandledResult::Err(HandledError {})
}

pub trait Handle<T, F> {
    fn handle_err(self, handler: F) -> HandledResult<T>;
}

impl<T, E, F: FnOnce(E)> Handle<T, F> for std::result::Result<T, E> {
    /// Handle an error by running the provided `handler` code, giving it the error.
    ///
    /// Then, return a `HandledResult`, so that transitive callers of this function know that they
    /// do not need to do anything further to handle the error.
    fn handle_err(self, handler: F) -> HandledResult<T> {
        self.map_err(|e| {
            handler(e);
            HandledError {}
        })
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// The test bed description (defaults to $GLUSTO_CONFIG, then /etc/glusto/glusto.yml).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the registered test cases and write a report.
    Run(RunArgs),
    /// Load the configuration and print the test bed it describes.
    Validate,
    /// Run a shell command on several hosts at once.
    Exec(ExecArgs),
    /// Print one parsed CLI surface as JSON.
    Query(QueryArgs),
}

/// Load the cluster described by the config file named on the command line.
fn load_cluster(cli: &Cli) -> HandledResult<Cluster> {
    Cluster::new(cli.config.as_deref()).handle_err(|e| eprintln!("Could not load test bed: {e}"))
}

pub fn main(cli: &Cli) -> HandledResult<()> {
    if let Commands::Validate = &cli.command {
        return validate::validate(cli);
    }

    let rt = tokio::runtime::Runtime::new()
        .handle_err(|e| eprintln!("Error launching tokio runtime: {e}"))?;

    rt.block_on(async {
        match &cli.command {
            Commands::Run(args) => run::run(cli, args).await,
            Commands::Exec(args) => exec::exec(cli, args).await,
            Commands::Query(args) => query::query(cli, args).await,
            Commands::Validate => unreachable!(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_takes_the_command_after_dashes() {
        let cli = Cli::try_parse_from([
            "glusto", "--config", "bed.yml", "exec", "--hosts", "server1", "server2", "--", "uname",
            "-r",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("bed.yml"));
        match cli.command {
            Commands::Exec(args) => {
                assert_eq!(args.hosts, vec!["server1", "server2"]);
                assert_eq!(args.command, vec!["uname", "-r"]);
            }
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn run_flags() {
        let cli = Cli::try_parse_from(["glusto", "run", "--fail-fast", "--filter", "quota"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert!(args.fail_fast);
                assert_eq!(args.filter.as_deref(), Some("quota"));
                assert_eq!(args.report, None);
            }
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn query_surfaces_are_kebab_case() {
        let cli = Cli::try_parse_from([
            "glusto", "query", "volume-info", "--mnode", "server1", "--volume", "v",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Query(_)));
        assert!(Cli::try_parse_from(["glusto", "query", "volume_info"]).is_err());
    }
}

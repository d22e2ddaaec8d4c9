// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Parsers for the storage CLI's output.
//!
//! Each surface has a pure `parse_*` function, which turns the CLI's stdout into typed records,
//! and a `get_*` query, which runs the command through the executor and parses the result. A query
//! returns `Ok(None)` when the command fails or its output cannot be parsed, and only returns an
//! error when the host could not be reached.

use log::warn;

use crate::{error::Result, remote::Executor};

pub mod heal;
pub mod peer;
pub mod quota;
pub mod rebalance;
pub mod session;
pub mod snapshot;
pub mod volume;
pub mod xml;

pub use xml::XmlElement;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ParseError(String);

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError(message.into())
    }
}

/// Run `command` on `host` and parse its stdout with `parse`.
pub(crate) async fn query<T, F>(
    executor: &Executor,
    host: &str,
    command: &str,
    parse: F,
) -> Result<Option<T>>
where
    F: FnOnce(&str) -> std::result::Result<T, ParseError>,
{
    let result = executor.run(host, command).await?;
    if !result.success() {
        warn!(
            "'{command}' failed on {host} (exit={}): {}",
            result.status,
            result.stderr.trim()
        );
        return Ok(None);
    }
    match parse(&result.stdout) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!("could not parse output of '{command}' on {host}: {e}");
            Ok(None)
        }
    }
}

/// Parse the text of a number the CLI printed, treating `N/A`, `-` and empty as absent.
pub(crate) fn optional_number(text: &str) -> Option<u64> {
    match text.trim() {
        "" | "N/A" | "-" => None,
        other => other.parse().ok(),
    }
}

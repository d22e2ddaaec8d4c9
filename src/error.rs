// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::sync::Arc;

/// Errors that abort a test cell.
///
/// Product-level failures (a CLI command exiting non-zero, output that cannot be parsed, an
/// operation that does not finish in time) are never represented here: the executor returns them
/// inside a [`crate::remote::CmdResult`], parsers return `None`, and lifecycle helpers return
/// `false`. What is left is the set of conditions that make continuing the cell meaningless.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The command could not be delivered to the host: ssh failed to connect, authentication was
    /// denied, or the local process could not be spawned.
    #[error("transport error on host '{host}': {reason}")]
    Transport { host: String, reason: String },

    /// Structural misconfiguration: not enough servers, no brick root, unknown layout name.
    #[error("fixture error: {0}")]
    Fixture(String),

    /// The configuration file is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A test assertion failed.
    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl Error {
    pub fn transport(host: &str, reason: impl Into<String>) -> Self {
        Error::Transport {
            host: host.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error should cause the cell to be reported as skipped rather than failed.
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::Fixture(msg) if msg.starts_with(SKIP_PREFIX))
    }

    /// A fixture error that marks the cell as skipped.
    pub fn skip(reason: impl std::fmt::Display) -> Self {
        Error::Fixture(format!("{SKIP_PREFIX}{reason}"))
    }
}

const SKIP_PREFIX: &str = "skipped: ";

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Turn a test condition into a `Result`, so that test bodies can use `?` on assertions and still
/// have their teardown run.
pub fn check(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::Assertion(message.into()))
    }
}

/// Like [`check`], but for comparing two values, including both in the message on mismatch.
pub fn check_eq<T: PartialEq + std::fmt::Debug>(left: T, right: T, what: &str) -> Result<()> {
    if left == right {
        Ok(())
    } else {
        Err(Error::Assertion(format!(
            "{what}: left={left:?} right={right:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_errors_are_recognised() {
        assert!(Error::skip("need 6 servers, have 4").is_skip());
        assert!(!Error::Fixture("no brick_root for server1".into()).is_skip());
        assert!(!Error::transport("server1", "connection refused").is_skip());
    }

    #[test]
    fn check_helpers() {
        assert!(check(true, "fine").is_ok());
        assert!(matches!(check(false, "nope"), Err(Error::Assertion(m)) if m == "nope"));
        assert!(check_eq(1, 1, "count").is_ok());
        assert!(check_eq("a", "b", "arequal").is_err());
    }
}

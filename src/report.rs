// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! The machine-readable report of a run: one entry per cell.

use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    /// A test assertion did not hold.
    Failed,
    Skipped,
    /// Setup, teardown or the transport failed, so the cell says nothing about the product.
    Error,
}

impl Status {
    /// The status of a cell whose setup or body ended with `error`.
    pub fn of_error(error: &Error) -> Self {
        match error {
            e if e.is_skip() => Status::Skipped,
            Error::Assertion(_) => Status::Failed,
            _ => Status::Error,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Failed | Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
            Status::Error => "error",
        };
        f.pad(s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CellReport {
    pub test: String,
    pub layout: String,
    pub protocol: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_secs: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub cells: Vec<CellReport>,
}

impl Report {
    pub fn push(&mut self, cell: CellReport) {
        self.cells.push(cell);
    }

    /// True iff no cell failed or errored. Skipped cells do not count against a run.
    pub fn success(&self) -> bool {
        !self.cells.iter().any(|c| c.status.is_failure())
    }

    pub fn count(&self, status: Status) -> usize {
        self.cells.iter().filter(|c| c.status == status).count()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Io(std::sync::Arc::new(std::io::Error::other(e))))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// A one-line summary, e.g. `3 passed, 1 failed, 0 errors, 2 skipped`.
    pub fn summary(&self) -> String {
        format!(
            "{} passed, {} failed, {} errors, {} skipped",
            self.count(Status::Passed),
            self.count(Status::Failed),
            self.count(Status::Error),
            self.count(Status::Skipped)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(status: Status) -> CellReport {
        CellReport {
            test: "t".into(),
            layout: "dispersed".into(),
            protocol: "glusterfs".into(),
            status,
            reason: None,
            duration_secs: 1.5,
        }
    }

    #[test]
    fn skips_do_not_fail_a_run() {
        let mut report = Report::default();
        report.push(cell(Status::Passed));
        report.push(cell(Status::Skipped));
        assert!(report.success());
        report.push(cell(Status::Error));
        assert!(!report.success());
        assert_eq!(report.summary(), "1 passed, 0 failed, 1 errors, 1 skipped");
    }

    #[test]
    fn statuses_serialize_lowercase() {
        let json = serde_json::to_value(cell(Status::Failed)).unwrap();
        assert_eq!(json["status"], "failed");
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(Status::of_error(&Error::skip("few servers")), Status::Skipped);
        assert_eq!(Status::of_error(&Error::Assertion("x".into())), Status::Failed);
        assert_eq!(Status::of_error(&Error::transport("h", "down")), Status::Error);
    }
}

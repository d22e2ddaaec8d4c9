// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Runs test cases cell by cell and collects the report.

use std::{sync::Arc, time::Instant};

use log::{error, info, warn};

use crate::{
    cluster::Cluster,
    error::{Error, Result},
    fixture::{expand_matrix, CellSpec, Fixture, TestCase},
    parse::{heal::get_heal_info, peer::get_peer_status, volume::get_one_volume_info},
    report::{CellReport, Report, Status},
};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after the first cell that fails or errors.
    pub fail_fast: bool,
    /// Only run cells whose id contains this string.
    pub filter: Option<String>,
}

pub struct Runner {
    fixture: Fixture,
    options: RunOptions,
}

impl Runner {
    pub fn new(cluster: Arc<Cluster>, options: RunOptions) -> Self {
        Self::with_fixture(Fixture::new(cluster), options)
    }

    pub fn with_fixture(fixture: Fixture, options: RunOptions) -> Self {
        Runner { fixture, options }
    }

    fn selected(&self, spec: &CellSpec) -> bool {
        self.options
            .filter
            .as_deref()
            .map_or(true, |filter| spec.id().contains(filter))
    }

    /// Run every cell of every case, sequentially, in registration order.
    pub async fn run(&self, cases: &[Box<dyn TestCase>]) -> Report {
        let mut report = Report::default();
        'cases: for case in cases {
            let cells = match expand_matrix(case.as_ref()) {
                Ok(cells) => cells,
                Err(e) => {
                    error!("test case {} is malformed: {e}", case.name());
                    report.push(CellReport {
                        test: case.name().to_string(),
                        layout: String::new(),
                        protocol: String::new(),
                        status: Status::Error,
                        reason: Some(e.to_string()),
                        duration_secs: 0.0,
                    });
                    if self.options.fail_fast {
                        break;
                    }
                    continue;
                }
            };
            for spec in cells.iter().filter(|s| self.selected(s)) {
                let cell = self.run_cell(case.as_ref(), spec).await;
                let failed = cell.status.is_failure();
                report.push(cell);
                if failed && self.options.fail_fast {
                    warn!("stopping after the first failure");
                    break 'cases;
                }
            }
        }
        info!("{}", report.summary());
        report
    }

    /// Prepare, set up, run and tear down one cell.
    pub async fn run_cell(&self, case: &dyn TestCase, spec: &CellSpec) -> CellReport {
        let id = spec.id();
        let cluster = self.fixture.cluster().clone();
        let executor = cluster.executor();
        let started = Instant::now();
        executor.log().start_test(&id);
        executor.clear_last_failure();

        let outcome = match self.fixture.prepare(case, spec) {
            // Nothing was created, so there is nothing to tear down.
            Err(e) => Err(e),
            Ok(mut cell) => {
                let mut outcome = self.fixture.setup(case, &mut cell).await;
                if outcome.is_ok() {
                    outcome = case.run(&mut cell).await;
                }
                if let Err(e) = &outcome {
                    if !e.is_skip() {
                        self.diagnostics(&id, cell.volname(), e).await;
                    }
                }
                let teardown = self.fixture.teardown(case, &mut cell).await;
                match (outcome, teardown) {
                    (Ok(()), Err(e)) => Err(e),
                    (outcome, _) => outcome,
                }
            }
        };

        let (status, reason) = match &outcome {
            Ok(()) => (Status::Passed, None),
            Err(e) => (Status::of_error(e), Some(e.to_string())),
        };
        match status {
            Status::Passed => info!("{id}: passed"),
            Status::Skipped => info!("{id}: skipped: {}", reason.as_deref().unwrap_or("")),
            _ => error!("{id}: {status}: {}", reason.as_deref().unwrap_or("")),
        }
        executor.log().end_test(&id);

        CellReport {
            test: spec.case.clone(),
            layout: spec.layout.clone(),
            protocol: spec.protocol.to_string(),
            status,
            reason,
            duration_secs: started.elapsed().as_secs_f64(),
        }
    }

    /// Report what a failed cell looked like: the last failing command, and the product state.
    async fn diagnostics(&self, id: &str, volname: &str, failure: &Error) {
        let cluster = self.fixture.cluster();
        let executor = cluster.executor();
        let mnode = cluster.mnode();

        error!("test {id} failed: {failure}");
        if let Some(failed) = executor.last_failure() {
            error!(
                "last failing command on {}: {} (exit={})\n{}",
                failed.host,
                failed.command,
                failed.result.status,
                failed.result.stderr.trim()
            );
        }
        let dump = |what: &str, state: Result<Option<String>>| match state {
            Ok(Some(state)) => error!("{what}:\n{state}"),
            Ok(None) => error!("{what}: unavailable"),
            Err(e) => error!("{what}: {e}"),
        };
        dump(
            "volume info",
            get_one_volume_info(executor, mnode, volname)
                .await
                .map(|v| v.map(|v| pretty(&v))),
        );
        dump(
            "peer status",
            get_peer_status(executor, mnode)
                .await
                .map(|v| v.map(|v| pretty(&v))),
        );
        dump(
            "heal info",
            get_heal_info(executor, mnode, volname)
                .await
                .map(|v| v.map(|v| pretty(&v))),
        );
    }
}

fn pretty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unprintable: {e}>"))
}

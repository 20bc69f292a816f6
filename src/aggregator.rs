//! # Result Aggregator
//!
//! Collects outcomes in the order the controller produces them and turns them
//! into a read-only [`SessionReport`] once the session ends.

use crate::error::SessionError;
use crate::model::{Status, TestCase, TestOutcome};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::fmt;

/// Why a session stopped before running every case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AbortReason {
    /// The transport closed or failed.
    LinkLost(String),
    /// The caller requested early termination.
    Cancelled,
}

impl From<&SessionError> for AbortReason {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::LinkLost(e) => AbortReason::LinkLost(e.to_string()),
            SessionError::Cancelled => AbortReason::Cancelled,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::LinkLost(msg) => write!(f, "link lost ({})", msg),
            AbortReason::Cancelled => f.write_str("cancelled by user"),
        }
    }
}

/// Summary statistics over a list of outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub errored: usize,
    pub not_run: usize,
    /// Passed divided by cases that actually ran.
    pub pass_rate: f64,
    /// Index of the first executed case that did not pass.
    pub first_failure: Option<usize>,
}

impl SessionSummary {
    /// Computes the summary. Pure; the same input always gives the same result.
    pub fn compute(outcomes: &[TestOutcome]) -> Self {
        let mut summary = SessionSummary {
            total: outcomes.len(),
            ..Default::default()
        };

        for (i, outcome) in outcomes.iter().enumerate() {
            match outcome.status {
                Status::Pass => summary.passed += 1,
                Status::Fail => summary.failed += 1,
                Status::Timeout => summary.timed_out += 1,
                Status::Error => summary.errored += 1,
                Status::NotRun => summary.not_run += 1,
            }
            if summary.first_failure.is_none()
                && !matches!(outcome.status, Status::Pass | Status::NotRun)
            {
                summary.first_failure = Some(i);
            }
        }

        let executed = summary.executed();
        if executed > 0 {
            summary.pass_rate = summary.passed as f64 / executed as f64;
        }
        summary
    }

    pub fn count(&self, status: Status) -> usize {
        match status {
            Status::Pass => self.passed,
            Status::Fail => self.failed,
            Status::Timeout => self.timed_out,
            Status::Error => self.errored,
            Status::NotRun => self.not_run,
        }
    }

    pub fn executed(&self) -> usize {
        self.total - self.not_run
    }

    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cases: {} passed, {} failed, {} timed out, {} errors, {} not run ({:.1}% pass rate)",
            self.total,
            self.passed,
            self.failed,
            self.timed_out,
            self.errored,
            self.not_run,
            self.pass_rate * 100.0
        )
    }
}

/// One flat row of the final report, ready for a writer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRecord<'a> {
    pub case_id: &'a str,
    pub sent: f64,
    pub expected: f64,
    pub received: Option<f64>,
    pub deviation: Option<f64>,
    pub error_percent: Option<f64>,
    pub status: Status,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

impl<'a> From<&'a TestOutcome> for ReportRecord<'a> {
    fn from(o: &'a TestOutcome) -> Self {
        Self {
            case_id: &o.case_id,
            sent: o.sent_value,
            expected: o.expected_value,
            received: o.received_value,
            deviation: o.deviation(),
            error_percent: o.error_percent(),
            status: o.status,
            attempts: o.attempts,
            timestamp: o.timestamp,
        }
    }
}

/// The finished, read-only result of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    outcomes: Vec<TestOutcome>,
    summary: SessionSummary,
    aborted: Option<AbortReason>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl SessionReport {
    pub fn outcomes(&self) -> &[TestOutcome] {
        &self.outcomes
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        self.aborted.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Rows for a report writer, in execution order.
    pub fn records(&self) -> impl Iterator<Item = ReportRecord<'_>> {
        self.outcomes.iter().map(ReportRecord::from)
    }

    /// True when every case ran and passed.
    pub fn succeeded(&self) -> bool {
        !self.is_aborted() && self.summary.all_passed()
    }
}

/// Accumulates outcomes while a session runs.
#[derive(Debug)]
pub struct Aggregator {
    outcomes: Vec<TestOutcome>,
    aborted: Option<AbortReason>,
    started_at: DateTime<Utc>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            outcomes: Vec::new(),
            aborted: None,
            started_at: Utc::now(),
        }
    }

    /// Appends an outcome. Ignored once the session has been aborted.
    pub fn record(&mut self, outcome: TestOutcome) {
        if self.aborted.is_some() {
            warn!("Ignoring outcome for '{}' after abort", outcome.case_id);
            return;
        }
        self.outcomes.push(outcome);
    }

    /// Marks the session aborted and adds a `NotRun` row for each case in
    /// `remaining`.
    pub fn abort(&mut self, reason: AbortReason, remaining: &[TestCase]) {
        if self.aborted.is_some() {
            return;
        }
        info!(
            "Session aborted: {}; {} case(s) not run",
            reason,
            remaining.len()
        );
        self.outcomes
            .extend(remaining.iter().map(TestOutcome::not_run));
        self.aborted = Some(reason);
    }

    pub fn outcomes(&self) -> &[TestOutcome] {
        &self.outcomes
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::compute(&self.outcomes)
    }

    /// Closes the session and hands out the report.
    pub fn finalize(self) -> SessionReport {
        let summary = SessionSummary::compute(&self.outcomes);
        SessionReport {
            outcomes: self.outcomes,
            summary,
            aborted: self.aborted,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

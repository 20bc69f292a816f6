//! Domain types: test cases, pass criteria and per-case outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// Session-wide defaults applied when a case does not override them.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Acceptance window around the expected value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    /// Maximum absolute deviation.
    Absolute(f64),
    /// Maximum deviation as a percentage of the expected value.
    Percent(f64),
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::Absolute(0.0)
    }
}

impl Tolerance {
    /// Returns true if `received` is close enough to `expected`.
    ///
    /// A percentage tolerance against an expected value of zero degrades to
    /// an exact comparison.
    pub fn accepts(&self, received: f64, expected: f64) -> bool {
        let deviation = (received - expected).abs();
        match *self {
            Tolerance::Absolute(limit) => deviation <= limit,
            Tolerance::Percent(_) if expected == 0.0 => deviation == 0.0,
            Tolerance::Percent(limit) => deviation * 100.0 / expected.abs() <= limit,
        }
    }

    pub fn is_valid(&self) -> bool {
        let limit = match *self {
            Tolerance::Absolute(t) | Tolerance::Percent(t) => t,
        };
        limit.is_finite() && limit >= 0.0
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tolerance::Absolute(t) => write!(f, "±{}", t),
            Tolerance::Percent(p) => write!(f, "±{}%", p),
        }
    }
}

/// One test vector. Read-only once handed to the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub id: String,
    pub sent_value: f64,
    pub expected_value: f64,
    pub tolerance: Tolerance,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl TestCase {
    /// Creates a case with an exact-match tolerance and the default timeout
    /// and retry count.
    pub fn new(id: impl Into<String>, sent_value: f64, expected_value: f64) -> Self {
        Self {
            id: id.into(),
            sent_value,
            expected_value,
            tolerance: Tolerance::default(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Pure pass/fail decision for a correlated response.
    pub fn classify(&self, received: f64) -> Status {
        if self.tolerance.accepts(received, self.expected_value) {
            Status::Pass
        } else {
            Status::Fail
        }
    }
}

/// Terminal classification of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pass,
    Fail,
    Timeout,
    Error,
    /// The session aborted before this case ran.
    #[serde(rename = "NOT RUN")]
    NotRun,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
            Status::Timeout => "TIMEOUT",
            Status::Error => "ERROR",
            Status::NotRun => "NOT RUN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running one case, created once and never modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestOutcome {
    pub case_id: String,
    pub sent_value: f64,
    pub expected_value: f64,
    pub received_value: Option<f64>,
    pub status: Status,
    /// Number of frames sent for this case.
    pub attempts: u32,
    /// When the case was classified.
    pub timestamp: DateTime<Utc>,
}

impl TestOutcome {
    pub fn new(case: &TestCase, received_value: Option<f64>, status: Status, attempts: u32) -> Self {
        Self {
            case_id: case.id.clone(),
            sent_value: case.sent_value,
            expected_value: case.expected_value,
            received_value,
            status,
            attempts,
            timestamp: Utc::now(),
        }
    }

    /// Placeholder for a case skipped because the session aborted.
    pub fn not_run(case: &TestCase) -> Self {
        Self::new(case, None, Status::NotRun, 0)
    }

    /// Signed difference between received and expected value.
    pub fn deviation(&self) -> Option<f64> {
        self.received_value.map(|r| r - self.expected_value)
    }

    /// Deviation as a percentage of the expected value.
    pub fn error_percent(&self) -> Option<f64> {
        if self.expected_value == 0.0 {
            return None;
        }
        self.deviation().map(|d| d * 100.0 / self.expected_value)
    }
}

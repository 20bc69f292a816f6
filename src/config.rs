//! TOML configuration: serial line settings, session defaults and the list of
//! test cases.

use crate::controller::ControllerConfig;
use crate::error::ConfigError;
use crate::model::{TestCase, Tolerance, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT};
use crate::transport::SerialSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Defaults inherited by every case, plus controller policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionDefaults {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub tolerance: Tolerance,
    pub retry_backoff_ms: u64,
    pub retry_malformed: bool,
    pub settle_ms: u64,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            max_retries: DEFAULT_MAX_RETRIES,
            tolerance: Tolerance::default(),
            retry_backoff_ms: 0,
            retry_malformed: false,
            settle_ms: 0,
        }
    }
}

impl SessionDefaults {
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            retry_malformed: self.retry_malformed,
            settle_time: Duration::from_millis(self.settle_ms),
            ..ControllerConfig::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportSettings {
    /// Where to write the CSV report, if anywhere.
    pub csv: Option<PathBuf>,
}

/// A `[[case]]` entry as written in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseSpec {
    pub id: String,
    pub sent: f64,
    pub expected: f64,
    #[serde(default)]
    pub tolerance: Option<Tolerance>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl CaseSpec {
    /// Fills unset fields from the session defaults.
    pub fn resolve(&self, defaults: &SessionDefaults) -> TestCase {
        TestCase {
            id: self.id.clone(),
            sent_value: self.sent,
            expected_value: self.expected,
            tolerance: self.tolerance.unwrap_or(defaults.tolerance),
            timeout: Duration::from_millis(self.timeout_ms.unwrap_or(defaults.timeout_ms)),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub serial: SerialSettings,
    pub session: SessionDefaults,
    pub report: ReportSettings,
    #[serde(rename = "case")]
    pub cases: Vec<CaseSpec>,
}

impl FromStr for HarnessConfig {
    type Err = ConfigError;

    /// Parses and validates a configuration document.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: HarnessConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "serial.baud_rate",
                reason: "must be greater than zero".into(),
            });
        }
        if self.serial.serial_data_bits().is_none() {
            return Err(ConfigError::Invalid {
                field: "serial.data_bits",
                reason: format!("{} is not one of 5, 6, 7, 8", self.serial.data_bits),
            });
        }
        if self.session.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "session.timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if !self.session.tolerance.is_valid() {
            return Err(ConfigError::Invalid {
                field: "session.tolerance",
                reason: "must be a finite, non-negative number".into(),
            });
        }
        if self.cases.is_empty() {
            return Err(ConfigError::NoCases);
        }

        let mut seen = HashSet::new();
        for case in &self.cases {
            let invalid = |reason: &str| ConfigError::InvalidCase {
                id: case.id.clone(),
                reason: reason.to_string(),
            };
            if case.id.trim().is_empty() {
                return Err(invalid("id must not be empty"));
            }
            if !seen.insert(case.id.as_str()) {
                return Err(ConfigError::DuplicateId(case.id.clone()));
            }
            if !case.sent.is_finite() || !case.expected.is_finite() {
                return Err(invalid("sent and expected values must be finite"));
            }
            if case.tolerance.is_some_and(|t| !t.is_valid()) {
                return Err(invalid("tolerance must be a finite, non-negative number"));
            }
            if case.timeout_ms == Some(0) {
                return Err(invalid("timeout_ms must be greater than zero"));
            }
        }
        Ok(())
    }

    /// The resolved test cases, in file order.
    pub fn test_cases(&self) -> Vec<TestCase> {
        self.cases
            .iter()
            .map(|c| c.resolve(&self.session))
            .collect()
    }

    pub fn controller_config(&self) -> ControllerConfig {
        self.session.controller_config()
    }
}

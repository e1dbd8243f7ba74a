//! Application configuration loaded from environment variables.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::parsers::{ParserId, ParserOptions};

/// Default values used when a variable is not set.
pub mod defaults {
    pub const PARSERS: &str = "robotframework,seleniumtestresults,uftrunreport";
    pub const HISTORY: bool = true;
    pub const HISTORY_FILE_NAME: &str = "qcri.history";
    pub const LOG_FILE_NAME: &str = "qcri.log";
    pub const HTTP_TIMEOUT_SECS: u64 = 60;

    // UFT data table column names
    pub const UFT_TEST_COLUMN: &str = "test";
    pub const UFT_DESCRIPTION_COLUMN: &str = "description";
    pub const UFT_SUBJECT_COLUMN: &str = "subject";
    pub const UFT_SUITE_COLUMN: &str = "suite";
}

/// Column names looked up in the UFT data table header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UftColumns {
    pub test: String,
    pub description: String,
    pub subject: String,
    pub suite: String,
}

impl Default for UftColumns {
    fn default() -> Self {
        Self {
            test: defaults::UFT_TEST_COLUMN.to_string(),
            description: defaults::UFT_DESCRIPTION_COLUMN.to_string(),
            subject: defaults::UFT_SUBJECT_COLUMN.to_string(),
            suite: defaults::UFT_SUITE_COLUMN.to_string(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Parsers tried against a result file, in registry order
    pub enabled_parsers: Vec<ParserId>,
    /// Remember connection parameters between runs
    pub history_enabled: bool,
    /// Location of the connection history file
    pub history_file: PathBuf,
    /// Log file; `None` logs to stderr
    pub log_file: Option<PathBuf>,
    /// UFT column overrides
    pub uft_columns: UftColumns,
    /// Timeout applied to each ALM REST request
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled_parsers: ParserId::ALL.to_vec(),
            history_enabled: defaults::HISTORY,
            history_file: env::temp_dir().join(defaults::HISTORY_FILE_NAME),
            log_file: Some(env::temp_dir().join(defaults::LOG_FILE_NAME)),
            uft_columns: UftColumns::default(),
            http_timeout_secs: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `QCRI_PARSERS`: comma separated parser ids (default: all parsers)
    /// - `QCRI_HISTORY`: remember connection parameters (default: true)
    /// - `QCRI_HISTORY_FILE`: history file (default: `<tmp>/qcri.history`)
    /// - `QCRI_LOG_FILE`: log file, `-` for stderr (default: `<tmp>/qcri.log`)
    /// - `QCRI_UFT_TEST_COLUMN`, `QCRI_UFT_DESCRIPTION_COLUMN`,
    ///   `QCRI_UFT_SUBJECT_COLUMN`, `QCRI_UFT_SUITE_COLUMN`: UFT data table columns
    /// - `QCRI_HTTP_TIMEOUT_SECS`: ALM request timeout in seconds (default: 60)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = Config::default();

        let parsers = lookup("QCRI_PARSERS").unwrap_or_else(|| defaults::PARSERS.to_string());
        let enabled_parsers = parse_parser_list(&parsers)?;

        let history_enabled = match lookup("QCRI_HISTORY") {
            Some(value) => parse_bool(&value)
                .ok_or(ConfigError::InvalidValue("QCRI_HISTORY must be a boolean"))?,
            None => base.history_enabled,
        };

        let history_file = lookup("QCRI_HISTORY_FILE")
            .map(PathBuf::from)
            .unwrap_or(base.history_file);

        let log_file = match lookup("QCRI_LOG_FILE") {
            Some(value) if value == "-" => None,
            Some(value) => Some(PathBuf::from(value)),
            None => base.log_file,
        };

        let uft_columns = UftColumns {
            test: lookup("QCRI_UFT_TEST_COLUMN").unwrap_or(base.uft_columns.test),
            description: lookup("QCRI_UFT_DESCRIPTION_COLUMN")
                .unwrap_or(base.uft_columns.description),
            subject: lookup("QCRI_UFT_SUBJECT_COLUMN").unwrap_or(base.uft_columns.subject),
            suite: lookup("QCRI_UFT_SUITE_COLUMN").unwrap_or(base.uft_columns.suite),
        };

        let http_timeout_secs = lookup("QCRI_HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|| defaults::HTTP_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue("QCRI_HTTP_TIMEOUT_SECS must be a valid number"))?;

        Ok(Config {
            enabled_parsers,
            history_enabled,
            history_file,
            log_file,
            uft_columns,
            http_timeout_secs,
        })
    }

    /// Options handed to a parser. Only the UFT parser consumes any.
    pub fn parser_options(&self, parser: ParserId) -> ParserOptions {
        let mut options = BTreeMap::new();
        if parser == ParserId::UftRunReport {
            options.insert("test_column".to_string(), self.uft_columns.test.clone());
            options.insert(
                "description_column".to_string(),
                self.uft_columns.description.clone(),
            );
            options.insert("subject_column".to_string(), self.uft_columns.subject.clone());
            options.insert("suite_column".to_string(), self.uft_columns.suite.clone());
        }
        ParserOptions::from(options)
    }

    /// Request timeout for the ALM REST session.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Parse a comma separated list of parser ids.
fn parse_parser_list(value: &str) -> Result<Vec<ParserId>, ConfigError> {
    let mut parsers = Vec::new();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id = ParserId::parse(name).ok_or_else(|| ConfigError::UnknownParser(name.to_string()))?;
        if !parsers.contains(&id) {
            parsers.push(id);
        }
    }
    Ok(parsers)
}

/// Parse a yes/no style flag.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Some(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),

    #[error("Unknown parser in QCRI_PARSERS: {0}")]
    UnknownParser(String),
}

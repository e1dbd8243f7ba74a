//! Result file parsers.
//!
//! Every parser turns one result file into normalized [`TestRecord`]s. The
//! format of a file is sniffed by trial: each enabled parser is run against
//! the file and the ones that succeed are offered to the caller.
//!
//! A parser distinguishes two kinds of failure:
//! - [`ParseError::Mismatch`]: the file is not in this parser's format. The
//!   dispatcher silently rules the parser out.
//! - [`ParseError::Fault`]: the file is in this parser's format but an
//!   expected substructure is missing or malformed. The dispatcher stops.

mod robotframework;
mod selenium;
mod uft;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::models::{ParseResult, TestRecord};

pub use robotframework::RobotFrameworkParser;
pub use selenium::SeleniumParser;
pub use uft::UftParser;

/// Parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The file does not match the parser's format
    #[error("{0}")]
    Mismatch(String),

    /// The file matched the format but is malformed
    #[error("malformed result file: {0}")]
    Fault(String),
}

impl ParseError {
    pub fn mismatch(reason: impl Into<String>) -> Self {
        ParseError::Mismatch(reason.into())
    }

    pub fn fault(reason: impl Into<String>) -> Self {
        ParseError::Fault(reason.into())
    }
}

pub type ParseOutcome = Result<Vec<TestRecord>, ParseError>;

/// Stable identifiers of the registered parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserId {
    RobotFramework,
    SeleniumTestResults,
    UftRunReport,
}

impl ParserId {
    pub const ALL: [ParserId; 3] = [
        ParserId::RobotFramework,
        ParserId::SeleniumTestResults,
        ParserId::UftRunReport,
    ];

    /// Identifier used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RobotFramework => "robotframework",
            Self::SeleniumTestResults => "seleniumtestresults",
            Self::UftRunReport => "uftrunreport",
        }
    }

    /// Parse a configuration identifier.
    pub fn parse(s: &str) -> Option<Self> {
        let name = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|id| id.as_str() == name)
    }

    /// The registered implementation.
    pub fn parser(&self) -> &'static dyn Parser {
        match self {
            Self::RobotFramework => &RobotFrameworkParser,
            Self::SeleniumTestResults => &SeleniumParser,
            Self::UftRunReport => &UftParser,
        }
    }
}

impl std::fmt::Display for ParserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-parser key/value options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserOptions(BTreeMap<String, String>);

impl ParserOptions {
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.0.get(key).map(String::as_str).unwrap_or(default)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for ParserOptions {
    fn from(options: BTreeMap<String, String>) -> Self {
        ParserOptions(options)
    }
}

/// A result file format.
pub trait Parser: Send + Sync {
    fn id(&self) -> ParserId;

    /// Glob patterns naming the artifacts that make up the report.
    fn attach_list(&self) -> &'static [&'static str];

    /// Parse a result file. Must not write anything.
    fn parse(&self, path: &Path, options: &ParserOptions) -> ParseOutcome;
}

/// Read a result file as text; unreadable files are not in any format.
pub(crate) fn read_source(path: &Path) -> Result<String, ParseError> {
    std::fs::read_to_string(path)
        .map_err(|e| ParseError::mismatch(format!("cannot read {}: {}", path.display(), e)))
}

/// Return the parsers enabled in `config` that are able to parse `path`.
///
/// Each parser is tried with its configured options. Parsers failing with
/// [`ParseError::Mismatch`] are excluded; a [`ParseError::Fault`] aborts the
/// dispatch. A missing file matches nothing.
pub fn get_parsers(path: &Path, config: &Config) -> Result<Vec<ParserId>, ParseError> {
    if !path.is_file() {
        debug!("Not a file, no parser applies: {}", path.display());
        return Ok(Vec::new());
    }

    let mut valid = Vec::new();
    for id in &config.enabled_parsers {
        debug!("Testing parser: {}", id);
        match id.parser().parse(path, &config.parser_options(*id)) {
            Ok(_) => valid.push(*id),
            Err(ParseError::Mismatch(reason)) => {
                debug!("Parser {} rejected {}: {}", id, path.display(), reason);
            }
            Err(fault) => return Err(fault),
        }
    }
    Ok(valid)
}

/// Parse `path` with the given parser and wrap the records with report metadata.
pub fn parse_results(
    id: ParserId,
    path: &Path,
    options: &ParserOptions,
) -> Result<ParseResult, ParseError> {
    let parser = id.parser();
    let tests = parser.parse(path, options)?;
    debug!("Parser {} produced {} tests", id, tests.len());

    Ok(ParseResult {
        filename: path.to_path_buf(),
        parser: id,
        tests,
        attach_list: parser.attach_list().iter().map(|s| s.to_string()).collect(),
    })
}

//! Envelope around the records parsed from one result file.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::TestRecord;
use crate::parsers::ParserId;

/// Parsed tests plus what is needed to attach the raw report.
#[derive(Debug, Clone, Serialize)]
pub struct ParseResult {
    /// Source result file
    pub filename: PathBuf,
    /// Parser that produced the records
    pub parser: ParserId,
    pub tests: Vec<TestRecord>,
    /// Glob patterns naming the report artifacts next to `filename`
    pub attach_list: Vec<String>,
}

impl ParseResult {
    /// Directory holding the result file and its artifacts.
    pub fn report_dir(&self) -> &Path {
        self.filename
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    /// Attachment globs including the result file itself.
    pub fn attachment_globs(&self) -> Vec<String> {
        let mut globs = self.attach_list.clone();
        if let Some(name) = self.filename.file_name() {
            globs.push(name.to_string_lossy().into_owned());
        }
        globs
    }

    /// Look up a test by name.
    pub fn test_mut(&mut self, name: &str) -> Option<&mut TestRecord> {
        self.tests.iter_mut().find(|t| t.name == name)
    }

    /// A copy restricted to the named tests, in file order.
    pub fn select(&self, names: &[String]) -> ParseResult {
        ParseResult {
            filename: self.filename.clone(),
            parser: self.parser,
            tests: self
                .tests
                .iter()
                .filter(|t| names.iter().any(|n| n == &t.name))
                .cloned()
                .collect(),
            attach_list: self.attach_list.clone(),
        }
    }
}

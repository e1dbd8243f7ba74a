//! Normalized test and step records produced by every parser.

use serde::{Deserialize, Serialize};

/// Execution status of a test or a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Passed,
    Failed,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl Status {
    /// Quality Center representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::Failed => "Failed",
            Self::NotApplicable => "N/A",
        }
    }

    /// Parse from the Quality Center representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Passed" => Some(Self::Passed),
            "Failed" => Some(Self::Failed),
            "N/A" => Some(Self::NotApplicable),
            _ => None,
        }
    }

    /// Map the `PASS`/`FAIL` vocabulary used by result files.
    pub fn from_verdict(s: &str) -> Self {
        match s {
            "PASS" => Self::Passed,
            "FAIL" => Self::Failed,
            _ => Self::NotApplicable,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One step of a test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: Status,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub expected: String,
    #[serde(default)]
    pub actual: String,
    /// `YYYY-MM-DD`, empty when unknown
    #[serde(default)]
    pub exec_date: String,
    /// Clock string, empty when unknown
    #[serde(default)]
    pub exec_time: String,
}

impl StepRecord {
    /// Create a step with empty text fields.
    pub fn new(name: impl Into<String>, status: Status) -> Self {
        StepRecord {
            name: name.into(),
            status,
            description: String::new(),
            expected: String::new(),
            actual: String::new(),
            exec_date: String::new(),
            exec_time: String::new(),
        }
    }
}

/// One executed test, ready to be uploaded as a Quality Center run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    /// Identifier inside the source file, when the format has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    pub name: String,
    /// Slash delimited grouping path
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub suite: String,
    pub status: Status,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub exec_date: String,
    #[serde(default)]
    pub exec_time: String,
    /// Whole seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    /// External bug id; `None` or `"0"` means unlinked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl TestRecord {
    /// Create a test with empty optional fields.
    pub fn new(name: impl Into<String>, status: Status) -> Self {
        TestRecord {
            test_id: None,
            name: name.into(),
            subject: String::new(),
            suite: String::new(),
            status,
            description: String::new(),
            exec_date: String::new(),
            exec_time: String::new(),
            duration: None,
            bug: None,
            steps: Vec::new(),
        }
    }

    /// The first failed step, which bug linking attaches to.
    pub fn first_failed_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.status == Status::Failed)
    }

    /// The linked bug id when it parses as a nonzero integer.
    pub fn bug_id(&self) -> Option<u64> {
        self.bug
            .as_deref()
            .and_then(|b| b.trim().parse::<u64>().ok())
            .filter(|id| *id != 0)
    }
}

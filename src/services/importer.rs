//! Import orchestration: upload parsed results, optionally with the report archive.
//!
//! In attachment mode every test gets a leading "serial" step whose
//! description is a random token; the archive uploaded afterwards is named
//! after the same token, which ties each run to its report. The marker is
//! removed from the records once the uploads are done.

use rand::distr::{Alphanumeric, SampleString};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult};
use crate::models::{ParseResult, Status, StepRecord, TestRecord};
use crate::qc::QcSession;
use crate::qc::adapter::{attach_report, import_test_result};

/// Name of the injected marker step.
pub const SERIAL_STEP_NAME: &str = "Attachment Serial";

const SERIAL_LENGTH: usize = 8;

/// Result of importing one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutcome {
    pub name: String,
    /// Failure message, `None` on success
    pub error: Option<String>,
}

impl TestOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of an import pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub outcomes: Vec<TestOutcome>,
    /// Name of the uploaded report archive
    pub attachment: Option<String>,
    /// Why the report archive could not be attached
    pub attachment_error: Option<String>,
}

impl ImportReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &TestOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// A random token of lowercase letters and digits.
pub fn generate_serial() -> String {
    Alphanumeric
        .sample_string(&mut rand::rng(), SERIAL_LENGTH)
        .to_ascii_lowercase()
}

/// The marker step; it takes the date and time of the test's first step.
pub fn serial_step(serial: &str, test: &TestRecord) -> StepRecord {
    let mut step = StepRecord::new(SERIAL_STEP_NAME, Status::NotApplicable);
    step.description = serial.to_string();
    if let Some(first) = test.steps.first() {
        step.exec_date = first.exec_date.clone();
        step.exec_time = first.exec_time.clone();
    }
    step
}

/// Prepend the marker step to every test.
pub fn insert_serial_step(tests: &mut [TestRecord], serial: &str) {
    for test in tests {
        let step = serial_step(serial, test);
        test.steps.insert(0, step);
    }
}

/// Remove the marker step inserted by [`insert_serial_step`].
pub fn remove_serial_step(tests: &mut [TestRecord], serial: &str) {
    for test in tests {
        let is_marker = test
            .steps
            .first()
            .is_some_and(|s| s.name == SERIAL_STEP_NAME && s.description == serial);
        if is_marker {
            test.steps.remove(0);
        }
    }
}

/// Upload every test of `results` to `destination`.
///
/// A failing test is recorded in the report and does not stop the others.
/// With `attach` set, the report artifacts are zipped and attached to the
/// destination folder once all tests are uploaded. A failed attachment is
/// recorded in the report next to the test outcomes.
pub async fn import_results<S>(
    session: &mut S,
    destination: &str,
    results: &mut ParseResult,
    attach: bool,
) -> AppResult<ImportReport>
where
    S: QcSession + ?Sized,
{
    if destination.trim().is_empty() {
        return Err(AppError::Validation(
            "a destination folder is required".to_string(),
        ));
    }
    if results.tests.is_empty() {
        return Err(AppError::Validation("no tests selected".to_string()));
    }

    let serial = attach.then(generate_serial);
    if let Some(serial) = &serial {
        debug!("Report serial: {}", serial);
        insert_serial_step(&mut results.tests, serial);
    }

    let mut report = ImportReport::default();
    for test in &results.tests {
        debug!("Importing test result: {}", test.name);
        let error = match import_test_result(session, destination, test).await {
            Ok(()) => None,
            Err(e) => {
                error!("Failed to import test '{}': {}", test.name, e);
                Some(e.to_string())
            }
        };
        report.outcomes.push(TestOutcome {
            name: test.name.clone(),
            error,
        });
    }

    if let Some(serial) = serial {
        remove_serial_step(&mut results.tests, &serial);

        let archive_name = format!("report-{}.zip", serial);
        match attach_report(
            session,
            results.report_dir(),
            &results.attachment_globs(),
            destination,
            &archive_name,
        )
        .await
        {
            Ok(()) => report.attachment = Some(archive_name),
            Err(e) => {
                error!("Failed to attach {} to {}: {}", archive_name, destination, e);
                report.attachment_error = Some(e.to_string());
            }
        }
    }

    info!(
        "Imported {}/{} tests to {}",
        report.succeeded(),
        report.outcomes.len(),
        destination
    );
    Ok(report)
}

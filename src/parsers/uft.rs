//! UFT / QTP run results parser.
//!
//! A run report is a `Results.xml` tree plus the data table workbook it
//! references. Each data table row is one test; the matching `DIter` node in
//! the XML carries its status, timing and steps.
//!
//! Versions tested to work: 12.52 and 12.53.

use std::path::Path;

use calamine::{Reader, open_workbook_auto};
use chrono::NaiveDateTime;
use roxmltree::{Document, Node};

use super::{ParseError, ParseOutcome, Parser, ParserId, ParserOptions, read_source};
use crate::config::defaults;
use crate::models::{Status, StepRecord, TestRecord};

const ATTACH_LIST: &[&str] = &[
    "Default.xls",
    "GeneralInfo.ini",
    "Results.qtp",
    "Resources/",
    "Icons/",
    "Act*",
];

const SHEET_NAME: &str = "Global";
const TIME_FORMAT: &str = "%m/%d/%Y - %H:%M:%S";

pub struct UftParser;

impl Parser for UftParser {
    fn id(&self) -> ParserId {
        ParserId::UftRunReport
    }

    fn attach_list(&self) -> &'static [&'static str] {
        ATTACH_LIST
    }

    fn parse(&self, path: &Path, options: &ParserOptions) -> ParseOutcome {
        let content = read_source(path)?;
        let doc = Document::parse(&content)
            .map_err(|e| ParseError::mismatch(format!("invalid XML syntax: {}", e)))?;

        let xls_name = datatable_name(&doc)
            .ok_or_else(|| ParseError::mismatch("did not find the data table node"))?;
        let xls_path = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(xls_name);
        let table = Datatable::load(&xls_path)?;

        parse_run(&doc, &table, options)
    }
}

/// The `Global` sheet of a data table workbook, as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Datatable {
    /// Row 0 holds the column names
    pub rows: Vec<Vec<String>>,
}

impl Datatable {
    fn load(path: &Path) -> Result<Self, ParseError> {
        if !path.is_file() {
            return Err(ParseError::mismatch(format!(
                "xls file not found: {}",
                path.display()
            )));
        }

        let mut workbook = open_workbook_auto(path)
            .map_err(|e| ParseError::mismatch(format!("cannot open {}: {}", path.display(), e)))?;
        let range = workbook
            .worksheet_range(SHEET_NAME)
            .map_err(|e| ParseError::fault(format!("sheet {} unavailable: {}", SHEET_NAME, e)))?;

        let rows = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        Ok(Datatable { rows })
    }

    /// Index of the header cell equal to `name`.
    fn column(&self, name: &str) -> Result<usize, ParseError> {
        self.rows
            .first()
            .and_then(|header| header.iter().position(|h| h == name))
            .ok_or_else(|| ParseError::mismatch(format!("column not found: {}", name)))
    }

    fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Data table file name referenced by the run report.
fn datatable_name<'a>(doc: &'a Document) -> Option<&'a str> {
    doc.descendants()
        .find(|n| n.has_tag_name("NodeArgs") && n.attribute("eType") == Some("Table"))
        .and_then(|table| table.descendants().find(|n| n.has_tag_name("Path")))
        .and_then(|p| p.text())
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

struct Columns {
    test: usize,
    subject: usize,
    suite: usize,
    description: usize,
}

pub(crate) fn parse_run(
    doc: &Document,
    table: &Datatable,
    options: &ParserOptions,
) -> ParseOutcome {
    let columns = Columns {
        test: table.column(options.get_or("test_column", defaults::UFT_TEST_COLUMN))?,
        subject: table.column(options.get_or("subject_column", defaults::UFT_SUBJECT_COLUMN))?,
        suite: table.column(options.get_or("suite_column", defaults::UFT_SUITE_COLUMN))?,
        description: table.column(
            options.get_or("description_column", defaults::UFT_DESCRIPTION_COLUMN),
        )?,
    };

    (1..table.rows.len())
        .map(|row| parse_test(doc, table, &columns, row))
        .collect()
}

fn parse_test(
    doc: &Document,
    table: &Datatable,
    columns: &Columns,
    row: usize,
) -> Result<TestRecord, ParseError> {
    let iter_id = row.to_string();
    let diter = doc
        .descendants()
        .find(|n| n.has_tag_name("DIter") && n.attribute("iterID") == Some(iter_id.as_str()))
        .ok_or_else(|| ParseError::mismatch(format!("no iteration {} in run report", row)))?;

    let status = diter
        .children()
        .find(|n| n.has_tag_name("NodeArgs") && n.attribute("eType") == Some("StartIteration"))
        .and_then(|n| n.attribute("status"))
        .ok_or_else(|| ParseError::fault(format!("iteration {} has no status", row)))?;

    let summary = diter
        .descendants()
        .find(|n| n.has_tag_name("Summary"))
        .ok_or_else(|| ParseError::fault(format!("iteration {} has no summary", row)))?;
    let start = parse_time(required_attribute(summary, "sTime")?)?;
    let end = parse_time(required_attribute(summary, "eTime")?)?;

    let steps = diter
        .descendants()
        .filter(is_reported_step)
        .map(parse_step)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TestRecord {
        test_id: None,
        name: table.cell(row, columns.test).to_string(),
        subject: table.cell(row, columns.subject).to_string(),
        suite: table.cell(row, columns.suite).to_string(),
        status: map_status(status),
        description: table.cell(row, columns.description).to_string(),
        exec_date: start.format("%Y-%m-%d").to_string(),
        exec_time: start.format("%I:%M:%S %p").to_string(),
        duration: Some((end - start).num_seconds()),
        bug: None,
        steps,
    })
}

/// User steps that passed, warned or failed, and failed replay steps.
fn is_reported_step(node: &Node) -> bool {
    if !node.has_tag_name("NodeArgs") {
        return false;
    }
    match (node.attribute("eType"), node.attribute("status")) {
        (Some("User"), Some("Warning" | "Passed" | "Failed")) => true,
        (Some("Replay"), Some("Failed")) => true,
        _ => false,
    }
}

fn parse_step(args: Node) -> Result<StepRecord, ParseError> {
    let step_node = args
        .parent_element()
        .ok_or_else(|| ParseError::fault("step without parent node"))?;

    let name = child_text(args, "Disp")?;
    let time = parse_time(child_text(step_node, "Time")?)?;
    let details = child_text(step_node, "Details")?;

    let mut step = StepRecord::new(name, map_status(args.attribute("status").unwrap_or_default()));
    step.description = details.to_string();
    step.exec_date = time.format("%Y-%m-%d").to_string();
    step.exec_time = time.format("%I:%M:%S %p").to_string();
    Ok(step)
}

fn map_status(status: &str) -> Status {
    match status {
        "Passed" | "Warning" => Status::Passed,
        "Failed" => Status::Failed,
        _ => Status::NotApplicable,
    }
}

fn child_text<'a>(node: Node<'a, '_>, tag: &str) -> Result<&'a str, ParseError> {
    node.children()
        .find(|n| n.has_tag_name(tag))
        .map(|n| n.text().unwrap_or_default())
        .ok_or_else(|| ParseError::fault(format!("missing <{}> node", tag)))
}

fn required_attribute<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, ParseError> {
    node.attribute(name)
        .ok_or_else(|| ParseError::fault(format!("missing {} attribute", name)))
}

fn parse_time(value: &str) -> Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), TIME_FORMAT)
        .map_err(|e| ParseError::fault(format!("invalid timestamp '{}': {}", value, e)))
}

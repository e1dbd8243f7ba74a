//! Selenium IDE "Test Results" plugin HTML report parser.

use std::path::Path;

use scraper::{ElementRef, Html, Selector};

use super::{ParseError, ParseOutcome, Parser, ParserId, ParserOptions, read_source};
use crate::models::{Status, StepRecord, TestRecord};

const SUITE_HEADER: &str = "Test Suite";
const TEST_HEADER: &str = "Test case: ";

pub struct SeleniumParser;

impl Parser for SeleniumParser {
    fn id(&self) -> ParserId {
        ParserId::SeleniumTestResults
    }

    fn attach_list(&self) -> &'static [&'static str] {
        &[]
    }

    fn parse(&self, path: &Path, _options: &ParserOptions) -> ParseOutcome {
        let content = read_source(path)?;
        parse_report(&content)
    }
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::fault(format!("bad selector {}: {}", css, e)))
}

/// Parse the content of a test results report.
pub(crate) fn parse_report(content: &str) -> ParseOutcome {
    let document = Html::parse_document(content);

    let header_sel = selector("table#suiteSummaryTable > thead > tr > td")?;
    let header = document
        .select(&header_sel)
        .next()
        .ok_or_else(|| ParseError::mismatch("Test Suite not found"))?;

    let header = element_text(header);
    let Some(rest) = header.strip_prefix(SUITE_HEADER) else {
        return Err(ParseError::mismatch("invalid test results"));
    };
    // "Test Suite: <name>"
    let suite_name = rest.trim_start_matches(':').trim();

    let table_sel = selector("table.test_case")?;
    let tables: Vec<ElementRef> = document.select(&table_sel).collect();
    if tables.is_empty() {
        return Err(ParseError::mismatch("no test cases found"));
    }

    let title_sel = selector("thead > tr > td")?;
    let row_sel = selector("tr")?;

    tables
        .into_iter()
        .map(|table| parse_test(table, suite_name, &title_sel, &row_sel))
        .collect()
}

fn parse_test(
    table: ElementRef,
    suite_name: &str,
    title_sel: &Selector,
    row_sel: &Selector,
) -> Result<TestRecord, ParseError> {
    let title = table
        .select(title_sel)
        .next()
        .map(element_text)
        .unwrap_or_default();
    let Some(name) = title.strip_prefix(TEST_HEADER) else {
        return Err(ParseError::mismatch("invalid test"));
    };

    let mut test = TestRecord::new(name.trim(), Status::Passed);
    test.suite = suite_name.to_string();

    // the first row is the test header
    for row in table.select(row_sel).skip(1) {
        let step = parse_step(row)?;
        if step.status == Status::Failed {
            test.status = Status::Failed;
        }
        test.steps.push(step);
    }

    Ok(test)
}

fn parse_step(row: ElementRef) -> Result<StepRecord, ParseError> {
    let cells: Vec<String> = row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "td")
        .map(element_text)
        .collect();

    let (name, ident) = match cells.as_slice() {
        [name, ident, ..] => (name, ident),
        _ => return Err(ParseError::fault("step row has fewer than two cells")),
    };

    let mut description = format!("{}: {}", name, ident);
    if let Some(input) = cells.get(2).filter(|s| !s.is_empty()) {
        description.push_str(" -> ");
        description.push_str(input);
    }

    let status = match cells.get(3).filter(|s| !s.is_empty()) {
        Some(failure) => {
            description.push('\n');
            description.push_str(failure);
            Status::Failed
        }
        None => Status::Passed,
    };

    let mut step = StepRecord::new(name.as_str(), status);
    step.description = description;
    Ok(step)
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

//! Robot Framework `output.xml` parser.
//!
//! Versions tested to work: 3.x (`starttime`/`endtime` status attributes) and
//! 7.x (`start`/`elapsed` status attributes).

use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use roxmltree::{Document, Node};

use super::{ParseError, ParseOutcome, Parser, ParserId, ParserOptions, read_source};
use crate::models::{Status, StepRecord, TestRecord};

const ATTACH_LIST: &[&str] = &["log.html", "report.html", "*.png"];

/// Timestamp format of Robot Framework 3.x status nodes.
const LEGACY_TIME_FORMAT: &str = "%Y%m%d %H:%M:%S%.f";

/// Timestamp format of Robot Framework 7.x status nodes.
const ISO_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub struct RobotFrameworkParser;

impl Parser for RobotFrameworkParser {
    fn id(&self) -> ParserId {
        ParserId::RobotFramework
    }

    fn attach_list(&self) -> &'static [&'static str] {
        ATTACH_LIST
    }

    fn parse(&self, path: &Path, _options: &ParserOptions) -> ParseOutcome {
        let content = read_source(path)?;
        parse_output(&content)
    }
}

/// Parse the content of an `output.xml` file.
pub(crate) fn parse_output(content: &str) -> ParseOutcome {
    let doc = Document::parse(content)
        .map_err(|e| ParseError::mismatch(format!("invalid XML syntax: {}", e)))?;

    let root = doc.root_element();
    if root.tag_name().name() != "robot" {
        return Err(ParseError::mismatch("root.tag is not robot"));
    }

    let mut tests = Vec::new();
    let mut stack: Vec<Node> = child_elements(root, "suite").collect();

    while let Some(suite) = stack.pop() {
        let suite_name = suite.attribute("name").unwrap_or_default();

        // ancestors() starts at the node itself
        let mut path: Vec<&str> = suite
            .ancestors()
            .skip(1)
            .filter(|n| n.has_tag_name("suite"))
            .map(|n| n.attribute("name").unwrap_or_default())
            .collect();
        path.reverse();
        let subject = path.join("/");

        for test in child_elements(suite, "test") {
            tests.push(parse_test(test, &subject, suite_name)?);
        }

        stack.extend(child_elements(suite, "suite"));
    }

    Ok(tests)
}

fn parse_test(test: Node, subject: &str, suite_name: &str) -> Result<TestRecord, ParseError> {
    let name = test.attribute("name").unwrap_or_default();
    let status_node = status_node(test, name)?;
    let (start, end) = status_times(status_node)?;

    let steps = child_elements(test, "kw")
        .map(parse_step)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TestRecord {
        test_id: test.attribute("id").map(str::to_string),
        name: name.to_string(),
        subject: subject.to_string(),
        suite: suite_name.to_string(),
        status: Status::from_verdict(status_node.attribute("status").unwrap_or_default()),
        description: name.to_string(),
        exec_date: start.format("%Y-%m-%d").to_string(),
        exec_time: start.format("%H:%M:%S").to_string(),
        duration: Some((end - start).num_seconds()),
        bug: None,
        steps,
    })
}

fn parse_step(keyword: Node) -> Result<StepRecord, ParseError> {
    let full_name = keyword.attribute("name").unwrap_or_default();
    // `Library.Keyword` is shown as `Keyword`
    let name = full_name.split('.').nth(1).unwrap_or(full_name);

    let status_node = status_node(keyword, full_name)?;
    let (start, _) = status_times(status_node)?;

    let mut description = String::new();
    for arg in arguments(keyword) {
        description.push_str("Argument = ");
        description.push_str(arg.text().unwrap_or_default());
        description.push('\n');
    }

    let mut step = StepRecord::new(
        name,
        Status::from_verdict(status_node.attribute("status").unwrap_or_default()),
    );
    step.description = description;
    step.exec_date = start.format("%Y-%m-%d").to_string();
    step.exec_time = start.format("%H:%M:%S").to_string();
    Ok(step)
}

/// `<arguments><arg/></arguments>` in 3.x, bare `<arg/>` children in 7.x.
fn arguments<'a, 'input>(keyword: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    keyword.children().filter(Node::is_element).flat_map(|child| {
        let nested: Vec<Node> = if child.has_tag_name("arguments") {
            child_elements(child, "arg").collect()
        } else if child.has_tag_name("arg") {
            vec![child]
        } else {
            Vec::new()
        };
        nested
    })
}

fn status_node<'a, 'input>(
    node: Node<'a, 'input>,
    name: &str,
) -> Result<Node<'a, 'input>, ParseError> {
    child_elements(node, "status")
        .next()
        .ok_or_else(|| ParseError::fault(format!("no status for '{}'", name)))
}

/// Start and end time of a status node.
fn status_times(status: Node) -> Result<(NaiveDateTime, NaiveDateTime), ParseError> {
    if let Some(start) = status.attribute("starttime") {
        let start = parse_time(start, LEGACY_TIME_FORMAT)?;
        let end = match status.attribute("endtime") {
            Some(end) => parse_time(end, LEGACY_TIME_FORMAT)?,
            None => start,
        };
        return Ok((start, end));
    }

    if let Some(start) = status.attribute("start") {
        let start = parse_time(start, ISO_TIME_FORMAT)?;
        let elapsed = status
            .attribute("elapsed")
            .map(|e| {
                e.parse::<f64>()
                    .map_err(|_| ParseError::fault(format!("invalid elapsed time '{}'", e)))
            })
            .transpose()?
            .unwrap_or(0.0);
        let end = start + Duration::milliseconds((elapsed * 1000.0) as i64);
        return Ok((start, end));
    }

    Err(ParseError::fault("status without start time"))
}

fn parse_time(value: &str, format: &str) -> Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(value, format)
        .map_err(|e| ParseError::fault(format!("invalid timestamp '{}': {}", value, e)))
}

fn child_elements<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |n| n.has_tag_name(tag))
}

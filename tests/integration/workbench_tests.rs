//! The command line flow driven end to end with scripted answers.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use clap::Parser;

use qcri_lib::cli::{self, Cli, Prompter};
use qcri_lib::config::Config;
use qcri_lib::error::AppError;
use qcri_lib::parsers::ParserId;
use qcri_lib::qc::{Credentials, EntityKind, Field, MemorySession, Op};
use qcri_lib::services::{Command, CommandOutput, Workbench};

use super::fixtures::*;

fn config(dir: &Path) -> Config {
    let vars = HashMap::from([(
        "QCRI_HISTORY_FILE".to_string(),
        dir.join("qcri.history").display().to_string(),
    )]);
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn prompter(answers: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
    Prompter::new(Cursor::new(answers.as_bytes().to_vec()), Vec::new())
}

fn output(prompter: &mut Prompter<Cursor<Vec<u8>>, Vec<u8>>) -> String {
    String::from_utf8(prompter.output().clone()).unwrap()
}

#[tokio::test]
async fn test_interactive_import() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_robot_report(dir.path());
    let session = MemorySession::new()
        .with_password("pw")
        .with_bug(42, "Error page", "Open", "2017-03-01");
    let probe = session.clone();
    let mut bench = Workbench::new(config(dir.path()), session);

    let source_arg = source.display().to_string();
    let cli = Cli::try_parse_from([
        "qcri",
        "--source",
        source_arg.as_str(),
        "--bug",
        "Invalid Login=42",
    ])
    .unwrap();
    // url, domain, project, username, password, destination, attach
    let mut prompter = prompter("memory://qc\nDEFAULT\nBank\nalice\npw\nRelease 1\nno\n");

    cli::run(&cli, &mut bench, &mut prompter).await.unwrap();

    let out = output(&mut prompter);
    assert!(out.contains("QC URL: "));
    assert!(out.contains("Invalid Login"));
    assert!(out.contains("Imported 2 of 2 tests."));
    assert!(out.ends_with("Import complete.\n"));

    assert_eq!(probe.entities(EntityKind::Run).len(), 2);
    assert_eq!(probe.entities(EntityKind::BugLink)[0].field(Field::BugId), "42");
    assert!(probe.attachments().is_empty());

    // the session is closed at the end
    let ops = probe.ops();
    assert_eq!(ops[ops.len() - 3..], [Op::DisconnectProject, Op::Logout, Op::ReleaseConnection]);

    // the next run offers the previous answers
    let history = bench.history().unwrap();
    assert_eq!(history.last("url"), Some("memory://qc"));
    assert_eq!(history.last("destination"), Some("Release 1"));
    assert_eq!(history.last("source"), Some(source_arg.as_str()));
}

#[tokio::test]
async fn test_second_run_uses_history_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_robot_report(dir.path());
    let source_arg = source.display().to_string();

    let first = Cli::try_parse_from([
        "qcri",
        "--source",
        source_arg.as_str(),
        "--url",
        "memory://qc",
        "--domain",
        "DEFAULT",
        "--project",
        "Bank",
        "--username",
        "alice",
        "--password",
        "pw",
        "--destination",
        "R1",
        "--attach-report",
        "no",
    ])
    .unwrap();
    let mut bench = Workbench::new(config(dir.path()), MemorySession::new());
    cli::run(&first, &mut bench, &mut prompter("")).await.unwrap();

    // everything but the password comes from the history
    let probe = MemorySession::new();
    let mut bench = Workbench::new(config(dir.path()), probe.clone());
    let second = Cli::try_parse_from(["qcri", "--test", "Valid Login"]).unwrap();
    let mut prompter = prompter("\n\n\n\n\npw\n\n\n");
    cli::run(&second, &mut bench, &mut prompter).await.unwrap();

    let out = output(&mut prompter);
    assert!(out.contains("QC Project [Bank]: "));
    assert!(out.contains("QC destination folder [R1]: "));
    let runs = probe.entities(EntityKind::Run);
    assert_eq!(runs.len(), 1);
    // attach defaults to yes
    assert_eq!(probe.attachments().len(), 1);
}

#[tokio::test]
async fn test_wrong_password_aborts_the_import() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_robot_report(dir.path());
    let session = MemorySession::new().with_password("right");
    let probe = session.clone();
    let mut bench = Workbench::new(config(dir.path()), session);

    let source_arg = source.display().to_string();
    let cli = Cli::try_parse_from(["qcri", "--source", source_arg.as_str()]).unwrap();
    let mut prompter = prompter("memory://qc\nDEFAULT\nBank\nalice\nwrong\n");

    let err = cli::run(&cli, &mut bench, &mut prompter).await.unwrap_err();
    assert!(matches!(err, AppError::Remote(_)));
    assert!(probe.entities(EntityKind::Run).is_empty());
    assert!(!probe.ops().contains(&Op::DisconnectProject));
}

#[tokio::test]
async fn test_detect_lists_matching_parsers() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "results.html", SELENIUM_REPORT);
    let mut bench = Workbench::new(config(dir.path()), MemorySession::new());

    let file_arg = path.display().to_string();
    let cli = Cli::try_parse_from(["qcri", "detect", file_arg.as_str()]).unwrap();
    let mut prompter = prompter("");
    cli::run(&cli, &mut bench, &mut prompter).await.unwrap();

    let out = output(&mut prompter);
    assert!(out.starts_with("Parser: seleniumtestresults\n"));
    assert!(out.contains("Add to cart"));
    assert!(out.contains("Failed"));
}

#[tokio::test]
async fn test_folders_and_bugs_commands() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_robot_report(dir.path());
    let session = MemorySession::new().with_bug(7, "Slow login", "New", "2017-02-01");
    let mut bench = Workbench::new(config(dir.path()), session);

    // populate the project through the command model
    let credentials = "memory://qc\nDEFAULT\nBank\nalice\npw\n";
    bench.execute(Command::ParseFile(source)).await.unwrap();
    let cli = Cli::try_parse_from(["qcri", "bugs"]).unwrap();
    let mut bugs_prompter = prompter(credentials);
    cli::run(&cli, &mut bench, &mut bugs_prompter).await.unwrap();
    let out = output(&mut bugs_prompter);
    assert!(out.contains("Slow login"));
    assert!(out.contains("2017-02-01"));

    let cli = Cli::try_parse_from(["qcri", "folders", "Subject"]).unwrap();
    let mut folder_prompter = prompter(credentials);
    bench
        .execute(Command::Connect(Credentials {
            url: "memory://qc".to_string(),
            domain: "DEFAULT".to_string(),
            project: "Bank".to_string(),
            username: "alice".to_string(),
            password: "pw".into(),
        }))
        .await
        .unwrap();
    let imported = bench
        .execute(Command::Upload {
            destination: "R1".to_string(),
            tests: vec!["Valid Login".to_string()],
            attach: false,
        })
        .await
        .unwrap();
    assert!(matches!(imported, CommandOutput::Imported(ref r) if r.succeeded() == 1));

    cli::run(&cli, &mut bench, &mut folder_prompter).await.unwrap();
    let out = output(&mut folder_prompter);
    assert!(out.contains("Subject\\R1\n"));
}

#[tokio::test]
async fn test_select_parser_requires_a_match() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_robot_report(dir.path());
    let mut bench = Workbench::new(config(dir.path()), MemorySession::new());

    let output = bench.execute(Command::ParseFile(source)).await.unwrap();
    assert!(matches!(output, CommandOutput::Parsers(ref p) if p == &[ParserId::RobotFramework]));

    let err = bench
        .execute(Command::SelectParser(ParserId::UftRunReport))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(bench.results().unwrap().tests.len(), 2);
}

#[tokio::test]
async fn test_uft_report_with_renamed_test_column_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let report = tempfile::tempdir().unwrap();
    write_xlsx(
        &report.path().join("Default.xlsx"),
        "Global",
        &[
            &["name", "subject", "suite", "description"],
            &["Login ok", "Bank/Web", "Smoke", "valid credentials"],
            &["Pay bill", "Bank/Web", "Smoke", "payment flow"],
        ],
    );
    let source = write_file(report.path(), "Results.xml", UFT_RESULTS);

    let vars = HashMap::from([
        (
            "QCRI_HISTORY_FILE".to_string(),
            dir.path().join("qcri.history").display().to_string(),
        ),
        ("QCRI_UFT_TEST_COLUMN".to_string(), "name".to_string()),
    ]);
    let renamed = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();
    let mut bench = Workbench::new(renamed, MemorySession::new());

    let parsers = bench.parse_file(source).await.unwrap();
    assert_eq!(parsers, [ParserId::UftRunReport]);
    let results = bench.results().unwrap();
    assert_eq!(results.tests.len(), 2);
    assert_eq!(results.tests[0].name, "Login ok");

    // the default column name is not in the header
    let mut defaults = Workbench::new(config(dir.path()), MemorySession::new());
    let source = report.path().join("Results.xml");
    assert!(matches!(
        defaults.parse_file(source).await,
        Err(AppError::NoParser(_))
    ));
}

//! Command line front end.
//!
//! Every connection or import value left out on the command line is asked
//! for interactively, with the most recently used value as the default.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use secrecy::SecretString;
use tracing::{error, info};

use crate::config::parse_bool;
use crate::error::{AppError, AppResult};
use crate::models::{ConnectionHistory, ParseResult};
use crate::parsers::ParserId;
use crate::qc::{BugInfo, Credentials, FolderNode, QcSession};
use crate::services::{ImportReport, Workbench};

#[derive(Parser, Debug)]
#[command(
    name = "qcri",
    version,
    about = "Import automated test results into HP Quality Center"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<CliCommand>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub import: ImportArgs,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Work against an in-memory project instead of a server
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// List the parsers accepting a file and the tests they read from it
    Detect { file: PathBuf },
    /// List the child folders of a `Root\...` or `Subject\...` path
    Folders { path: String },
    /// List the bugs of the project
    Bugs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Quality Center URL, e.g. http://qc.example.com/qcbin
    #[arg(long, global = true)]
    pub url: Option<String>,

    #[arg(long, global = true)]
    pub domain: Option<String>,

    #[arg(long, global = true)]
    pub project: Option<String>,

    #[arg(long, global = true)]
    pub username: Option<String>,

    #[arg(long, global = true, env = "QCRI_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ImportArgs {
    /// Result file to import
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Test Lab folder receiving the runs
    #[arg(long)]
    pub destination: Option<String>,

    /// Zip the report artifacts and attach them to the destination (yes/no)
    #[arg(long, value_parser = parse_yes_no)]
    pub attach_report: Option<bool>,

    /// Import only the named test (repeatable)
    #[arg(long = "test", value_name = "NAME")]
    pub tests: Vec<String>,

    /// Link a failed test to a bug (repeatable)
    #[arg(long = "bug", value_name = "TEST=ID", value_parser = parse_bug_assignment)]
    pub bugs: Vec<(String, String)>,

    /// Parser to use when several accept the file
    #[arg(long, value_parser = parse_parser_id)]
    pub parser: Option<ParserId>,
}

fn parse_yes_no(value: &str) -> Result<bool, String> {
    parse_bool(value).ok_or_else(|| format!("expected yes or no, got '{}'", value))
}

fn parse_bug_assignment(value: &str) -> Result<(String, String), String> {
    match value.rsplit_once('=') {
        Some((test, bug)) if !test.is_empty() && !bug.is_empty() => {
            Ok((test.to_string(), bug.to_string()))
        }
        _ => Err(format!("expected TEST=ID, got '{}'", value)),
    }
}

fn parse_parser_id(value: &str) -> Result<ParserId, String> {
    ParserId::parse(value).ok_or_else(|| {
        let known: Vec<&str> = ParserId::ALL.iter().map(ParserId::as_str).collect();
        format!("unknown parser '{}', expected one of: {}", value, known.join(", "))
    })
}

/// Line based prompting over any reader and writer.
///
/// With masked input, secrets are read from the terminal in raw mode so the
/// typed characters are not echoed. Piped input is always read line by line.
pub struct Prompter<R, W> {
    input: R,
    output: W,
    masked: bool,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Prompter {
            input,
            output,
            masked: false,
        }
    }

    /// Read secrets from the terminal without echo.
    pub fn with_masked_input(mut self, masked: bool) -> Self {
        self.masked = masked;
        self
    }

    pub fn output(&mut self) -> &mut W {
        &mut self.output
    }

    /// Ask until a non-empty answer is given; an empty answer takes `last`.
    pub fn ask(&mut self, label: &str, last: Option<&str>) -> io::Result<String> {
        loop {
            match last {
                Some(last) => write!(self.output, "{} [{}]: ", label, last)?,
                None => write!(self.output, "{}: ", label)?,
            }
            self.output.flush()?;

            let answer = self.read_answer()?;
            if !answer.is_empty() {
                return Ok(answer);
            }
            if let Some(last) = last {
                return Ok(last.to_string());
            }
        }
    }

    /// Ask for a secret until a non-empty answer is given. There is no default.
    pub fn ask_secret(&mut self, label: &str) -> io::Result<String> {
        loop {
            write!(self.output, "{}: ", label)?;
            self.output.flush()?;

            let answer = if self.masked {
                let answer = read_hidden_line()?;
                writeln!(self.output)?;
                answer
            } else {
                self.read_answer()?
            };
            if !answer.is_empty() {
                return Ok(answer);
            }
        }
    }

    /// Ask a yes/no question.
    pub fn confirm(&mut self, label: &str, default: bool) -> io::Result<bool> {
        let hint = if default { "Y/n" } else { "y/N" };
        loop {
            write!(self.output, "{} [{}]: ", label, hint)?;
            self.output.flush()?;

            let answer = self.read_answer()?;
            if answer.is_empty() {
                return Ok(default);
            }
            if let Some(value) = parse_bool(&answer) {
                return Ok(value);
            }
            writeln!(self.output, "Please answer yes or no.")?;
        }
    }

    /// Pick one of `options` by number; returns its index.
    pub fn choose<T: std::fmt::Display>(&mut self, label: &str, options: &[T]) -> io::Result<usize> {
        if options.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "nothing to choose from"));
        }
        for (i, option) in options.iter().enumerate() {
            writeln!(self.output, "  {}. {}", i + 1, option)?;
        }
        loop {
            let answer = self.ask(label, Some("1"))?;
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
                _ => writeln!(self.output, "Enter a number from 1 to {}.", options.len())?,
            }
        }
    }

    fn read_answer(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed while prompting",
            ));
        }
        Ok(line.trim().to_string())
    }
}

/// Read one line from the terminal without echoing it.
fn read_hidden_line() -> io::Result<String> {
    terminal::enable_raw_mode()?;
    let line = read_hidden_keys();
    terminal::disable_raw_mode()?;
    line
}

fn read_hidden_keys() -> io::Result<String> {
    let mut line = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(line.trim().to_string()),
            KeyCode::Backspace => {
                line.pop();
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "password prompt interrupted",
                ));
            }
            KeyCode::Char(c) => line.push(c),
            _ => {}
        }
    }
}

/// Fill the connection values, prompting for the missing ones.
pub fn resolve_credentials<R: BufRead, W: Write>(
    args: &ConnectionArgs,
    history: Option<&ConnectionHistory>,
    prompter: &mut Prompter<R, W>,
) -> io::Result<Credentials> {
    let mut value = |given: &Option<String>, label: &str, field: &str| match given {
        Some(v) => Ok(v.clone()),
        None => prompter.ask(label, history.and_then(|h| h.last(field))),
    };

    let url = value(&args.url, "QC URL", "url")?;
    let domain = value(&args.domain, "QC Domain", "domain")?;
    let project = value(&args.project, "QC Project", "project")?;
    let username = value(&args.username, "QC Username", "username")?;
    let password = match &args.password {
        Some(password) => password.clone(),
        None => prompter.ask_secret("QC Password")?,
    };

    Ok(Credentials {
        url,
        domain,
        project,
        username,
        password: SecretString::from(password),
    })
}

/// Run the parsed command line against `bench`. The session is always closed.
pub async fn run<S, R, W>(
    cli: &Cli,
    bench: &mut Workbench<S>,
    prompter: &mut Prompter<R, W>,
) -> AppResult<()>
where
    S: QcSession,
    R: BufRead,
    W: Write,
{
    let result = match &cli.command {
        Some(CliCommand::Detect { file }) => detect(bench, file.clone(), prompter).await,
        Some(CliCommand::Folders { path }) => folders(cli, bench, path, prompter).await,
        Some(CliCommand::Bugs) => bugs(cli, bench, prompter).await,
        None => import(cli, bench, prompter).await,
    };
    let closed = bench.disconnect().await;
    result?;
    closed
}

async fn detect<S, R, W>(
    bench: &mut Workbench<S>,
    file: PathBuf,
    prompter: &mut Prompter<R, W>,
) -> AppResult<()>
where
    S: QcSession,
    R: BufRead,
    W: Write,
{
    let parsers = bench.parse_file(file).await?;
    for id in parsers {
        let results = bench.select_parser(id).await?;
        writeln!(prompter.output(), "Parser: {}", id)?;
        print_tests(prompter.output(), results)?;
    }
    Ok(())
}

async fn folders<S, R, W>(
    cli: &Cli,
    bench: &mut Workbench<S>,
    path: &str,
    prompter: &mut Prompter<R, W>,
) -> AppResult<()>
where
    S: QcSession,
    R: BufRead,
    W: Write,
{
    connect(cli, bench, prompter).await?;
    let nodes = bench.browse_folder(path).await?;
    print_folders(prompter.output(), &nodes)?;
    Ok(())
}

async fn bugs<S, R, W>(
    cli: &Cli,
    bench: &mut Workbench<S>,
    prompter: &mut Prompter<R, W>,
) -> AppResult<()>
where
    S: QcSession,
    R: BufRead,
    W: Write,
{
    connect(cli, bench, prompter).await?;
    let bugs = bench.bugs().await?;
    print_bugs(prompter.output(), &bugs)?;
    Ok(())
}

async fn connect<S, R, W>(
    cli: &Cli,
    bench: &mut Workbench<S>,
    prompter: &mut Prompter<R, W>,
) -> AppResult<()>
where
    S: QcSession,
    R: BufRead,
    W: Write,
{
    let credentials = resolve_credentials(&cli.connection, bench.history(), prompter)?;
    bench.connect(&credentials).await
}

async fn import<S, R, W>(
    cli: &Cli,
    bench: &mut Workbench<S>,
    prompter: &mut Prompter<R, W>,
) -> AppResult<()>
where
    S: QcSession,
    R: BufRead,
    W: Write,
{
    let args = &cli.import;
    let history = bench.history().cloned();
    let last = |field: &str| history.as_ref().and_then(|h| h.last(field).map(str::to_string));

    let source = match &args.source {
        Some(source) => source.clone(),
        None => PathBuf::from(prompter.ask("Test results file", last("source").as_deref())?),
    };

    let parsers = bench.parse_file(source).await?;
    if parsers.len() > 1 {
        let id = match args.parser {
            Some(id) => id,
            None => parsers[prompter.choose("Choose a parser", &parsers)?],
        };
        bench.select_parser(id).await?;
    }
    let Some(results) = bench.results() else {
        return Err(AppError::Validation("no results parsed".to_string()));
    };
    print_tests(prompter.output(), results)?;

    let tests: Vec<String> = if args.tests.is_empty() {
        results.tests.iter().map(|t| t.name.clone()).collect()
    } else {
        args.tests.clone()
    };

    connect(cli, bench, prompter).await?;

    for (test, bug) in &args.bugs {
        if !bench.assign_bug(test, bug).await? {
            error!("Bug {} was not linked to '{}'", bug, test);
        }
    }

    let destination = match &args.destination {
        Some(destination) => destination.clone(),
        None => prompter.ask("QC destination folder", last("destination").as_deref())?,
    };
    let attach = match args.attach_report {
        Some(attach) => attach,
        None => prompter.confirm("Attach report", true)?,
    };

    let report = bench.upload(&destination, &tests, attach).await?;
    print_report(prompter.output(), &report)?;
    info!("Import complete.");
    writeln!(prompter.output(), "Import complete.")?;
    Ok(())
}

/// Tests of a parse result, one per line.
pub fn print_tests<W: Write>(out: &mut W, results: &ParseResult) -> io::Result<()> {
    writeln!(out, "{:<30} {:<30} {:<7} {:>5}", "SUBJECT", "NAME", "STATUS", "STEPS")?;
    for test in &results.tests {
        writeln!(
            out,
            "{:<30} {:<30} {:<7} {:>5}",
            test.subject,
            test.name,
            test.status,
            test.steps.len()
        )?;
    }
    Ok(())
}

pub fn print_folders<W: Write>(out: &mut W, nodes: &[FolderNode]) -> io::Result<()> {
    for node in nodes {
        writeln!(out, "{}", node.path)?;
    }
    Ok(())
}

pub fn print_bugs<W: Write>(out: &mut W, bugs: &[BugInfo]) -> io::Result<()> {
    writeln!(out, "{:>6}  {:<12} {:<12} {}", "ID", "STATUS", "DETECTED", "SUMMARY")?;
    for bug in bugs {
        writeln!(
            out,
            "{:>6}  {:<12} {:<12} {}",
            bug.id, bug.status, bug.detection_date, bug.summary
        )?;
    }
    Ok(())
}

fn print_report<W: Write>(out: &mut W, report: &ImportReport) -> io::Result<()> {
    writeln!(
        out,
        "Imported {} of {} tests.",
        report.succeeded(),
        report.outcomes.len()
    )?;
    for outcome in report.failed() {
        writeln!(
            out,
            "  FAILED {}: {}",
            outcome.name,
            outcome.error.as_deref().unwrap_or_default()
        )?;
    }
    if let Some(name) = &report.attachment {
        writeln!(out, "Attached {}", name)?;
    }
    if let Some(err) = &report.attachment_error {
        writeln!(out, "Report not attached: {}", err)?;
    }
    Ok(())
}

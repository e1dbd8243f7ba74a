//! Front-end independent command model.
//!
//! A [`Workbench`] owns the state of an interactive import: the source file,
//! the parsers that accept it, the parsed results and the remote session.
//! Front ends drive it through [`Command`]s or the matching methods.

use std::path::PathBuf;

use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{error, info, warn};

use super::background::{run_blocking, spinner};
use super::history::{load_history, update_history};
use super::importer::{ImportReport, import_results};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{ConnectionHistory, ParseResult};
use crate::parsers::{ParserId, get_parsers, parse_results};
use crate::qc::adapter::{self, get_bugs, get_subdirectories};
use crate::qc::{BugInfo, Credentials, FolderNode, QcError, QcPath, QcSession};

/// A user action.
#[derive(Debug, Clone)]
pub enum Command {
    ParseFile(PathBuf),
    SelectParser(ParserId),
    Connect(Credentials),
    BrowseFolder(String),
    AssignBug { test: String, bug: String },
    Upload {
        destination: String,
        tests: Vec<String>,
        attach: bool,
    },
    Disconnect,
}

/// What a command produced.
#[derive(Debug, Clone, Serialize)]
pub enum CommandOutput {
    /// Parsers accepting the file
    Parsers(Vec<ParserId>),
    /// Names of the parsed tests
    Tests(Vec<String>),
    Connected,
    Folders(Vec<FolderNode>),
    BugAssigned(bool),
    Imported(ImportReport),
    Disconnected,
}

pub struct Workbench<S: QcSession> {
    config: Config,
    session: S,
    history: Option<ConnectionHistory>,
    source: Option<PathBuf>,
    parsers: Vec<ParserId>,
    results: Option<ParseResult>,
    show_progress: bool,
}

impl<S: QcSession> Workbench<S> {
    pub fn new(config: Config, session: S) -> Self {
        let history = if config.history_enabled {
            match load_history(&config.history_file) {
                Ok(history) => Some(history),
                Err(e) => {
                    warn!("Ignoring unreadable history: {}", e);
                    Some(ConnectionHistory::new())
                }
            }
        } else {
            None
        };

        Workbench {
            config,
            session,
            history,
            source: None,
            parsers: Vec::new(),
            results: None,
            show_progress: false,
        }
    }

    /// Show a spinner while files are parsed.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn history(&self) -> Option<&ConnectionHistory> {
        self.history.as_ref()
    }

    pub fn parsers(&self) -> &[ParserId] {
        &self.parsers
    }

    pub fn results(&self) -> Option<&ParseResult> {
        self.results.as_ref()
    }

    /// Run one command.
    pub async fn execute(&mut self, command: Command) -> AppResult<CommandOutput> {
        match command {
            Command::ParseFile(path) => self.parse_file(path).await.map(CommandOutput::Parsers),
            Command::SelectParser(id) => self
                .select_parser(id)
                .await
                .map(|results| CommandOutput::Tests(test_names(results))),
            Command::Connect(credentials) => {
                self.connect(&credentials).await?;
                Ok(CommandOutput::Connected)
            }
            Command::BrowseFolder(path) => self.browse_folder(&path).await.map(CommandOutput::Folders),
            Command::AssignBug { test, bug } => {
                self.assign_bug(&test, &bug).await.map(CommandOutput::BugAssigned)
            }
            Command::Upload {
                destination,
                tests,
                attach,
            } => self
                .upload(&destination, &tests, attach)
                .await
                .map(CommandOutput::Imported),
            Command::Disconnect => {
                self.disconnect().await?;
                Ok(CommandOutput::Disconnected)
            }
        }
    }

    /// Find the parsers accepting `path`. A single match is selected right away.
    pub async fn parse_file(&mut self, path: PathBuf) -> AppResult<Vec<ParserId>> {
        self.results = None;
        self.parsers.clear();

        let config = self.config.clone();
        let source = path.clone();
        let progress = self.progress("Detecting result format...");
        self.parsers = run_blocking(&progress, move || get_parsers(&source, &config), |r| r)
            .await??;
        self.source = Some(path.clone());

        if self.parsers.is_empty() {
            let source = path.display().to_string();
            error!("No parsers found for file: {}", source);
            return Err(AppError::NoParser(source));
        }
        if let Some(source) = path.to_str() {
            self.remember([("source", source)]);
        }
        if let [only] = self.parsers[..] {
            self.select_parser(only).await?;
        }
        Ok(self.parsers.clone())
    }

    /// Parse the source file with one of the matching parsers.
    pub async fn select_parser(&mut self, id: ParserId) -> AppResult<&ParseResult> {
        let source = self
            .source
            .clone()
            .ok_or_else(|| AppError::Validation("no result file selected".to_string()))?;
        if !self.parsers.contains(&id) {
            return Err(AppError::Validation(format!(
                "parser {} does not accept {}",
                id,
                source.display()
            )));
        }

        let options = self.config.parser_options(id);
        let path = source.clone();
        let progress = self.progress(format!("Parsing {}...", source.display()));
        let results = run_blocking(
            &progress,
            move || parse_results(id, &path, &options),
            |r| r,
        )
        .await??;
        info!(
            "Parsed {} tests from {} with {}",
            results.tests.len(),
            source.display(),
            id
        );
        Ok(self.results.insert(results))
    }

    /// Open a session, closing any previous one. Used values go to the history.
    pub async fn connect(&mut self, credentials: &Credentials) -> AppResult<()> {
        self.disconnect().await?;
        adapter::connect(&mut self.session, credentials).await?;

        self.remember([
            ("url", credentials.url.as_str()),
            ("domain", credentials.domain.as_str()),
            ("project", credentials.project.as_str()),
            ("username", credentials.username.as_str()),
        ]);
        Ok(())
    }

    /// Child folders of a `Root\...` or `Subject\...` path.
    pub async fn browse_folder(&mut self, path: &str) -> AppResult<Vec<FolderNode>> {
        let path = QcPath::parse(path)?;
        self.require_connection()?;
        Ok(get_subdirectories(&mut self.session, &path).await?)
    }

    /// Every bug of the connected project.
    pub async fn bugs(&mut self) -> AppResult<Vec<BugInfo>> {
        self.require_connection()?;
        Ok(get_bugs(&mut self.session).await?)
    }

    /// Attach a bug id to a failed test. Tests without a failed step are skipped.
    pub async fn assign_bug(&mut self, test_name: &str, bug: &str) -> AppResult<bool> {
        let bug_id = bug
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .ok_or_else(|| AppError::Validation(format!("invalid bug id: {}", bug)))?;

        let has_failed_step = self
            .results
            .as_ref()
            .ok_or_else(|| AppError::Validation("no results parsed".to_string()))?
            .tests
            .iter()
            .find(|t| t.name == test_name)
            .ok_or_else(|| AppError::Validation(format!("unknown test: {}", test_name)))?
            .first_failed_step()
            .is_some();
        if !has_failed_step {
            error!("Test '{}' has no failed step to link a bug to", test_name);
            return Ok(false);
        }

        if self.session.is_connected() {
            let bugs = get_bugs(&mut self.session).await?;
            if !bugs.iter().any(|b| b.id == bug_id.to_string()) {
                error!("No bug found with id {}", bug_id);
                return Ok(false);
            }
        }

        if let Some(test) = self.results.as_mut().and_then(|r| r.test_mut(test_name)) {
            test.bug = Some(bug_id.to_string());
        }
        Ok(true)
    }

    /// Upload the named tests to `destination`.
    pub async fn upload(
        &mut self,
        destination: &str,
        tests: &[String],
        attach: bool,
    ) -> AppResult<ImportReport> {
        if destination.trim().is_empty() {
            return Err(AppError::Validation(
                "a destination folder is required".to_string(),
            ));
        }
        if tests.is_empty() {
            return Err(AppError::Validation("no tests selected".to_string()));
        }
        let results = self
            .results
            .as_ref()
            .ok_or_else(|| AppError::Validation("no results parsed".to_string()))?;

        let unknown: Vec<&str> = tests
            .iter()
            .filter(|name| !results.tests.iter().any(|t| &t.name == *name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(AppError::Validation(format!(
                "unknown tests: {}",
                unknown.join(", ")
            )));
        }
        self.require_connection()?;

        let mut selection = results.select(tests);
        let report = import_results(&mut self.session, destination, &mut selection, attach).await?;
        self.remember([("destination", destination)]);
        Ok(report)
    }

    /// Close the session if one is open.
    pub async fn disconnect(&mut self) -> AppResult<()> {
        adapter::disconnect(Some(&mut self.session)).await?;
        Ok(())
    }

    fn remember<'a>(&mut self, items: impl IntoIterator<Item = (&'a str, &'a str)>) {
        if let Some(history) = self.history.as_mut()
            && let Err(e) = update_history(&self.config.history_file, history, items)
        {
            warn!("Could not save history: {}", e);
        }
    }

    fn require_connection(&self) -> AppResult<()> {
        if self.session.is_connected() {
            Ok(())
        } else {
            Err(QcError::NotConnected.into())
        }
    }

    fn progress(&self, message: impl Into<String>) -> ProgressBar {
        if self.show_progress {
            spinner(message)
        } else {
            ProgressBar::hidden()
        }
    }
}

fn test_names(results: &ParseResult) -> Vec<String> {
    results.tests.iter().map(|t| t.name.clone()).collect()
}

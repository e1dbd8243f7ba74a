//! QCRI - Main entry point.
//!
//! Parses the command line, sets up logging and runs the requested command
//! against Quality Center (or an in-memory project with `--dry-run`).

use std::io::{self, IsTerminal};

use clap::Parser;
use tracing::{error, info, warn};

use qcri_lib::cli::{self, Cli, Prompter};
use qcri_lib::config::Config;
use qcri_lib::error::AppResult;
use qcri_lib::logging;
use qcri_lib::qc::{AlmRestSession, MemorySession, QcSession};
use qcri_lib::services::Workbench;

async fn run_with<S: QcSession>(cli: &Cli, config: Config, session: S) -> AppResult<()> {
    let mut bench = Workbench::new(config, session).with_progress(true);
    let stdin = io::stdin();
    let masked = stdin.is_terminal();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout()).with_masked_input(masked);
    cli::run(cli, &mut bench, &mut prompter).await
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init(config.log_file.as_deref(), cli.verbose) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
    info!("QCRI {} starting", env!("CARGO_PKG_VERSION"));

    let result = if cli.dry_run {
        warn!("Dry run: results go to an in-memory project");
        run_with(&cli, config, MemorySession::new()).await
    } else {
        match AlmRestSession::new(config.http_timeout()) {
            Ok(session) => run_with(&cli, config, session).await,
            Err(e) => Err(e.into()),
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

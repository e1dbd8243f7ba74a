//! Import workflow services.

pub mod archive;
pub mod background;
pub mod history;
pub mod importer;
pub mod workbench;

pub use archive::build_report_archive;
pub use background::{run_blocking, spinner};
pub use history::{load_history, save_history, update_history};
pub use importer::{ImportReport, TestOutcome, import_results};
pub use workbench::{Command, CommandOutput, Workbench};

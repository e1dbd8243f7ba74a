//! Domain models for the results importer.

pub mod history;
pub mod parse_result;
pub mod test_record;

// Re-export commonly used types
pub use history::ConnectionHistory;
pub use parse_result::ParseResult;
pub use test_record::{Status, StepRecord, TestRecord};

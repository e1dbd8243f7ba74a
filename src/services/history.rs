//! Connection history persistence.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::ConnectionHistory;

/// Load the history file; a missing file is an empty history.
pub fn load_history(path: &Path) -> AppResult<ConnectionHistory> {
    if !path.is_file() {
        debug!("History file not found: {}", path.display());
        return Ok(ConnectionHistory::new());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::History(format!("cannot read {}: {}", path.display(), e)))?;
    Ok(serde_json::from_str(&content)?)
}

/// Deduplicate and write the whole history, replacing the previous file.
pub fn save_history(path: &Path, history: &mut ConnectionHistory) -> AppResult<()> {
    history.dedup();
    let json = serde_json::to_string(history)?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)
        .and_then(|()| fs::rename(&tmp, path))
        .map_err(|e| AppError::History(format!("cannot write {}: {}", path.display(), e)))?;
    debug!("History saved to {}", path.display());
    Ok(())
}

/// Record newly used values and save. The password is never stored.
pub fn update_history<'a, I>(path: &Path, history: &mut ConnectionHistory, items: I) -> AppResult<()>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    history.update(items);
    save_history(path, history)
}

//! Busy indicator for blocking work.
//!
//! The work runs on a blocking worker thread and hands its result back over
//! a one-shot channel. The caller polls the channel at a fixed interval,
//! ticking a spinner until the result arrives, then runs the completion
//! callback. There is no cancellation and no timeout.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::error;

use crate::error::{AppError, AppResult};

/// How often the completion channel is polled.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A spinner showing `message`, ticked by [`run_blocking`].
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.into());
    spinner
}

/// Run `work` off the async thread, then hand its result to `on_complete`.
pub async fn run_blocking<T, R, F, C>(spinner: &ProgressBar, work: F, on_complete: C) -> AppResult<R>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
    C: FnOnce(T) -> R,
{
    let (tx, mut rx) = oneshot::channel();
    let worker = tokio::task::spawn_blocking(move || {
        // the receiver only goes away if the caller is dropped
        let _ = tx.send(work());
    });

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        match rx.try_recv() {
            Ok(value) => {
                spinner.finish_and_clear();
                return Ok(on_complete(value));
            }
            Err(TryRecvError::Empty) => spinner.tick(),
            Err(TryRecvError::Closed) => {
                spinner.abandon();
                let reason = match worker.await {
                    Err(e) => e.to_string(),
                    Ok(()) => "worker exited without a result".to_string(),
                };
                error!("Background work failed: {}", reason);
                return Err(AppError::Internal(reason));
            }
        }
    }
}

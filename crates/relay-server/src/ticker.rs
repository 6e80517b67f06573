//! Background expiry sweep, independent of request handling.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::dispatcher::AppState;

/// Runs `Store::expire()` every `tick_interval`, forever. Never terminates
/// the process on a compaction error (§7 "Fatal conditions: None"); an I/O
/// failure against the index itself is logged at `error` and the loop
/// continues on the next tick.
pub async fn run(state: Arc<AppState>, tick_interval: Duration) {
    let mut interval = tokio::time::interval(tick_interval);
    loop {
        interval.tick().await;
        let state = Arc::clone(&state);
        match tokio::task::spawn_blocking(move || state.store.expire()).await {
            Ok(Ok(expired)) => {
                if expired > 0 {
                    info!(expired, "expiry tick complete");
                }
            }
            Ok(Err(e)) => error!(error = %e, "expiry tick failed"),
            Err(e) => error!(error = %e, "expiry tick task panicked"),
        }
    }
}

use std::time::Duration;

use tracing::{info, warn};

use crate::state::AppState;

/// Background task that prunes abandoned uploads from the temp area.
pub async fn run_cleanup_loop(state: AppState, retention: Duration, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match state.storage.prune_temp(retention).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: pruned {} stale temp uploads", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }
    }
}

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration as TokioDuration};
use tracing::{info, warn};

use crate::config;
use crate::store::{ChatStore, StoreError};

/// key: chat-cleanup -> drops abandoned empty chats on an interval
pub fn spawn(store: Arc<dyn ChatStore>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let interval = TokioDuration::from_secs(*config::CLEANUP_INTERVAL_SECS);
    let max_age = Duration::minutes(*config::CLEANUP_MAX_AGE_MINUTES);

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cutoff = Utc::now() - max_age;
                    match process_tick(&*store, cutoff).await {
                        Ok(0) => {}
                        Ok(deleted) => info!(deleted, "removed abandoned empty chats"),
                        Err(err) => warn!(?err, "error cleaning empty chats"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// One sweep: deletes every session that never got a message and is older
/// than the cutoff.
pub async fn process_tick(
    store: &dyn ChatStore,
    cutoff: DateTime<Utc>,
) -> Result<u64, StoreError> {
    store.delete_empty_sessions_before(cutoff).await
}

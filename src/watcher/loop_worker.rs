use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::settings::WatchSettings;
use crate::sorting::Sorter;

use super::oracle::SizeOracle;
use super::stability::StabilityTracker;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const PRUNE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Polls `oracle`, sorts every file that finishes arriving, prunes history
/// daily and flushes statistics every minute. Exits after the file in
/// flight when `cancel_token` fires; unsorted files stay where they are
/// and are picked up by the next run.
pub async fn watch_loop<O>(
    sorter: Sorter,
    oracle: O,
    watch: WatchSettings,
    cancel_token: CancellationToken,
) where
    O: SizeOracle + Clone + Send + Sync + 'static,
{
    sorter.prune_history(Utc::now()).await;

    let tracker = Arc::new(Mutex::new(StabilityTracker::new(watch)));

    let mut poll_ticker = tokio::time::interval(watch.poll_interval);
    poll_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut prune_ticker = tokio::time::interval_at(Instant::now() + PRUNE_INTERVAL, PRUNE_INTERVAL);
    let mut flush_ticker = tokio::time::interval_at(Instant::now() + FLUSH_INTERVAL, FLUSH_INTERVAL);
    flush_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log_info!(
        "watch loop started (poll every {}ms, {} stable polls)",
        watch.poll_interval.as_millis(),
        watch.stable_polls
    );

    loop {
        tokio::select! {
            _ = poll_ticker.tick() => {
                if let Err(err) = poll_once(&sorter, &oracle, &tracker, &cancel_token).await {
                    log_warn!("watch poll failed: {err:?}");
                }
            }
            _ = prune_ticker.tick() => {
                sorter.prune_history(Utc::now()).await;
            }
            _ = flush_ticker.tick() => {
                flush_statistics(&sorter).await;
            }
            _ = cancel_token.cancelled() => {
                log_info!("watch loop shutting down");
                break;
            }
        }
    }

    flush_statistics(&sorter).await;
}

async fn poll_once<O>(
    sorter: &Sorter,
    oracle: &O,
    tracker: &Arc<Mutex<StabilityTracker>>,
    cancel_token: &CancellationToken,
) -> Result<()>
where
    O: SizeOracle + Clone + Send + Sync + 'static,
{
    // Listing and open checks touch the filesystem, so both run off the
    // async workers.
    let (ready, still_arriving) = tokio::task::spawn_blocking({
        let oracle = oracle.clone();
        let tracker = Arc::clone(tracker);
        move || {
            let mut tracker = tracker.lock().unwrap_or_else(PoisonError::into_inner);
            tracker
                .poll(std::time::Instant::now(), &oracle)
                .map(|ready| (ready, tracker.pending_count()))
        }
    })
    .await
    .context("directory listing worker join failed")?
    .context("failed to list download directory")?;

    if ready.is_empty() {
        return Ok(());
    }

    log_debug!("{} file(s) ready, {} still arriving", ready.len(), still_arriving);

    for file in ready {
        if cancel_token.is_cancelled() {
            log_info!("cancelled; leaving {} for the next run", file.path.display());
            break;
        }
        // A source left behind stays promoted so it is not sorted twice.
        if sorter.process(&file).await.released_source() {
            tracker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .forget(&file.path);
        }
    }
    Ok(())
}

async fn flush_statistics(sorter: &Sorter) {
    match sorter.flush_statistics().await {
        Ok(0) => {}
        Ok(rows) => log_debug!("flushed {rows} statistics row(s)"),
        Err(err) => log_warn!("statistics flush failed, keeping counts for later: {err:?}"),
    }
}

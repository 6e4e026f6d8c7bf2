//! The last room captured by the hotkey helper.
//!
//! The helper is a separate process that rewrites a one-line record
//! (`<room>|<YYYYMMDDHHMMSS>`) every time the user presses the hotkey. We
//! cannot lock its file, so a read that lands mid-rewrite is simply retried.

mod record;

pub use record::{parse_record, parse_record_bytes, RecordError, RoomContext, TIMESTAMP_FORMAT};

use chrono::{DateTime, Utc};
use std::{
    io,
    path::PathBuf,
    time::Duration,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Room used when no usable capture exists.
pub const FALLBACK_ROOM: &str = "Uncategorized";

const DEFAULT_READ_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct ContextStore {
    path: PathBuf,
    ttl: Option<Duration>,
    attempts: u32,
    retry_delay: Duration,
}

impl ContextStore {
    pub fn new(path: PathBuf, ttl: Option<Duration>) -> Self {
        Self {
            path,
            ttl,
            attempts: DEFAULT_READ_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub async fn read(&self) -> Option<RoomContext> {
        self.read_at(Utc::now()).await
    }

    /// Reads the current capture as seen at `now`. `None` means missing,
    /// unreadable after every retry, or older than the TTL.
    pub async fn read_at(&self, now: DateTime<Utc>) -> Option<RoomContext> {
        for attempt in 1..=self.attempts {
            let bytes = match tokio::fs::read(&self.path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    log_debug!("No room context at {}", self.path.display());
                    return None;
                }
                Err(err) => {
                    log_debug!(
                        "Room context read {attempt}/{} failed: {err}",
                        self.attempts
                    );
                    self.pause_before_retry(attempt).await;
                    continue;
                }
            };

            match parse_record_bytes(bytes) {
                Ok(context) => return self.fresh(context, now),
                Err(reason) => {
                    log_debug!(
                        "Room context attempt {attempt}/{} malformed: {reason}",
                        self.attempts
                    );
                    self.pause_before_retry(attempt).await;
                }
            }
        }

        log_debug!("Giving up on room context after {} attempts", self.attempts);
        None
    }

    async fn pause_before_retry(&self, attempt: u32) {
        if attempt < self.attempts {
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    fn fresh(&self, context: RoomContext, now: DateTime<Utc>) -> Option<RoomContext> {
        let Some(ttl) = self.ttl else {
            return Some(context);
        };
        let age = now.signed_duration_since(context.captured_at);
        match age.to_std() {
            Ok(age) if age > ttl => {
                log_debug!(
                    "Room context '{}' is {}s old, past the {}s TTL",
                    context.room_name,
                    age.as_secs(),
                    ttl.as_secs()
                );
                None
            }
            // Negative age means the capturer's clock is ahead of ours.
            _ => Some(context),
        }
    }
}

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::io;
use std::time::Instant;

use super::oracle::SizeOracle;
use crate::settings::WatchSettings;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// A file the watcher has decided is done arriving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub path: PathBuf,
    pub first_seen_at: Instant,
    pub last_size: u64,
    /// When the size last changed.
    pub stable_since: Instant,
    /// Promoted by the max-age cutoff rather than by settling.
    pub forced: bool,
}

#[derive(Debug, Clone)]
enum Tracked {
    Growing {
        first_seen_at: Instant,
        last_size: u64,
        stable_since: Instant,
        equal_polls: u32,
    },
    Promoted,
}

/// Per-path state table: Growing → Promoted, or dropped when the file
/// vanishes first.
///
/// Time and sizes come from the caller so the table can be driven without
/// touching the filesystem.
#[derive(Debug)]
pub struct StabilityTracker {
    settings: WatchSettings,
    table: HashMap<PathBuf, Tracked>,
}

impl StabilityTracker {
    pub fn new(settings: WatchSettings) -> Self {
        Self {
            settings,
            table: HashMap::new(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.table
            .values()
            .filter(|state| matches!(state, Tracked::Growing { .. }))
            .count()
    }

    /// Drops whatever is known about `path`, so the next file to appear
    /// under that name starts over as a new arrival.
    pub fn forget(&mut self, path: &Path) {
        self.table.remove(path);
    }

    /// Takes a listing from `oracle` and feeds it through [`observe`],
    /// holding back files the oracle cannot open yet.
    ///
    /// [`observe`]: StabilityTracker::observe
    pub fn poll(&mut self, now: Instant, oracle: &impl SizeOracle) -> io::Result<Vec<PendingFile>> {
        let listing = oracle.snapshot()?;
        Ok(self.observe_with(now, listing, |path| oracle.can_open(path)))
    }

    /// Feeds one directory listing taken at `now`. Returns the files that
    /// became ready, oldest first. Each path is returned at most once while
    /// it stays in the listing.
    pub fn observe(&mut self, now: Instant, listing: Vec<(PathBuf, u64)>) -> Vec<PendingFile> {
        self.observe_with(now, listing, |_| true)
    }

    /// Like [`observe`], but a file is only promoted once `openable`
    /// accepts it. Until then it stays Growing with its count intact.
    ///
    /// [`observe`]: StabilityTracker::observe
    pub fn observe_with(
        &mut self,
        now: Instant,
        listing: Vec<(PathBuf, u64)>,
        openable: impl Fn(&Path) -> bool,
    ) -> Vec<PendingFile> {
        let mut seen = HashSet::with_capacity(listing.len());
        let mut ready = Vec::new();

        for (path, size) in listing {
            if !seen.insert(path.clone()) {
                continue;
            }
            if let Some(file) = self.advance(&path, size, now, &openable) {
                ready.push(file);
            }
        }

        self.table.retain(|path, state| {
            let present = seen.contains(path);
            if !present && matches!(state, Tracked::Growing { .. }) {
                log_debug!("{} vanished before settling; dropping", path.display());
            }
            present
        });

        ready.sort_by(|a, b| {
            a.first_seen_at
                .cmp(&b.first_seen_at)
                .then_with(|| a.path.cmp(&b.path))
        });
        ready
    }

    fn advance(
        &mut self,
        path: &Path,
        size: u64,
        now: Instant,
        openable: impl Fn(&Path) -> bool,
    ) -> Option<PendingFile> {
        let state = self.table.entry(path.to_path_buf()).or_insert(Tracked::Growing {
            first_seen_at: now,
            last_size: size,
            stable_since: now,
            equal_polls: 0,
        });

        let Tracked::Growing {
            first_seen_at,
            last_size,
            stable_since,
            equal_polls,
        } = state
        else {
            return None;
        };

        if *first_seen_at != now {
            if size == *last_size && size > 0 {
                *equal_polls += 1;
            } else {
                *last_size = size;
                *stable_since = now;
                *equal_polls = 0;
            }
        }

        let settled = *equal_polls >= self.settings.stable_polls;
        let max_pending = self.settings.max_pending;
        let overdue =
            !max_pending.is_zero() && now.saturating_duration_since(*first_seen_at) >= max_pending;

        if !settled && !overdue {
            return None;
        }

        if !openable(path) {
            log_debug!("{} is still held open elsewhere; waiting", path.display());
            return None;
        }

        if !settled {
            log_warn!(
                "{} still changing after {}s; promoting anyway",
                path.display(),
                max_pending.as_secs()
            );
        }

        let file = PendingFile {
            path: path.to_path_buf(),
            first_seen_at: *first_seen_at,
            last_size: *last_size,
            stable_since: *stable_since,
            forced: !settled,
        };
        *state = Tracked::Promoted;
        Some(file)
    }
}

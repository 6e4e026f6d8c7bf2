use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::context::{ContextStore, FALLBACK_ROOM};
use crate::db::{Database, MoveOutcome, MoveRecord};
use crate::error::SortError;
use crate::history::HistoryLedger;
use crate::settings::{DuplicateHandling, Settings};
use crate::statistics::{StatisticsAggregator, StatisticsSnapshot};
use crate::utils::paths::{is_within, safe_file_name, safe_name};
use crate::watcher::PendingFile;

use super::classifier::{classify, Category, Classification};
use super::collision::{resolve, Resolution};
use super::mover::{move_file, MoveMethod};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// `{ts}` keeps minutes but drops seconds.
const TEMPLATE_TS_FORMAT: &str = "%Y%m%d%H%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UntouchedReason {
    ExcludedExtension,
    ExcludedRoom,
}

/// What the sorter did with one promoted file.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Left in place on purpose. No record is written.
    Untouched {
        path: PathBuf,
        reason: UntouchedReason,
    },
    Recorded(MoveRecord),
}

impl Disposition {
    pub fn record(&self) -> Option<&MoveRecord> {
        match self {
            Disposition::Recorded(record) => Some(record),
            Disposition::Untouched { .. } => None,
        }
    }

    /// True once the file is no longer at its download path.
    pub fn released_source(&self) -> bool {
        self.record().is_some_and(|record| {
            record.outcome == MoveOutcome::Moved && record.error.is_none()
        })
    }
}

/// Result of the filesystem half of a move.
#[derive(Debug)]
pub enum Relocation {
    Moved { dest: PathBuf, method: MoveMethod },
    Skipped { dest: PathBuf },
    Failed { dest: PathBuf, error: SortError },
}

/// Runs promoted files through classify → correlate → resolve → move →
/// record. One file at a time: the existence check in collision
/// resolution and the move that follows are never interleaved with
/// another move.
#[derive(Clone)]
pub struct Sorter {
    settings: Arc<Settings>,
    context: ContextStore,
    history: HistoryLedger,
    statistics: StatisticsAggregator,
    db: Database,
}

impl Sorter {
    pub fn new(settings: Arc<Settings>, db: Database) -> Self {
        let context = ContextStore::new(settings.context_file.clone(), settings.context_ttl);
        let history = HistoryLedger::new(db.clone(), settings.enable_history);
        let statistics = StatisticsAggregator::new(settings.enable_statistics);
        Self {
            settings,
            context,
            history,
            statistics,
            db,
        }
    }

    pub fn with_context_store(mut self, context: ContextStore) -> Self {
        self.context = context;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn history(&self) -> &HistoryLedger {
        &self.history
    }

    pub async fn process(&self, file: &PendingFile) -> Disposition {
        let source = file.path.clone();
        let settings = &self.settings;

        let category = match classify(
            &source,
            &settings.exclude_extensions,
            &settings.category_overrides,
        ) {
            Classification::Excluded => {
                log_debug!("{} has an excluded extension; leaving it", source.display());
                return self.untouched(source, UntouchedReason::ExcludedExtension).await;
            }
            Classification::Category(category) => category,
        };

        let context = self.context.read().await;
        let raw_room = context.as_ref().map(|c| c.room_name.as_str());
        let room = room_directory(raw_room);
        if raw_room.is_some_and(|raw| settings.is_room_excluded(raw))
            || settings.is_room_excluded(&room)
        {
            log_info!("{} belongs to excluded room '{room}'; leaving it", source.display());
            return self.untouched(source, UntouchedReason::ExcludedRoom).await;
        }

        let captured_at = context.map(|c| c.captured_at).unwrap_or_else(Utc::now);
        let file_name = render_file_name(
            &settings.rename_template,
            &source,
            &room,
            category,
            captured_at,
        );
        let dest = settings
            .output_dir
            .join(&room)
            .join(category.as_str())
            .join(file_name);

        if file.forced {
            log_warn!("{} never settled; moving it as-is", source.display());
        }

        let relocation = {
            let (from, to) = (source.clone(), dest.clone());
            let download_dir = settings.download_dir.clone();
            let policy = settings.duplicate_handling;
            tokio::task::spawn_blocking(move || relocate(&from, &to, &download_dir, policy))
                .await
                .unwrap_or_else(|err| Relocation::Failed {
                    dest,
                    error: SortError::Io {
                        path: source.clone(),
                        source: io::Error::other(err.to_string()),
                    },
                })
        };

        let record = self.finish(source, room, category, relocation);
        self.remember(&record).await;
        Disposition::Recorded(record)
    }

    fn finish(
        &self,
        source: PathBuf,
        room: String,
        category: Category,
        relocation: Relocation,
    ) -> MoveRecord {
        let (dest, outcome, error) = match relocation {
            Relocation::Moved { dest, method } => {
                log_info!("Moved {} -> {} ({method:?})", source.display(), dest.display());
                let note = matches!(method, MoveMethod::Copied { source_retained: true })
                    .then(|| "copied, but the source could not be removed".to_string());
                (dest, MoveOutcome::Moved, note)
            }
            Relocation::Skipped { dest } => {
                log_info!(
                    "Skipped {}: {} already exists",
                    source.display(),
                    dest.display()
                );
                (dest, MoveOutcome::Skipped, None)
            }
            Relocation::Failed { dest, error } => {
                if error.is_user_visible() {
                    log_error!("Could not move {}: {error}", source.display());
                } else {
                    log_warn!("Could not move {}: {error}", source.display());
                }
                (dest, MoveOutcome::Failed, Some(error.to_string()))
            }
        };
        MoveRecord::new(source, dest, room, category, Utc::now(), outcome, error)
    }

    /// History and statistics are best-effort: their failures are logged
    /// and never change the outcome.
    async fn remember(&self, record: &MoveRecord) {
        if let Err(err) = self.history.append(record).await {
            log_warn!("Failed to append move history for {}: {err:?}", record.source_path.display());
        }
        self.statistics.record_outcome(record.outcome).await;
        if record.outcome == MoveOutcome::Moved {
            self.statistics
                .record(&record.room, record.category, record.timestamp)
                .await;
        }
    }

    async fn untouched(&self, path: PathBuf, reason: UntouchedReason) -> Disposition {
        self.statistics.record_untouched().await;
        Disposition::Untouched { path, reason }
    }

    pub async fn prune_history(&self, now: DateTime<Utc>) -> u64 {
        match self.history.prune(now).await {
            Ok(removed) => removed,
            Err(err) => {
                log_warn!("History prune failed: {err:?}");
                0
            }
        }
    }

    pub async fn flush_statistics(&self) -> Result<usize> {
        self.statistics.flush(&self.db).await
    }

    pub async fn snapshot(&self) -> StatisticsSnapshot {
        self.statistics.snapshot().await
    }
}

/// Sanitized directory name for a captured room, or the fallback room.
pub fn room_directory(raw_room: Option<&str>) -> String {
    raw_room
        .map(safe_name)
        .filter(|room| !room.is_empty())
        .unwrap_or_else(|| FALLBACK_ROOM.to_string())
}

/// Expands `{ts}`, `{room}`, `{category}` (alias `{bucket}`) and `{orig}`.
/// A template that renders to nothing falls back to the original name.
pub fn render_file_name(
    template: &str,
    source: &Path,
    room: &str,
    category: Category,
    captured_at: DateTime<Utc>,
) -> String {
    let orig = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ts = captured_at
        .with_timezone(&Local)
        .format(TEMPLATE_TS_FORMAT)
        .to_string();

    let rendered = template
        .replace("{ts}", &ts)
        .replace("{room}", room)
        .replace("{category}", category.as_str())
        .replace("{bucket}", category.as_str())
        .replace("{orig}", &orig);

    let name = safe_file_name(&rendered);
    if name.is_empty() {
        safe_file_name(&orig)
    } else {
        name
    }
}

/// Blocking half of a move: guard, collision policy, then the move itself.
pub fn relocate(
    source: &Path,
    dest: &Path,
    download_dir: &Path,
    policy: DuplicateHandling,
) -> Relocation {
    if is_within(dest, download_dir) {
        return Relocation::Failed {
            dest: dest.to_path_buf(),
            error: SortError::DestinationInsideDownloads {
                dest: dest.to_path_buf(),
            },
        };
    }

    let resolution = match resolve(dest, policy, Path::exists) {
        Ok(resolution) => resolution,
        Err(error) => {
            return Relocation::Failed {
                dest: dest.to_path_buf(),
                error,
            }
        }
    };

    match resolution {
        Resolution::Skip(dest) => Relocation::Skipped { dest },
        Resolution::Write(dest) | Resolution::Overwrite(dest) => match move_file(source, &dest) {
            Ok(method) => Relocation::Moved { dest, method },
            Err(error) => Relocation::Failed { dest, error },
        },
    }
}

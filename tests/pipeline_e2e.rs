//! End-to-end tests for the sorting pipeline
//!
//! These drive the real watch loop against temp directories: a config file
//! on disk, a context record written the way the capture helper writes it,
//! and downloads dropped into the watched folder.

use chrono::Local;
use roomsort_lib::context::TIMESTAMP_FORMAT;
use roomsort_lib::db::{Database, HistoryFilter, MoveOutcome};
use roomsort_lib::settings::{RawSettings, Settings};
use roomsort_lib::sorting::Sorter;
use roomsort_lib::watcher::WatchController;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Create a test environment with temp directories
struct TestEnv {
    /// Temp directory (cleaned up on drop)
    _temp: TempDir,
    pub download_dir: PathBuf,
    pub output_dir: PathBuf,
    pub context_file: PathBuf,
    pub config_path: PathBuf,
}

impl TestEnv {
    fn new(extra: serde_json::Value) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let download_dir = temp.path().join("KakaoTalk Downloads");
        let output_dir = temp.path().join("KakaoSorted");
        let context_file = temp.path().join("kakao_room_ctx.txt");
        let config_path = temp.path().join("config").join("config.json");

        let mut config = serde_json::json!({
            "download_dir": download_dir,
            "output_dir": output_dir,
            "context_file": context_file,
            "data_dir": temp.path().join("data"),
            "poll_interval_ms": 50,
            "stable_polls": 2,
        });
        if let (Some(base), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
            for (key, value) in extra {
                base.insert(key.clone(), value.clone());
            }
        }

        fs::create_dir_all(config_path.parent().unwrap()).expect("Failed to create config dir");
        fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap())
            .expect("Failed to write config");

        Self {
            _temp: temp,
            download_dir,
            output_dir,
            context_file,
            config_path,
        }
    }

    fn settings(&self) -> Settings {
        Settings::load(&self.config_path).expect("Failed to load settings")
    }

    fn capture(&self, room: &str) {
        let stamp = Local::now().format(TIMESTAMP_FORMAT);
        fs::write(&self.context_file, format!("{room}|{stamp}")).expect("Failed to write context");
    }

    fn download(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.download_dir.join(name);
        fs::write(&path, content).expect("Failed to write download");
        path
    }
}

async fn wait_for(path: &Path) -> bool {
    for _ in 0..100 {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

async fn start(env: &TestEnv) -> (WatchController, Sorter, Database) {
    let settings = env.settings();
    let db = Database::new(settings.database_path()).unwrap();
    let sorter = Sorter::new(Arc::new(settings), db.clone());
    let mut controller = WatchController::new();
    controller.start(sorter.clone()).unwrap();
    (controller, sorter, db)
}

// ============================================================================
// Watch loop
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_captured_room_routes_download() {
    let env = TestEnv::new(serde_json::json!({}));
    let (mut controller, sorter, db) = start(&env).await;

    env.capture("Friends");
    tokio::time::sleep(Duration::from_millis(100)).await;
    let source = env.download("photo.jpg", b"not really a jpeg");

    let dest = env.output_dir.join("Friends").join("Image").join("photo.jpg");
    assert!(wait_for(&dest).await, "photo.jpg was never sorted");
    controller.stop().await.unwrap();

    assert!(!source.exists());
    assert_eq!(fs::read(&dest).unwrap(), b"not really a jpeg");

    let history = db.list_move_records(&HistoryFilter::default()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, MoveOutcome::Moved);
    assert_eq!(history[0].dest_path, dest);

    // Stopping flushes the day's counts.
    let stats = db.list_daily_stats(None).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].room, "Friends");
    assert_eq!(stats[0].count, 1);
    assert_eq!(sorter.snapshot().await.total_moved(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_each_download_yields_one_record() {
    let env = TestEnv::new(serde_json::json!({}));
    let (mut controller, _sorter, db) = start(&env).await;

    env.capture("Work");
    env.download("a.txt", b"one");
    let first = env.output_dir.join("Work").join("Document").join("a.txt");
    assert!(wait_for(&first).await);

    env.download("a.txt", b"two");
    let second = env.output_dir.join("Work").join("Document").join("a (1).txt");
    assert!(wait_for(&second).await);

    // Let a few more polls pass over the now-empty folder.
    tokio::time::sleep(Duration::from_millis(300)).await;
    controller.stop().await.unwrap();

    let history = db.list_move_records(&HistoryFilter::default()).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(fs::read(&second).unwrap(), b"two");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_context_uses_fallback_room() {
    let env = TestEnv::new(serde_json::json!({}));
    let (mut controller, _sorter, _db) = start(&env).await;

    env.download("notes.hwp", b"hwp");
    let dest = env
        .output_dir
        .join("Uncategorized")
        .join("Document")
        .join("notes.hwp");
    assert!(wait_for(&dest).await);
    controller.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exclusions_leave_files_in_place() {
    let env = TestEnv::new(serde_json::json!({
        "exclude_extensions": [".crdownload"],
        "exclude_rooms": ["Family"],
    }));
    let (mut controller, sorter, db) = start(&env).await;

    env.capture("Friends");
    let partial = env.download("movie.crdownload", b"partial");
    let moved = env.output_dir.join("Friends").join("Other").join("readme");
    env.download("readme", b"r");
    assert!(wait_for(&moved).await);

    env.capture("Family");
    let family = env.download("family.jpg", b"f");
    tokio::time::sleep(Duration::from_millis(500)).await;
    controller.stop().await.unwrap();

    assert!(partial.exists());
    assert!(family.exists());
    assert!(!env.output_dir.join("Family").exists());

    let history = db.list_move_records(&HistoryFilter::default()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(sorter.snapshot().await.outcomes.untouched, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_skip_policy_records_skip() {
    let env = TestEnv::new(serde_json::json!({ "duplicate_handling": "skip" }));
    let dest = env.output_dir.join("Work").join("Archive").join("bundle.zip");
    fs::create_dir_all(dest.parent().unwrap()).unwrap();
    fs::write(&dest, b"existing").unwrap();

    let (mut controller, _sorter, db) = start(&env).await;
    env.capture("Work");
    let source = env.download("bundle.zip", b"incoming");

    let mut skipped = Vec::new();
    for _ in 0..100 {
        skipped = db
            .list_move_records(&HistoryFilter {
                outcome: Some(MoveOutcome::Skipped),
                ..HistoryFilter::default()
            })
            .await
            .unwrap();
        if !skipped.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    controller.stop().await.unwrap();

    assert_eq!(skipped.len(), 1);
    assert_eq!(fs::read(&dest).unwrap(), b"existing");
    assert_eq!(fs::read(&source).unwrap(), b"incoming");
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_missing_config_is_created_with_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("fresh").join("config.json");

    let raw = RawSettings::load_or_init(&path).unwrap();

    assert!(path.exists());
    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["download_dir"], "AUTO");
    assert_eq!(written["duplicate_handling"], "rename");
    assert_eq!(raw.hotkey, "F8");
}

#[test]
fn test_output_inside_downloads_is_rejected() {
    let temp = TempDir::new().unwrap();
    let downloads = temp.path().join("dl");
    let config_path = temp.path().join("config.json");
    fs::write(
        &config_path,
        serde_json::json!({
            "download_dir": downloads,
            "output_dir": downloads.join("sorted"),
        })
        .to_string(),
    )
    .unwrap();

    assert!(Settings::load(&config_path).is_err());
}

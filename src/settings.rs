use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::sorting::classifier::{normalize_extension, Category};
use crate::utils::paths::{expand_env, is_within};

pub const AUTO: &str = "AUTO";
const DEFAULT_HOTKEY: &str = "F8";
const DEFAULT_CONTEXT_FILE_NAME: &str = "kakao_room_ctx.txt";
const DATABASE_FILE_NAME: &str = "roomsort.sqlite3";
const LOG_DIR_NAME: &str = "logs";
const MIN_POLL_INTERVAL_MS: u64 = 50;

/// Folder names the chat client is known to save into, relative to
/// Documents or Downloads. The first one that exists wins.
const KNOWN_DOWNLOAD_FOLDERS: &[(KnownRoot, &str)] = &[
    (KnownRoot::Documents, "카카오톡 받은 파일"),
    (KnownRoot::Downloads, "KakaoTalk Downloads"),
    (KnownRoot::Downloads, "KakaoTalk"),
    (KnownRoot::Downloads, "KakaoTalk/Download"),
    (KnownRoot::Documents, "KakaoTalk Downloads"),
];
const AUTO_OUTPUT_FOLDER: &str = "KakaoSorted";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateHandling {
    #[default]
    Rename,
    Skip,
    Overwrite,
}

/// The config file as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSettings {
    pub download_dir: String,
    pub output_dir: String,
    pub hotkey: String,
    pub exclude_rooms: Vec<String>,
    pub exclude_extensions: Vec<String>,
    pub duplicate_handling: DuplicateHandling,
    pub enable_statistics: bool,
    pub enable_history: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_file: Option<String>,
    pub context_ttl_secs: u64,
    pub poll_interval_ms: u64,
    pub stable_polls: u32,
    pub max_pending_secs: u64,
    pub rename_template: String,
    pub category_overrides: BTreeMap<String, Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Where dated log files go. Unset means `<data_dir>/logs`; an empty
    /// string turns file logging off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            download_dir: AUTO.into(),
            output_dir: AUTO.into(),
            hotkey: DEFAULT_HOTKEY.into(),
            exclude_rooms: Vec::new(),
            exclude_extensions: Vec::new(),
            duplicate_handling: DuplicateHandling::Rename,
            enable_statistics: true,
            enable_history: true,
            context_file: None,
            context_ttl_secs: 180,
            poll_interval_ms: 500,
            stable_polls: 2,
            max_pending_secs: 600,
            rename_template: "{orig}".into(),
            category_overrides: BTreeMap::new(),
            data_dir: None,
            log_dir: None,
        }
    }
}

/// Stabilization knobs for the directory watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    pub poll_interval: Duration,
    pub stable_polls: u32,
    pub max_pending: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            stable_polls: 2,
            max_pending: Duration::from_secs(600),
        }
    }
}

/// Fully resolved settings. Built once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct Settings {
    pub download_dir: PathBuf,
    pub output_dir: PathBuf,
    pub hotkey: String,
    pub exclude_rooms: HashSet<String>,
    pub exclude_extensions: HashSet<String>,
    pub duplicate_handling: DuplicateHandling,
    pub enable_statistics: bool,
    pub enable_history: bool,
    pub context_file: PathBuf,
    /// `None` accepts a captured room no matter how old it is.
    pub context_ttl: Option<Duration>,
    pub watch: WatchSettings,
    pub rename_template: String,
    pub category_overrides: HashMap<String, Category>,
    pub data_dir: PathBuf,
}

impl Settings {
    pub fn is_room_excluded(&self, room: &str) -> bool {
        self.exclude_rooms.contains(room.trim())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    /// Loads `path`, writing a default config there first if it is missing.
    pub fn load(path: &Path) -> Result<Self> {
        RawSettings::load_or_init(path)?.resolve(&KnownFolders::detect())
    }
}

#[derive(Debug, Clone, Copy)]
enum KnownRoot {
    Documents,
    Downloads,
}

/// The OS folders `AUTO` paths are resolved against.
#[derive(Debug, Clone)]
pub struct KnownFolders {
    pub documents: PathBuf,
    pub downloads: PathBuf,
}

impl KnownFolders {
    /// Asks the OS. On Windows this goes through the known-folder API, so a
    /// Documents folder redirected into OneDrive is reported where it lives.
    pub fn detect() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let documents = dirs::document_dir().unwrap_or_else(|| home.join("Documents"));
        let downloads = dirs::download_dir().unwrap_or_else(|| home.join("Downloads"));
        Self {
            documents,
            downloads,
        }
    }

    fn root(&self, root: KnownRoot) -> &Path {
        match root {
            KnownRoot::Documents => &self.documents,
            KnownRoot::Downloads => &self.downloads,
        }
    }

    pub fn auto_download_dir(&self) -> PathBuf {
        KNOWN_DOWNLOAD_FOLDERS
            .iter()
            .map(|(root, rel)| self.root(*root).join(rel))
            .find(|candidate| candidate.is_dir())
            .unwrap_or_else(|| {
                let (root, rel) = KNOWN_DOWNLOAD_FOLDERS[0];
                self.root(root).join(rel)
            })
    }

    pub fn auto_output_dir(&self) -> PathBuf {
        self.documents.join(AUTO_OUTPUT_FOLDER)
    }
}

impl RawSettings {
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let defaults = RawSettings::default();
            defaults.persist(path)?;
            return Ok(defaults);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    /// Directory for the daily log files, or `None` when file logging is
    /// switched off. Needed before [`resolve`] so its warnings reach the file.
    ///
    /// [`resolve`]: RawSettings::resolve
    pub fn log_dir(&self) -> Option<PathBuf> {
        match self.log_dir.as_deref().map(str::trim) {
            Some("") => None,
            Some(raw) => Some(PathBuf::from(expand_env(raw))),
            None => Some(self.resolved_data_dir().join(LOG_DIR_NAME)),
        }
    }

    fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .as_deref()
            .map(|raw| PathBuf::from(expand_env(raw.trim())))
            .unwrap_or_else(default_data_dir)
    }

    pub fn resolve(&self, folders: &KnownFolders) -> Result<Settings> {
        let download_dir = resolve_dir(&self.download_dir, || folders.auto_download_dir());
        let output_dir = resolve_dir(&self.output_dir, || folders.auto_output_dir());

        if is_within(&output_dir, &download_dir) {
            bail!(
                "output_dir {} must not be inside download_dir {}",
                output_dir.display(),
                download_dir.display()
            );
        }

        let context_file = self
            .context_file
            .as_deref()
            .map(|raw| PathBuf::from(expand_env(raw.trim())))
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_CONTEXT_FILE_NAME));

        let data_dir = self.resolved_data_dir();

        let category_overrides = self
            .category_overrides
            .iter()
            .map(|(ext, category)| (normalize_extension(ext), *category))
            .filter(|(ext, _)| !ext.is_empty())
            .collect();

        Ok(Settings {
            download_dir,
            output_dir,
            hotkey: validated_hotkey(&self.hotkey),
            exclude_rooms: self
                .exclude_rooms
                .iter()
                .map(|room| room.trim().to_string())
                .filter(|room| !room.is_empty())
                .collect(),
            exclude_extensions: self
                .exclude_extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .filter(|ext| !ext.is_empty())
                .collect(),
            duplicate_handling: self.duplicate_handling,
            enable_statistics: self.enable_statistics,
            enable_history: self.enable_history,
            context_file,
            context_ttl: (self.context_ttl_secs > 0)
                .then(|| Duration::from_secs(self.context_ttl_secs)),
            watch: WatchSettings {
                poll_interval: Duration::from_millis(
                    self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS),
                ),
                stable_polls: self.stable_polls.max(1),
                max_pending: Duration::from_secs(self.max_pending_secs),
            },
            rename_template: if self.rename_template.trim().is_empty() {
                "{orig}".into()
            } else {
                self.rename_template.clone()
            },
            category_overrides,
            data_dir,
        })
    }
}

fn resolve_dir(raw: &str, auto: impl FnOnce() -> PathBuf) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case(AUTO) {
        auto()
    } else {
        PathBuf::from(expand_env(raw))
    }
}

fn validated_hotkey(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    let valid = upper
        .strip_prefix('F')
        .and_then(|n| n.parse::<u8>().ok())
        .map(|n| (1..=12).contains(&n))
        .unwrap_or(false);
    if valid {
        upper
    } else {
        warn!("Unsupported hotkey '{raw}', expected F1-F12; using {DEFAULT_HOTKEY}");
        DEFAULT_HOTKEY.into()
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("roomsort"))
        .unwrap_or_else(|| PathBuf::from(".roomsort"))
}

/// Where the binary looks for its config when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("roomsort").join("config.json"))
        .unwrap_or_else(|| PathBuf::from("config").join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn folders(temp: &TempDir) -> KnownFolders {
        KnownFolders {
            documents: temp.path().join("Documents"),
            downloads: temp.path().join("Downloads"),
        }
    }

    #[test]
    fn missing_config_is_created_with_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.json");

        let raw = RawSettings::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(raw.download_dir, AUTO);
        assert_eq!(raw.duplicate_handling, DuplicateHandling::Rename);

        let reread = RawSettings::load_or_init(&path).unwrap();
        assert_eq!(reread.poll_interval_ms, 500);
    }

    #[test]
    fn parses_documented_keys() {
        let json = r#"{
            "download_dir": "/dl",
            "output_dir": "/sorted",
            "hotkey": "f9",
            "exclude_rooms": [" Work ", ""],
            "exclude_extensions": [".TMP", "part"],
            "duplicate_handling": "skip",
            "enable_statistics": false,
            "enable_history": true,
            "category_overrides": { ".HEIC": "Image" }
        }"#;
        let raw: RawSettings = serde_json::from_str(json).unwrap();
        let temp = TempDir::new().unwrap();
        let settings = raw.resolve(&folders(&temp)).unwrap();

        assert_eq!(settings.download_dir, PathBuf::from("/dl"));
        assert_eq!(settings.output_dir, PathBuf::from("/sorted"));
        assert_eq!(settings.hotkey, "F9");
        assert!(settings.is_room_excluded("Work"));
        assert_eq!(settings.exclude_rooms.len(), 1);
        assert!(settings.exclude_extensions.contains("tmp"));
        assert!(settings.exclude_extensions.contains("part"));
        assert_eq!(settings.duplicate_handling, DuplicateHandling::Skip);
        assert!(!settings.enable_statistics);
        assert_eq!(settings.category_overrides.get("heic"), Some(&Category::Image));
        assert_eq!(settings.context_ttl, Some(Duration::from_secs(180)));
    }

    #[test]
    fn rejects_unknown_duplicate_policy() {
        let json = r#"{ "duplicate_handling": "merge" }"#;
        assert!(serde_json::from_str::<RawSettings>(json).is_err());
    }

    #[test]
    fn auto_prefers_existing_client_folder() {
        let temp = TempDir::new().unwrap();
        let known = folders(&temp);
        let existing = known.downloads.join("KakaoTalk");
        fs::create_dir_all(&existing).unwrap();

        let settings = RawSettings::default().resolve(&known).unwrap();
        assert_eq!(settings.download_dir, existing);
        assert_eq!(settings.output_dir, known.documents.join("KakaoSorted"));
    }

    #[test]
    fn auto_falls_back_to_documents_folder() {
        let temp = TempDir::new().unwrap();
        let known = folders(&temp);
        let settings = RawSettings::default().resolve(&known).unwrap();
        assert_eq!(settings.download_dir, known.documents.join("카카오톡 받은 파일"));
    }

    #[test]
    fn output_inside_downloads_is_rejected() {
        let temp = TempDir::new().unwrap();
        let raw = RawSettings {
            download_dir: "/dl".into(),
            output_dir: "/dl/sorted".into(),
            ..RawSettings::default()
        };
        assert!(raw.resolve(&folders(&temp)).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn output_reached_through_a_symlink_is_rejected() {
        let temp = TempDir::new().unwrap();
        let downloads = temp.path().join("dl");
        fs::create_dir_all(&downloads).unwrap();
        let link = temp.path().join("dl-link");
        std::os::unix::fs::symlink(&downloads, &link).unwrap();

        let raw = RawSettings {
            download_dir: downloads.to_string_lossy().into_owned(),
            output_dir: link.join("sorted").to_string_lossy().into_owned(),
            ..RawSettings::default()
        };
        assert!(raw.resolve(&folders(&temp)).is_err());
    }

    #[test]
    fn invalid_hotkey_falls_back() {
        assert_eq!(validated_hotkey("F13"), "F8");
        assert_eq!(validated_hotkey("ctrl"), "F8");
        assert_eq!(validated_hotkey(" f12 "), "F12");
    }

    #[test]
    fn log_dir_defaults_under_data_dir_and_can_be_disabled() {
        let raw: RawSettings = serde_json::from_str(r#"{ "data_dir": "/var/roomsort" }"#).unwrap();
        assert_eq!(raw.log_dir(), Some(PathBuf::from("/var/roomsort/logs")));

        let raw: RawSettings = serde_json::from_str(r#"{ "log_dir": "/tmp/rs-logs" }"#).unwrap();
        assert_eq!(raw.log_dir(), Some(PathBuf::from("/tmp/rs-logs")));

        let raw: RawSettings = serde_json::from_str(r#"{ "log_dir": "  " }"#).unwrap();
        assert_eq!(raw.log_dir(), None);
    }

    #[test]
    fn zero_ttl_disables_staleness_check() {
        let temp = TempDir::new().unwrap();
        let raw = RawSettings {
            download_dir: "/dl".into(),
            output_dir: "/out".into(),
            context_ttl_secs: 0,
            stable_polls: 0,
            poll_interval_ms: 1,
            ..RawSettings::default()
        };
        let settings = raw.resolve(&folders(&temp)).unwrap();
        assert_eq!(settings.context_ttl, None);
        assert_eq!(settings.watch.stable_polls, 1);
        assert_eq!(settings.watch.poll_interval, Duration::from_millis(50));
    }
}

use anyhow::{bail, Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::sorting::Sorter;

use super::loop_worker::watch_loop;
use super::oracle::DirectoryOracle;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Owns the background watch task for the download directory.
pub struct WatchController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl WatchController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start(&mut self, sorter: Sorter) -> Result<()> {
        if self.handle.is_some() {
            bail!("watcher already active");
        }

        let settings = sorter.settings();
        for dir in [&settings.download_dir, &settings.output_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        log_info!(
            "Watching {} -> {} (press {} in a chat room before saving)",
            settings.download_dir.display(),
            settings.output_dir.display(),
            settings.hotkey
        );

        let oracle = DirectoryOracle::new(settings.download_dir.clone());
        let watch = settings.watch;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(watch_loop(sorter, oracle, watch, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancels the loop and waits for the file in flight and the final
    /// statistics flush.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("watch loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for WatchController {
    fn default() -> Self {
        Self::new()
    }
}

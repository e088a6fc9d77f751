//! Static export through the Simply Static plugin.
//!
//! The export is started by requesting the plugin's trigger URL. The plugin
//! offers no status endpoint, so readiness means the export directory holds a
//! top-level entry written since the trigger. The directory doubles as the
//! deploy working tree, so `.git` and files left by earlier exports do not
//! count.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use devlog_core::contract::Exporter;
use reqwest::Client;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub struct SimplyStaticExporter {
    http: Client,
    trigger_url: String,
    export_path: PathBuf,
    poll_interval: Duration,
    triggered_at: Mutex<Option<SystemTime>>,
}

/// True when `path` has a top-level entry other than `.git`, modified at or
/// after `since` when given.
pub(crate) fn export_dir_ready(path: &Path, since: Option<SystemTime>) -> bool {
    let Ok(entries) = std::fs::read_dir(path) else {
        return false;
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name() != ".git")
        .any(|entry| match since {
            None => true,
            Some(since) => entry
                .metadata()
                .and_then(|meta| meta.modified())
                .is_ok_and(|modified| modified >= since),
        })
}

impl SimplyStaticExporter {
    pub fn new(http: Client, trigger_url: &str, export_path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        let export_path = export_path.into();
        if !export_path.exists() {
            warn!(path = %export_path.display(), "Export path does not exist yet");
        }
        Self {
            http,
            trigger_url: trigger_url.to_string(),
            export_path,
            poll_interval,
            triggered_at: Mutex::new(None),
        }
    }

    pub fn export_path(&self) -> &Path {
        &self.export_path
    }
}

#[async_trait]
impl Exporter for SimplyStaticExporter {
    async fn trigger_export(&self) -> bool {
        info!(url = %self.trigger_url, "Triggering static export");
        *self.triggered_at.lock().await = Some(SystemTime::now());
        match self.http.get(&self.trigger_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(status = %resp.status(), "Static export triggered");
                true
            }
            Ok(resp) => {
                error!(status = %resp.status(), url = %self.trigger_url, "Export trigger rejected");
                false
            }
            Err(e) => {
                error!(error = ?e, url = %self.trigger_url, "Export trigger request failed");
                false
            }
        }
    }

    async fn wait_for_export_ready(&self, timeout: Duration) -> bool {
        info!(path = %self.export_path.display(), timeout_secs = timeout.as_secs(), "Waiting for static export");
        let since = *self.triggered_at.lock().await;
        let deadline = Instant::now() + timeout;
        loop {
            if export_dir_ready(&self.export_path, since) {
                info!(path = %self.export_path.display(), "Export directory populated");
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                error!(path = %self.export_path.display(), "Timed out waiting for static export");
                return false;
            }
            debug!(path = %self.export_path.display(), "Export not ready yet");
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(start_paused = true)]
    async fn empty_export_dir_times_out() {
        let dir = tempdir().unwrap();
        let exporter = SimplyStaticExporter::new(
            Client::new(),
            "http://localhost/?simply_static_export=1",
            dir.path(),
            Duration::from_secs(10),
        );
        let start = Instant::now();
        assert!(!exporter.wait_for_export_ready(Duration::from_secs(30)).await);
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn populated_export_dir_is_ready_at_once() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>blog</h1>").unwrap();
        let exporter = SimplyStaticExporter::new(Client::new(), "http://localhost/", dir.path(), Duration::from_secs(10));
        assert!(exporter.wait_for_export_ready(Duration::from_secs(30)).await);
    }

    #[test]
    fn missing_dir_is_not_ready() {
        let dir = tempdir().unwrap();
        assert!(!export_dir_ready(&dir.path().join("missing"), None));
    }

    #[test]
    fn git_metadata_alone_is_not_an_export() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("HEAD"), "ref: refs/heads/gh-pages").unwrap();
        assert!(!export_dir_ready(dir.path(), None));

        std::fs::write(dir.path().join("index.html"), "<h1>blog</h1>").unwrap();
        assert!(export_dir_ready(dir.path(), None));
    }

    #[test]
    fn files_from_an_earlier_export_are_not_ready() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>old</h1>").unwrap();

        let later = SystemTime::now() + Duration::from_secs(3600);
        assert!(!export_dir_ready(dir.path(), Some(later)));
        assert!(export_dir_ready(dir.path(), Some(SystemTime::UNIX_EPOCH)));
    }
}

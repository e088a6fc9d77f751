//! Deploys the exported site by force-pushing it to a hosting branch.
//!
//! The export directory is treated as its own git working tree: initialised
//! and pointed at the remote on first use, switched to the hosting branch,
//! then committed and pushed. A commit with nothing to commit counts as a
//! successful deploy and skips the push.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use devlog_core::contract::Deployer;
use tokio::process::Command;
use tracing::{error, info, warn};

pub struct GitPagesDeployer {
    repo_path: PathBuf,
    repo_url: String,
    branch: String,
}

struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

pub(crate) fn nothing_to_commit(stdout: &str, stderr: &str) -> bool {
    stdout.contains("nothing to commit") || stderr.contains("nothing to commit")
}

impl GitPagesDeployer {
    pub fn new(repo_path: impl Into<PathBuf>, repo_url: &str, branch: &str) -> Self {
        Self {
            repo_path: repo_path.into(),
            repo_url: repo_url.to_string(),
            branch: branch.to_string(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    async fn git(&self, args: &[&str]) -> Option<GitOutput> {
        info!(args = ?args, cwd = %self.repo_path.display(), "Running git");
        match Command::new("git").args(args).current_dir(&self.repo_path).output().await {
            Ok(output) => {
                let result = GitOutput {
                    success: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                };
                if !result.success && !nothing_to_commit(&result.stdout, &result.stderr) {
                    error!(args = ?args, stderr = %result.stderr.trim(), "git command failed");
                }
                Some(result)
            }
            Err(e) => {
                error!(error = ?e, args = ?args, "Failed to spawn git");
                None
            }
        }
    }

    async fn git_ok(&self, args: &[&str]) -> bool {
        self.git(args).await.is_some_and(|out| out.success)
    }

    /// Makes sure the working tree is a repository on `branch` with the right remote.
    async fn prepare(&self) -> bool {
        if self.repo_path.join(".git").exists() {
            if !self.git_ok(&["remote", "set-url", "origin", &self.repo_url]).await {
                warn!(repo_url = %self.repo_url, "Could not update remote URL, continuing");
            }
        } else {
            info!(path = %self.repo_path.display(), "Initialising deploy repository");
            if !self.git_ok(&["init"]).await || !self.git_ok(&["remote", "add", "origin", &self.repo_url]).await {
                return false;
            }
        }
        self.git_ok(&["checkout", "-B", &self.branch]).await
    }
}

#[async_trait]
impl Deployer for GitPagesDeployer {
    async fn deploy(&self, message: &str) -> bool {
        info!(path = %self.repo_path.display(), repo_url = %self.repo_url, branch = %self.branch, "Deploying static site");
        if !self.repo_path.is_dir() {
            error!(path = %self.repo_path.display(), "Deploy directory does not exist");
            return false;
        }
        if !self.prepare().await {
            error!("Failed to prepare deploy repository");
            return false;
        }
        if !self.git_ok(&["add", "."]).await {
            return false;
        }

        let Some(commit) = self.git(&["commit", "-m", message]).await else {
            return false;
        };
        if nothing_to_commit(&commit.stdout, &commit.stderr) {
            info!("No changes to commit, skipping push");
            return true;
        }
        if !commit.success {
            return false;
        }

        if !self.git_ok(&["push", "origin", &self.branch, "--force"]).await {
            return false;
        }
        info!(branch = %self.branch, "Static site pushed");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn nothing_to_commit_is_detected_on_either_stream() {
        assert!(nothing_to_commit("On branch gh-pages\nnothing to commit, working tree clean", ""));
        assert!(nothing_to_commit("", "nothing to commit"));
        assert!(!nothing_to_commit("[gh-pages 1a2b3c4] Automated blog update", ""));
    }

    #[tokio::test]
    async fn missing_directory_fails_without_running_git() {
        let dir = tempdir().unwrap();
        let deployer = GitPagesDeployer::new(
            dir.path().join("not-exported"),
            "https://github.com/octo/octo.github.io.git",
            "gh-pages",
        );
        assert!(!deployer.deploy("Automated blog update").await);
    }
}

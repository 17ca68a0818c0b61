use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info};

use crate::error::{Error, Result};

pub const SERVICE_EMAIL: &str = "github-actions@users.noreply.github.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    NothingToCommit,
    Pushed { branch: String },
}

/// Runs git in a working copy on behalf of the CI service account.
pub struct GitRepo {
    repo_root: PathBuf,
}

impl GitRepo {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    pub fn current_branch(&self) -> Result<String> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
            .map(|out| out.trim().to_string())
            .map_err(|e| Error::Git(format!("failed to resolve current branch: {}", e.trim())))
    }

    /// `git status --porcelain` lines, empty when the tree is clean.
    pub fn pending_changes(&self) -> Result<Vec<String>> {
        let out = self
            .git(&["status", "--porcelain"])
            .map_err(|e| Error::Git(format!("git status failed: {}", e.trim())))?;
        Ok(out
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_string())
            .collect())
    }

    /// Stage everything, commit as `actor` and push to the current branch on
    /// origin.
    pub fn commit_pending(&self, actor: &str, message: &str) -> Result<CommitOutcome> {
        info!("checking repository state");
        let branch = self.current_branch()?;
        info!(branch = %branch, "current branch");

        let changes = self.pending_changes()?;
        if changes.is_empty() {
            info!("no changes detected, nothing to commit");
            return Ok(CommitOutcome::NothingToCommit);
        }

        info!(count = changes.len(), "detected changes");
        for line in &changes {
            info!("  {line}");
        }

        self.git(&["add", "-A"])
            .map_err(|e| Error::Git(format!("git add failed: {}", e.trim())))?;
        self.git(&["config", "user.name", actor])
            .map_err(|e| Error::Git(format!("failed to set user.name: {}", e.trim())))?;
        self.git(&["config", "user.email", SERVICE_EMAIL])
            .map_err(|e| Error::Git(format!("failed to set user.email: {}", e.trim())))?;

        if let Err(e) = self.git(&["commit", "-m", message]) {
            debug!(error = %e.trim(), "git commit failed");
            info!("no staged changes to commit");
            return Ok(CommitOutcome::NothingToCommit);
        }
        info!("commit created");

        self.git(&["push", "origin", &branch]).map_err(|e| {
            Error::Git(format!("failed to push to origin/{branch}: {}", e.trim()))
        })?;
        info!(branch = %branch, "changes pushed");

        Ok(CommitOutcome::Pushed { branch })
    }

    /// Run a git command in the repo root.
    fn git(&self, args: &[&str]) -> std::result::Result<String, String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(|e| format!("failed to run git: {e}"))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            Err(if stderr.trim().is_empty() {
                stdout.to_string()
            } else {
                stderr.to_string()
            })
        }
    }
}

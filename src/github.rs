use std::process::Command;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::branch::validate_branch_name;
use crate::error::{Error, Result};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

/// Abstraction over `gh` CLI execution for testability.
pub trait GhClient {
    fn run(&self, args: &[&str]) -> Result<String>;
}

/// Real `gh` CLI client with retry and exponential backoff. `gh` picks up
/// `GH_TOKEN`/`GITHUB_TOKEN` from the environment.
pub struct DefaultGhClient;

impl GhClient for DefaultGhClient {
    fn run(&self, args: &[&str]) -> Result<String> {
        retry_with_backoff(|| {
            let output = Command::new("gh")
                .args(args)
                .output()
                .map_err(|e| Error::GitHub(format!("failed to run gh: {e}")))?;

            if output.status.success() {
                String::from_utf8(output.stdout)
                    .map_err(|e| Error::GitHub(format!("invalid utf8 from gh: {e}")))
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(Error::GitHub(format!("gh failed: {}", stderr.trim())))
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitInfo {
    sha: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
}

/// A remote branch head after `ensure_branch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    pub name: String,
    pub sha: String,
    /// First line of the head commit message.
    pub summary: String,
    pub created: bool,
}

impl BranchRef {
    pub fn short_sha(&self) -> &str {
        &self.sha[..self.sha.len().min(8)]
    }
}

/// Creates and inspects branches through the GitHub git refs API.
pub struct BranchManager {
    repo: String,
    client: Box<dyn GhClient>,
}

impl BranchManager {
    pub fn new(repo: &str) -> Self {
        Self::with_client(repo, Box::new(DefaultGhClient))
    }

    pub fn with_client(repo: &str, client: Box<dyn GhClient>) -> Self {
        Self {
            repo: repo.to_string(),
            client,
        }
    }

    /// Head sha of `heads/{branch}`, or `None` if the branch does not exist.
    pub fn head_sha(&self, branch: &str) -> Result<Option<String>> {
        let path = format!("repos/{}/git/ref/heads/{branch}", self.repo);
        match self.client.run(&["api", &path]) {
            Ok(json) => {
                let parsed: GitRef = serde_json::from_str(&json).map_err(|e| {
                    Error::GitHub(format!("failed to parse ref for '{branch}': {e}"))
                })?;
                Ok(Some(parsed.object.sha))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create_ref(&self, branch: &str, sha: &str) -> Result<()> {
        let path = format!("repos/{}/git/refs", self.repo);
        let ref_field = format!("ref=refs/heads/{branch}");
        let sha_field = format!("sha={sha}");
        self.client.run(&[
            "api", "--method", "POST", &path, "-f", &ref_field, "-f", &sha_field,
        ])?;
        Ok(())
    }

    fn commit_summary(&self, sha: &str) -> Result<CommitInfo> {
        let path = format!("repos/{}/commits/{sha}", self.repo);
        let json = self.client.run(&["api", &path])?;
        serde_json::from_str(&json)
            .map_err(|e| Error::GitHub(format!("failed to parse commit {sha}: {e}")))
    }

    /// Make sure `branch` exists on the remote, creating it from `base` when
    /// missing, and report the commit it points to.
    pub fn ensure_branch(&self, base: &str, branch: &str) -> Result<BranchRef> {
        validate_branch_name(base)?;
        validate_branch_name(branch)?;

        info!(repo = %self.repo, "connecting to GitHub repository");
        let base_sha = self
            .head_sha(base)?
            .ok_or_else(|| Error::GitHub(format!("base branch '{base}' not found")))?;
        info!(base, "base branch found");

        let created = match self.head_sha(branch)? {
            Some(_) => {
                info!(branch, "branch already exists");
                false
            }
            None => {
                info!(branch, base, "branch does not exist, creating");
                self.create_ref(branch, &base_sha).map_err(|e| {
                    Error::GitHub(format!("failed to create branch '{branch}': {e}"))
                })?;
                info!(branch, "branch created");
                true
            }
        };

        let head = self
            .head_sha(branch)?
            .ok_or_else(|| Error::GitHub(format!("failed to verify branch '{branch}'")))?;
        let commit = self.commit_summary(&head)?;
        let summary = commit
            .commit
            .message
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();

        let branch_ref = BranchRef {
            name: branch.to_string(),
            sha: commit.sha,
            summary,
            created,
        };
        info!(
            "Branch '{}' now points to commit {} ({})",
            branch_ref.name,
            branch_ref.short_sha(),
            branch_ref.summary
        );
        Ok(branch_ref)
    }
}

/// `gh api` reports missing refs as HTTP 404.
fn is_not_found(err: &Error) -> bool {
    let msg = err.to_string();
    msg.contains("HTTP 404") || msg.contains("Not Found")
}

fn retry_with_backoff<F, T>(f: F) -> Result<T>
where
    F: Fn() -> Result<T>,
{
    retry_with_backoff_ms(f, INITIAL_BACKOFF_MS, MAX_RETRIES)
}

fn retry_with_backoff_ms<F, T>(f: F, initial_backoff_ms: u64, max_retries: u32) -> Result<T>
where
    F: Fn() -> Result<T>,
{
    let mut backoff_ms = initial_backoff_ms;

    for attempt in 1..=max_retries {
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if is_not_found(&e) => {
                debug!(error = %e, "not found, not retrying");
                return Err(e);
            }
            Err(e) if attempt < max_retries => {
                warn!(attempt, error = %e, backoff_ms, "retrying after transient error");
                thread::sleep(Duration::from_millis(backoff_ms));
                backoff_ms *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Replays canned responses and records the arguments of every call.
    struct MockGhClient {
        responses: RefCell<Vec<Result<String>>>,
        calls: Rc<RefCell<Vec<Vec<String>>>>,
    }

    impl MockGhClient {
        fn new(responses: Vec<Result<String>>) -> (Self, Rc<RefCell<Vec<Vec<String>>>>) {
            let calls = Rc::new(RefCell::new(Vec::new()));
            (
                Self {
                    responses: RefCell::new(responses),
                    calls: Rc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl GhClient for MockGhClient {
        fn run(&self, args: &[&str]) -> Result<String> {
            self.calls
                .borrow_mut()
                .push(args.iter().map(|a| a.to_string()).collect());
            let mut responses = self.responses.borrow_mut();
            if responses.is_empty() {
                Err(Error::GitHub("no more mock responses".to_string()))
            } else {
                responses.remove(0)
            }
        }
    }

    fn ref_json(sha: &str) -> Result<String> {
        Ok(serde_json::json!({
            "ref": "refs/heads/x",
            "object": { "sha": sha, "type": "commit" }
        })
        .to_string())
    }

    fn commit_json(sha: &str, message: &str) -> Result<String> {
        Ok(serde_json::json!({ "sha": sha, "commit": { "message": message } }).to_string())
    }

    fn not_found() -> Result<String> {
        Err(Error::GitHub("gh failed: gh: Not Found (HTTP 404)".to_string()))
    }

    const BASE_SHA: &str = "0123456789abcdef0123456789abcdef01234567";
    const HEAD_SHA: &str = "fedcba9876543210fedcba9876543210fedcba98";

    #[test]
    fn test_ensure_branch_creates_missing() {
        let (client, calls) = MockGhClient::new(vec![
            ref_json(BASE_SHA),
            not_found(),
            Ok("{}".to_string()),
            ref_json(BASE_SHA),
            commit_json(BASE_SHA, "Initial commit\n\nlong description"),
        ]);
        let mgr = BranchManager::with_client("acme/sim", Box::new(client));

        let branch = mgr.ensure_branch("master", "feature/42-radar").unwrap();
        let sha_field = format!("sha={BASE_SHA}");
        let commit_path = format!("repos/acme/sim/commits/{BASE_SHA}");

        assert!(branch.created);
        assert_eq!(branch.name, "feature/42-radar");
        assert_eq!(branch.short_sha(), "01234567");
        assert_eq!(branch.summary, "Initial commit");

        let calls = calls.borrow();
        assert_eq!(calls[0], vec!["api", "repos/acme/sim/git/ref/heads/master"]);
        assert_eq!(calls[1], vec!["api", "repos/acme/sim/git/ref/heads/feature/42-radar"]);
        assert_eq!(
            calls[2],
            vec![
                "api",
                "--method",
                "POST",
                "repos/acme/sim/git/refs",
                "-f",
                "ref=refs/heads/feature/42-radar",
                "-f",
                sha_field.as_str(),
            ]
        );
        assert_eq!(calls[4], vec!["api", commit_path.as_str()]);
    }

    #[test]
    fn test_ensure_branch_reuses_existing() {
        let (client, calls) = MockGhClient::new(vec![
            ref_json(BASE_SHA),
            ref_json(HEAD_SHA),
            ref_json(HEAD_SHA),
            commit_json(HEAD_SHA, "Add radar component"),
        ]);
        let mgr = BranchManager::with_client("acme/sim", Box::new(client));

        let branch = mgr.ensure_branch("master", "task/7-radar").unwrap();

        assert!(!branch.created);
        assert_eq!(branch.sha, HEAD_SHA);
        assert_eq!(branch.summary, "Add radar component");
        assert!(calls.borrow().iter().all(|c| !c.contains(&"POST".to_string())));
    }

    #[test]
    fn test_ensure_branch_missing_base() {
        let (client, _) = MockGhClient::new(vec![not_found()]);
        let mgr = BranchManager::with_client("acme/sim", Box::new(client));
        let err = mgr.ensure_branch("master", "task/1").unwrap_err();
        assert!(err.to_string().contains("base branch 'master' not found"));
    }

    #[test]
    fn test_ensure_branch_create_failure() {
        let (client, _) = MockGhClient::new(vec![
            ref_json(BASE_SHA),
            not_found(),
            Err(Error::GitHub("gh failed: HTTP 422 Reference already exists".to_string())),
        ]);
        let mgr = BranchManager::with_client("acme/sim", Box::new(client));
        let err = mgr.ensure_branch("master", "task/1").unwrap_err();
        assert!(err.to_string().contains("failed to create branch 'task/1'"));
    }

    #[test]
    fn test_ensure_branch_rejects_invalid_name() {
        let (client, calls) = MockGhClient::new(vec![]);
        let mgr = BranchManager::with_client("acme/sim", Box::new(client));
        assert!(mgr.ensure_branch("master", "bad name").is_err());
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_head_sha_propagates_other_errors() {
        let (client, _) = MockGhClient::new(vec![Err(Error::GitHub(
            "gh failed: HTTP 401 Bad credentials".to_string(),
        ))]);
        let mgr = BranchManager::with_client("acme/sim", Box::new(client));
        assert!(mgr.head_sha("main").is_err());
    }

    #[test]
    fn test_short_sha_of_short_value() {
        let b = BranchRef {
            name: "x".to_string(),
            sha: "abc".to_string(),
            summary: String::new(),
            created: false,
        };
        assert_eq!(b.short_sha(), "abc");
    }

    #[test]
    fn test_retry_stops_on_not_found() {
        let attempts = Cell::new(0);
        let result: Result<()> = retry_with_backoff_ms(
            || {
                attempts.set(attempts.get() + 1);
                Err(Error::GitHub("gh failed: Not Found (HTTP 404)".to_string()))
            },
            1,
            3,
        );
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_retry_recovers_from_transient_error() {
        let attempts = Cell::new(0);
        let result = retry_with_backoff_ms(
            || {
                attempts.set(attempts.get() + 1);
                if attempts.get() < 3 {
                    Err(Error::GitHub("gh failed: HTTP 502".to_string()))
                } else {
                    Ok("done")
                }
            },
            1,
            3,
        );
        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.get(), 3);
    }
}

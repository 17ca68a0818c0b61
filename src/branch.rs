use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

const MAX_SLUG_LEN: usize = 80;

static NON_BRANCH_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_\-]+").expect("valid branch char pattern"));
static HYPHEN_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-+").expect("valid hyphen pattern"));

/// Validate that a branch name is safe: matches `^[a-zA-Z0-9/_.-]+$` and does not start with `refs/`.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::GitHub("branch name must not be empty".to_string()));
    }
    if name.starts_with("refs/") {
        return Err(Error::GitHub(format!(
            "branch name must not start with 'refs/': {name}"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '/' || c == '_' || c == '.' || c == '-')
    {
        return Err(Error::GitHub(format!(
            "branch name contains invalid characters (allowed: a-zA-Z0-9/_.-): {name}"
        )));
    }
    Ok(())
}

/// Branch prefix derived from issue labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchKind {
    #[default]
    Task,
    Bugfix,
    Feature,
    Chore,
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchKind::Task => write!(f, "task"),
            BranchKind::Bugfix => write!(f, "bugfix"),
            BranchKind::Feature => write!(f, "feature"),
            BranchKind::Chore => write!(f, "chore"),
        }
    }
}

impl BranchKind {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "bug" | "fix" => Some(BranchKind::Bugfix),
            "feature" | "enhancement" => Some(BranchKind::Feature),
            "chore" | "maintenance" => Some(BranchKind::Chore),
            _ => None,
        }
    }

    /// The last label that maps to a kind wins; no match means `Task`.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        labels
            .iter()
            .filter_map(|l| Self::from_label(l.as_ref()))
            .last()
            .unwrap_or_default()
    }
}

/// Turn an issue title into a branch-safe slug of at most 80 characters.
pub fn sanitize_branch_name(title: &str) -> String {
    let lower = title.to_lowercase();
    let replaced = NON_BRANCH_CHARS.replace_all(&lower, "-");
    let collapsed = HYPHEN_RUNS.replace_all(&replaced, "-");
    let mut slug = collapsed.trim_matches('-').to_string();
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// `{kind}/{number}-{slug}`, or `{kind}/{number}` when the title has no
/// usable characters.
pub fn issue_branch_name<S: AsRef<str>>(number: u64, title: &str, labels: &[S]) -> String {
    let kind = BranchKind::from_labels(labels);
    let slug = sanitize_branch_name(title);
    if slug.is_empty() {
        format!("{kind}/{number}")
    } else {
        format!("{kind}/{number}-{slug}")
    }
}

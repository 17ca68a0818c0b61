use std::path::Path;

use serde::Deserialize;

use crate::branch::issue_branch_name;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Issue {
    pub number: Option<u64>,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

impl Issue {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    /// Both title and body carry text.
    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && !self.body.trim().is_empty()
    }

    /// `{kind}/{number}-{slug}` from the labels, number and title.
    pub fn branch_name(&self) -> Result<String> {
        let number = self
            .number
            .ok_or_else(|| Error::Issue(format!("issue '{}' has no number", self.title)))?;
        Ok(issue_branch_name(number, &self.title, &self.labels))
    }
}

#[derive(Debug, Deserialize)]
struct IssueFile {
    #[serde(default)]
    number: Option<u64>,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<GhLabel>,
}

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

/// Load an issue from a JSON file such as the `github.event.issue` payload.
/// Returns `None` when the file does not exist.
pub fn load_issue_file(path: &Path) -> Result<Option<Issue>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let file: IssueFile = serde_json::from_str(&content).map_err(|e| {
        Error::Issue(format!("failed to parse issue file {}: {e}", path.display()))
    })?;
    Ok(Some(Issue {
        number: file.number,
        title: file.title,
        body: file.body.unwrap_or_default(),
        labels: file.labels.into_iter().map(|l| l.name).collect(),
    }))
}

/// Parse a JSON array of `{"name": ...}` label objects.
pub fn parse_labels(json: &str) -> Result<Vec<String>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let labels: Vec<GhLabel> = serde_json::from_str(json)
        .map_err(|e| Error::Issue(format!("failed to parse issue labels: {e}")))?;
    Ok(labels.into_iter().map(|l| l.name).collect())
}

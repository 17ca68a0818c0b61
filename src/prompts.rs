use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

const DEFAULT_UPDATE_ARCHITECTURE: &str = include_str!("default_prompts/update-architecture.md");
const DEFAULT_ARCHITECT_SYSTEM: &str = include_str!("default_prompts/architect-system.md");
const DEFAULT_CURRENT_ARCHITECTURE: &str = include_str!("default_prompts/current-architecture.md");
const DEFAULT_ISSUE: &str = include_str!("default_prompts/issue.md");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Single prompt asking for a PlantUML diagram.
    UpdateArchitecture,
    /// System message for the chat-style LLM task.
    ArchitectSystem,
    /// User message carrying the current diagram.
    CurrentArchitecture,
    /// User message carrying the issue.
    Issue,
}

impl PromptKind {
    fn default_template(self) -> &'static str {
        match self {
            PromptKind::UpdateArchitecture => DEFAULT_UPDATE_ARCHITECTURE,
            PromptKind::ArchitectSystem => DEFAULT_ARCHITECT_SYSTEM,
            PromptKind::CurrentArchitecture => DEFAULT_CURRENT_ARCHITECTURE,
            PromptKind::Issue => DEFAULT_ISSUE,
        }
    }

    fn filename(self) -> String {
        format!("{self}.md")
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptKind::UpdateArchitecture => write!(f, "update-architecture"),
            PromptKind::ArchitectSystem => write!(f, "architect-system"),
            PromptKind::CurrentArchitecture => write!(f, "current-architecture"),
            PromptKind::Issue => write!(f, "issue"),
        }
    }
}

/// Values available to every template as `{{ name }}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptVars {
    pub issue_title: String,
    pub issue_body: String,
    pub current_architecture: String,
}

/// Prompt templates with embedded defaults and per-file user overrides.
pub struct PromptEngine {
    override_dir: Option<PathBuf>,
    engine: upon::Engine<'static>,
}

impl PromptEngine {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self {
            override_dir,
            engine: upon::Engine::new(),
        }
    }

    /// Load the template for `kind`. A file named `<kind>.md` in the
    /// override directory wins over the embedded default.
    pub fn load_template(&self, kind: PromptKind) -> Result<String> {
        if let Some(ref dir) = self.override_dir {
            let path = dir.join(kind.filename());
            if path.exists() {
                debug!(path = %path.display(), "using prompt override");
                return std::fs::read_to_string(&path).map_err(|e| {
                    Error::Prompt(format!(
                        "failed to read override template {}: {e}",
                        path.display()
                    ))
                });
            }
        }
        Ok(kind.default_template().to_string())
    }

    pub fn render(&self, kind: PromptKind, vars: &PromptVars) -> Result<String> {
        let template = self.load_template(kind)?;
        self.render_template(&template, vars)
            .map_err(|e| Error::Prompt(format!("{kind} template: {e}")))
    }

    /// Render a template string. Unknown variables are an error.
    pub fn render_template(&self, template: &str, vars: &PromptVars) -> Result<String> {
        let compiled = self
            .engine
            .compile(template)
            .map_err(|e| Error::Prompt(format!("invalid template: {e}")))?;
        compiled
            .render(&self.engine, vars)
            .to_string()
            .map_err(|e| Error::Prompt(format!("render failed: {e}")))
    }
}

/// Read a text file, treating a missing file as empty.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(std::fs::read_to_string(path)?))
}

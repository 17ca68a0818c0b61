use clap::{Args, Parser, Subcommand};

/// archflow: CI glue for issue-driven architecture work
#[derive(Parser, Debug, Clone)]
#[command(name = "archflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,

    /// Path to config file (default: .archflow.toml, optional)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Overrides for the `[llm]` config section.
#[derive(Args, Debug, Clone, Default)]
pub struct LlmArgs {
    /// LLM provider (ollama, openai)
    #[arg(long)]
    pub provider: Option<String>,

    /// Base URL of the LLM service
    #[arg(long = "llm-url")]
    pub base_url: Option<String>,

    /// Model name
    #[arg(long)]
    pub model: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Ask the LLM for a PlantUML diagram and merge it into the persisted one
    UpdateDiagram {
        /// Title of the issue
        #[arg(long, env = "ISSUE_TITLE")]
        title: String,

        /// Body/description of the issue
        #[arg(long, env = "ISSUE_BODY", default_value = "")]
        body: String,

        /// Diagram file to merge into
        #[arg(long)]
        diagram: Option<String>,

        #[command(flatten)]
        llm: LlmArgs,
    },

    /// Send an issue plus the current architecture to the LLM and store the raw answer
    LlmTask {
        /// Issue JSON file ({"title": ..., "body": ...})
        #[arg(long, default_value = "architect_issue.json")]
        issue: String,

        /// Issue title when the issue file is absent
        #[arg(long, env = "ISSUE_TITLE", default_value = "")]
        title: String,

        /// Issue body when the issue file is absent
        #[arg(long, env = "ISSUE_BODY", default_value = "")]
        body: String,

        /// Current architecture file sent as context
        #[arg(long)]
        input: Option<String>,

        /// Where the raw response is written
        #[arg(long)]
        output: Option<String>,

        /// System prompt file
        #[arg(long)]
        system_prompt: Option<String>,

        /// Record the request payload to this file
        #[arg(long)]
        payload_file: Option<String>,

        #[command(flatten)]
        llm: LlmArgs,
    },

    /// Stage, commit and push all pending changes on the current branch
    Commit {
        /// Commit message
        #[arg(long, env = "COMMIT_MESSAGE", default_value = "Automated commit")]
        message: String,

        /// Author name for the commit
        #[arg(long, env = "GITHUB_ACTOR", default_value = "github-actions[bot]")]
        actor: String,
    },

    /// Create a remote branch from a base branch unless it already exists
    Branch {
        /// Repository in owner/name form
        #[arg(long, env = "GITHUB_REPOSITORY")]
        repo: String,

        /// Branch to create or reuse
        #[arg(long, env = "BRANCH_NAME")]
        branch: String,

        /// Branch to create from
        #[arg(long, env = "BASE_BRANCH")]
        base: String,
    },

    /// Derive a branch name from an issue and create it unless it already exists
    IssueBranch {
        /// Repository in owner/name form
        #[arg(long, env = "GITHUB_REPOSITORY")]
        repo: String,

        /// Issue number
        #[arg(long, env = "ISSUE_NUMBER")]
        number: u64,

        /// Issue title
        #[arg(long, env = "ISSUE_TITLE")]
        title: String,

        /// Issue labels as a JSON array of {"name": ...} objects
        #[arg(long, env = "ISSUE_LABELS", default_value = "[]")]
        labels: String,

        /// Branch to create from
        #[arg(long, default_value = "master")]
        base: String,
    },
}

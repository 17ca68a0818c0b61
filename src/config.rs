use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::{Cli, CliCommand, LlmArgs};
use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = ".archflow.toml";
pub const DEFAULT_DIAGRAM: &str = "docs/ecs_architecture.puml";
pub const DEFAULT_TASK_OUTPUT: &str = "docs/architecture_response.md";

/// `update-diagram` talks to Ollama's native API by default.
pub const DEFAULT_DIAGRAM_PROVIDER: &str = "ollama";
pub const DEFAULT_DIAGRAM_BASE_URL: &str = "http://localhost:11434";
/// `llm-task` talks to an OpenAI-compatible chat endpoint by default.
pub const DEFAULT_TASK_PROVIDER: &str = "openai";
pub const DEFAULT_TASK_BASE_URL: &str = "http://localhost:11434/v1";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub diagram: Option<String>,
    pub prompts_dir: Option<String>,
    #[serde(default)]
    pub llm: LlmFileConfig,
    #[serde(default)]
    pub task: TaskFileConfig,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LlmFileConfig {
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TaskFileConfig {
    /// Overrides `[llm].provider` for `llm-task` only.
    pub provider: Option<String>,
    /// Overrides `[llm].base_url` for `llm-task` only.
    pub base_url: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub system_prompt: Option<String>,
    pub payload_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Name of the env var holding a bearer token, if the service wants one.
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// `None` uses the embedded architect prompt.
    pub system_prompt: Option<PathBuf>,
    pub payload_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub diagram: PathBuf,
    /// Directory of prompt template overrides.
    pub prompts_dir: Option<PathBuf>,
    pub llm: LlmConfig,
    pub task: TaskConfig,
}

impl Config {
    /// Load the config file and layer CLI/env values over it.
    ///
    /// An explicit `--config` path must exist; the default
    /// `.archflow.toml` is optional.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file_config = match cli.config.as_deref() {
            Some(path) => {
                let path = Path::new(path);
                if !path.exists() {
                    return Err(Error::ConfigNotFound(path.to_path_buf()));
                }
                parse_config(&std::fs::read_to_string(path)?)?
            }
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    parse_config(&std::fs::read_to_string(path)?)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        let config = merge(file_config, cli);
        validate_llm(&config.llm)?;
        Ok(config)
    }
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ConfigFile) -> Result<()> {
    for provider in [&config.llm.provider, &config.task.provider].into_iter().flatten() {
        validate_provider(provider)?;
    }
    if let Some(timeout) = config.llm.timeout_secs
        && timeout == 0
    {
        return Err(Error::ConfigValidation(
            "llm.timeout_secs must be > 0".to_string(),
        ));
    }
    if let Some(ref url) = config.llm.base_url
        && url.trim().is_empty()
    {
        return Err(Error::ConfigValidation(
            "llm.base_url must not be empty".to_string(),
        ));
    }
    if let Some(ref url) = config.task.base_url
        && url.trim().is_empty()
    {
        return Err(Error::ConfigValidation(
            "task.base_url must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_provider(provider: &str) -> Result<()> {
    match provider {
        "ollama" | "openai" => Ok(()),
        other => Err(Error::ConfigValidation(format!(
            "unknown llm provider: {other} (expected: ollama, openai)"
        ))),
    }
}

/// CLI overrides can bypass file validation, so check the merged result too.
fn validate_llm(llm: &LlmConfig) -> Result<()> {
    validate_provider(&llm.provider)?;
    if llm.timeout_secs == 0 {
        return Err(Error::ConfigValidation(
            "llm timeout must be > 0".to_string(),
        ));
    }
    if llm.base_url.trim().is_empty() {
        return Err(Error::ConfigValidation(
            "llm base url must not be empty".to_string(),
        ));
    }
    Ok(())
}

pub fn merge(file: ConfigFile, cli: &Cli) -> Config {
    let default_llm = LlmArgs::default();
    let (llm_args, diagram_arg) = match &cli.command {
        CliCommand::UpdateDiagram { llm, diagram, .. } => (llm, diagram.clone()),
        CliCommand::LlmTask { llm, .. } => (llm, None),
        _ => (&default_llm, None),
    };

    let diagram = diagram_arg
        .or(file.diagram)
        .unwrap_or_else(|| DEFAULT_DIAGRAM.to_string());

    // `llm-task` takes provider and endpoint from `[task]`, the rest from `[llm]`.
    let (file_provider, file_base_url, default_provider, default_base_url) = match &cli.command {
        CliCommand::LlmTask { .. } => (
            file.task.provider,
            file.task.base_url,
            DEFAULT_TASK_PROVIDER,
            DEFAULT_TASK_BASE_URL,
        ),
        _ => (
            file.llm.provider,
            file.llm.base_url,
            DEFAULT_DIAGRAM_PROVIDER,
            DEFAULT_DIAGRAM_BASE_URL,
        ),
    };

    let llm = LlmConfig {
        provider: llm_args
            .provider
            .clone()
            .or(file_provider)
            .unwrap_or_else(|| default_provider.to_string()),
        base_url: llm_args
            .base_url
            .clone()
            .or(file_base_url)
            .unwrap_or_else(|| default_base_url.to_string()),
        model: llm_args
            .model
            .clone()
            .or(file.llm.model)
            .unwrap_or_else(|| "llama3".to_string()),
        timeout_secs: llm_args.timeout_secs.or(file.llm.timeout_secs).unwrap_or(120),
        api_key_env: file.llm.api_key_env,
    };

    let (input, output, system_prompt, payload_file) = match &cli.command {
        CliCommand::LlmTask {
            input,
            output,
            system_prompt,
            payload_file,
            ..
        } => (
            input.clone(),
            output.clone(),
            system_prompt.clone(),
            payload_file.clone(),
        ),
        _ => (None, None, None, None),
    };

    let task = TaskConfig {
        input: PathBuf::from(input.or(file.task.input).unwrap_or_else(|| diagram.clone())),
        output: PathBuf::from(
            output
                .or(file.task.output)
                .unwrap_or_else(|| DEFAULT_TASK_OUTPUT.to_string()),
        ),
        system_prompt: system_prompt.or(file.task.system_prompt).map(PathBuf::from),
        payload_file: payload_file.or(file.task.payload_file).map(PathBuf::from),
    };

    Config {
        diagram: PathBuf::from(diagram),
        prompts_dir: file.prompts_dir.map(PathBuf::from),
        llm,
        task,
    }
}

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    ConfigValidation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("prompt error: {0}")]
    Prompt(String),

    #[error("issue error: {0}")]
    Issue(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("github error: {0}")]
    GitHub(String),
}

pub type Result<T> = std::result::Result<T, Error>;

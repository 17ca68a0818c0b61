pub mod architecture;
pub mod branch;
pub mod cli;
pub mod config;
pub mod diagram;
pub mod error;
pub mod git;
pub mod github;
pub mod issue;
pub mod llm;
pub mod prompts;
pub mod store;

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use archflow::architecture::{run_diagram_update, run_llm_task};
use archflow::cli::{Cli, CliCommand};
use archflow::config::Config;
use archflow::error::Result;
use archflow::git::{CommitOutcome, GitRepo};
use archflow::github::BranchManager;
use archflow::issue::{Issue, load_issue_file, parse_labels};
use archflow::llm::build_generator;
use archflow::prompts::PromptEngine;
use archflow::store::DiagramStore;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        CliCommand::UpdateDiagram { title, body, .. } => {
            let config = Config::load(cli)?;
            info!(?config, "config loaded");

            let issue = Issue::new(title.as_str(), body.as_str());
            info!(title = %issue.title, "processing issue");

            let store = DiagramStore::new(&config.diagram);
            let prompts = PromptEngine::new(config.prompts_dir.clone());
            let generator = build_generator(&config.llm);
            let update = run_diagram_update(&issue, &store, &prompts, &generator)?;

            println!(
                "architecture diagram merged and updated: {} ({} classes, {} relations; +{} classes, +{} relations)",
                update.path.display(),
                update.state.classes.len(),
                update.state.relations.len(),
                update.added_classes,
                update.added_relations,
            );
        }

        CliCommand::LlmTask {
            issue, title, body, ..
        } => {
            let config = Config::load(cli)?;
            info!(?config, "config loaded");

            let issue = match load_issue_file(Path::new(issue))? {
                Some(issue) => issue,
                None => Issue::new(title.as_str(), body.as_str()),
            };
            if !issue.is_complete() {
                warn!("no issue provided");
                println!("no issue provided, nothing to do");
                return Ok(());
            }

            info!(title = %issue.title, "processing issue");
            let prompts = PromptEngine::new(config.prompts_dir.clone());
            let generator = build_generator(&config.llm);
            let output = run_llm_task(&issue, &config.task, &prompts, &generator)?;
            println!("LLM response written to {}", output.display());
        }

        CliCommand::Commit { message, actor } => {
            let repo_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            match GitRepo::new(repo_root).commit_pending(actor, message)? {
                CommitOutcome::NothingToCommit => println!("nothing to commit"),
                CommitOutcome::Pushed { branch } => {
                    println!("changes pushed to branch '{branch}'")
                }
            }
        }

        CliCommand::Branch { repo, branch, base } => {
            let head = BranchManager::new(repo).ensure_branch(base, branch)?;
            println!(
                "branch '{}' at {} ({})",
                head.name,
                head.short_sha(),
                head.summary
            );
        }

        CliCommand::IssueBranch {
            repo,
            number,
            title,
            labels,
            base,
        } => {
            let issue = Issue {
                number: Some(*number),
                title: title.clone(),
                labels: parse_labels(labels)?,
                ..Default::default()
            };
            let branch = issue.branch_name()?;
            info!(issue = number, branch = %branch, "creating or switching to branch for issue");

            let head = BranchManager::new(repo).ensure_branch(base, &branch)?;
            println!(
                "branch '{}' at {} ({})",
                head.name,
                head.short_sha(),
                head.summary
            );
        }
    }

    Ok(())
}

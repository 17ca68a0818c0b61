use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::TaskConfig;
use crate::diagram::{self, DiagramState};
use crate::error::{Error, Result};
use crate::issue::Issue;
use crate::llm::{ChatMessage, TextGenerator};
use crate::prompts::{PromptEngine, PromptKind, PromptVars, read_optional};
use crate::store::{DiagramStore, write_atomic};

/// What a successful diagram update changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramUpdate {
    pub path: PathBuf,
    pub state: DiagramState,
    pub added_classes: usize,
    pub added_relations: usize,
}

/// Ask the LLM for a diagram of `issue`, merge it into the persisted
/// diagram and rewrite the file.
///
/// Nothing is written unless the response carries a delimited diagram.
pub fn run_diagram_update<G: TextGenerator>(
    issue: &Issue,
    store: &DiagramStore,
    prompts: &PromptEngine,
    generator: &G,
) -> Result<DiagramUpdate> {
    info!(title = %issue.title, "generating diagram for issue");

    let prompt = prompts.render(
        PromptKind::UpdateArchitecture,
        &PromptVars {
            issue_title: issue.title.clone(),
            issue_body: issue.body.clone(),
            ..Default::default()
        },
    )?;
    let response = generator.generate(&[ChatMessage::user(prompt)])?;
    debug!(bytes = response.len(), "received diagram response");

    if !diagram::has_delimiters(&response) {
        return Err(Error::Generation(
            "LLM did not return valid PlantUML code".to_string(),
        ));
    }
    let body = diagram::extract_body(&response)
        .ok_or_else(|| Error::Generation("no PlantUML body found".to_string()))?;

    let incoming = DiagramState::extract(body);
    let existing = store.load()?;
    let merged = existing.merge(&incoming);

    info!(
        existing_classes = existing.classes.len(),
        incoming_classes = incoming.classes.len(),
        merged_classes = merged.classes.len(),
        merged_relations = merged.relations.len(),
        "merged diagram"
    );

    store.save(&merged)?;
    info!(path = %store.path().display(), "architecture diagram updated");

    Ok(DiagramUpdate {
        path: store.path().to_path_buf(),
        added_classes: merged.classes.len() - existing.classes.len(),
        added_relations: merged.relations.len() - existing.relations.len(),
        state: merged,
    })
}

/// Send the issue and the current architecture to the LLM and write the
/// raw response to the task's output file. Returns the output path.
pub fn run_llm_task<G: TextGenerator>(
    issue: &Issue,
    task: &TaskConfig,
    prompts: &PromptEngine,
    generator: &G,
) -> Result<PathBuf> {
    let system_prompt = match &task.system_prompt {
        Some(path) => read_optional(path)?.unwrap_or_else(|| {
            warn!(path = %path.display(), "system prompt file not found");
            String::new()
        }),
        None => prompts.render(PromptKind::ArchitectSystem, &PromptVars::default())?,
    };

    let current_architecture = read_optional(&task.input)?.unwrap_or_else(|| {
        warn!(path = %task.input.display(), "design file not found");
        String::new()
    });

    let vars = PromptVars {
        issue_title: issue.title.clone(),
        issue_body: issue.body.clone(),
        current_architecture,
    };
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(prompts.render(PromptKind::CurrentArchitecture, &vars)?),
        ChatMessage::user(prompts.render(PromptKind::Issue, &vars)?),
    ];

    if let Some(ref payload_path) = task.payload_file {
        let payload = generator.request_payload(&messages)?;
        let text = serde_json::to_string_pretty(&payload)
            .map_err(|e| Error::Generation(format!("failed to serialize payload: {e}")))?;
        write_atomic(payload_path, &text)?;
        debug!(path = %payload_path.display(), "recorded request payload");
    }

    info!(title = %issue.title, "sending issue to LLM");
    let response = generator.generate(&messages)?;
    debug!(%response, "LLM response");

    write_atomic(&task.output, &response)?;
    info!(path = %task.output.display(), bytes = response.len(), "wrote LLM response");
    Ok(task.output.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct MockGenerator {
        response: Result<String>,
        seen: RefCell<Vec<Vec<ChatMessage>>>,
    }

    impl MockGenerator {
        fn ok(text: &str) -> Self {
            Self {
                response: Ok(text.to_string()),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err(Error::Generation("connection refused".to_string())),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl TextGenerator for MockGenerator {
        fn request_payload(&self, messages: &[ChatMessage]) -> Result<serde_json::Value> {
            Ok(serde_json::json!({ "messages": messages }))
        }

        fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
            self.seen.borrow_mut().push(messages.to_vec());
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(Error::Generation(e.to_string())),
            }
        }
    }

    fn issue() -> Issue {
        Issue::new("Add radar", "Units need a radar sensor.")
    }

    #[test]
    fn test_update_creates_missing_diagram() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs/ecs.puml");
        let store = DiagramStore::new(&path);
        let generator = MockGenerator::ok(
            "Here you go:\n@startuml\nclass Alpha\nclass BetaSystem\nAlpha --> BetaSystem\n@enduml\nThanks",
        );

        let update =
            run_diagram_update(&issue(), &store, &PromptEngine::new(None), &generator).unwrap();

        assert_eq!(update.added_classes, 2);
        assert_eq!(update.added_relations, 1);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "@startuml\npackage \"Components\" {\n  class Alpha\n}\n\n\
package \"Systems\" {\n  class BetaSystem\n}\n\nAlpha --> BetaSystem\n@enduml\n"
        );

        let seen = generator.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(seen[0][0].content.contains("Issue title: Add radar"));
    }

    #[test]
    fn test_update_merges_with_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecs.puml");
        std::fs::write(&path, "@startuml\nclass Alpha\n@enduml\n").unwrap();
        let store = DiagramStore::new(&path);
        let generator = MockGenerator::ok("@startuml\nclass Gamma\nGamma --> Alpha\n@enduml");

        let update =
            run_diagram_update(&issue(), &store, &PromptEngine::new(None), &generator).unwrap();

        assert_eq!(update.added_classes, 1);
        let text = std::fs::read_to_string(&path).unwrap();
        let alpha = text.find("class Alpha").unwrap();
        let gamma = text.find("class Gamma").unwrap();
        assert!(alpha < gamma);
        assert!(text.contains("\nGamma --> Alpha\n"));
    }

    #[test]
    fn test_update_is_stable_when_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecs.puml");
        let store = DiagramStore::new(&path);
        let generator = MockGenerator::ok("@startuml\nclass B\nclass A\nA --> B\n@enduml");
        let prompts = PromptEngine::new(None);

        run_diagram_update(&issue(), &store, &prompts, &generator).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        let update = run_diagram_update(&issue(), &store, &prompts, &generator).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(update.added_classes, 0);
        assert_eq!(update.added_relations, 0);
    }

    #[test]
    fn test_update_without_markers_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecs.puml");
        std::fs::write(&path, "@startuml\nclass Alpha\n@enduml\n").unwrap();
        let store = DiagramStore::new(&path);
        let generator = MockGenerator::ok("class Gamma\nGamma --> Alpha");

        let err = run_diagram_update(&issue(), &store, &PromptEngine::new(None), &generator)
            .unwrap_err();

        assert!(matches!(err, Error::Generation(_)));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "@startuml\nclass Alpha\n@enduml\n"
        );
    }

    #[test]
    fn test_update_with_reversed_markers_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecs.puml");
        let store = DiagramStore::new(&path);
        let generator = MockGenerator::ok("@enduml\nclass Gamma\n@startuml");

        let err = run_diagram_update(&issue(), &store, &PromptEngine::new(None), &generator)
            .unwrap_err();

        assert!(err.to_string().contains("no PlantUML body"));
        assert!(!path.exists());
    }

    #[test]
    fn test_update_generation_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecs.puml");
        let store = DiagramStore::new(&path);

        let err = run_diagram_update(
            &issue(),
            &store,
            &PromptEngine::new(None),
            &MockGenerator::failing(),
        )
        .unwrap_err();

        assert!(matches!(err, Error::Generation(_)));
        assert!(!path.exists());
    }

    fn task_config(dir: &std::path::Path) -> TaskConfig {
        TaskConfig {
            input: dir.join("docs/ecs.puml"),
            output: dir.join("out/response.md"),
            system_prompt: None,
            payload_file: None,
        }
    }

    #[test]
    fn test_llm_task_writes_raw_response() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = task_config(dir.path());
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(&task.input, "@startuml\nclass Position\n@enduml").unwrap();
        std::fs::write(dir.path().join("system.md"), "Be terse.").unwrap();
        task.system_prompt = Some(dir.path().join("system.md"));
        task.payload_file = Some(dir.path().join("payload.json"));

        let generator = MockGenerator::ok("no diagram, just words");
        let out = run_llm_task(&issue(), &task, &PromptEngine::new(None), &generator).unwrap();

        assert_eq!(out, task.output);
        assert_eq!(
            std::fs::read_to_string(&task.output).unwrap(),
            "no diagram, just words"
        );

        let seen = generator.seen.borrow();
        let messages = &seen[0];
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], ChatMessage::system("Be terse."));
        assert!(messages[1].content.contains("class Position"));
        assert!(messages[2].content.contains("Issue title: Add radar"));
        assert!(messages[2].content.contains("Units need a radar sensor."));

        let payload: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("payload.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(payload["messages"][0]["role"], "system");
    }

    #[test]
    fn test_llm_task_tolerates_missing_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = task_config(dir.path());
        task.system_prompt = Some(dir.path().join("missing.md"));

        let generator = MockGenerator::ok("ok");
        run_llm_task(&issue(), &task, &PromptEngine::new(None), &generator).unwrap();

        let seen = generator.seen.borrow();
        assert_eq!(seen[0][0].content, "");
        assert!(seen[0][1].content.starts_with("The current architecture : "));
    }

    #[test]
    fn test_llm_task_uses_embedded_system_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_config(dir.path());
        let generator = MockGenerator::ok("ok");
        run_llm_task(&issue(), &task, &PromptEngine::new(None), &generator).unwrap();
        assert!(generator.seen.borrow()[0][0].content.contains("ECS"));
    }

    #[test]
    fn test_llm_task_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_config(dir.path());
        let err = run_llm_task(
            &issue(),
            &task,
            &PromptEngine::new(None),
            &MockGenerator::failing(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
        assert!(!task.output.exists());
    }
}

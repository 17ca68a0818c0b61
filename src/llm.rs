use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A text-completion service. Implementations block until the response
/// arrives or the request times out.
pub trait TextGenerator {
    /// The JSON body that `generate` would send for these messages.
    fn request_payload(&self, messages: &[ChatMessage]) -> Result<serde_json::Value>;

    /// Send the messages and return the raw response text.
    fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Ollama `/api/generate`
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    text: Option<String>,
}

/// Single-prompt generation against an Ollama-style endpoint.
pub struct OllamaGenerator {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
            agent: build_agent(timeout),
        }
    }
}

impl TextGenerator for OllamaGenerator {
    fn request_payload(&self, messages: &[ChatMessage]) -> Result<serde_json::Value> {
        let system = join_contents(messages, Role::System);
        let request = GenerateRequest {
            model: &self.model,
            prompt: join_contents(messages, Role::User),
            system: (!system.is_empty()).then_some(system),
            stream: false,
        };
        to_payload(&request)
    }

    fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let payload = self.request_payload(messages)?;
        let body = post_json(&self.agent, &self.endpoint, self.api_key.as_deref(), &payload)?;
        parse_generate_response(&body)
    }
}

/// Pull the generated text out of a `/api/generate` response. An absent or
/// empty `response` falls back to `text`, then to an empty string.
pub fn parse_generate_response(body: &str) -> Result<String> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| Error::Generation(format!("failed to parse LLM response: {e}")))?;
    Ok(parsed
        .response
        .filter(|s| !s.is_empty())
        .or(parsed.text)
        .unwrap_or_default())
}

// ---------------------------------------------------------------------------
// OpenAI-compatible `/chat/completions`
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Multi-message generation against an OpenAI-compatible endpoint.
pub struct ChatGenerator {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl ChatGenerator {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
            agent: build_agent(timeout),
        }
    }
}

impl TextGenerator for ChatGenerator {
    fn request_payload(&self, messages: &[ChatMessage]) -> Result<serde_json::Value> {
        to_payload(&ChatRequest {
            model: &self.model,
            messages,
        })
    }

    fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let payload = self.request_payload(messages)?;
        let body = post_json(&self.agent, &self.endpoint, self.api_key.as_deref(), &payload)?;
        parse_chat_response(&body)
    }
}

/// Pull `choices[0].message.content` out of a chat-completion response.
pub fn parse_chat_response(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::Generation(format!("failed to parse LLM response: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| Error::Generation("LLM response has no message content".to_string()))
}

// ---------------------------------------------------------------------------
// Provider selection
// ---------------------------------------------------------------------------

pub enum AnyGenerator {
    Ollama(OllamaGenerator),
    Chat(ChatGenerator),
}

impl TextGenerator for AnyGenerator {
    fn request_payload(&self, messages: &[ChatMessage]) -> Result<serde_json::Value> {
        match self {
            AnyGenerator::Ollama(g) => g.request_payload(messages),
            AnyGenerator::Chat(g) => g.request_payload(messages),
        }
    }

    fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        match self {
            AnyGenerator::Ollama(g) => g.generate(messages),
            AnyGenerator::Chat(g) => g.generate(messages),
        }
    }
}

/// Build the generator described by the `[llm]` config section.
pub fn build_generator(config: &LlmConfig) -> AnyGenerator {
    let timeout = Duration::from_secs(config.timeout_secs);
    let api_key = config
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok());
    match config.provider.as_str() {
        "openai" => AnyGenerator::Chat(ChatGenerator::new(
            &config.base_url,
            &config.model,
            api_key,
            timeout,
        )),
        _ => AnyGenerator::Ollama(OllamaGenerator::new(
            &config.base_url,
            &config.model,
            api_key,
            timeout,
        )),
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

fn to_payload<T: Serialize>(request: &T) -> Result<serde_json::Value> {
    serde_json::to_value(request)
        .map_err(|e| Error::Generation(format!("failed to serialize LLM request: {e}")))
}

fn join_contents(messages: &[ChatMessage], role: Role) -> String {
    messages
        .iter()
        .filter(|m| m.role == role)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// POST a JSON body and return the response text. Any non-2xx status,
/// transport failure or timeout is a generation error; there is no retry.
fn post_json(
    agent: &ureq::Agent,
    url: &str,
    api_key: Option<&str>,
    payload: &serde_json::Value,
) -> Result<String> {
    info!(url, "sending LLM request");
    let mut request = agent.post(url).set("Content-Type", "application/json");
    if let Some(key) = api_key {
        request = request.set("Authorization", &format!("Bearer {key}"));
    }

    match request.send_json(payload) {
        Ok(response) => {
            let status = response.status();
            let body = response
                .into_string()
                .map_err(|e| Error::Generation(format!("failed to read LLM response: {e}")))?;
            debug!(status, bytes = body.len(), "received LLM response");
            Ok(body)
        }
        Err(ureq::Error::Status(code, response)) => {
            let text = response.into_string().unwrap_or_default();
            Err(Error::Generation(format!(
                "LLM request failed with status {code}: {text}"
            )))
        }
        Err(ureq::Error::Transport(e)) => Err(Error::Generation(format!(
            "LLM request to {url} failed: {e}"
        ))),
    }
}

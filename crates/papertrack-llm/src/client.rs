//! Chat-completions client (summarization collaborator)

use std::time::{Duration, Instant};

use papertrack_core::http::{fetch_text, http_client};
use papertrack_core::{Paper, StageError, Summarizer};
use serde::{Deserialize, Serialize};

use crate::prompt::build_prompt;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

/// Generated text plus reported token usage
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub total_tokens: Option<u64>,
}

/// Decode a chat-completions body.
///
/// A body that parses but has no `choices[0].message.content` (or an empty
/// one) is `malformed_response`.
pub fn parse_completion(body: &str) -> Result<Completion, StageError> {
    let resp: ChatResponse = serde_json::from_str(body)
        .map_err(|e| StageError::malformed(format!("Invalid completion JSON: {e}")))?;
    let Some(first) = resp.choices.into_iter().next() else {
        return Err(StageError::malformed("response has no choices"));
    };
    let content = first
        .message
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| StageError::malformed("response has empty content"))?;
    Ok(Completion {
        content,
        total_tokens: resp.usage.and_then(|u| u.total_tokens),
    })
}

/// Model parameters for [`ChatClient`].
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    /// Paper text is cut to this many chars; `None` means no limit
    pub max_content_length: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    settings: ChatSettings,
}

impl ChatClient {
    pub fn new(settings: ChatSettings) -> Self {
        log::debug!(
            "LLM client: model={}, max_tokens={}, temperature={}, max_content_length={}",
            settings.model,
            settings.max_tokens,
            settings.temperature,
            settings
                .max_content_length
                .map_or("unlimited".to_string(), |n| n.to_string())
        );
        Self { settings }
    }

    /// JSON request body for `prompt`
    pub fn request_body(&self, prompt: &str) -> Result<String, StageError> {
        let req = ChatRequest {
            model: &self.settings.model,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };
        serde_json::to_string(&req)
            .map_err(|e| StageError::malformed(format!("Cannot encode request: {e}")))
    }
}

impl Summarizer for ChatClient {
    fn prompt(&self, paper: &Paper, text: &str) -> String {
        let prompt = build_prompt(paper, text, self.settings.max_content_length);
        log::debug!("{}: prompt is {} chars", paper.id, prompt.len());
        prompt
    }

    fn complete(&self, prompt: &str) -> Result<String, StageError> {
        let body = self.request_body(prompt)?;
        let request = http_client()
            .post(&self.settings.endpoint)
            .bearer_auth(&self.settings.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .timeout(self.settings.timeout);

        let start = Instant::now();
        let text = fetch_text(request)?;
        let completion = parse_completion(&text)?;
        log::debug!(
            "LLM call ok in {:.2}s, tokens: {}",
            start.elapsed().as_secs_f64(),
            completion
                .total_tokens
                .map_or("unknown".to_string(), |t| t.to_string())
        );
        Ok(completion.content)
    }
}

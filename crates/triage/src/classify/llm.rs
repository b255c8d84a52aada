//! LLM classifier over an OpenAI-compatible chat completions endpoint

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use ureq::Agent;

use super::{ClassifyItem, Classifier, RawVerdict};
use crate::error::TriageError;
use crate::models::Category;

/// Connection settings for the classification model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL up to and including the API version, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f64,
    /// Completion budget per item; the request asks for `items * max_tokens_per_item`
    pub max_tokens_per_item: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: 0.1,
            max_tokens_per_item: 60,
        }
    }
}

/// Token counters accumulated over the client's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub requests: u64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<UsageBlock>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Classifier backed by a chat completions API
pub struct LlmClassifier {
    agent: Agent,
    config: LlmConfig,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    requests: AtomicU64,
}

impl LlmClassifier {
    pub fn new(config: LlmConfig, timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            agent,
            config,
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
            requests: AtomicU64::new(0),
        }
    }

    pub fn usage(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, items: &[ClassifyItem]) -> Value {
        let max_tokens = (items.len() as u32)
            .saturating_mul(self.config.max_tokens_per_item)
            .max(self.config.max_tokens_per_item);
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system_prompt() },
                { "role": "user", "content": user_prompt(items) }
            ],
            "temperature": self.config.temperature,
            "max_tokens": max_tokens,
            "response_format": { "type": "json_object" }
        })
    }
}

fn system_prompt() -> String {
    let categories: Vec<String> = Category::KNOWN
        .iter()
        .map(|c| c.as_str().to_string())
        .collect();
    format!(
        "You classify emails. For every email you receive, return one entry in a JSON \
         object of the form {{\"results\": [{{\"id\": <id>, \"category\": <category>, \
         \"confidence_score\": <0.0-1.0>, \"is_spam\": <true|false>, \"spam_reason\": <string or null>}}]}}. \
         Use one of these categories: {}. Spam indicators include suspicious senders, \
         urgency tactics, promotional language and generic greetings.",
        categories.join(", ")
    )
}

fn user_prompt(items: &[ClassifyItem]) -> String {
    let emails: Vec<Value> = items
        .iter()
        .map(|item| {
            json!({
                "id": item.id.get(),
                "subject": item.subject,
                "from": item.sender,
                "content": item.snippet,
            })
        })
        .collect();
    json!({ "emails": emails }).to_string()
}

/// Drop a surrounding markdown code fence, if any
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse model output into raw verdicts
///
/// Output that is not JSON fails the whole batch. Individual entries that do
/// not deserialize are dropped, which the runner reports as missing.
pub fn parse_verdicts(content: &str) -> Result<Vec<RawVerdict>, TriageError> {
    let value: Value = serde_json::from_str(strip_code_fence(content)).map_err(|e| {
        TriageError::MalformedResponse(format!("classifier output is not JSON: {}", e))
    })?;

    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(entries)) => entries,
            _ => {
                return Err(TriageError::MalformedResponse(
                    "classifier output has no results array".to_string(),
                ));
            }
        },
        _ => {
            return Err(TriageError::MalformedResponse(
                "classifier output is neither an object nor an array".to_string(),
            ));
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RawVerdict>(entry) {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                debug!("[CLASSIFY] Dropping unparseable entry: {}", e);
                None
            }
        })
        .collect())
}

impl Classifier for LlmClassifier {
    fn classify_batch(&self, items: &[ClassifyItem]) -> Result<Vec<RawVerdict>, TriageError> {
        let mut request = self.agent.post(&self.endpoint());
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", &format!("Bearer {}", key));
        }

        let mut response = request.send_json(self.request_body(items))?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            return Err(TriageError::from_http_status(status, &body));
        }

        let parsed: ChatResponse = response.body_mut().read_json()?;
        self.requests.fetch_add(1, Ordering::Relaxed);
        if let Some(usage) = &parsed.usage {
            self.prompt_tokens
                .fetch_add(usage.prompt_tokens, Ordering::Relaxed);
            self.completion_tokens
                .fetch_add(usage.completion_tokens, Ordering::Relaxed);
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                TriageError::MalformedResponse("classifier returned no choices".to_string())
            })?;

        parse_verdicts(&content)
    }
}

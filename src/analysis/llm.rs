//! LLM semantic adapter: one chat-completion call per file, reply validated
//! against a fixed JSON schema.

use crate::analysis::language_display_name;
use crate::error::{AnalysisCondition, LlmError};
use crate::models::config::PipelineConfig;
use crate::models::issue::{Category, IssueRecord, LineRange, Severity};
use crate::models::pr::PrFile;
use crate::models::report::AdapterStatus;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are an expert code reviewer. You answer with JSON only.";

const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Transport to a chat-completion provider. Returns the assistant text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// OpenAI-compatible `POST {base_url}/chat/completions`.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("reviewlens/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Client keyed by `OPENAI_API_KEY`, or `None` when the variable is unset.
    pub fn from_env(config: &PipelineConfig) -> Option<Self> {
        let key = std::env::var("OPENAI_API_KEY").ok()?;
        Self::new(&config.llm_base_url, &key).ok()
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            200..=299 => {}
            401 | 403 => return Err(LlmError::Auth(status)),
            429 => return Err(LlmError::RateLimited),
            _ => {
                let text = response.text().await.unwrap_or_default();
                let body: String = text.chars().take(ERROR_BODY_LIMIT).collect();
                return Err(LlmError::Api { status, body });
            }
        }

        let envelope: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Envelope(e.to_string()))?;
        envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Envelope("no message content in reply".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmOutcome {
    pub issues: Vec<IssueRecord>,
    pub status: AdapterStatus,
    pub conditions: Vec<AnalysisCondition>,
}

impl LlmOutcome {
    fn empty(status: AdapterStatus) -> Self {
        Self {
            issues: Vec::new(),
            status,
            conditions: Vec::new(),
        }
    }

    fn degraded(status: AdapterStatus, condition: AnalysisCondition) -> Self {
        Self {
            issues: Vec::new(),
            status,
            conditions: vec![condition],
        }
    }
}

/// Which text the prompt carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptInput {
    FullText,
    Diff,
}

pub struct LlmAnalyzer {
    client: Option<Arc<dyn CompletionClient>>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    max_input_chars: usize,
    timeout: Duration,
    retry_count: u32,
    retry_backoff: Duration,
}

impl LlmAnalyzer {
    /// `client` is `None` when the LLM is disabled or has no credentials.
    pub fn new(config: &PipelineConfig, client: Option<Arc<dyn CompletionClient>>) -> Self {
        Self {
            client: client.filter(|_| config.llm_enabled),
            model: config.llm_model.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            max_input_chars: config.llm_max_input_chars,
            timeout: Duration::from_secs(config.llm_timeout_seconds),
            retry_count: config.llm_retry_count,
            retry_backoff: Duration::from_millis(config.llm_retry_backoff_ms),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub async fn analyze(&self, file: &PrFile, context: &str) -> LlmOutcome {
        let Some(client) = &self.client else {
            return LlmOutcome::empty(AdapterStatus::Disabled);
        };

        let input = if file.file_text.chars().count() <= self.max_input_chars {
            PromptInput::FullText
        } else if !file.diff.trim().is_empty() && file.diff.chars().count() <= self.max_input_chars {
            debug!("{} exceeds the LLM input limit, sending the diff", file.file_path);
            PromptInput::Diff
        } else {
            debug!("{} and its diff exceed the LLM input limit, skipping", file.file_path);
            return LlmOutcome::empty(AdapterStatus::Skipped);
        };

        let request = CompletionRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            user: build_prompt(file, input, context),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let reply = match self.complete_with_retry(client.as_ref(), &request, &file.file_path).await {
            Ok(reply) => reply,
            Err((error, attempts)) => {
                warn!("LLM unavailable for {} after {attempts} attempt(s): {error}", file.file_path);
                return LlmOutcome::degraded(
                    AdapterStatus::Unavailable,
                    AnalysisCondition::LlmUnavailable {
                        reason: error.to_string(),
                        attempts,
                    },
                );
            }
        };

        match parse_findings(&reply, &file.file_path) {
            Ok(issues) => LlmOutcome {
                issues,
                status: AdapterStatus::Ok,
                conditions: Vec::new(),
            },
            Err(reason) => {
                warn!("discarding malformed LLM reply for {}: {reason}", file.file_path);
                LlmOutcome::degraded(AdapterStatus::Malformed, AnalysisCondition::MalformedResponse { reason })
            }
        }
    }

    /// Retries transient failures with exponential backoff. On failure returns
    /// the last error and the number of attempts made.
    async fn complete_with_retry(
        &self,
        client: &dyn CompletionClient,
        request: &CompletionRequest,
        file_path: &str,
    ) -> Result<String, (LlmError, u32)> {
        let max_attempts = self.retry_count.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.timeout, client.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(self.timeout.as_secs())),
            };
            match result {
                Ok(reply) => return Ok(reply),
                Err(error) if error.retryable() && attempt < max_attempts => {
                    let delay = self.retry_backoff.saturating_mul(1 << (attempt - 1).min(16));
                    debug!("LLM attempt {attempt} for {file_path} failed ({error}), retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err((error, attempt)),
            }
        }
    }
}

fn build_prompt(file: &PrFile, input: PromptInput, context: &str) -> String {
    let language = language_display_name(&file.file_path);
    let categories: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
    let severities: Vec<&str> = Severity::ALL.iter().map(Severity::as_str).collect();

    let (what, body) = match input {
        PromptInput::FullText => {
            let numbered: Vec<String> = file
                .file_text
                .lines()
                .enumerate()
                .map(|(i, line)| format!("{:>5} | {line}", i + 1))
                .collect();
            ("the full file, with line numbers", numbered.join("\n"))
        }
        PromptInput::Diff => (
            "a unified diff; report line numbers of the new version",
            file.diff.clone(),
        ),
    };

    format!(
        "You are reviewing a {language} file changed in {context}.\n\
         File: {path}\n\n\
         Look for bugs and logical errors, security vulnerabilities, maintainability and \
         complexity problems, duplication and style violations. Only report real issues; \
         an empty list is a valid answer.\n\n\
         Answer with a JSON object of the form \
         {{\"issues\": [{{\"line_start\": 1, \"line_end\": 1, \"category\": \"...\", \
         \"severity\": \"...\", \"message\": \"...\", \"confidence\": 0.0, \
         \"suggested_fix\": \"...\"}}]}}\n\
         category is one of: {categories}\n\
         severity is one of: {severities}\n\
         confidence is between 0 and 1; suggested_fix is optional.\n\n\
         Below is {what}:\n```{lang_tag}\n{body}\n```\n",
        path = file.file_path,
        categories = categories.join(", "),
        severities = severities.join(", "),
        lang_tag = language.to_ascii_lowercase(),
    )
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    line_start: u32,
    #[serde(default)]
    line_end: Option<u32>,
    category: String,
    severity: String,
    message: String,
    confidence: f64,
    #[serde(default)]
    suggested_fix: Option<String>,
}

/// Validate a model reply. Any invalid entry rejects the whole reply.
pub fn parse_findings(reply: &str, file_path: &str) -> Result<Vec<IssueRecord>, String> {
    let value = extract_json(reply).ok_or_else(|| "reply contains no JSON document".to_string())?;

    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut object) => match object.remove("issues") {
            Some(Value::Array(entries)) => entries,
            Some(_) => return Err("\"issues\" is not an array".to_string()),
            None => return Err("object has no \"issues\" field".to_string()),
        },
        _ => return Err("reply is neither an object nor an array".to_string()),
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            to_issue(entry, file_path).map_err(|reason| format!("issue #{index}: {reason}"))
        })
        .collect()
}

fn to_issue(entry: Value, file_path: &str) -> Result<IssueRecord, String> {
    let raw: RawFinding = serde_json::from_value(entry).map_err(|e| e.to_string())?;
    let category =
        Category::parse(&raw.category).ok_or_else(|| format!("unknown category '{}'", raw.category))?;
    let severity =
        Severity::parse(&raw.severity).ok_or_else(|| format!("unknown severity '{}'", raw.severity))?;
    if raw.message.trim().is_empty() {
        return Err("empty message".to_string());
    }
    let range = LineRange::new(raw.line_start, raw.line_end.unwrap_or(raw.line_start))
        .map_err(|e| e.to_string())?;

    IssueRecord::from_llm(file_path, range, category, severity, raw.message.trim(), raw.confidence)
        .map(|issue| issue.with_suggested_fix(raw.suggested_fix))
        .map_err(|e| e.to_string())
}

/// Parse the reply as JSON, tolerating Markdown fences and surrounding prose.
fn extract_json(reply: &str) -> Option<Value> {
    let trimmed = reply.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(fenced) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(fenced.trim()) {
            return Some(value);
        }
    }

    let start = trimmed.find(['{', '['])?;
    let end = trimmed.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

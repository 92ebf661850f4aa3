//! Error and condition types shared by the pipeline.
//!
//! Per-file adapter failures are [`AnalysisCondition`]s: they are recorded in the
//! report diagnostics and never abort a run. Only [`FetchError`] (no file list)
//! is fatal, surfaced through [`PipelineError::FatalFetch`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Violations of the IssueRecord invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidIssue {
    #[error("line numbers are 1-based, got {start}-{end}")]
    NonPositiveLine { start: u32, end: u32 },
    #[error("line range start {start} is after end {end}")]
    InvertedRange { start: u32, end: u32 },
    #[error("issue file path is empty")]
    EmptyPath,
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

/// Degraded-analysis conditions reported per file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisCondition {
    #[error("linter {tool} unavailable: {reason}")]
    ToolUnavailable { tool: String, reason: String },
    #[error("LLM response malformed: {reason}")]
    MalformedResponse { reason: String },
    #[error("LLM unavailable after {attempts} attempt(s): {reason}")]
    LlmUnavailable { reason: String, attempts: u32 },
    #[error("storage warning: {reason}")]
    StorageWarning { reason: String },
}

/// Failures talking to the language-model provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LlmError {
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("rate limited by provider")]
    RateLimited,
    #[error("authentication rejected (HTTP {0})")]
    Auth(u16),
    #[error("provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response envelope: {0}")]
    Envelope(String),
    #[error("no API key configured")]
    MissingApiKey,
}

impl LlmError {
    /// Whether another attempt could plausibly succeed.
    pub fn retryable(&self) -> bool {
        match self {
            LlmError::Timeout(_) | LlmError::RateLimited | LlmError::Transport(_) => true,
            LlmError::Api { status, .. } => *status >= 500,
            LlmError::Auth(_) | LlmError::Envelope(_) | LlmError::MissingApiKey => false,
        }
    }
}

/// Failures obtaining the pull request file list. Always fatal for a run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GitHub rejected the credentials (HTTP {0})")]
    Auth(u16),
    #[error("GitHub rate limit exceeded")]
    RateLimited,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("GitHub returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pull request identifier '{0}', expected owner/repo#number")]
pub struct ParsePrError(pub String);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not fetch pull request files: {0}")]
    FatalFetch(#[from] FetchError),
    #[error("settings error: {0}")]
    Settings(String),
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

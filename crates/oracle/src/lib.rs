//! Reasoning oracle contract
//!
//! The oracle is an opaque text-in/text-out collaborator used for
//! perception judgments and plan generation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use thiserror::Error;

pub mod openai;

pub use openai::OpenAiCompatibleOracle;

/// Oracle errors
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("oracle payload error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("oracle rejected request: {0}")]
    Api(String),

    #[error("oracle api key missing")]
    NoApiKey,

    #[error("oracle returned a malformed response")]
    InvalidResponse,

    #[error("oracle returned an empty completion")]
    EmptyCompletion,

    #[error("oracle rate limited")]
    RateLimited,
}

pub type Result<T> = std::result::Result<T, OracleError>;

/// What a completion is for; implementations may route on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Perception,
    Planning,
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Purpose::Perception => write!(f, "perception"),
            Purpose::Planning => write!(f, "planning"),
        }
    }
}

/// Prompt message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub purpose: Purpose,
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    /// Single-prompt request with default sampling
    pub fn prompt(purpose: Purpose, model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            purpose,
            model: model.into(),
            messages: vec![Message::user(prompt)],
            ..Default::default()
        }
    }

    /// Concatenated text of the user messages
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            purpose: Purpose::Planning,
            model: String::new(),
            messages: Vec::new(),
            max_tokens: 4096,
            temperature: 0.2,
        }
    }
}

/// Token accounting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Completion text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    #[serde(default)]
    pub finish_reason: String,
    #[serde(default)]
    pub usage: Usage,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }
}

/// Reasoning oracle
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
    fn default_model(&self) -> String;
    fn is_configured(&self) -> bool;
}

/// Strip a surrounding markdown code fence and its language tag
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // language tag runs to the end of the first line
    let body = match rest.find('\n') {
        Some(idx) if rest[..idx].chars().all(|c| c.is_ascii_alphanumeric()) => &rest[idx + 1..],
        _ => rest,
    };

    body.trim_end().trim_end_matches("```").trim()
}

/// Locate the JSON object in a free-text response
///
/// Prefers a fenced block; otherwise the span from the first `{` to the
/// last `}`.
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let body = match after.find('\n') {
            Some(idx) if after[..idx].chars().all(|c| c.is_ascii_alphanumeric()) => {
                &after[idx + 1..]
            }
            _ => after,
        };
        if let Some(end) = body.find("```") {
            let candidate = body[..end].trim();
            if candidate.starts_with('{') && candidate.ends_with('}') {
                return Some(candidate);
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

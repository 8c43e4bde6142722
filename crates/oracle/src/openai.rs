//! OpenAI-compatible chat completions oracle (OpenAI, OpenRouter, vLLM)

use crate::*;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, trace};

const OPENROUTER_BASE: &str = "https://openrouter.ai/api/v1";
const OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Oracle backed by a `/chat/completions` endpoint
pub struct OpenAiCompatibleOracle {
    client: Client,
    api_key: String,
    api_base: String,
    default_model: String,
    is_openrouter: bool,
}

impl OpenAiCompatibleOracle {
    pub fn new(
        api_key: impl Into<String>,
        api_base: Option<String>,
        default_model: Option<String>,
    ) -> Self {
        let api_key = api_key.into();
        let is_openrouter = api_key.starts_with("sk-or-")
            || api_base
                .as_ref()
                .map(|b| b.contains("openrouter"))
                .unwrap_or(false);

        let api_base = api_base.unwrap_or_else(|| {
            if is_openrouter {
                OPENROUTER_BASE.to_string()
            } else {
                OPENAI_BASE.to_string()
            }
        });

        let default_model = default_model.unwrap_or_else(|| {
            if is_openrouter {
                "google/gemini-2.0-flash-001".to_string()
            } else {
                "gpt-4o-mini".to_string()
            }
        });

        Self {
            client: Client::new(),
            api_key,
            api_base,
            default_model,
            is_openrouter,
        }
    }

    fn build_request(&self, request: &CompletionRequest) -> serde_json::Value {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": &m.role, "content": &m.content }))
            .collect();

        json!({
            "model": model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        })
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<Completion> {
        let choice = json["choices"]
            .get(0)
            .ok_or(OracleError::InvalidResponse)?;
        let content = choice["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(OracleError::EmptyCompletion)?;
        let finish_reason = choice["finish_reason"]
            .as_str()
            .unwrap_or("stop")
            .to_string();

        let usage = if let Some(usage) = json["usage"].as_object() {
            Usage {
                prompt_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                completion_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
                total_tokens: usage["total_tokens"].as_u64().unwrap_or(0) as u32,
            }
        } else {
            Usage::default()
        };

        Ok(Completion {
            content,
            finish_reason,
            usage,
        })
    }
}

/// `error.message` from a JSON error body, else the raw body
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string));

    match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => format!("http {}", status),
        None => format!("http {}: {}", status, body.trim()),
    }
}

#[async_trait::async_trait]
impl Oracle for OpenAiCompatibleOracle {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        if self.api_key.is_empty() {
            return Err(OracleError::NoApiKey);
        }

        trace!("◆ {} request to {}", request.purpose, self.api_base);

        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request(&request);

        let mut http = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if self.is_openrouter {
            http = http.header("X-Title", "cortex");
        }

        let response = http.json(&body).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(OracleError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OracleError::Api(error_message(status, &text)));
        }

        let json: serde_json::Value = response.json().await?;
        let completion = self.parse_response(json)?;
        debug!(
            "◆ {} completion: {} chars, {} tokens",
            request.purpose,
            completion.content.len(),
            completion.usage.total_tokens
        );
        Ok(completion)
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_with_openrouter_key() {
        let oracle = OpenAiCompatibleOracle::new("sk-or-test123", None, None);
        assert!(oracle.is_openrouter);
        assert_eq!(oracle.api_base, OPENROUTER_BASE);
        assert_eq!(oracle.default_model, "google/gemini-2.0-flash-001");
    }

    #[test]
    fn test_new_with_openai_key() {
        let oracle = OpenAiCompatibleOracle::new("sk-openai123", None, None);
        assert!(!oracle.is_openrouter);
        assert_eq!(oracle.api_base, OPENAI_BASE);
        assert_eq!(oracle.default_model, "gpt-4o-mini");
    }

    #[test]
    fn test_new_with_custom_openrouter_base() {
        let oracle = OpenAiCompatibleOracle::new(
            "some-key",
            Some("https://custom.openrouter.ai/api".to_string()),
            None,
        );
        assert!(oracle.is_openrouter);
        assert_eq!(oracle.api_base, "https://custom.openrouter.ai/api");
    }

    #[test]
    fn test_new_with_local_base() {
        let oracle = OpenAiCompatibleOracle::new(
            "token",
            Some("http://localhost:8000/v1".to_string()),
            Some("local/model".to_string()),
        );
        assert!(!oracle.is_openrouter);
        assert_eq!(oracle.api_base, "http://localhost:8000/v1");
        assert_eq!(oracle.default_model(), "local/model");
    }

    #[test]
    fn test_is_configured() {
        assert!(OpenAiCompatibleOracle::new("key", None, None).is_configured());
        assert!(!OpenAiCompatibleOracle::new("", None, None).is_configured());
    }

    #[tokio::test]
    async fn test_complete_without_key_fails_fast() {
        let oracle = OpenAiCompatibleOracle::new("", None, None);
        let request = CompletionRequest::prompt(Purpose::Planning, "m", "hi");
        assert!(matches!(
            oracle.complete(request).await,
            Err(OracleError::NoApiKey)
        ));
    }

    #[test]
    fn test_build_request_basic() {
        let oracle = OpenAiCompatibleOracle::new("sk-test", None, None);
        let request = CompletionRequest {
            purpose: Purpose::Planning,
            model: "gpt-4".to_string(),
            messages: vec![Message::system("rules"), Message::user("Hello")],
            max_tokens: 1024,
            temperature: 0.5,
        };

        let body = oracle.build_request(&request);

        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["temperature"], 0.5);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "Hello");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_build_request_uses_default_model_when_empty() {
        let oracle = OpenAiCompatibleOracle::new("sk-test", None, Some("fallback".to_string()));
        let request = CompletionRequest::prompt(Purpose::Perception, "", "Hello");
        assert_eq!(oracle.build_request(&request)["model"], "fallback");
    }

    #[test]
    fn test_parse_response_basic() {
        let oracle = OpenAiCompatibleOracle::new("sk-test", None, None);
        let response = json!({
            "choices": [{
                "message": { "role": "assistant", "content": "  FINAL_ANSWER: 4\n" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13 }
        });

        let completion = oracle.parse_response(response).unwrap();
        assert_eq!(completion.content, "FINAL_ANSWER: 4");
        assert_eq!(completion.finish_reason, "stop");
        assert_eq!(completion.usage.total_tokens, 13);
    }

    #[test]
    fn test_parse_response_no_choices() {
        let oracle = OpenAiCompatibleOracle::new("sk-test", None, None);
        let result = oracle.parse_response(json!({ "choices": [] }));
        assert!(matches!(result, Err(OracleError::InvalidResponse)));
    }

    #[test]
    fn test_parse_response_empty_content() {
        let oracle = OpenAiCompatibleOracle::new("sk-test", None, None);
        let response = json!({
            "choices": [{ "message": { "content": "   " }, "finish_reason": "stop" }]
        });
        assert!(matches!(
            oracle.parse_response(response),
            Err(OracleError::EmptyCompletion)
        ));
    }

    #[test]
    fn test_parse_response_null_content() {
        let oracle = OpenAiCompatibleOracle::new("sk-test", None, None);
        let response = json!({
            "choices": [{ "message": { "content": null }, "finish_reason": "length" }]
        });
        assert!(matches!(
            oracle.parse_response(response),
            Err(OracleError::EmptyCompletion)
        ));
    }

    #[test]
    fn test_parse_response_missing_usage() {
        let oracle = OpenAiCompatibleOracle::new("sk-test", None, None);
        let response = json!({
            "choices": [{ "message": { "content": "{}" } }]
        });
        let completion = oracle.parse_response(response).unwrap();
        assert_eq!(completion.finish_reason, "stop");
        assert_eq!(completion.usage.prompt_tokens, 0);
    }
}

//! Perception: intent and capability-group selection
//!
//! The judgment made for the original input is cached on the session and
//! reused for every continuation step of the same turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use cortex_oracle::{extract_json_block, CompletionRequest, Oracle, Purpose};
use cortex_session::MemoryRecord;

use crate::capability::CapabilityRegistry;
use crate::prompt;
use crate::state::Session;
use crate::Fault;

/// What perception concluded about an input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionJudgment {
    pub intent: String,
    pub entities: Vec<String>,
    pub capability_hint: Option<String>,
    /// Never empty
    pub selected_groups: Vec<String>,
}

impl PerceptionJudgment {
    /// Judgment used when the oracle gives nothing usable
    pub fn fallback(all_groups: Vec<String>) -> Self {
        Self {
            intent: "unknown".to_string(),
            entities: Vec::new(),
            capability_hint: None,
            selected_groups: all_groups,
        }
    }
}

#[derive(Deserialize)]
struct RawJudgment {
    intent: Option<String>,
    #[serde(default)]
    entities: Value,
    #[serde(alias = "capability_hint")]
    tool_hint: Option<String>,
    #[serde(default, alias = "selected_groups")]
    selected_servers: Value,
}

/// Parse an oracle perception response, keeping only known groups
pub fn parse_judgment(text: &str, known_groups: &[String]) -> Option<PerceptionJudgment> {
    let block = extract_json_block(text)?;
    let raw: RawJudgment = serde_json::from_str(block).ok()?;

    let intent = raw
        .intent
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let mut selected_groups = Vec::new();
    for group in strings(&raw.selected_servers) {
        if known_groups.contains(&group) && !selected_groups.contains(&group) {
            selected_groups.push(group);
        }
    }
    if selected_groups.is_empty() {
        selected_groups = known_groups.to_vec();
    }

    let capability_hint = raw
        .tool_hint
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty() && !h.eq_ignore_ascii_case("none"));

    Some(PerceptionJudgment {
        intent,
        entities: strings(&raw.entities),
        capability_hint,
        selected_groups,
    })
}

/// Flatten a list, map or scalar into strings
fn strings(value: &Value) -> Vec<String> {
    let render = |v: &Value| match v {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    };

    let items: Vec<String> = match value {
        Value::Array(items) => items.iter().map(render).collect(),
        Value::Object(map) => map.values().map(render).collect(),
        Value::Null => Vec::new(),
        other => vec![render(other)],
    };
    items.into_iter().filter(|s| !s.is_empty()).collect()
}

/// Whether this step needs a fresh judgment
///
/// Only the original input is perceived; continuation inputs reuse the
/// cached judgment.
pub fn should_perceive(session: &Session) -> bool {
    session.cached_judgment().is_none() || session.working_input() == session.original_input()
}

/// Asks the oracle which capability groups matter for an input
pub struct PerceptionSelector<O: Oracle + ?Sized> {
    oracle: Arc<O>,
    model: String,
    timeout: Duration,
}

impl<O: Oracle + ?Sized> PerceptionSelector<O> {
    pub fn new(oracle: Arc<O>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            oracle,
            model: model.into(),
            timeout,
        }
    }

    /// Oracle errors and unparseable responses fall back to all groups;
    /// only a timeout is reported as a fault.
    pub async fn perceive(
        &self,
        input: &str,
        registry: &CapabilityRegistry,
        memory: &[MemoryRecord],
    ) -> Result<PerceptionJudgment, Fault> {
        let all_groups = registry.group_ids();
        let request = CompletionRequest {
            purpose: Purpose::Perception,
            model: self.model.clone(),
            messages: prompt::perception_messages(input, registry.groups(), memory),
            max_tokens: 1024,
            temperature: 0.0,
        };

        let response = tokio::time::timeout(self.timeout, self.oracle.complete(request)).await;
        let completion = match response {
            Err(_) => return Err(Fault::OracleTimeout(self.timeout.as_secs())),
            Ok(Err(e)) => {
                warn!("[perception] oracle error, using all groups: {}", e);
                return Ok(PerceptionJudgment::fallback(all_groups));
            }
            Ok(Ok(completion)) => completion,
        };

        let judgment = match parse_judgment(&completion.content, &all_groups) {
            Some(judgment) => judgment,
            None => {
                debug!(
                    "[perception] unparseable response: {}",
                    cortex_session::preview(&completion.content, 200)
                );
                PerceptionJudgment::fallback(all_groups)
            }
        };

        info!(
            intent = %judgment.intent,
            groups = ?judgment.selected_groups,
            "[perception] judgment"
        );
        Ok(judgment)
    }
}

//! Plan generation and validation
//!
//! Plans arrive from the oracle as JSON:
//!
//! ```text
//! {"invoke": {"capability": "add", "args": {"a": 2, "b": 2}},
//!  "return": "FINAL_ANSWER: {result}"}
//! ```
//!
//! `invoke` may be written as a list so that plans asking for more than one
//! capability are recognised and rejected.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use cortex_oracle::{extract_json_block, strip_code_fence, CompletionRequest, Oracle, Purpose};
use cortex_session::MemoryRecord;

use crate::capability::CapabilityRegistry;
use crate::classifier::TERMINAL_SENTINEL;
use crate::perception::PerceptionJudgment;
use crate::prompt;
use crate::Fault;

/// The single capability call of a plan
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub capability: String,
    pub args: Value,
}

/// What the plan returns once the capability has answered
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnBody {
    /// Text with `{result}` / `{result.path}` placeholders
    Template(String),
    /// JSON object whose string leaves are templates
    Structured(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub invocation: Invocation,
    pub body: ReturnBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    Plan(Plan),
    /// The oracle answered without needing a capability
    DirectAnswer(String),
}

/// Asks the oracle for a plan
pub struct Planner<O: Oracle + ?Sized> {
    oracle: Arc<O>,
    model: String,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
}

impl<O: Oracle + ?Sized> Planner<O> {
    pub fn new(oracle: Arc<O>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            oracle,
            model: model.into(),
            timeout,
            max_tokens: 4096,
            temperature: 0.2,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub async fn plan(
        &self,
        input: &str,
        judgment: &PerceptionJudgment,
        registry: &CapabilityRegistry,
        memory: &[MemoryRecord],
    ) -> Result<PlannerOutput, Fault> {
        let descriptors = registry.describe_groups(&judgment.selected_groups);
        let request = CompletionRequest {
            purpose: Purpose::Planning,
            model: self.model.clone(),
            messages: prompt::planning_messages(input, judgment, &descriptors, memory),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = tokio::time::timeout(self.timeout, self.oracle.complete(request)).await;
        let completion = match response {
            Err(_) => return Err(Fault::OracleTimeout(self.timeout.as_secs())),
            Ok(Err(e)) => {
                warn!("[plan] oracle error: {}", e);
                return Err(Fault::OracleUnavailable(e.to_string()));
            }
            Ok(Ok(completion)) => completion,
        };

        debug!("[plan] raw: {}", cortex_session::preview(&completion.content, 200));
        parse_plan(&completion.content)
    }
}

/// Parse and validate an oracle planning response
pub fn parse_plan(text: &str) -> Result<PlannerOutput, Fault> {
    let stripped = strip_code_fence(text);
    let object = extract_json_block(text)
        .and_then(|block| serde_json::from_str::<Value>(block).ok())
        .filter(|value| value.get("invoke").is_some());

    let Some(object) = object else {
        if let Some(answer) = stripped.strip_prefix(TERMINAL_SENTINEL) {
            let answer = answer.trim();
            if answer.is_empty() {
                return Err(Fault::MalformedPlan(
                    "final answer marker without an answer".to_string(),
                ));
            }
            return Ok(PlannerOutput::DirectAnswer(answer.to_string()));
        }
        return Err(Fault::MalformedPlan(
            "response contains no plan object".to_string(),
        ));
    };

    let invocation = parse_invocation(&object["invoke"])?;
    let body = parse_body(object.get("return"))?;
    Ok(PlannerOutput::Plan(Plan { invocation, body }))
}

fn parse_invocation(invoke: &Value) -> Result<Invocation, Fault> {
    let call = match invoke {
        Value::Array(calls) if calls.len() == 1 => &calls[0],
        Value::Array(calls) => {
            return Err(Fault::MalformedPlan(format!(
                "plan invokes {} capabilities; exactly one is required",
                calls.len()
            )))
        }
        Value::Null => {
            return Err(Fault::MalformedPlan(
                "plan invokes no capability".to_string(),
            ))
        }
        other => other,
    };

    let Some(call) = call.as_object() else {
        return Err(Fault::MalformedPlan(
            "invocation must be an object".to_string(),
        ));
    };

    let capability = ["capability", "tool", "name"]
        .iter()
        .find_map(|key| call.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Fault::MalformedPlan("invocation names no capability".to_string()))?;

    let args = call
        .get("args")
        .or_else(|| call.get("arguments"))
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));

    Ok(Invocation {
        capability: capability.to_string(),
        args,
    })
}

fn parse_body(body: Option<&Value>) -> Result<ReturnBody, Fault> {
    match body {
        Some(Value::String(template)) if !template.trim().is_empty() => {
            Ok(ReturnBody::Template(template.clone()))
        }
        Some(Value::Object(map)) if !map.is_empty() => {
            Ok(ReturnBody::Structured(Value::Object(map.clone())))
        }
        Some(Value::Null) | None => Err(Fault::MalformedPlan(
            "plan has no return body".to_string(),
        )),
        Some(Value::String(_)) | Some(Value::Object(_)) => Err(Fault::MalformedPlan(
            "plan has an empty return body".to_string(),
        )),
        Some(_) => Err(Fault::MalformedPlan(
            "return body must be a string or an object".to_string(),
        )),
    }
}

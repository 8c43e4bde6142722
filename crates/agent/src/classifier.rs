//! Step outcome classification

use serde_json::Value;

use crate::sandbox::{ExecutionReturn, RawReturn};
use crate::Fault;

/// Marks a plan return value as the final answer
pub const TERMINAL_SENTINEL: &str = "FINAL_ANSWER:";

/// Marks a plan return value as needing another step
pub const CONTINUE_SENTINEL: &str = "FURTHER_PROCESSING_REQUIRED:";

/// What a step produced
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    TerminalAnswer(String),
    /// Raw payload to forward into the next step
    ContinuationRequest(String),
    Fault(Fault),
}

/// Classify an executor result
pub fn classify(result: Result<ExecutionReturn, Fault>) -> ExecutionOutcome {
    match result {
        Ok(ret) => classify_return(&ret),
        Err(fault) => ExecutionOutcome::Fault(fault),
    }
}

pub fn classify_return(ret: &ExecutionReturn) -> ExecutionOutcome {
    match &ret.value {
        RawReturn::Text(text) => classify_text(text, ret),
        RawReturn::Structured(value) => classify_structured(value, ret),
    }
}

fn classify_text(text: &str, ret: &ExecutionReturn) -> ExecutionOutcome {
    let text = text.trim();
    if text.is_empty() {
        return ExecutionOutcome::Fault(Fault::SandboxFault(
            "plan returned an empty value".to_string(),
        ));
    }

    if let Some(outcome) = tagged(text, ret) {
        return outcome;
    }

    let output = ret.output.text();
    let output = output.trim();
    if (!output.is_empty() && text.contains(output)) || looks_like_container(text) {
        return ExecutionOutcome::ContinuationRequest(text.to_string());
    }

    // the plan synthesised the text itself
    ExecutionOutcome::TerminalAnswer(text.to_string())
}

fn classify_structured(value: &Value, ret: &ExecutionReturn) -> ExecutionOutcome {
    if let Some(outcome) = value
        .get("result")
        .and_then(|r| r.as_str())
        .and_then(|r| tagged(r.trim(), ret))
    {
        return outcome;
    }

    let empty = match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    if empty {
        return ExecutionOutcome::Fault(Fault::SandboxFault(
            "plan returned an empty value".to_string(),
        ));
    }

    ExecutionOutcome::ContinuationRequest(value.to_string())
}

fn tagged(text: &str, ret: &ExecutionReturn) -> Option<ExecutionOutcome> {
    if let Some(answer) = text.strip_prefix(TERMINAL_SENTINEL) {
        let answer = answer.trim();
        return Some(if answer.is_empty() {
            ExecutionOutcome::Fault(Fault::SandboxFault(
                "final answer marker without an answer".to_string(),
            ))
        } else {
            ExecutionOutcome::TerminalAnswer(answer.to_string())
        });
    }

    if let Some(payload) = text.strip_prefix(CONTINUE_SENTINEL) {
        let payload = payload.trim();
        return Some(if payload.is_empty() {
            ExecutionOutcome::ContinuationRequest(ret.output.text())
        } else {
            ExecutionOutcome::ContinuationRequest(payload.to_string())
        });
    }

    None
}

/// Printed or serialized capability result wrapper
fn looks_like_container(text: &str) -> bool {
    if text.contains("TextContent(") {
        return true;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => {
            map.contains_key("result") || map.get("content").map_or(false, Value::is_array)
        }
        _ => false,
    }
}

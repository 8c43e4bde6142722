//! Prompt assembly for perception and planning

use chrono::Local;

use cortex_oracle::Message;
use cortex_session::MemoryRecord;

use crate::capability::{CapabilityDescriptor, CapabilityGroup};
use crate::classifier::{CONTINUE_SENTINEL, TERMINAL_SENTINEL};
use crate::perception::PerceptionJudgment;

fn identity() -> String {
    let now = Local::now().format("%Y-%m-%d %H:%M (%A)");
    format!(
        "You are cortex, a reasoning agent that solves tasks one capability call at a time.\n\nCurrent time: {}",
        now
    )
}

/// `- [role] text` lines, oldest first
pub fn format_memory(records: &[MemoryRecord]) -> String {
    records
        .iter()
        .map(|r| format!("- [{}] {}", r.role, r.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn perception_messages(
    input: &str,
    groups: &[CapabilityGroup],
    memory: &[MemoryRecord],
) -> Vec<Message> {
    let catalog = groups
        .iter()
        .map(|g| format!("- {}: {}", g.id, g.description))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        r#"Decide which capability groups are relevant to the input below.

Available groups:
{}

Input: "{}"
"#,
        catalog, input
    );

    if !memory.is_empty() {
        prompt.push_str(&format!("\nRecent history:\n{}\n", format_memory(memory)));
    }

    prompt.push_str(
        r#"
Respond with a single JSON object and nothing else:
{"intent": "<short intent>", "entities": ["<entity>", ...], "tool_hint": "<capability id or null>", "selected_servers": ["<group id>", ...]}

Select every group that could help. If unsure, select all of them."#,
    );

    vec![Message::system(identity()), Message::user(prompt)]
}

pub fn planning_messages(
    input: &str,
    judgment: &PerceptionJudgment,
    descriptors: &[&CapabilityDescriptor],
    memory: &[MemoryRecord],
) -> Vec<Message> {
    let catalog = descriptors
        .iter()
        .map(|d| format!("- {}: {}\n  input schema: {}", d.id, d.usage, d.input_schema))
        .collect::<Vec<_>>()
        .join("\n");

    let entities = if judgment.entities.is_empty() {
        "none".to_string()
    } else {
        judgment.entities.join(", ")
    };

    let mut prompt = format!(
        "Available capabilities:\n{}\n\nTask:\n{}\n\nIntent: {}\nEntities: {}\nSuggested capability: {}\n",
        catalog,
        input,
        judgment.intent,
        entities,
        judgment.capability_hint.as_deref().unwrap_or("none")
    );

    if !memory.is_empty() {
        prompt.push_str(&format!(
            "\nHistory:\n{}\n\nIMPORTANT: if the history already contains the information the task needs, do not invoke the capability again. Answer with {} instead.\n",
            format_memory(memory),
            TERMINAL_SENTINEL
        ));
    }

    prompt.push_str(&format!(
        r#"
Reply with ONE of the following.

1. A plan invoking exactly one capability, as JSON:
{{"invoke": {{"capability": "<id>", "args": {{...}}}}, "return": "<template>"}}

The return template may reference the capability output as {{result}}, or a field of structured output as {{result.field}} (list items by index, e.g. {{result.items.0}}). Capability output may be plain text or structured JSON; handle both.
Start the template with "{terminal} " if the output answers the task, or with "{cont} " if another step is needed.

2. If the task is already answered, the answer alone:
{terminal} <answer>"#,
        terminal = TERMINAL_SENTINEL,
        cont = CONTINUE_SENTINEL
    ));

    vec![Message::system(identity()), Message::user(prompt)]
}

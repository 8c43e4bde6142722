//! Shared fixtures: a scripted oracle and test capabilities

#![allow(dead_code)]

use async_trait::async_trait;
use cortex_agent::{Capability, CapabilityError, CapabilityOutput, CapabilityRegistry};
use cortex_oracle::{Completion, CompletionRequest, Oracle, OracleError, Purpose};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Oracle that replays canned responses
///
/// Perception calls always get `perception`. Planning calls pop the next
/// scripted response; once the script is empty `fallback` is repeated.
pub struct ScriptedOracle {
    perception: String,
    plans: Mutex<VecDeque<Result<String, String>>>,
    fallback: String,
    planning_delay: Option<Duration>,
    first_planning_delay: Mutex<Option<Duration>>,
    pub perception_calls: AtomicUsize,
    pub planning_calls: AtomicUsize,
    pub planning_prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(plans: Vec<&str>) -> Self {
        Self {
            perception: json!({
                "intent": "test",
                "entities": [],
                "tool_hint": null,
                "selected_servers": ["math", "websearch"]
            })
            .to_string(),
            plans: Mutex::new(plans.into_iter().map(|p| Ok(p.to_string())).collect()),
            fallback: "I have no idea".to_string(),
            planning_delay: None,
            first_planning_delay: Mutex::new(None),
            perception_calls: AtomicUsize::new(0),
            planning_calls: AtomicUsize::new(0),
            planning_prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, fallback: &str) -> Self {
        self.fallback = fallback.to_string();
        self
    }

    pub fn with_perception(mut self, perception: &str) -> Self {
        self.perception = perception.to_string();
        self
    }

    pub fn with_planning_delay(mut self, delay: Duration) -> Self {
        self.planning_delay = Some(delay);
        self
    }

    /// Delay only the first planning call
    pub fn with_first_planning_delay(self, delay: Duration) -> Self {
        *self.first_planning_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Queue an oracle failure for the next planning call
    pub fn push_error(&self, message: &str) {
        self.plans
            .lock()
            .unwrap()
            .push_front(Err(message.to_string()));
    }

    pub fn perception_count(&self) -> usize {
        self.perception_calls.load(Ordering::SeqCst)
    }

    pub fn planning_count(&self) -> usize {
        self.planning_calls.load(Ordering::SeqCst)
    }

    pub fn last_planning_prompt(&self) -> String {
        self.planning_prompts
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, OracleError> {
        match request.purpose {
            Purpose::Perception => {
                self.perception_calls.fetch_add(1, Ordering::SeqCst);
                Ok(Completion::text(self.perception.clone()))
            }
            Purpose::Planning => {
                self.planning_calls.fetch_add(1, Ordering::SeqCst);
                self.planning_prompts
                    .lock()
                    .unwrap()
                    .push(request.prompt_text());
                let first = self.first_planning_delay.lock().unwrap().take();
                if let Some(delay) = first.or(self.planning_delay) {
                    tokio::time::sleep(delay).await;
                }
                let next = self.plans.lock().unwrap().pop_front();
                match next {
                    Some(Ok(text)) => Ok(Completion::text(text)),
                    Some(Err(message)) => Err(OracleError::Api(message)),
                    None => Ok(Completion::text(self.fallback.clone())),
                }
            }
        }
    }

    fn default_model(&self) -> String {
        "scripted".to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }
}

/// Capability returning fixed text and counting invocations
pub struct StaticCapability {
    pub id: String,
    pub group: String,
    pub output: CapabilityOutput,
    pub calls: Arc<AtomicUsize>,
}

impl StaticCapability {
    pub fn text(id: &str, group: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            group: group.to_string(),
            output: CapabilityOutput::from_text(text),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn json(id: &str, group: &str, value: Value) -> Self {
        Self {
            id: id.to_string(),
            group: group.to_string(),
            output: CapabilityOutput::from_json(value),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Capability for StaticCapability {
    fn id(&self) -> &str {
        &self.id
    }

    fn group(&self) -> &str {
        &self.group
    }

    fn usage(&self) -> &str {
        "Returns a fixed result. Usage: {\"query\": \"...\"}"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }

    async fn invoke(&self, _args: Value) -> Result<CapabilityOutput, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// Capability that never answers in time
pub struct SlowCapability(pub Duration);

#[async_trait]
impl Capability for SlowCapability {
    fn id(&self) -> &str {
        "slow"
    }

    fn group(&self) -> &str {
        "test"
    }

    fn usage(&self) -> &str {
        "Sleeps before answering"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn invoke(&self, _args: Value) -> Result<CapabilityOutput, CapabilityError> {
        tokio::time::sleep(self.0).await;
        Ok(CapabilityOutput::from_text("late"))
    }
}

/// Capability that panics
pub struct PanickingCapability;

#[async_trait]
impl Capability for PanickingCapability {
    fn id(&self) -> &str {
        "explode"
    }

    fn group(&self) -> &str {
        "test"
    }

    fn usage(&self) -> &str {
        "Always panics"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn invoke(&self, _args: Value) -> Result<CapabilityOutput, CapabilityError> {
        panic!("provider bug");
    }
}

/// Capability that cancels a token when invoked
pub struct CancellingCapability(pub CancellationToken);

#[async_trait]
impl Capability for CancellingCapability {
    fn id(&self) -> &str {
        "cancel"
    }

    fn group(&self) -> &str {
        "test"
    }

    fn usage(&self) -> &str {
        "Cancels the running turn"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn invoke(&self, _args: Value) -> Result<CapabilityOutput, CapabilityError> {
        self.0.cancel();
        Ok(CapabilityOutput::from_text("cancel requested"))
    }
}

/// Math capabilities plus a `search` capability returning `search_text`
pub fn test_registry(search_text: &str) -> (CapabilityRegistry, Arc<AtomicUsize>) {
    let mut registry = CapabilityRegistry::new();
    cortex_agent::capability::math::register(&mut registry);
    registry.register_group("websearch", "Web search");
    let search = StaticCapability::text("search", "websearch", search_text);
    let calls = Arc::clone(&search.calls);
    registry.register(search);
    (registry, calls)
}

pub fn plan(capability: &str, args: Value, body: &str) -> String {
    json!({
        "invoke": { "capability": capability, "args": args },
        "return": body
    })
    .to_string()
}

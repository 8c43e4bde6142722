//! Per-turn session state

use chrono::{DateTime, Local};
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

use cortex_session::{MemoryLedger, MemoryRecord};

use crate::perception::PerceptionJudgment;

/// Controller state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Perceiving,
    Planning,
    Executing,
    Classifying,
    Continuing,
    Terminal,
    Faulted,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopState::Idle => "idle",
            LoopState::Perceiving => "perceiving",
            LoopState::Planning => "planning",
            LoopState::Executing => "executing",
            LoopState::Classifying => "classifying",
            LoopState::Continuing => "continuing",
            LoopState::Terminal => "terminal",
            LoopState::Faulted => "faulted",
        };
        write!(f, "{}", name)
    }
}

/// One user turn, owned by the controller for its duration
#[derive(Debug)]
pub struct Session {
    id: String,
    original_input: String,
    working_input: String,
    ledger: MemoryLedger,
    cached_judgment: Option<Arc<PerceptionJudgment>>,
    steps: u32,
    lifelines_used: u32,
    perception_calls: u32,
    state: LoopState,
    executed: Vec<(String, Value)>,
    started_at: DateTime<Local>,
}

impl Session {
    pub fn new(input: impl Into<String>) -> Self {
        let input = input.into();
        Self {
            id: Uuid::new_v4().to_string(),
            working_input: input.clone(),
            original_input: input,
            ledger: MemoryLedger::new(),
            cached_judgment: None,
            steps: 0,
            lifelines_used: 0,
            perception_calls: 0,
            state: LoopState::Idle,
            executed: Vec::new(),
            started_at: Local::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn original_input(&self) -> &str {
        &self.original_input
    }

    pub fn working_input(&self) -> &str {
        &self.working_input
    }

    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    pub fn cached_judgment(&self) -> Option<&Arc<PerceptionJudgment>> {
        self.cached_judgment.as_ref()
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn lifelines_used(&self) -> u32 {
        self.lifelines_used
    }

    pub fn perception_calls(&self) -> u32 {
        self.perception_calls
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Whether the working input came from a rewrite
    pub fn is_continuation(&self) -> bool {
        self.working_input != self.original_input
    }

    pub fn transition(&mut self, next: LoopState) {
        trace!("[loop] {} -> {}", self.state, next);
        self.state = next;
    }

    pub fn cache_judgment(&mut self, judgment: Arc<PerceptionJudgment>) {
        self.perception_calls += 1;
        self.cached_judgment = Some(judgment);
    }

    pub fn record(&mut self, record: MemoryRecord) {
        self.ledger.append(record);
    }

    pub fn rewrite_input(&mut self, next: String) {
        self.working_input = next;
    }

    pub fn consume_step(&mut self) {
        self.steps += 1;
    }

    pub fn consume_lifeline(&mut self) {
        self.lifelines_used += 1;
    }

    pub fn has_executed(&self, capability: &str, args: &Value) -> bool {
        self.executed
            .iter()
            .any(|(id, previous)| id == capability && previous == args)
    }

    pub fn mark_executed(&mut self, capability: &str, args: &Value) {
        if !self.has_executed(capability, args) {
            self.executed.push((capability.to_string(), args.clone()));
        }
    }

    pub fn into_ledger(self) -> MemoryLedger {
        self.ledger
    }
}

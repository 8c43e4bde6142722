//! Loop controller
//!
//! Drives a [`Session`] through perceive → plan → execute → classify passes.
//! A pass that reaches classification consumes a step; a recoverable fault
//! consumes a lifeline instead. Either counter running out ends the turn, so
//! a turn makes at most `max_steps + max_lifelines + 1` attempts.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cortex_config::{Config, StrategyConfig};
use cortex_oracle::Oracle;
use cortex_session::{preview, MemoryLedger, MemoryRecord, TurnRecord, TurnStore};

use crate::capability::CapabilityRegistry;
use crate::classifier::{classify, ExecutionOutcome};
use crate::forward::{decode, forward_fault, forward_result};
use crate::perception::{should_perceive, PerceptionSelector};
use crate::planner::{Planner, PlannerOutput};
use crate::sandbox::SandboxedExecutor;
use crate::state::{LoopState, Session};
use crate::Fault;

/// Text returned when the step budget runs out
pub const BUDGET_EXHAUSTED: &str = "step budget exhausted";

/// How a turn ended
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Answer(String),
    BudgetExhausted,
    Failed(String),
}

impl TurnOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TurnOutcome::Answer(_) => "answer",
            TurnOutcome::BudgetExhausted => "budget_exhausted",
            TurnOutcome::Failed(_) => "failed",
        }
    }

    /// Answer text, the budget message, or the failure reason
    pub fn text(&self) -> &str {
        match self {
            TurnOutcome::Answer(answer) => answer,
            TurnOutcome::BudgetExhausted => BUDGET_EXHAUSTED,
            TurnOutcome::Failed(reason) => reason,
        }
    }

    pub fn is_answer(&self) -> bool {
        matches!(self, TurnOutcome::Answer(_))
    }
}

impl std::fmt::Display for TurnOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnOutcome::Answer(answer) => write!(f, "{}", answer),
            TurnOutcome::BudgetExhausted => write!(f, "◆ {}", BUDGET_EXHAUSTED),
            TurnOutcome::Failed(reason) => write!(f, "◆ turn failed: {}", reason),
        }
    }
}

/// Result of one turn
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub session_id: String,
    pub outcome: TurnOutcome,
    pub steps: u32,
    pub lifelines_used: u32,
    pub perception_calls: u32,
    pub ledger: MemoryLedger,
}

enum Progress {
    Answer(String),
    Continue(String),
}

pub struct LoopController<O: Oracle + ?Sized> {
    registry: Arc<CapabilityRegistry>,
    perception: PerceptionSelector<O>,
    planner: Planner<O>,
    executor: SandboxedExecutor,
    strategy: StrategyConfig,
    store: Option<Arc<TurnStore>>,
}

impl<O: Oracle + ?Sized> LoopController<O> {
    /// Controller using the oracle's default model for every call
    pub fn new(oracle: Arc<O>, registry: Arc<CapabilityRegistry>, strategy: StrategyConfig) -> Self {
        let oracle_timeout = Duration::from_secs(strategy.oracle_timeout_secs);
        let capability_timeout = Duration::from_secs(strategy.capability_timeout_secs);
        Self {
            perception: PerceptionSelector::new(Arc::clone(&oracle), "", oracle_timeout),
            planner: Planner::new(oracle, "", oracle_timeout),
            executor: SandboxedExecutor::new(Arc::clone(&registry), capability_timeout),
            registry,
            strategy,
            store: None,
        }
    }

    pub fn from_config(oracle: Arc<O>, registry: Arc<CapabilityRegistry>, config: &Config) -> Self {
        let strategy = config.strategy.clone();
        let oracle_timeout = Duration::from_secs(strategy.oracle_timeout_secs);
        let capability_timeout = Duration::from_secs(strategy.capability_timeout_secs);
        Self {
            perception: PerceptionSelector::new(
                Arc::clone(&oracle),
                config.perception_model(),
                oracle_timeout,
            ),
            planner: Planner::new(oracle, config.default_model(), oracle_timeout)
                .with_sampling(config.oracle.max_tokens, config.oracle.temperature),
            executor: SandboxedExecutor::new(Arc::clone(&registry), capability_timeout),
            registry,
            strategy,
            store: None,
        }
    }

    /// Archive finished turns to `store`
    pub fn with_store(mut self, store: Arc<TurnStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    pub async fn run_turn(&self, input: &str) -> TurnReport {
        self.run_turn_with_cancel(input, CancellationToken::new())
            .await
    }

    /// Run a turn, checking `cancel` between attempts
    pub async fn run_turn_with_cancel(&self, input: &str, cancel: CancellationToken) -> TurnReport {
        let mut session = Session::new(input);
        info!(session = %session.id(), "[loop] turn started: {}", preview(input, 80));

        let outcome = if self.registry.is_empty() {
            TurnOutcome::Failed("no capabilities registered".to_string())
        } else {
            self.drive(&mut session, &cancel).await
        };

        self.finish(session, outcome).await
    }

    async fn drive(&self, session: &mut Session, cancel: &CancellationToken) -> TurnOutcome {
        loop {
            if cancel.is_cancelled() {
                info!(session = %session.id(), "[loop] cancelled");
                return TurnOutcome::Failed("turn cancelled".to_string());
            }
            if session.steps() >= self.strategy.max_steps {
                warn!(
                    session = %session.id(),
                    steps = session.steps(),
                    "[loop] step budget exhausted"
                );
                return TurnOutcome::BudgetExhausted;
            }

            match self.attempt(session).await {
                Ok(Progress::Answer(answer)) => {
                    session.consume_step();
                    session.record(MemoryRecord::output(answer.clone()));
                    return TurnOutcome::Answer(answer);
                }
                Ok(Progress::Continue(payload)) => {
                    session.consume_step();
                    session.record(MemoryRecord::output(decode(&payload)));
                    session.transition(LoopState::Continuing);
                    let next = forward_result(session.original_input(), &payload);
                    session.rewrite_input(next);
                    info!(
                        session = %session.id(),
                        step = session.steps(),
                        lifelines = session.lifelines_used(),
                        "[loop] continuing"
                    );
                }
                Err(fault) => {
                    session.consume_lifeline();
                    session.record(MemoryRecord::output(format!("fault: {}", fault)));
                    warn!(
                        session = %session.id(),
                        step = session.steps(),
                        lifelines = session.lifelines_used(),
                        kind = fault.kind(),
                        "[loop] fault: {}",
                        fault
                    );
                    if session.lifelines_used() > self.strategy.max_lifelines {
                        return TurnOutcome::Failed(fault.to_string());
                    }
                    let next = forward_fault(session.original_input(), &fault);
                    session.rewrite_input(next);
                }
            }
        }
    }

    async fn attempt(&self, session: &mut Session) -> Result<Progress, Fault> {
        let memory = session
            .ledger()
            .recent(self.strategy.memory_window)
            .to_vec();
        let input = session.working_input().to_string();
        session.record(MemoryRecord::input(input.clone()));

        session.transition(LoopState::Perceiving);
        let cached = if should_perceive(session) {
            None
        } else {
            session.cached_judgment().cloned()
        };
        let judgment = match cached {
            Some(judgment) => {
                debug!("[perception] reusing cached judgment");
                judgment
            }
            None => {
                let judgment = Arc::new(
                    self.perception
                        .perceive(session.original_input(), &self.registry, &memory)
                        .await?,
                );
                session.cache_judgment(Arc::clone(&judgment));
                judgment
            }
        };

        session.transition(LoopState::Planning);
        let plan = match self
            .planner
            .plan(&input, &judgment, &self.registry, &memory)
            .await?
        {
            PlannerOutput::DirectAnswer(answer) => {
                info!(session = %session.id(), "[plan] direct answer");
                return Ok(Progress::Answer(answer));
            }
            PlannerOutput::Plan(plan) => plan,
        };
        info!(
            session = %session.id(),
            capability = %plan.invocation.capability,
            "[plan] invoke {}",
            plan.invocation.args
        );

        let invocation = &plan.invocation;
        if self.strategy.reject_duplicate_invocations
            && session.has_executed(&invocation.capability, &invocation.args)
        {
            return Err(Fault::DuplicateInvocation(invocation.capability.clone()));
        }

        session.transition(LoopState::Executing);
        let result = self.executor.run(&plan).await;
        if let Ok(ret) = &result {
            session.mark_executed(&ret.capability, &ret.args);
        }

        session.transition(LoopState::Classifying);
        match classify(result) {
            ExecutionOutcome::TerminalAnswer(answer) => Ok(Progress::Answer(answer)),
            ExecutionOutcome::ContinuationRequest(payload) => Ok(Progress::Continue(payload)),
            ExecutionOutcome::Fault(fault) => Err(fault),
        }
    }

    async fn finish(&self, mut session: Session, outcome: TurnOutcome) -> TurnReport {
        let final_state = match outcome {
            TurnOutcome::Failed(_) => LoopState::Faulted,
            _ => LoopState::Terminal,
        };
        session.transition(final_state);
        info!(
            session = %session.id(),
            outcome = outcome.label(),
            steps = session.steps(),
            lifelines = session.lifelines_used(),
            perception_calls = session.perception_calls(),
            "[loop] turn finished"
        );

        if let Some(store) = &self.store {
            let record = TurnRecord {
                session_id: session.id().to_string(),
                original_input: session.original_input().to_string(),
                outcome: outcome.label().to_string(),
                result: outcome.text().to_string(),
                steps: session.steps(),
                lifelines_used: session.lifelines_used(),
                perception_calls: session.perception_calls(),
                started_at: session.started_at(),
                finished_at: chrono::Local::now(),
                records: session.ledger().records().to_vec(),
            };
            if let Err(e) = store.save(&record).await {
                warn!("[loop] failed to archive turn {}: {}", session.id(), e);
            }
        }

        TurnReport {
            session_id: session.id().to_string(),
            outcome,
            steps: session.steps(),
            lifelines_used: session.lifelines_used(),
            perception_calls: session.perception_calls(),
            ledger: session.into_ledger(),
        }
    }
}

//! Reasoning loop core
//!
//! A turn runs perceive → plan → execute → classify passes against a
//! [`CapabilityRegistry`] until the oracle produces a terminal answer, the
//! step budget runs out, or recoverable faults exhaust the lifelines.

use thiserror::Error;

pub mod capability;
pub mod classifier;
pub mod controller;
pub mod forward;
pub mod perception;
pub mod planner;
pub mod prompt;
pub mod sandbox;
pub mod state;

pub use capability::{
    default_registry, Capability, CapabilityDescriptor, CapabilityError, CapabilityGroup,
    CapabilityOutput, CapabilityRegistry, ContentItem,
};
pub use classifier::{classify, ExecutionOutcome, CONTINUE_SENTINEL, TERMINAL_SENTINEL};
pub use controller::{LoopController, TurnOutcome, TurnReport};
pub use forward::decode;
pub use perception::{should_perceive, PerceptionJudgment, PerceptionSelector};
pub use planner::{Invocation, Plan, Planner, PlannerOutput, ReturnBody};
pub use sandbox::{ExecutionReturn, InvocationGate, RawReturn, SandboxedExecutor};
pub use state::{LoopState, Session};

/// Recoverable step faults
///
/// Each one costs a lifeline and is fed back to the oracle as context. A
/// fault only ends the turn once the lifelines are gone.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Fault {
    #[error("malformed plan: {0}")]
    MalformedPlan(String),

    #[error("capability '{0}' not found")]
    CapabilityNotFound(String),

    #[error("invalid arguments for '{capability}': {reason}")]
    CapabilityInvalidArgs { capability: String, reason: String },

    #[error("capability '{capability}' failed: {reason}")]
    CapabilityProviderError { capability: String, reason: String },

    #[error("capability '{capability}' timed out after {secs}s")]
    CapabilityTimeout { capability: String, secs: u64 },

    #[error("sandbox fault: {0}")]
    SandboxFault(String),

    #[error("oracle timed out after {0}s")]
    OracleTimeout(u64),

    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("capability '{0}' was already invoked with the same arguments")]
    DuplicateInvocation(String),
}

impl Fault {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Fault::MalformedPlan(_) => "malformed_plan",
            Fault::CapabilityNotFound(_) => "capability_not_found",
            Fault::CapabilityInvalidArgs { .. } => "capability_invalid_args",
            Fault::CapabilityProviderError { .. } => "capability_provider_error",
            Fault::CapabilityTimeout { .. } => "capability_timeout",
            Fault::SandboxFault(_) => "sandbox_fault",
            Fault::OracleTimeout(_) => "oracle_timeout",
            Fault::OracleUnavailable(_) => "oracle_unavailable",
            Fault::DuplicateInvocation(_) => "duplicate_invocation",
        }
    }
}

pub type Result<T> = std::result::Result<T, Fault>;

//! Sandboxed plan execution
//!
//! A plan can reach the outside world only through an [`InvocationGate`],
//! which forwards a single call to the registry. The call runs on its own
//! task so that a hung provider is abandoned at the timeout and a panicking
//! one is caught instead of unwinding into the controller.

use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::info;

use crate::capability::{CapabilityOutput, CapabilityRegistry};
use crate::planner::{Plan, ReturnBody};
use crate::Fault;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{result((?:\.[A-Za-z0-9_]+)*)\}").unwrap())
}

/// Value handed back by a plan
#[derive(Debug, Clone, PartialEq)]
pub enum RawReturn {
    Text(String),
    Structured(Value),
}

/// Everything the classifier needs about one executed plan
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReturn {
    pub value: RawReturn,
    pub capability: String,
    pub args: Value,
    pub output: CapabilityOutput,
}

/// The only primitive a plan may use; admits exactly one call
pub struct InvocationGate {
    registry: Arc<CapabilityRegistry>,
    timeout: Duration,
    used: bool,
}

impl InvocationGate {
    pub fn new(registry: Arc<CapabilityRegistry>, timeout: Duration) -> Self {
        Self {
            registry,
            timeout,
            used: false,
        }
    }

    pub async fn call(&mut self, capability: &str, args: Value) -> Result<CapabilityOutput, Fault> {
        if self.used {
            return Err(Fault::SandboxFault(
                "plan attempted a second capability invocation".to_string(),
            ));
        }
        self.used = true;

        let target = self
            .registry
            .resolve(capability, &args)
            .map_err(|e| e.into_fault(capability))?;

        let started = Instant::now();
        let mut handle = tokio::spawn(async move { target.invoke(args).await });

        let result = match tokio::time::timeout(self.timeout, &mut handle).await {
            Err(_) => {
                // straggler responses are dropped with the task
                handle.abort();
                Err(Fault::CapabilityTimeout {
                    capability: capability.to_string(),
                    secs: self.timeout.as_secs(),
                })
            }
            Ok(Err(join_error)) if join_error.is_panic() => Err(Fault::SandboxFault(format!(
                "capability '{}' panicked",
                capability
            ))),
            Ok(Err(join_error)) => Err(Fault::SandboxFault(format!(
                "capability '{}' was cancelled: {}",
                capability, join_error
            ))),
            Ok(Ok(Err(e))) => Err(e.into_fault(capability)),
            Ok(Ok(Ok(output))) => Ok(output),
        };

        let outcome = if result.is_ok() { "ok" } else { "fault" };
        info!(
            capability,
            outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "[action] capability call"
        );
        result
    }

    pub fn used(&self) -> bool {
        self.used
    }
}

/// Runs plans against the registry
pub struct SandboxedExecutor {
    registry: Arc<CapabilityRegistry>,
    capability_timeout: Duration,
}

impl SandboxedExecutor {
    pub fn new(registry: Arc<CapabilityRegistry>, capability_timeout: Duration) -> Self {
        Self {
            registry,
            capability_timeout,
        }
    }

    pub async fn run(&self, plan: &Plan) -> Result<ExecutionReturn, Fault> {
        let mut gate = InvocationGate::new(Arc::clone(&self.registry), self.capability_timeout);
        let invocation = &plan.invocation;
        let output = gate
            .call(&invocation.capability, invocation.args.clone())
            .await?;

        let value = match &plan.body {
            ReturnBody::Template(template) => RawReturn::Text(render_template(template, &output)?),
            ReturnBody::Structured(value) => RawReturn::Structured(render_value(value, &output)?),
        };

        Ok(ExecutionReturn {
            value,
            capability: invocation.capability.clone(),
            args: invocation.args.clone(),
            output,
        })
    }
}

/// Substitute `{result}` and `{result.a.0}` placeholders
pub fn render_template(template: &str, output: &CapabilityOutput) -> Result<String, Fault> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder_re().captures_iter(template) {
        let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(&resolve_placeholder(path.as_str(), output)?);
        last = whole.end();
    }

    rendered.push_str(&template[last..]);
    Ok(rendered)
}

fn render_value(value: &Value, output: &CapabilityOutput) -> Result<Value, Fault> {
    Ok(match value {
        Value::String(template) => Value::String(render_template(template, output)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| render_value(item, output))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), render_value(v, output)?)))
                .collect::<Result<_, Fault>>()?,
        ),
        other => other.clone(),
    })
}

fn resolve_placeholder(path: &str, output: &CapabilityOutput) -> Result<String, Fault> {
    if path.is_empty() {
        return Ok(output.text());
    }

    let missing = || Fault::SandboxFault(format!("result{} not found in capability output", path));
    let root = output.structured().ok_or_else(missing)?;

    let mut current = &root;
    for segment in path.trim_start_matches('.').split('.') {
        current = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
        .ok_or_else(missing)?;
    }

    Ok(match current {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

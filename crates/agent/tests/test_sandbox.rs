//! Tests for sandboxed plan execution

mod common;

use common::{test_registry, PanickingCapability, SlowCapability, StaticCapability};
use cortex_agent::sandbox::render_template;
use cortex_agent::{
    CapabilityOutput, CapabilityRegistry, Fault, Invocation, InvocationGate, Plan, RawReturn,
    ReturnBody, SandboxedExecutor,
};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn template_plan(capability: &str, args: Value, template: &str) -> Plan {
    Plan {
        invocation: Invocation {
            capability: capability.to_string(),
            args,
        },
        body: ReturnBody::Template(template.to_string()),
    }
}

fn executor(registry: CapabilityRegistry) -> SandboxedExecutor {
    SandboxedExecutor::new(Arc::new(registry), Duration::from_secs(5))
}

#[tokio::test]
async fn test_run_renders_result_placeholder() {
    let (registry, _) = test_registry("unused");
    let plan = template_plan("add", json!({"a": 2, "b": 2}), "FINAL_ANSWER: {result}");

    let ret = executor(registry).run(&plan).await.unwrap();
    assert_eq!(ret.value, RawReturn::Text("FINAL_ANSWER: 4".to_string()));
    assert_eq!(ret.capability, "add");
    assert_eq!(ret.args, json!({"a": 2, "b": 2}));
    assert_eq!(ret.output.text(), "4");
}

#[tokio::test]
async fn test_run_renders_field_path() {
    let (registry, _) = test_registry("unused");
    let plan = template_plan(
        "strings_to_chars_to_int",
        json!({"string": "IN"}),
        "FURTHER_PROCESSING_REQUIRED: first={result.result.0} all={result.result}",
    );

    let ret = executor(registry).run(&plan).await.unwrap();
    assert_eq!(
        ret.value,
        RawReturn::Text("FURTHER_PROCESSING_REQUIRED: first=73 all=[73,78]".to_string())
    );
}

#[tokio::test]
async fn test_run_renders_structured_body() {
    let (registry, _) = test_registry("Paris is the capital");
    let plan = Plan {
        invocation: Invocation {
            capability: "search".to_string(),
            args: json!({"query": "capital of France"}),
        },
        body: ReturnBody::Structured(json!({
            "result": "FURTHER_PROCESSING_REQUIRED: {result}",
            "count": 1
        })),
    };

    let ret = executor(registry).run(&plan).await.unwrap();
    assert_eq!(
        ret.value,
        RawReturn::Structured(json!({
            "result": "FURTHER_PROCESSING_REQUIRED: Paris is the capital",
            "count": 1
        }))
    );
}

#[tokio::test]
async fn test_missing_field_path_is_sandbox_fault() {
    let (registry, _) = test_registry("plain text");
    let plan = template_plan("search", json!({"query": "x"}), "{result.items.0}");

    match executor(registry).run(&plan).await {
        Err(Fault::SandboxFault(reason)) => assert!(reason.contains("result.items.0")),
        other => panic!("Expected SandboxFault, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_capability() {
    let (registry, _) = test_registry("unused");
    let plan = template_plan("teleport", json!({}), "{result}");

    assert_eq!(
        executor(registry).run(&plan).await,
        Err(Fault::CapabilityNotFound("teleport".to_string()))
    );
}

#[tokio::test]
async fn test_invalid_args_never_reach_the_capability() {
    let (registry, calls) = test_registry("unused");
    let plan = template_plan("search", json!({"q": "wrong key"}), "{result}");

    let result = executor(registry).run(&plan).await;
    assert!(matches!(result, Err(Fault::CapabilityInvalidArgs { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_provider_error_maps_to_fault() {
    let (registry, _) = test_registry("unused");
    let plan = template_plan("divide", json!({"a": 1, "b": 0}), "{result}");

    match executor(registry).run(&plan).await {
        Err(Fault::CapabilityProviderError { capability, reason }) => {
            assert_eq!(capability, "divide");
            assert!(reason.contains("division by zero"));
        }
        other => panic!("Expected provider error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_capability_times_out() {
    let mut registry = CapabilityRegistry::new();
    registry.register(SlowCapability(Duration::from_secs(30)));
    let executor = SandboxedExecutor::new(Arc::new(registry), Duration::from_millis(50));

    let started = std::time::Instant::now();
    let result = executor
        .run(&template_plan("slow", json!({}), "{result}"))
        .await;

    assert!(matches!(result, Err(Fault::CapabilityTimeout { ref capability, .. }) if capability == "slow"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_panicking_capability_is_contained() {
    let mut registry = CapabilityRegistry::new();
    registry.register(PanickingCapability);

    match executor(registry)
        .run(&template_plan("explode", json!({}), "{result}"))
        .await
    {
        Err(Fault::SandboxFault(reason)) => assert!(reason.contains("panicked")),
        other => panic!("Expected SandboxFault, got {:?}", other),
    }
}

#[tokio::test]
async fn test_gate_admits_one_call() {
    let (registry, calls) = test_registry("hit");
    let mut gate = InvocationGate::new(Arc::new(registry), Duration::from_secs(5));
    assert!(!gate.used());

    let first = gate.call("search", json!({"query": "a"})).await;
    assert_eq!(first.unwrap().text(), "hit");
    assert!(gate.used());

    let second = gate.call("search", json!({"query": "b"})).await;
    assert!(matches!(second, Err(Fault::SandboxFault(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_gate_is_spent_even_when_the_call_fails() {
    let (registry, _) = test_registry("hit");
    let mut gate = InvocationGate::new(Arc::new(registry), Duration::from_secs(5));

    assert!(gate.call("missing", json!({})).await.is_err());
    assert!(matches!(
        gate.call("search", json!({"query": "a"})).await,
        Err(Fault::SandboxFault(_))
    ));
}

#[test]
fn test_render_template_variants() {
    let text = CapabilityOutput::from_text("42");
    assert_eq!(render_template("no placeholders", &text).unwrap(), "no placeholders");
    assert_eq!(render_template("{result} and {result}", &text).unwrap(), "42 and 42");
    assert_eq!(render_template("{other} stays", &text).unwrap(), "{other} stays");

    let structured = CapabilityOutput::from_json(json!({"items": [{"name": "a"}, {"name": "b"}]}));
    assert_eq!(render_template("{result.items.1.name}", &structured).unwrap(), "b");
    assert!(render_template("{result.items.5}", &structured).is_err());

    // text that parses as JSON is addressable too
    let serialized = CapabilityOutput::from_text(r#"{"city": "Paris"}"#);
    assert_eq!(render_template("{result.city}", &serialized).unwrap(), "Paris");
}

#[tokio::test]
async fn test_json_capability_output() {
    let mut registry = CapabilityRegistry::new();
    registry.register(StaticCapability::json(
        "lookup",
        "data",
        json!({"result": "FINAL_ANSWER: done"}),
    ));
    let plan = template_plan("lookup", json!({"query": "x"}), "{result.result}");

    let ret = executor(registry).run(&plan).await.unwrap();
    assert_eq!(ret.value, RawReturn::Text("FINAL_ANSWER: done".to_string()));
}

//! Tests for plan parsing and validation

use cortex_agent::planner::parse_plan;
use cortex_agent::{Fault, Invocation, PlannerOutput, ReturnBody};
use serde_json::json;

fn expect_plan(text: &str) -> cortex_agent::Plan {
    match parse_plan(text) {
        Ok(PlannerOutput::Plan(plan)) => plan,
        other => panic!("Expected plan, got {:?}", other),
    }
}

fn expect_malformed(text: &str) -> String {
    match parse_plan(text) {
        Err(Fault::MalformedPlan(reason)) => reason,
        other => panic!("Expected MalformedPlan, got {:?}", other),
    }
}

#[test]
fn test_single_invocation_plan() {
    let plan = expect_plan(
        r#"{"invoke": {"capability": "add", "args": {"a": 2, "b": 2}}, "return": "FINAL_ANSWER: {result}"}"#,
    );
    assert_eq!(
        plan.invocation,
        Invocation {
            capability: "add".to_string(),
            args: json!({"a": 2, "b": 2})
        }
    );
    assert_eq!(
        plan.body,
        ReturnBody::Template("FINAL_ANSWER: {result}".to_string())
    );
}

#[test]
fn test_fenced_plan_with_prose() {
    let text = "Here is my plan:\n```json\n{\"invoke\": {\"capability\": \"search\", \"args\": {\"query\": \"x\"}}, \"return\": \"{result}\"}\n```";
    let plan = expect_plan(text);
    assert_eq!(plan.invocation.capability, "search");
}

#[test]
fn test_single_element_list_is_accepted() {
    let plan = expect_plan(
        r#"{"invoke": [{"capability": "sqrt", "args": {"a": 9}}], "return": "FINAL_ANSWER: {result}"}"#,
    );
    assert_eq!(plan.invocation.capability, "sqrt");
}

#[test]
fn test_structured_body() {
    let plan = expect_plan(
        r#"{"invoke": {"capability": "search", "args": {"query": "q"}}, "return": {"result": "FURTHER_PROCESSING_REQUIRED: {result}"}}"#,
    );
    assert_eq!(
        plan.body,
        ReturnBody::Structured(json!({"result": "FURTHER_PROCESSING_REQUIRED: {result}"}))
    );
}

#[test]
fn test_missing_args_default_to_empty_object() {
    let plan = expect_plan(r#"{"invoke": {"capability": "ping"}, "return": "{result}"}"#);
    assert_eq!(plan.invocation.args, json!({}));
}

#[test]
fn test_two_invocations_rejected() {
    let reason = expect_malformed(
        r#"{"invoke": [{"capability": "add", "args": {}}, {"capability": "multiply", "args": {}}], "return": "{result}"}"#,
    );
    assert!(reason.contains("2 capabilities"));
}

#[test]
fn test_zero_invocations_rejected() {
    expect_malformed(r#"{"invoke": [], "return": "{result}"}"#);
    expect_malformed(r#"{"invoke": null, "return": "{result}"}"#);
}

#[test]
fn test_missing_body_rejected() {
    let reason = expect_malformed(r#"{"invoke": {"capability": "add", "args": {}}}"#);
    assert!(reason.contains("no return body"));
    expect_malformed(r#"{"invoke": {"capability": "add", "args": {}}, "return": "   "}"#);
    expect_malformed(r#"{"invoke": {"capability": "add", "args": {}}, "return": {}}"#);
    expect_malformed(r#"{"invoke": {"capability": "add", "args": {}}, "return": 4}"#);
}

#[test]
fn test_invocation_without_capability_rejected() {
    expect_malformed(r#"{"invoke": {"args": {"a": 1}}, "return": "{result}"}"#);
    expect_malformed(r#"{"invoke": "add", "return": "{result}"}"#);
}

#[test]
fn test_no_plan_object_rejected() {
    expect_malformed("I think we should add the numbers.");
    expect_malformed(r#"{"thoughts": "no invoke key"}"#);
}

#[test]
fn test_direct_answer() {
    assert_eq!(
        parse_plan("FINAL_ANSWER: Paris").unwrap(),
        PlannerOutput::DirectAnswer("Paris".to_string())
    );
    assert_eq!(
        parse_plan("```\nFINAL_ANSWER: 4\n```").unwrap(),
        PlannerOutput::DirectAnswer("4".to_string())
    );
}

#[test]
fn test_direct_answer_may_contain_json() {
    assert_eq!(
        parse_plan(r#"FINAL_ANSWER: {"codes": [73, 78]}"#).unwrap(),
        PlannerOutput::DirectAnswer(r#"{"codes": [73, 78]}"#.to_string())
    );
}

#[test]
fn test_empty_direct_answer_rejected() {
    expect_malformed("FINAL_ANSWER:");
}

//! Tests for fincrew-agent: role binding, step decoding, throttle, and the role loop

use fincrew_agent::*;
use fincrew_llm::{AccumulatedToolCall, ContentBlock, LlmContent, MockBehavior, ScriptedProvider};
use fincrew_tools::{Tool, ToolRegistry, ToolResult};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct EchoTool;

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str { "echo" }
    fn description(&self) -> &str { "echoes input" }
    async fn invoke(&self, input: &str) -> ToolResult {
        ToolResult::text(format!("echo:{}", input))
    }
}

struct PanickingTool;

#[async_trait::async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str { "explode" }
    fn description(&self) -> &str { "always panics" }
    async fn invoke(&self, _input: &str) -> ToolResult {
        panic!("tool blew up")
    }
}

fn catalog() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    registry.register(PanickingTool);
    registry
}

fn vars(query: &str) -> TemplateVars {
    let mut v = TemplateVars::new();
    v.insert("query".into(), query.into());
    v
}

fn analyst(max_iterations: usize) -> BoundRole {
    RoleSpec::new(
        "analyst",
        Persona::new("Financial Analyst", "Answer: {query}", "You never fabricate numbers."),
    )
    .with_capabilities(&["echo", "explode"])
    .with_limits(max_iterations, 0)
    .bind(&catalog(), &vars("what is revenue"))
    .unwrap()
}

fn runtime(provider: Arc<ScriptedProvider>) -> RoleRuntime {
    RoleRuntime::new(provider, RuntimeConfig::default())
}

fn call(name: &str, arguments: &str) -> AccumulatedToolCall {
    AccumulatedToolCall { id: "call_1".into(), name: name.into(), arguments: arguments.into() }
}

// ===========================================================================
// Templates / binding
// ===========================================================================

#[test]
fn render_template_replaces_known_vars_only() {
    let out = render_template("Q: {query} / {missing}", &vars("revenue?"));
    assert_eq!(out, "Q: revenue? / {missing}");
}

#[test]
fn bind_renders_persona_and_scopes_tools() {
    let role = analyst(5);
    assert_eq!(role.persona.goal, "Answer: what is revenue");
    assert_eq!(role.tools.list(), vec!["echo", "explode"]);
}

#[test]
fn bind_rejects_unknown_capability() {
    let spec = RoleSpec::new("verifier", Persona::new("V", "g", "b")).with_capabilities(&["ghost"]);
    let err = spec.bind(&catalog(), &TemplateVars::new()).unwrap_err();
    assert!(matches!(err, RoleError::UnknownCapability { ref missing, .. } if missing == &vec!["ghost".to_string()]));
}

#[test]
fn bind_rejects_delegation() {
    let mut spec = RoleSpec::new("advisor", Persona::new("A", "g", "b"));
    spec.allow_delegation = true;
    assert!(matches!(
        spec.bind(&catalog(), &TemplateVars::new()),
        Err(RoleError::DelegationUnsupported { .. })
    ));
}

#[test]
fn separate_binds_do_not_share_tools() {
    let spec = RoleSpec::new("r", Persona::new("R", "g", "b")).with_capabilities(&["echo"]);
    let mut other = ToolRegistry::new();
    other.register(EchoTool);
    let a = spec.bind(&catalog(), &TemplateVars::new()).unwrap();
    let b = spec.bind(&other, &TemplateVars::new()).unwrap();
    assert!(!Arc::ptr_eq(&a.tools, &b.tools));
    assert!(!Arc::ptr_eq(&a.throttle, &b.throttle));
}

// ===========================================================================
// decode_step
// ===========================================================================

#[test]
fn decode_native_call_coerces_input() {
    let tools = catalog();
    match decode_step("", &[call("echo", r#"{"query": "Total Revenue"}"#)], &tools) {
        Decision::ToolCall { id, name, input, .. } => {
            assert_eq!(id.as_deref(), Some("call_1"));
            assert_eq!(name, "echo");
            assert_eq!(input, "Total Revenue");
        }
        other => panic!("Expected ToolCall, got {:?}", other),
    }
}

#[test]
fn decode_native_unknown_tool_and_bad_json() {
    let tools = catalog();
    match decode_step("", &[call("ghost", "{}")], &tools) {
        Decision::ParseFailure(reason) => assert!(reason.contains("echo, explode")),
        other => panic!("Expected ParseFailure, got {:?}", other),
    }
    assert!(matches!(
        decode_step("", &[call("echo", "{not json")], &tools),
        Decision::ParseFailure(r) if r.contains("not valid JSON")
    ));
}

#[test]
fn decode_text_action_protocol() {
    let text = "Thought: I should look it up\nAction: echo\nAction Input: \"net income\"\nObservation: pending";
    match decode_step(text, &[], &catalog()) {
        Decision::ToolCall { id, name, input, .. } => {
            assert!(id.is_none());
            assert_eq!(name, "echo");
            assert_eq!(input, "net income");
        }
        other => panic!("Expected ToolCall, got {:?}", other),
    }
}

#[test]
fn decode_text_action_with_json_dict_input() {
    let text = "Action: `echo`\nAction Input: {\"query\": \"company name\"}";
    match decode_step(text, &[], &catalog()) {
        Decision::ToolCall { input, arguments, .. } => {
            assert_eq!(input, "company name");
            assert_eq!(arguments, json!({"query": "company name"}));
        }
        other => panic!("Expected ToolCall, got {:?}", other),
    }
}

#[test]
fn decode_action_without_input_is_failure() {
    assert!(matches!(
        decode_step("Action: echo", &[], &catalog()),
        Decision::ParseFailure(r) if r.contains("Action Input")
    ));
}

#[test]
fn decode_final_answer_and_plain_text() {
    let tools = catalog();
    assert_eq!(
        decode_step("Thought: done\nFinal Answer: Revenue: $10M", &[], &tools),
        Decision::Answer("Revenue: $10M".into())
    );
    assert_eq!(decode_step("  just an answer  ", &[], &tools), Decision::Answer("just an answer".into()));
    assert!(matches!(decode_step("   ", &[], &tools), Decision::ParseFailure(_)));
    assert!(matches!(decode_step("Final Answer:   ", &[], &tools), Decision::ParseFailure(_)));
}

// ===========================================================================
// CallThrottle
// ===========================================================================

#[tokio::test]
async fn throttle_delays_instead_of_failing() {
    let throttle = CallThrottle::new(2, Duration::from_millis(150));
    let start = Instant::now();
    throttle.acquire().await;
    throttle.acquire().await;
    assert!(start.elapsed() < Duration::from_millis(100));
    throttle.acquire().await;
    assert!(start.elapsed() >= Duration::from_millis(140));
    assert!(throttle.in_window().await <= 2);
}

#[tokio::test]
async fn zero_limit_is_unthrottled() {
    let throttle = CallThrottle::per_minute(0);
    for _ in 0..100 {
        throttle.acquire().await;
    }
    assert_eq!(throttle.in_window().await, 0);
}

// ===========================================================================
// RoleRuntime
// ===========================================================================

#[tokio::test]
async fn runtime_returns_final_answer() {
    let provider = Arc::new(ScriptedProvider::constant(MockBehavior::text("Final Answer: all done")));
    let outcome = runtime(provider.clone()).run(&analyst(5), "Analyze", "").await.unwrap();
    assert_eq!(outcome.text, "all done");
    assert_eq!(outcome.iterations, 1);
    assert!(!outcome.exhausted);
}

#[tokio::test]
async fn runtime_sends_persona_and_context() {
    let provider = Arc::new(ScriptedProvider::constant(MockBehavior::text("Final Answer: ok")));
    let role = analyst(5);
    runtime(provider.clone()).run(&role, "Summarize risks", "[verification]\nACME Corp").await.unwrap();

    let requests = provider.requests().await;
    let system = requests[0].system.clone().unwrap();
    assert!(system.starts_with(&role.persona.preamble()));
    assert!(system.contains("- echo: echoes input"));
    let user = requests[0].messages[0].text();
    assert!(user.starts_with("Summarize risks"));
    assert!(user.contains("[verification]\nACME Corp"));
    assert_eq!(requests[0].tools.as_ref().map(|t| t.len()), Some(2));
}

#[tokio::test]
async fn runtime_feeds_native_tool_result_back() {
    let provider = Arc::new(ScriptedProvider::sequence(vec![
        MockBehavior::tool("echo", "hi"),
        MockBehavior::text("Final Answer: got it"),
    ]));
    let outcome = runtime(provider.clone()).run(&analyst(5), "Go", "").await.unwrap();
    assert_eq!(outcome.text, "got it");
    assert_eq!(outcome.tool_calls, 1);
    assert_eq!(outcome.iterations, 2);

    let second = &provider.requests().await[1];
    let last = second.messages.last().unwrap();
    match &last.content {
        LlmContent::Blocks(blocks) => match &blocks[0] {
            ContentBlock::ToolResult { content, is_error, .. } => {
                assert_eq!(content, "echo:hi");
                assert!(!is_error);
            }
            other => panic!("Expected ToolResult, got {:?}", other),
        },
        other => panic!("Expected blocks, got {:?}", other),
    }
}

#[tokio::test]
async fn runtime_survives_panicking_tool() {
    let provider = Arc::new(ScriptedProvider::sequence(vec![
        MockBehavior::tool("explode", "x"),
        MockBehavior::text("Final Answer: recovered"),
    ]));
    let outcome = runtime(provider.clone()).run(&analyst(5), "Go", "").await.unwrap();
    assert_eq!(outcome.text, "recovered");

    let second = &provider.requests().await[1];
    match &second.messages.last().unwrap().content {
        LlmContent::Blocks(blocks) => match &blocks[0] {
            ContentBlock::ToolResult { content, is_error, .. } => {
                assert!(content.starts_with("Error: "));
                assert!(content.contains("tool blew up"));
                assert!(*is_error);
            }
            other => panic!("Expected ToolResult, got {:?}", other),
        },
        other => panic!("Expected blocks, got {:?}", other),
    }
}

#[tokio::test]
async fn runtime_text_protocol_observation() {
    let provider = Arc::new(ScriptedProvider::sequence(vec![
        MockBehavior::text("Thought: check\nAction: echo\nAction Input: abc"),
        MockBehavior::text("Final Answer: ok"),
    ]));
    runtime(provider.clone()).run(&analyst(5), "Go", "").await.unwrap();
    let second = &provider.requests().await[1];
    assert_eq!(second.messages.last().unwrap().text(), "Observation: echo:abc");
}

#[tokio::test]
async fn runtime_recovers_from_parse_failure() {
    let provider = Arc::new(ScriptedProvider::sequence(vec![
        MockBehavior::MalformedToolCall { name: "echo".into(), arguments: "{oops".into() },
        MockBehavior::text("Final Answer: fine"),
    ]));
    let outcome = runtime(provider.clone()).run(&analyst(5), "Go", "").await.unwrap();
    assert_eq!(outcome.text, "fine");
    assert_eq!(outcome.tool_calls, 0);
    let second = &provider.requests().await[1];
    assert!(second.messages.last().unwrap().text().contains("not valid JSON"));
}

#[tokio::test]
async fn runtime_iteration_limit_returns_partial() {
    let provider = Arc::new(ScriptedProvider::constant(MockBehavior::text(
        "Thought: still digging\nAction: echo\nAction Input: more",
    )));
    let outcome = runtime(provider.clone()).run(&analyst(3), "Go", "").await.unwrap();
    assert!(outcome.exhausted);
    assert_eq!(outcome.text, "still digging");
    assert_eq!(outcome.iterations, 3);
    assert_eq!(provider.call_count().await, 3);

    let requests = provider.requests().await;
    assert!(requests[2].tools.is_none());
    assert!(requests[2].messages.last().unwrap().text().contains("last step"));
}

#[tokio::test]
async fn runtime_tool_only_role_falls_back_to_last_observation() {
    let provider = Arc::new(ScriptedProvider::sequence(vec![
        MockBehavior::tool("echo", "first"),
        MockBehavior::tool("echo", "second"),
        MockBehavior::tool("explode", "x"),
    ]));
    let outcome = runtime(provider).run(&analyst(3), "Go", "").await.unwrap();
    assert!(outcome.exhausted);
    assert_eq!(outcome.text, "echo:second");
    assert_eq!(outcome.tool_calls, 3);
}

#[tokio::test]
async fn runtime_without_any_text_is_no_answer() {
    let provider = Arc::new(ScriptedProvider::constant(MockBehavior::Empty));
    let err = runtime(provider).run(&analyst(2), "Go", "").await.unwrap_err();
    assert!(matches!(err, RoleError::NoAnswer { iterations: 2, .. }));
}

#[tokio::test]
async fn runtime_only_failed_tools_is_no_answer() {
    let provider = Arc::new(ScriptedProvider::constant(MockBehavior::tool("explode", "x")));
    let err = runtime(provider).run(&analyst(2), "Go", "").await.unwrap_err();
    assert!(matches!(err, RoleError::NoAnswer { .. }));
}

#[tokio::test]
async fn runtime_clips_long_observation_counting_chars() {
    let long = "\u{20ac}".repeat(50_000);
    let provider = Arc::new(ScriptedProvider::sequence(vec![
        MockBehavior::tool("echo", long),
        MockBehavior::text("Final Answer: done"),
    ]));
    runtime(provider.clone()).run(&analyst(5), "Go", "").await.unwrap();

    let second = &provider.requests().await[1];
    match &second.messages.last().unwrap().content {
        LlmContent::Blocks(blocks) => match &blocks[0] {
            ContentBlock::ToolResult { content, .. } => {
                assert!(content.ends_with("[truncated, 50005 total chars]"));
                assert!(content.starts_with("echo:\u{20ac}"));
            }
            other => panic!("Expected ToolResult, got {:?}", other),
        },
        other => panic!("Expected blocks, got {:?}", other),
    }
}

#[tokio::test]
async fn runtime_engine_failure_propagates() {
    let provider = Arc::new(ScriptedProvider::constant(MockBehavior::Error("engine down".into())));
    let err = runtime(provider).run(&analyst(5), "Go", "").await.unwrap_err();
    assert!(matches!(err, RoleError::Engine(_)));
    assert!(err.to_string().contains("engine down"));
}

#[tokio::test]
async fn runtime_throttles_tool_calls() {
    let provider = Arc::new(ScriptedProvider::sequence(vec![
        MockBehavior::tool("echo", "1"),
        MockBehavior::tool("echo", "2"),
        MockBehavior::text("Final Answer: throttled but done"),
    ]));
    let mut role = analyst(5);
    role.throttle = Arc::new(CallThrottle::new(1, Duration::from_millis(120)));

    let start = Instant::now();
    let outcome = runtime(provider).run(&role, "Go", "").await.unwrap();
    assert_eq!(outcome.tool_calls, 2);
    assert!(start.elapsed() >= Duration::from_millis(100));
}

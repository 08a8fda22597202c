//! Capability registry and the Tool trait
//!
//! Every capability takes one string and returns one string. Failures are
//! values: a tool that errors or panics still hands the role a readable
//! `Error: ...` observation, never an `Err`.

use fincrew_llm::LlmTool;
use futures::FutureExt;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix carried by every failed capability observation.
pub const ERROR_MARKER: &str = "Error: ";

#[derive(Clone, Debug)]
pub enum ToolResult {
    Text(String),
    Json(Value),
    Error(String),
}

impl ToolResult {
    pub fn text(s: impl Into<String>) -> Self { Self::Text(s.into()) }
    pub fn error(s: impl Into<String>) -> Self { Self::Error(s.into()) }

    pub fn to_content_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Json(v) => serde_json::to_string_pretty(v).unwrap_or_default(),
            Self::Error(e) => format!("{}{}", ERROR_MARKER, e),
        }
    }

    pub fn is_error(&self) -> bool { matches!(self, Self::Error(_)) }
}

/// A named capability a role may call.
///
/// Implementations receive the already-coerced string input. The registry
/// handles lookup, argument coercion, and panic containment.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (e.g. "document_search").
    fn name(&self) -> &str;

    /// Human-readable description sent to the LLM.
    fn description(&self) -> &str;

    /// Usage note appended to the role's system prompt.
    fn prompt(&self) -> &str { "" }

    /// Name of the single string parameter.
    fn input_name(&self) -> &str { "query" }

    /// JSON Schema for the input: one required string property.
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                self.input_name(): {
                    "type": "string",
                    "description": "Plain text input"
                }
            },
            "required": [self.input_name()]
        })
    }

    fn is_enabled(&self) -> bool { true }

    async fn invoke(&self, input: &str) -> ToolResult;

    fn to_llm_tool(&self) -> LlmTool {
        LlmTool {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.input_schema(),
        }
    }
}

/// Ordered set of tools. Cloning shares the underlying tool instances.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self { Self { tools: Vec::new() } }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_shared(Arc::new(tool));
    }

    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Remove a tool by name.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.tools.len();
        self.tools.retain(|t| t.name() != name);
        self.tools.len() != before
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    /// Invoke a tool with a plain string input.
    pub async fn invoke(&self, name: &str, input: &str) -> ToolResult {
        let tool = match self.get(name) {
            Some(tool) if tool.is_enabled() => tool,
            Some(_) => return ToolResult::Error(format!("Tool '{}' is disabled", name)),
            None => return ToolResult::Error(format!("Tool not found: {}", name)),
        };

        debug!(tool = name, input_len = input.len(), "invoking tool");
        match AssertUnwindSafe(tool.invoke(input)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                warn!(tool = name, %reason, "tool panicked");
                ToolResult::Error(format!("tool '{}' crashed: {}", name, reason))
            }
        }
    }

    /// Invoke a tool with structured arguments as produced by a native tool call.
    pub async fn invoke_with_arguments(&self, name: &str, args: &Value) -> ToolResult {
        let input_name = self
            .get(name)
            .map(|t| t.input_name().to_string())
            .unwrap_or_else(|| "query".to_string());
        let input = coerce_input(args, &input_name);
        self.invoke(name, &input).await
    }

    /// Get LLM tool definitions for all enabled tools, in registration order.
    pub fn get_definitions(&self) -> Vec<LlmTool> {
        self.tools.iter()
            .filter(|t| t.is_enabled())
            .map(|t| t.to_llm_tool())
            .collect()
    }

    /// Get prompt fragments from all enabled tools.
    pub fn combined_prompts(&self) -> String {
        self.tools.iter()
            .filter(|t| t.is_enabled())
            .map(|t| t.prompt())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize { self.tools.len() }

    pub fn is_empty(&self) -> bool { self.tools.is_empty() }

    /// Merge another registry's tools into this one. Later names win.
    pub fn extend(&mut self, other: &ToolRegistry) {
        for tool in &other.tools {
            self.register_shared(Arc::clone(tool));
        }
    }

    /// Build a registry holding only the named tools, in the order given.
    /// Names missing from this registry are returned as the error.
    pub fn subset(&self, names: &[String]) -> Result<ToolRegistry, Vec<String>> {
        let mut out = ToolRegistry::new();
        let mut missing = Vec::new();
        for name in names {
            match self.get(name) {
                Some(tool) => out.register_shared(tool),
                None => missing.push(name.clone()),
            }
        }
        if missing.is_empty() { Ok(out) } else { Err(missing) }
    }
}

/// Reduce tool-call arguments to the single string a capability takes.
///
/// Models frequently wrap the input in an object, sometimes with the schema
/// echoed back (`{"query": {"description": "...", "type": "string"}}`).
pub fn coerce_input(args: &Value, input_name: &str) -> String {
    match args {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            let preferred = map
                .get(input_name)
                .or_else(|| map.get("query"))
                .or_else(|| map.get("input"));
            if let Some(v) = preferred {
                return coerce_input(v, input_name);
            }
            if let Some(Value::String(s)) = map.get("description") {
                return s.clone();
            }
            if map.len() == 1 {
                if let Some(v) = map.values().next() {
                    return coerce_input(v, input_name);
                }
            }
            args.to_string()
        }
        other => other.to_string(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

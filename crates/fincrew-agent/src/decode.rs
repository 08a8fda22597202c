//! Decoding one reasoning step into a typed decision
//!
//! Accepts both native tool calls and the plain-text protocol:
//!
//! ```text
//! Thought: ...
//! Action: document_search
//! Action Input: Total Revenue
//! ```
//!
//! or `Final Answer: ...` when the role is done.

use fincrew_llm::AccumulatedToolCall;
use fincrew_tools::{coerce_input, ToolRegistry};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

pub const FINAL_ANSWER: &str = "Final Answer:";

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Answer(String),
    ToolCall {
        /// Present for native tool calls; text-protocol calls have none.
        id: Option<String>,
        name: String,
        arguments: Value,
        input: String,
    },
    /// The step could not be understood. The reason is fed back to the role.
    ParseFailure(String),
}

fn action_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*Action\s*:\s*(.+?)\s*$").ok()).as_ref()
}

fn action_input_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*Action\s+Input\s*:\s*").ok()).as_ref()
}

/// Decide what one step of model output means.
pub fn decode_step(text: &str, tool_calls: &[AccumulatedToolCall], tools: &ToolRegistry) -> Decision {
    if let Some(call) = tool_calls.first() {
        if tool_calls.len() > 1 {
            debug!(count = tool_calls.len(), "multiple tool calls in one step, using the first");
        }
        return decode_native(call, tools);
    }

    let action = action_regex().and_then(|re| re.captures(text));
    let final_pos = text.find(FINAL_ANSWER);

    if let Some(caps) = action {
        let action_start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        if final_pos.map_or(true, |f| action_start < f) {
            let name = caps.get(1).map(|m| clean_name(m.as_str())).unwrap_or_default();
            let after = caps.get(0).map(|m| m.end()).unwrap_or(text.len());
            return decode_text_action(&name, &text[after..], tools);
        }
    }

    if let Some(pos) = final_pos {
        let answer = text[pos + FINAL_ANSWER.len()..].trim();
        if answer.is_empty() {
            return Decision::ParseFailure("'Final Answer:' was given with nothing after it.".into());
        }
        return Decision::Answer(answer.to_string());
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        Decision::ParseFailure("The response was empty.".into())
    } else {
        Decision::Answer(trimmed.to_string())
    }
}

/// Text that came before any action in a step, usually the role's thought.
pub fn thought_text(text: &str) -> Option<String> {
    let end = action_regex()
        .and_then(|re| re.find(text))
        .map(|m| m.start())
        .unwrap_or(text.len());
    let thought = text[..end].trim();
    let thought = thought.strip_prefix("Thought:").map(str::trim).unwrap_or(thought);
    (!thought.is_empty()).then(|| thought.to_string())
}

fn decode_native(call: &AccumulatedToolCall, tools: &ToolRegistry) -> Decision {
    let Some(tool) = tools.get(&call.name) else {
        return unknown_tool(&call.name, tools);
    };
    match call.parse_arguments() {
        Ok(arguments) => Decision::ToolCall {
            id: Some(call.id.clone()),
            name: call.name.clone(),
            input: coerce_input(&arguments, tool.input_name()),
            arguments,
        },
        Err(e) => Decision::ParseFailure(format!(
            "The arguments for tool '{}' were not valid JSON ({}). Pass a single plain text string.",
            call.name, e
        )),
    }
}

fn decode_text_action(name: &str, rest: &str, tools: &ToolRegistry) -> Decision {
    let Some(tool) = tools.get(name) else {
        return unknown_tool(name, tools);
    };
    let Some(m) = action_input_regex().and_then(|re| re.find(rest)) else {
        return Decision::ParseFailure(format!(
            "Action '{}' is missing its 'Action Input:' line.",
            name
        ));
    };

    let mut raw = &rest[m.end()..];
    if let Some(cut) = raw.find("\nObservation:") {
        raw = &raw[..cut];
    }
    let raw = strip_quotes(raw.trim());

    let arguments = match serde_json::from_str::<Value>(raw) {
        Ok(v @ Value::Object(_)) => v,
        _ => Value::String(raw.to_string()),
    };
    Decision::ToolCall {
        id: None,
        name: name.to_string(),
        input: coerce_input(&arguments, tool.input_name()),
        arguments,
    }
}

fn unknown_tool(name: &str, tools: &ToolRegistry) -> Decision {
    let available = tools.list();
    let available = if available.is_empty() { "none".to_string() } else { available.join(", ") };
    Decision::ParseFailure(format!(
        "'{}' is not one of your tools. Available tools: {}.",
        name, available
    ))
}

fn clean_name(raw: &str) -> String {
    raw.trim().trim_matches(|c| c == '`' || c == '"' || c == '\'' || c == '*').trim().to_string()
}

fn strip_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

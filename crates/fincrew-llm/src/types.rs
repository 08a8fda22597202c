//! Provider-neutral chat types shared by the role loop and engine adapters

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_MODEL: &str = "llama3.1:8b";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Who said a message. The system prompt travels separately on the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One completion request: persona, conversation so far, and the
/// capabilities the engine may call.
#[derive(Clone, Debug, Serialize)]
pub struct LlmRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<LlmMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<LlmTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            messages: Vec::new(),
            tools: None,
            temperature: None,
            max_tokens: Some(DEFAULT_MAX_TOKENS),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<LlmMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// An empty list means "no tools", not "an empty catalog".
    pub fn with_tools(mut self, tools: Vec<LlmTool>) -> Self {
        self.tools = (!tools.is_empty()).then_some(tools);
        self
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: ChatRole,
    pub content: LlmContent,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: LlmContent::Text(content.into()) }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: LlmContent::Text(content.into()) }
    }

    pub fn blocks(role: ChatRole, blocks: Vec<ContentBlock>) -> Self {
        Self { role, content: LlmContent::Blocks(blocks) }
    }

    /// Concatenated text of the message, ignoring tool blocks.
    pub fn text(&self) -> String {
        match &self.content {
            LlmContent::Text(s) => s.clone(),
            LlmContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Observations carried by this message, in order.
    pub fn tool_results(&self) -> Vec<&str> {
        match &self.content {
            LlmContent::Text(_) => Vec::new(),
            LlmContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolResult { content, .. } => Some(content.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// Plain text, or a list of blocks when tool traffic is involved.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LlmContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

/// A capability as the engine sees it: a function with JSON-schema parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmTool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug)]
pub enum StreamDelta {
    Text(String),
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, arguments: String },
    ToolCallEnd { id: String },
    Done { stop_reason: Option<String>, usage: Option<Usage> },
}

/// Token counts as reported by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Clone, Debug, Default)]
pub struct AccumulatedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl AccumulatedToolCall {
    /// Empty argument text parses as `{}`.
    pub fn parse_arguments(&self) -> Result<Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&self.arguments)
    }
}

/// One finished engine step: the text it wrote and the calls it made.
#[derive(Clone, Debug, Default)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<AccumulatedToolCall>,
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
}

impl Completion {
    /// Fold one delta in. Argument fragments attach to the open call with
    /// the same id; fragments for unknown ids are dropped.
    pub fn push(&mut self, delta: StreamDelta, open: &mut Vec<AccumulatedToolCall>) {
        match delta {
            StreamDelta::Text(t) => self.text.push_str(&t),
            StreamDelta::ToolCallStart { id, name } => {
                open.push(AccumulatedToolCall { id, name, arguments: String::new() });
            }
            StreamDelta::ToolCallDelta { id, arguments } => {
                if let Some(call) = open.iter_mut().find(|c| c.id == id) {
                    call.arguments.push_str(&arguments);
                }
            }
            StreamDelta::ToolCallEnd { id } => {
                if let Some(pos) = open.iter().position(|c| c.id == id) {
                    self.tool_calls.push(open.remove(pos));
                }
            }
            StreamDelta::Done { stop_reason, usage } => {
                self.stop_reason = stop_reason;
                self.usage = usage;
            }
        }
    }
}

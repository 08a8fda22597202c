//! ScriptedProvider - deterministic reasoning engine for tests and offline runs
//!
//! Each call to complete_stream pops the next queued behavior, or asks the
//! responder closure when one is installed. Every request is captured so
//! tests can assert on the prompts a role actually sent.

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmRequest, StreamDelta};
use async_stream::stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mock behavior configuration
#[derive(Clone, Debug)]
pub enum MockBehavior {
    /// Return a text-only response
    Text(String),
    /// Return a tool call with given name and args
    ToolCall { name: String, args: Value },
    /// Return a tool call whose argument payload is not valid JSON
    MalformedToolCall { name: String, arguments: String },
    /// Return a response with no text and no tool call
    Empty,
    /// Fail the request outright
    Error(String),
}

impl MockBehavior {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn tool(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self::ToolCall { name: name.into(), args: serde_json::json!({ "query": query.into() }) }
    }
}

type Responder = dyn Fn(&LlmRequest) -> MockBehavior + Send + Sync;

pub struct ScriptedProvider {
    behaviors: Mutex<VecDeque<MockBehavior>>,
    default_behavior: MockBehavior,
    responder: Option<Arc<Responder>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedProvider {
    /// Create a mock that always returns the same behavior
    pub fn constant(behavior: MockBehavior) -> Self {
        Self {
            behaviors: Mutex::new(VecDeque::new()),
            default_behavior: behavior,
            responder: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock with a sequence of behaviors (consumed in order)
    pub fn sequence(behaviors: Vec<MockBehavior>) -> Self {
        Self {
            behaviors: Mutex::new(behaviors.into()),
            default_behavior: MockBehavior::Text("(mock: sequence exhausted)".into()),
            responder: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that decides each reply from the request it receives.
    pub fn responder(f: impl Fn(&LlmRequest) -> MockBehavior + Send + Sync + 'static) -> Self {
        Self {
            behaviors: Mutex::new(VecDeque::new()),
            default_behavior: MockBehavior::Empty,
            responder: Some(Arc::new(f)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Get the number of calls made
    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// All requests received so far, in arrival order.
    pub async fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_behavior(&self, request: &LlmRequest) -> MockBehavior {
        self.requests.lock().await.push(request.clone());

        if let Some(queued) = self.behaviors.lock().await.pop_front() {
            return queued;
        }
        match &self.responder {
            Some(f) => f(request),
            None => self.default_behavior.clone(),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str { "scripted" }

    async fn complete_stream(&self, request: LlmRequest) -> LlmResult<LlmStream> {
        let behavior = self.next_behavior(&request).await;

        if let MockBehavior::Error(e) = behavior {
            return Err(LlmError::RequestFailed(e));
        }

        Ok(Box::pin(stream! {
            match behavior {
                MockBehavior::Text(text) => {
                    // Stream text in chunks like a real LLM
                    let chars: Vec<char> = text.chars().collect();
                    for chunk in chars.chunks(20) {
                        yield Ok(StreamDelta::Text(chunk.iter().collect()));
                    }
                }
                MockBehavior::ToolCall { name, args } => {
                    let id = format!("call_mock_{}", uuid::Uuid::new_v4().simple());
                    yield Ok(StreamDelta::ToolCallStart { id: id.clone(), name });
                    yield Ok(StreamDelta::ToolCallDelta { id: id.clone(), arguments: args.to_string() });
                    yield Ok(StreamDelta::ToolCallEnd { id });
                }
                MockBehavior::MalformedToolCall { name, arguments } => {
                    let id = format!("call_mock_{}", uuid::Uuid::new_v4().simple());
                    yield Ok(StreamDelta::ToolCallStart { id: id.clone(), name });
                    yield Ok(StreamDelta::ToolCallDelta { id: id.clone(), arguments });
                    yield Ok(StreamDelta::ToolCallEnd { id });
                }
                MockBehavior::Empty | MockBehavior::Error(_) => {}
            }
            yield Ok(StreamDelta::Done { stop_reason: Some("stop".into()), usage: None });
        }))
    }
}

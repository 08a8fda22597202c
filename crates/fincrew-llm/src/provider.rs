//! The reasoning engine seam

use crate::types::{Completion, LlmRequest, StreamDelta};
use futures::{Stream, StreamExt};
use std::pin::Pin;

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("engine unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("engine returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model not available: {0}")]
    ModelNotFound(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("malformed engine output: {0}")]
    InvalidResponse(String),

    #[error("stream interrupted: {0}")]
    Stream(String),
}

pub type LlmStream = Pin<Box<dyn Stream<Item = LlmResult<StreamDelta>> + Send>>;

/// Structured prompt and tool catalog in, streamed text and tool calls out.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete_stream(&self, request: LlmRequest) -> LlmResult<LlmStream>;

    /// Run one step to the end of its stream.
    async fn complete(&self, request: LlmRequest) -> LlmResult<Completion> {
        collect(self.complete_stream(request).await?).await
    }
}

/// Drain a delta stream into a [`Completion`]. The first stream error wins.
pub async fn collect(mut stream: LlmStream) -> LlmResult<Completion> {
    let mut completion = Completion::default();
    let mut open = Vec::new();
    while let Some(delta) = stream.next().await {
        completion.push(delta?, &mut open);
    }
    // Calls the engine never closed still count.
    completion.tool_calls.extend(open);
    Ok(completion)
}

//! Ollama chat API provider with NDJSON streaming

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{ContentBlock, LlmContent, LlmMessage, LlmRequest, StreamDelta, Usage};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

const OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(OLLAMA_BASE_URL)
    }
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str { "ollama" }

    async fn complete_stream(&self, request: LlmRequest) -> LlmResult<LlmStream> {
        let body = build_chat_request(&request);

        debug!(model = %body.model, messages = body.messages.len(), tools = body.tools.as_ref().map_or(0, Vec::len), "ollama chat");

        let response = self.client.post(self.chat_url()).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), %body, "ollama rejected request");
            return Err(status_error(status.as_u16(), &request.model, body));
        }

        Ok(Box::pin(parse_ndjson_stream(response.bytes_stream())))
    }
}

/// Ollama answers 404 when the model has not been pulled.
fn status_error(status: u16, model: &str, body: String) -> LlmError {
    match status {
        404 => LlmError::ModelNotFound(model.to_string()),
        _ => LlmError::Status { status, body },
    }
}

/// Translate the provider-neutral request into Ollama's chat body.
pub fn build_chat_request(request: &LlmRequest) -> OllamaChatRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(OllamaMessage::plain("system", system));
    }
    for message in &request.messages {
        messages.extend(convert_message(message));
    }

    OllamaChatRequest {
        model: request.model.clone(),
        messages,
        stream: true,
        tools: request.tools.as_ref().filter(|t| !t.is_empty()).map(|tools| {
            tools.iter().map(|t| OllamaTool {
                kind: "function".into(),
                function: OllamaFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            }).collect()
        }),
        options: OllamaOptions {
            temperature: request.temperature,
            num_predict: request.max_tokens,
        },
    }
}

fn convert_message(message: &LlmMessage) -> Vec<OllamaMessage> {
    let blocks = match &message.content {
        LlmContent::Text(s) => return vec![OllamaMessage::plain(message.role.as_str(), s)],
        LlmContent::Blocks(blocks) => blocks,
    };

    let mut out = Vec::new();
    let mut text = String::new();
    let mut calls = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => {
                if !text.is_empty() { text.push('\n'); }
                text.push_str(t);
            }
            ContentBlock::ToolUse { name, input, .. } => calls.push(OllamaToolCall {
                function: OllamaFunctionCall { name: name.clone(), arguments: input.clone() },
            }),
            ContentBlock::ToolResult { content, .. } => {
                out.push(OllamaMessage::plain("tool", content));
            }
        }
    }
    if !text.is_empty() || !calls.is_empty() {
        out.insert(0, OllamaMessage {
            role: message.role.as_str().to_string(),
            content: text,
            tool_calls: if calls.is_empty() { None } else { Some(calls) },
        });
    }
    out
}

/// Split an NDJSON byte stream into lines and decode each one. Lines are
/// buffered as bytes so a character split across chunks stays intact.
pub fn parse_ndjson_stream(
    bytes_stream: impl futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl futures::Stream<Item = LlmResult<StreamDelta>> + Send {
    async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        let mut call_seq = 0usize;

        tokio::pin!(bytes_stream);

        while let Some(chunk_result) = bytes_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(LlmError::Stream(e.to_string()));
                    return;
                }
            };

            buffer.extend_from_slice(&chunk);

            while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=line_end).collect();
                for delta in decode_line_bytes(&line, &mut call_seq) {
                    yield delta;
                }
            }
        }

        for delta in decode_line_bytes(&buffer, &mut call_seq) {
            yield delta;
        }
    }
}

fn decode_line_bytes(line: &[u8], call_seq: &mut usize) -> Vec<LlmResult<StreamDelta>> {
    match std::str::from_utf8(line) {
        Ok(text) if text.trim().is_empty() => Vec::new(),
        Ok(text) => decode_chunk_line(text.trim(), call_seq),
        Err(e) => vec![Err(LlmError::InvalidResponse(format!("line is not UTF-8: {}", e)))],
    }
}

/// Decode one NDJSON line of an Ollama chat stream into deltas.
pub fn decode_chunk_line(line: &str, call_seq: &mut usize) -> Vec<LlmResult<StreamDelta>> {
    let chunk: OllamaChunk = match serde_json::from_str(line) {
        Ok(c) => c,
        Err(e) => return vec![Err(LlmError::InvalidResponse(format!("{}: {}", e, line)))],
    };

    if let Some(err) = chunk.error {
        return vec![Err(LlmError::Stream(err))];
    }

    let mut deltas = Vec::new();
    if let Some(message) = chunk.message {
        if !message.content.is_empty() {
            deltas.push(Ok(StreamDelta::Text(message.content)));
        }
        for call in message.tool_calls.unwrap_or_default() {
            *call_seq += 1;
            let id = format!("call_{}", call_seq);
            deltas.push(Ok(StreamDelta::ToolCallStart { id: id.clone(), name: call.function.name }));
            deltas.push(Ok(StreamDelta::ToolCallDelta {
                id: id.clone(),
                arguments: call.function.arguments.to_string(),
            }));
            deltas.push(Ok(StreamDelta::ToolCallEnd { id }));
        }
    }

    if chunk.done {
        deltas.push(Ok(StreamDelta::Done {
            stop_reason: chunk.done_reason,
            usage: Some(Usage {
                prompt_tokens: chunk.prompt_eval_count.unwrap_or(0),
                completion_tokens: chunk.eval_count.unwrap_or(0),
            }),
        }));
    }
    deltas
}

#[derive(Serialize, Debug)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<OllamaMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OllamaTool>>,
    pub options: OllamaOptions,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct OllamaMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OllamaToolCall>>,
}

impl OllamaMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self { role: role.to_string(), content: content.to_string(), tool_calls: None }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct OllamaToolCall {
    pub function: OllamaFunctionCall,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct OllamaFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Serialize, Debug)]
pub struct OllamaTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: OllamaFunction,
}

#[derive(Serialize, Debug)]
pub struct OllamaFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Serialize, Debug)]
pub struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaChunk {
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
    error: Option<String>,
}

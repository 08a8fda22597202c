//! Role runtime - the bounded reasoning loop
//!
//! One role, one instruction: stream a step from the reasoning engine,
//! decode it, run at most one capability, feed the observation back, repeat
//! until a final answer or the iteration limit.

use crate::decode::{decode_step, thought_text, Decision, FINAL_ANSWER};
use crate::role::BoundRole;
use fincrew_llm::{ChatRole, ContentBlock, LlmError, LlmMessage, LlmProvider, LlmRequest, DEFAULT_MODEL};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const MAX_OBSERVATION_CHARS: usize = 50_000;

#[derive(Debug, thiserror::Error)]
pub enum RoleError {
    #[error("reasoning engine failed: {0}")]
    Engine(#[from] LlmError),

    #[error("role '{role}' produced no answer within {iterations} iterations")]
    NoAnswer { role: String, iterations: usize },

    #[error("role '{role}' binds unknown capabilities: {}", missing.join(", "))]
    UnknownCapability { role: String, missing: Vec<String> },

    #[error("role '{role}' requests delegation, which is not supported")]
    DelegationUnsupported { role: String },
}

/// What a role run produced.
#[derive(Debug, Clone)]
pub struct RoleOutcome {
    pub text: String,
    pub iterations: usize,
    pub tool_calls: usize,
    /// The loop hit its iteration limit; `text` is the best partial answer.
    pub exhausted: bool,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub default_model: String,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            temperature: Some(0.1),
            max_tokens: 4096,
        }
    }
}

pub struct RoleRuntime {
    provider: Arc<dyn LlmProvider>,
    config: RuntimeConfig,
}

impl RoleRuntime {
    pub fn new(provider: Arc<dyn LlmProvider>, config: RuntimeConfig) -> Self {
        Self { provider, config }
    }

    /// Drive `role` until it answers `instruction`.
    ///
    /// Engine failures end the run with an error. Capability failures do not:
    /// they come back to the role as observations.
    pub async fn run(
        &self,
        role: &BoundRole,
        instruction: &str,
        context: &str,
    ) -> Result<RoleOutcome, RoleError> {
        let started = Instant::now();
        let system = system_prompt(role);
        let definitions = role.tools.get_definitions();
        let model = role.model.clone().unwrap_or_else(|| self.config.default_model.clone());
        let temperature = role.temperature.or(self.config.temperature);

        let mut messages = vec![LlmMessage::user(task_message(instruction, context))];
        let mut partial: Option<String> = None;
        let mut last_observation: Option<String> = None;
        let mut tool_calls = 0usize;

        for iteration in 1..=role.max_iterations {
            let last_step = iteration == role.max_iterations && role.max_iterations > 1;
            if last_step {
                messages.push(LlmMessage::user(format!(
                    "This is your last step. Do not call any more tools. Reply now with '{} ' \
                     followed by your complete answer.",
                    FINAL_ANSWER
                )));
            }

            let request = LlmRequest::new(model.clone())
                .with_system(system.clone())
                .with_messages(messages.clone())
                .with_tools(if last_step { Vec::new() } else { definitions.clone() })
                .with_sampling(temperature, self.config.max_tokens);

            let step = self.provider.complete(request).await?;
            if let Some(usage) = step.usage {
                debug!(
                    role = %role.name,
                    iteration,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "step done"
                );
            }
            let text = step.text;
            let calls = step.tool_calls;
            if let Some(thought) = thought_text(&text) {
                partial = Some(thought);
            }

            match decode_step(&text, &calls, &role.tools) {
                Decision::Answer(answer) => {
                    info!(
                        role = %role.name,
                        iterations = iteration,
                        tool_calls,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "role_completed"
                    );
                    return Ok(RoleOutcome { text: answer, iterations: iteration, tool_calls, exhausted: false });
                }
                Decision::ToolCall { id, name, arguments, input } => {
                    role.throttle.acquire().await;
                    debug!(role = %role.name, tool = %name, iteration, "tool call");
                    let result = role.tools.invoke(&name, &input).await;
                    tool_calls += 1;
                    let is_error = result.is_error();
                    let observation = clip(result.to_content_string());
                    if !is_error {
                        last_observation = Some(observation.clone());
                    }

                    match id {
                        Some(id) => {
                            let mut blocks = Vec::new();
                            if !text.trim().is_empty() {
                                blocks.push(ContentBlock::Text { text: text.clone() });
                            }
                            blocks.push(ContentBlock::ToolUse { id: id.clone(), name, input: arguments });
                            messages.push(LlmMessage::blocks(ChatRole::Assistant, blocks));
                            messages.push(LlmMessage::blocks(
                                ChatRole::User,
                                vec![ContentBlock::ToolResult { tool_use_id: id, content: observation, is_error }],
                            ));
                        }
                        None => {
                            messages.push(LlmMessage::assistant(text));
                            messages.push(LlmMessage::user(format!("Observation: {}", observation)));
                        }
                    }
                }
                Decision::ParseFailure(reason) => {
                    debug!(role = %role.name, iteration, %reason, "unparseable step");
                    if !text.trim().is_empty() {
                        messages.push(LlmMessage::assistant(text));
                    }
                    messages.push(LlmMessage::user(format!("{} {}", reason, format_reminder(role))));
                }
            }
        }

        // A role that only ever called tools still leaves its last observation.
        match partial.or(last_observation) {
            Some(text) => {
                warn!(
                    role = %role.name,
                    iterations = role.max_iterations,
                    tool_calls,
                    "role_iteration_limit"
                );
                Ok(RoleOutcome { text, iterations: role.max_iterations, tool_calls, exhausted: true })
            }
            None => Err(RoleError::NoAnswer { role: role.name.clone(), iterations: role.max_iterations }),
        }
    }
}

/// Persona preamble, tool catalog, and the reply protocol.
pub fn system_prompt(role: &BoundRole) -> String {
    let mut prompt = role.persona.preamble();
    if !role.tools.is_empty() {
        prompt.push_str("\n\nYou can use these tools:\n");
        for def in role.tools.get_definitions() {
            prompt.push_str(&format!("- {}: {}\n", def.name, def.description));
        }
        let notes = role.tools.combined_prompts();
        if !notes.is_empty() {
            prompt.push_str(&notes);
            prompt.push('\n');
        }
    }
    prompt.push('\n');
    prompt.push_str(&format_reminder(role));
    prompt
}

fn format_reminder(role: &BoundRole) -> String {
    if role.tools.is_empty() {
        format!("Reply with '{}' followed by your complete answer.", FINAL_ANSWER)
    } else {
        format!(
            "To use a tool reply with 'Action: <tool name>' and 'Action Input: <plain text>' on \
             separate lines. When you are done reply with '{}' followed by your complete answer.",
            FINAL_ANSWER
        )
    }
}

fn task_message(instruction: &str, context: &str) -> String {
    if context.trim().is_empty() {
        instruction.to_string()
    } else {
        format!("{}\n\nThis is the context you are working with:\n{}", instruction, context)
    }
}

fn clip(observation: String) -> String {
    let total = observation.chars().count();
    if total <= MAX_OBSERVATION_CHARS {
        return observation;
    }
    let head: String = observation.chars().take(MAX_OBSERVATION_CHARS).collect();
    format!("{}...\n[truncated, {} total chars]", head, total)
}

//! Fincrew LLM - reasoning engine adapters with streaming support

pub mod mock;
pub mod ollama;
pub mod provider;
pub mod types;

pub use mock::{MockBehavior, ScriptedProvider};
pub use ollama::OllamaProvider;
pub use provider::{collect, LlmError, LlmProvider, LlmResult, LlmStream};
pub use types::*;

//! LLM-assisted requirements selection
//!
//! - [`extract`]: pulls a flat string map out of free-form model output
//! - [`session`]: single-shot selection and the multi-turn chat session
//! - [`interactive`]: the terminal chat loop
//! - [`vendors`]: HTTP completion clients for the supported vendors

pub mod extract;
pub mod interactive;
pub mod session;
pub mod vendors;

pub use extract::{extract_fields, trim_markdown_json};
pub use interactive::{run_interactive, LineSource, StdinLines};
pub use session::{build_system_prompt, select_profile, ChatSession};
pub use vendors::{create_client, LlmSettings, Vendor};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat string-keyed fields extracted from a model response
pub type LlmFields = BTreeMap<String, String>;

pub const CONFIDENCE_KEY: &str = "confidence";
pub const REASONING_KEY: &str = "reasoning";
pub const LOW_CONFIDENCE: &str = "low";

/// Printed after every assistant reply in the interactive session
pub const INTERACTIVE_PROMPT_SUFFIX: &str = "\n\n---\nIf you would like to generate the manifests for the recommended profile, type 'generate'. If you want to ask another question, type it here.";

/// Sampling temperature for every completion request
pub const TEMPERATURE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Stateless text completion: the full system prompt and history go out on every call
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        user_text: &str,
    ) -> anyhow::Result<String>;
}

/// Whether extracted fields carry a low-confidence marker
pub fn is_low_confidence(fields: &LlmFields) -> bool {
    fields
        .get(CONFIDENCE_KEY)
        .map(|c| c == LOW_CONFIDENCE)
        .unwrap_or(false)
}

/// Reasoning text attached to a recommendation, empty when absent
pub fn reasoning(fields: &LlmFields) -> String {
    fields.get(REASONING_KEY).cloned().unwrap_or_default()
}

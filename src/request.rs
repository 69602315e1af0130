//! Chat-completion request flattening.
//!
//! The proxy front-end hands the routing core a parsed OpenAI-style body.
//! Before classification the message list is flattened: system messages
//! concatenate into the system prompt, user and assistant turns into the
//! prompt. A non-empty `tools` array marks the call agentic.

use serde::{Deserialize, Serialize};

/// One message of a chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// The request fields the routing core cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub stream: Option<bool>,
}

impl ChatRequest {
    /// Whether the request carries a non-empty tool list.
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// Flatten a message list into `(prompt, system_prompt)`.
///
/// System messages join into the system prompt; user and assistant turns
/// join into the prompt, each newline-separated, in original order.
pub fn flatten_messages(messages: &[ChatMessage]) -> (String, Option<String>) {
    let mut prompt_parts = Vec::new();
    let mut system_parts = Vec::new();

    for message in messages {
        if message.content.is_empty() {
            continue;
        }
        match message.role.as_str() {
            "system" | "developer" => system_parts.push(message.content.as_str()),
            _ => prompt_parts.push(message.content.as_str()),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n"))
    };
    (prompt_parts.join("\n"), system)
}

// ── Tests ──────────────────────────────────────────────────────────────

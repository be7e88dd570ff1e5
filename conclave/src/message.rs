//! The message log's element type (spec §3 "Message").
//!
//! A tagged sum with four variants. Entries are immutable once appended; the
//! log ([`crate::team::state::ConversationState::messages`]) never mutates a
//! past entry, only appends new ones (spec §3 invariant).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A pending or already-issued tool call carried on an [`Message::Assistant`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque id. Every [`Message::Tool`] answering this call echoes it back.
    pub id: String,
    /// Registered tool name (see [`crate::team::tool::ToolSpec::name`]).
    pub name: String,
    /// Structured arguments, validated against the tool's declared schema
    /// before invocation.
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One entry in the append-only message log.
///
/// Invariant (spec §3): every [`Message::Tool`]'s `tool_call_id` refers to
/// some earlier [`Message::Assistant`]'s tool call; entries have an implicit
/// monotonic index (their position in the `Vec`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// Authored by the end user.
    User { content: String },
    /// Authored by an agent's LLM turn; may carry tool calls the LLM asked for.
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCallRequest>>,
    },
    /// A tool's result, answering one tool call from an earlier assistant message.
    Tool {
        content: String,
        tool_call_id: String,
        tool_name: String,
    },
    /// A system prompt or instruction.
    System { content: String },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: None,
        }
    }

    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
        }
    }

    pub fn tool(
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        Message::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
        }
    }

    /// The message's text content, regardless of variant.
    pub fn content(&self) -> &str {
        match self {
            Message::User { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. }
            | Message::System { content } => content,
        }
    }

    /// Tool calls carried by this message, if it is an [`Message::Assistant`] with any.
    pub fn tool_calls(&self) -> Option<&[ToolCallRequest]> {
        match self {
            Message::Assistant {
                tool_calls: Some(calls),
                ..
            } => Some(calls),
            _ => None,
        }
    }
}

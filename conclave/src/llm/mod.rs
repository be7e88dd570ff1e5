//! LLM provider abstraction consumed by the Agent Node and Router Node (spec §6.2).
//!
//! Mirrors the upstream `llm::LlmClient` trait shape (`invoke` / `invoke_stream`
//! over an `mpsc::Sender<MessageChunk>`) but widens it to the chat-completion
//! contract the orchestrator needs: tool declarations on the request, tool
//! calls on the response, and a narrow `router_decide` entry point for
//! structured routing, so each provider adapter can implement routing as best
//! it can even without native structured output.

mod mock;
mod openai;

pub use mock::{MockChatProvider, ScriptedTurn};
pub use openai::ChatOpenAI;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::message::{Message, ToolCallRequest};

/// Error surfaced by a [`ChatProvider`]. The executor converts this into an
/// `error` [`conclave_protocol::StreamEvent`] (spec §7: "LLM provider failure").
#[derive(Debug, Error, Clone)]
pub enum LlmError {
    #[error("llm call failed: {0}")]
    CallFailed(String),
    /// The provider has no native structured-output support and the
    /// JSON-parsing heuristic fallback also failed.
    #[error("router decision could not be parsed: {0}")]
    RouteParseFailed(String),
}

/// A tool's wire declaration, as sent to the LLM provider so it can emit
/// matching tool calls. Narrower than [`crate::team::tool::ToolSpec`], which
/// additionally carries approval policy the provider never needs to see.
#[derive(Debug, Clone)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One incremental token from a streaming LLM call.
#[derive(Debug, Clone)]
pub struct MessageChunk {
    pub content: String,
}

/// The complete result of one LLM turn: content plus any tool calls.
#[derive(Debug, Clone, Default)]
pub struct ChatTurn {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Result of the Router Node's classification call (spec §4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    pub target_agent: String,
    pub reason: String,
}

/// `stream_chat(messages, tools?, structured_schema?) -> async iterator of
/// {token | tool_call | end{full_message}}` (spec §6.2), expressed the way the
/// upstream `LlmClient` expresses streaming: an optional `mpsc::Sender` the
/// implementation pushes [`MessageChunk`]s into while it also returns the
/// complete [`ChatTurn`] at the end.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// One non-streaming turn: full message log in, one assistant turn out.
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolDeclaration],
    ) -> Result<ChatTurn, LlmError>;

    /// Streaming variant. Default implementation calls [`Self::invoke`] and,
    /// when `chunk_tx` is `Some`, sends the full content as one chunk,
    /// matching the upstream `LlmClient::invoke_stream` default exactly.
    async fn invoke_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDeclaration],
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> Result<ChatTurn, LlmError> {
        let turn = self.invoke(messages, tools).await?;
        if let Some(tx) = chunk_tx {
            if !turn.content.is_empty() {
                let _ = tx
                    .send(MessageChunk {
                        content: turn.content.clone(),
                    })
                    .await;
            }
        }
        Ok(turn)
    }

    /// Narrow structured-routing entry point (spec §4.6/§9). `agents` is the
    /// list of enabled agent identifiers the decision must choose among.
    ///
    /// Implementations that lack native structured output should fall back to
    /// parsing a fixed JSON shape from a free-form response (spec §4.6); if
    /// that also fails, return [`LlmError::RouteParseFailed`] so the Router
    /// Node can apply its own hard-coded default (`m`).
    async fn router_decide(
        &self,
        messages: &[Message],
        agents: &[String],
    ) -> Result<RouteDecision, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubProvider {
        content: String,
    }

    #[async_trait]
    impl ChatProvider for StubProvider {
        async fn invoke(
            &self,
            _messages: &[Message],
            _tools: &[ToolDeclaration],
        ) -> Result<ChatTurn, LlmError> {
            Ok(ChatTurn {
                content: self.content.clone(),
                tool_calls: vec![],
            })
        }

        async fn router_decide(
            &self,
            _messages: &[Message],
            _agents: &[String],
        ) -> Result<RouteDecision, LlmError> {
            Ok(RouteDecision {
                target_agent: "m".to_string(),
                reason: "stub".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn default_invoke_stream_sends_single_chunk_when_enabled() {
        let provider = StubProvider {
            content: "hello".to_string(),
        };
        let (tx, mut rx) = mpsc::channel(2);
        let turn = provider.invoke_stream(&[], &[], Some(tx)).await.unwrap();
        assert_eq!(turn.content, "hello");
        let chunk = rx.recv().await.expect("one chunk");
        assert_eq!(chunk.content, "hello");
    }

    #[tokio::test]
    async fn default_invoke_stream_skips_chunk_for_empty_content() {
        let provider = StubProvider {
            content: String::new(),
        };
        let (tx, mut rx) = mpsc::channel(2);
        let turn = provider.invoke_stream(&[], &[], Some(tx)).await.unwrap();
        assert!(turn.content.is_empty());
        assert!(rx.try_recv().is_err());
    }
}

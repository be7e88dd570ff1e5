//! Deterministic [`ChatProvider`] for tests, analogous to the upstream `MockLlm`.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::message::{Message, ToolCallRequest};

use super::{ChatProvider, ChatTurn, LlmError, MessageChunk, RouteDecision, ToolDeclaration};

/// A single scripted turn: either a terminal assistant message, or one with
/// tool calls (which the Agent Node will execute and loop again).
#[derive(Debug, Clone)]
pub struct ScriptedTurn {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ScriptedTurn {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: vec![],
        }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            content: String::new(),
            tool_calls: vec![ToolCallRequest::new(id, name, arguments)],
        }
    }
}

/// Replays a fixed queue of [`ScriptedTurn`]s, one per `invoke`/`invoke_stream`
/// call, in order. Also replays a fixed queue of [`RouteDecision`]s for
/// `router_decide`. Panics (test-only, never shipped) if the queue runs dry;
/// scripts should provide exactly as many turns as the scenario needs.
pub struct MockChatProvider {
    turns: Mutex<Vec<ScriptedTurn>>,
    routes: Mutex<Vec<RouteDecision>>,
}

impl MockChatProvider {
    /// Builds a provider that replays `turns` in order, one per agent-LLM call.
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns),
            routes: Mutex::new(Vec::new()),
        }
    }

    /// Attaches a queue of router decisions to replay in order.
    pub fn with_routes(self, routes: Vec<RouteDecision>) -> Self {
        *self.routes.lock().unwrap() = routes;
        self
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    async fn invoke(
        &self,
        _messages: &[Message],
        _tools: &[ToolDeclaration],
    ) -> Result<ChatTurn, LlmError> {
        let mut turns = self.turns.lock().unwrap();
        if turns.is_empty() {
            return Err(LlmError::CallFailed(
                "MockChatProvider: scripted turn queue exhausted".to_string(),
            ));
        }
        let next = turns.remove(0);
        Ok(ChatTurn {
            content: next.content,
            tool_calls: next.tool_calls,
        })
    }

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

    async fn router_decide(
        &self,
        _messages: &[Message],
        _agents: &[String],
    ) -> Result<RouteDecision, LlmError> {
        let mut routes = self.routes.lock().unwrap();
        if routes.is_empty() {
            return Err(LlmError::CallFailed(
                "MockChatProvider: scripted route queue exhausted".to_string(),
            ));
        }
        Ok(routes.remove(0))
    }
}

//! Agent Node (spec §4.5, C5).
//!
//! One invocation runs a bounded inner loop: call the LLM, execute any tool
//! calls it returns (via the Tool Invoker, gated by Approval Middleware),
//! append messages, and loop, until a terminal assistant message (no tool
//! calls) or a suspension (an approval-gated tool call) is reached.

use std::sync::Arc;

use conclave_protocol::StreamEvent;
use tokio::sync::mpsc;

use crate::llm::{ChatProvider, MessageChunk};
use crate::message::Message;
use crate::team::approval::{ApprovalMiddleware, PendingApproval};
use crate::team::tool::{Invoker, RuntimeContext};

/// Default per-node recursion limit (spec §4.5). Individual agents (e.g. the
/// memory agent) may configure a tighter one.
pub const DEFAULT_RECURSION_LIMIT: u32 = 25;

/// One configured agent: identity, prompt, tools, and recursion limit.
pub struct AgentNode {
    pub id: String,
    pub system_prompt: String,
    pub invoker: Invoker,
    pub recursion_limit: u32,
}

impl AgentNode {
    pub fn new(id: impl Into<String>, system_prompt: impl Into<String>, invoker: Invoker) -> Self {
        Self {
            id: id.into(),
            system_prompt: system_prompt.into(),
            invoker,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }
}

/// What one Agent Node invocation produced (spec §4.5 "Output: the set of
/// newly appended messages only").
#[derive(Debug)]
pub enum AgentOutcome {
    Completed { new_messages: Vec<Message> },
    Suspended {
        new_messages: Vec<Message>,
        pending: PendingApproval,
    },
}

/// Runs one Agent Node invocation (spec §4.5 steps 1-4).
///
/// `log` is the committed message log (the conversation state at the start
/// of this node's turn); `carry_in` is non-empty only when resuming a
/// previously suspended turn: the Assistant message that carried the tool
/// calls, followed by the Tool messages the Approval Middleware just
/// resolved for them, which must be folded into both the working log sent
/// to the LLM and this invocation's `new_messages` output.
pub async fn run_agent_node(
    agent: &AgentNode,
    log: &[Message],
    carry_in: Vec<Message>,
    ctx: &RuntimeContext,
    provider: &Arc<dyn ChatProvider>,
    events: &mpsc::Sender<StreamEvent>,
) -> AgentOutcome {
    let mut new_messages = carry_in.clone();
    let mut working_log: Vec<Message> = Vec::with_capacity(log.len() + carry_in.len() + 1);
    working_log.push(Message::system(agent.system_prompt.clone()));
    working_log.extend_from_slice(log);
    working_log.extend(carry_in);

    let tool_decls = agent.invoker.registry().declarations();

    for _ in 0..agent.recursion_limit {
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<MessageChunk>(32);
        let forward_tokens = {
            let events = events.clone();
            let agent_id = agent.id.clone();
            tokio::spawn(async move {
                while let Some(chunk) = chunk_rx.recv().await {
                    let _ = events
                        .send(StreamEvent::Token {
                            content: chunk.content,
                            current_agent: agent_id.clone(),
                        })
                        .await;
                }
            })
        };

        let turn = provider
            .invoke_stream(&working_log, &tool_decls, Some(chunk_tx))
            .await;
        let _ = forward_tokens.await;

        let turn = match turn {
            Ok(turn) => turn,
            Err(e) => {
                let _ = events
                    .send(StreamEvent::Error {
                        error: e.to_string(),
                        traceback: None,
                    })
                    .await;
                return AgentOutcome::Completed { new_messages };
            }
        };

        let _ = events
            .send(StreamEvent::LlmEnd {
                full_message: turn.content.clone(),
                node: agent.id.clone(),
            })
            .await;

        if turn.tool_calls.is_empty() {
            let msg = Message::assistant(turn.content);
            new_messages.push(msg.clone());
            working_log.push(msg);
            return AgentOutcome::Completed { new_messages };
        }

        let approval_calls = ApprovalMiddleware::calls_requiring_approval(&agent.invoker, &turn.tool_calls);
        if !approval_calls.is_empty() {
            let interrupt = ApprovalMiddleware::build_interrupt(&agent.invoker, &approval_calls);
            let assistant_message =
                Message::assistant_with_tool_calls(turn.content, turn.tool_calls.clone());
            let pending = PendingApproval {
                agent_id: agent.id.clone(),
                assistant_message,
                all_calls: turn.tool_calls,
                approval_call_ids: approval_calls.iter().map(|c| c.id.clone()).collect(),
                interrupt,
            };
            return AgentOutcome::Suspended {
                new_messages,
                pending,
            };
        }

        let assistant_message = Message::assistant_with_tool_calls(turn.content, turn.tool_calls.clone());
        new_messages.push(assistant_message.clone());
        working_log.push(assistant_message);

        let mut tool_messages = Vec::with_capacity(turn.tool_calls.len());
        for call in &turn.tool_calls {
            let _ = events
                .send(StreamEvent::ToolStart {
                    tool_name: call.name.clone(),
                    tool_input: call.arguments.clone(),
                    node: agent.id.clone(),
                })
                .await;
            let result = agent.invoker.invoke(call, ctx, &agent.id).await;
            let _ = events
                .send(StreamEvent::ToolEnd {
                    tool_name: call.name.clone(),
                    tool_output: result.content().to_string(),
                    node: agent.id.clone(),
                })
                .await;
            tool_messages.push(result);
        }

        new_messages.extend(tool_messages.clone());
        working_log.extend(tool_messages);
    }

    AgentOutcome::Completed { new_messages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockChatProvider, ScriptedTurn};
    use crate::team::tool::{Tool, ToolError, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::Value;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn call(&self, _arguments: Value, _ctx: &RuntimeContext) -> Result<String, ToolError> {
            Ok("echoed".to_string())
        }
    }

    struct ApprovalTool;

    #[async_trait]
    impl Tool for ApprovalTool {
        fn name(&self) -> &str {
            "add_memory"
        }
        fn description(&self) -> &str {
            "remembers"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        fn requires_approval(&self) -> bool {
            true
        }
        async fn call(&self, _arguments: Value, _ctx: &RuntimeContext) -> Result<String, ToolError> {
            Ok("stored".to_string())
        }
    }

    fn ctx() -> RuntimeContext {
        RuntimeContext {
            user_id: "u".to_string(),
            thread_id: "t".to_string(),
            session_id: None,
        }
    }

    #[tokio::test]
    async fn terminal_assistant_message_ends_the_loop_with_no_tool_calls() {
        let provider: Arc<dyn ChatProvider> =
            Arc::new(MockChatProvider::new(vec![ScriptedTurn::text("hello there")]));
        let invoker = Invoker::new(Arc::new(ToolRegistry::new()));
        let agent = AgentNode::new("s", "you are s", invoker);
        let (tx, mut rx) = mpsc::channel(16);
        let outcome = run_agent_node(&agent, &[], vec![], &ctx(), &provider, &tx).await;
        match outcome {
            AgentOutcome::Completed { new_messages } => {
                assert_eq!(new_messages.len(), 1);
                assert_eq!(new_messages[0].content(), "hello there");
            }
            _ => panic!("expected Completed"),
        }
        drop(tx);
        let mut saw_llm_end = false;
        while let Some(ev) = rx.recv().await {
            if let StreamEvent::LlmEnd { .. } = ev {
                saw_llm_end = true;
            }
        }
        assert!(saw_llm_end);
    }

    #[tokio::test]
    async fn tool_call_then_terminal_message_runs_two_turns() {
        let provider: Arc<dyn ChatProvider> = Arc::new(MockChatProvider::new(vec![
            ScriptedTurn::tool_call("c1", "echo", serde_json::json!({})),
            ScriptedTurn::text("done"),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let invoker = Invoker::new(Arc::new(registry));
        let agent = AgentNode::new("s", "you are s", invoker);
        let (tx, _rx) = mpsc::channel(16);
        let outcome = run_agent_node(&agent, &[], vec![], &ctx(), &provider, &tx).await;
        match outcome {
            AgentOutcome::Completed { new_messages } => {
                // tool message, assistant(tool_calls) message, terminal assistant message
                assert_eq!(new_messages.len(), 3);
                assert_eq!(new_messages[0].content(), "echoed");
                assert_eq!(new_messages[2].content(), "done");
            }
            _ => panic!("expected Completed"),
        }
    }

    #[tokio::test]
    async fn approval_required_tool_call_suspends_before_invoking_it() {
        let provider: Arc<dyn ChatProvider> = Arc::new(MockChatProvider::new(vec![
            ScriptedTurn::tool_call("c1", "add_memory", serde_json::json!({"content": "x"})),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ApprovalTool));
        let invoker = Invoker::new(Arc::new(registry));
        let agent = AgentNode::new("m", "you are m", invoker);
        let (tx, _rx) = mpsc::channel(16);
        let outcome = run_agent_node(&agent, &[], vec![], &ctx(), &provider, &tx).await;
        match outcome {
            AgentOutcome::Suspended { new_messages, pending } => {
                assert!(new_messages.is_empty());
                assert_eq!(pending.approval_call_ids, vec!["c1".to_string()]);
                assert_eq!(pending.interrupt.actions.len(), 1);
            }
            _ => panic!("expected Suspended"),
        }
    }

    #[tokio::test]
    async fn resume_carry_in_is_included_in_new_messages_and_llm_sees_it() {
        let provider: Arc<dyn ChatProvider> =
            Arc::new(MockChatProvider::new(vec![ScriptedTurn::text("confirmed")]));
        let invoker = Invoker::new(Arc::new(ToolRegistry::new()));
        let agent = AgentNode::new("m", "you are m", invoker);
        let (tx, _rx) = mpsc::channel(16);
        let carry_in = vec![
            Message::tool("stored: coffee", "c1", "add_memory"),
            Message::assistant_with_tool_calls(
                "",
                vec![crate::message::ToolCallRequest::new(
                    "c1",
                    "add_memory",
                    serde_json::json!({}),
                )],
            ),
        ];
        let outcome = run_agent_node(&agent, &[], carry_in.clone(), &ctx(), &provider, &tx).await;
        match outcome {
            AgentOutcome::Completed { new_messages } => {
                assert_eq!(new_messages.len(), 3);
                assert_eq!(new_messages[0], carry_in[0]);
                assert_eq!(new_messages[1], carry_in[1]);
                assert_eq!(new_messages[2].content(), "confirmed");
            }
            _ => panic!("expected Completed"),
        }
    }
}

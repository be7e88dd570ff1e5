//! Approval Middleware (spec §4.4, C4) and the Interrupt Record it builds (spec §3).
//!
//! The middleware never holds its own task state across the suspend. By the
//! time execution resumes (possibly in a different process, spec §9
//! "Suspend/resume across processes"), everything it needs comes back from the
//! [`crate::team::checkpoint::Checkpoint`]'s `pending` field as a
//! [`PendingApproval`].

use conclave_protocol::StreamEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::message::{Message, ToolCallRequest};
use crate::team::tool::{DecisionKind, Invoker, RuntimeContext};

/// One pending tool call echoed back to the client for review (spec §3
/// "Interrupt Record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub tool_call_id: String,
    pub tool_name: String,
    pub tool_input: Value,
    pub description: String,
}

/// The subset of decision kinds allowed for one [`ActionRequest`] (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    pub allowed_decisions: Vec<DecisionKind>,
}

/// Non-empty ordered list of [`ActionRequest`]s paired 1:1 with
/// [`ReviewConfig`]s (spec §3). Emitted when the middleware suspends;
/// consumed exactly once when the client supplies matching [`ToolDecision`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptRecord {
    pub actions: Vec<ActionRequest>,
    pub reviews: Vec<ReviewConfig>,
}

/// A human decision on one [`ActionRequest`] (spec §3 "Tool Decision").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDecision {
    Approve,
    Reject { message: String },
    Edit { edited_name: String, edited_args: Value },
}

/// Everything needed to resume an interrupted Agent Node turn (spec §4.8
/// "every suspension point must be representable as a checkpoint field").
/// Not client-facing; [`InterruptRecord`] is the wire shape clients see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    /// The agent whose turn is suspended.
    pub agent_id: String,
    /// The assistant message that carried the tool calls, not yet appended
    /// to the log (spec §4.5 step 4 happens only after every call resolves).
    pub assistant_message: Message,
    /// Every tool call in `assistant_message`, in original order. Calls whose
    /// id appears in `approval_call_ids` are resolved via the matching
    /// [`ToolDecision`]; the rest are invoked normally on resume.
    pub all_calls: Vec<ToolCallRequest>,
    /// Ids (in order) of the calls that require approval, 1:1 with the
    /// [`ToolDecision`] list a resume request must supply.
    pub approval_call_ids: Vec<String>,
    /// The client-facing record built from `approval_call_ids`.
    pub interrupt: InterruptRecord,
}

/// Error folding [`ToolDecision`]s back into tool invocations (spec §4.4
/// "If any decision is missing, malformed, or the list length differs").
#[derive(Debug, Error, Clone)]
pub enum ApprovalError {
    #[error("expected {expected} decisions, got {got}")]
    LengthMismatch { expected: usize, got: usize },
}

/// Wraps the Tool Invoker (spec §4.4). `gate` decides, for a given assistant
/// message's tool calls, which ones require approval; `resolve` folds a
/// client's decisions back into Tool messages on resume.
pub struct ApprovalMiddleware;

impl ApprovalMiddleware {
    /// Splits `calls` into tool calls requiring approval, in original order.
    /// Empty means the whole message can be invoked without suspending.
    pub fn calls_requiring_approval(
        invoker: &Invoker,
        calls: &[ToolCallRequest],
    ) -> Vec<ToolCallRequest> {
        calls
            .iter()
            .filter(|c| {
                invoker
                    .registry()
                    .get(&c.name)
                    .map(|t| t.requires_approval())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Builds the client-facing [`InterruptRecord`] for the calls that need
    /// approval (spec §4.4 steps 1-2).
    pub fn build_interrupt(invoker: &Invoker, approval_calls: &[ToolCallRequest]) -> InterruptRecord {
        let mut actions = Vec::with_capacity(approval_calls.len());
        let mut reviews = Vec::with_capacity(approval_calls.len());
        for call in approval_calls {
            let tool = invoker.registry().get(&call.name);
            let allowed = tool
                .as_ref()
                .map(|t| t.allowed_decisions())
                .unwrap_or_else(|| vec![DecisionKind::Approve, DecisionKind::Reject]);
            actions.push(ActionRequest {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                tool_input: call.arguments.clone(),
                description: format!("Call {}({})", call.name, call.arguments),
            });
            reviews.push(ReviewConfig {
                allowed_decisions: allowed,
            });
        }
        InterruptRecord { actions, reviews }
    }

    /// Folds a client's decisions into Tool messages for every call in
    /// `pending.all_calls`, in original order: approval-gated calls per their
    /// decision, the rest invoked normally (spec §4.4, §4.8 resume path).
    /// Emits `ToolStart`/`ToolEnd` around each actual invocation, symmetric
    /// with the normal (non-resume) tool loop in `agent::run_agent_node`.
    pub async fn resolve(
        invoker: &Invoker,
        pending: &PendingApproval,
        decisions: &[ToolDecision],
        ctx: &RuntimeContext,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<Vec<Message>, ApprovalError> {
        if decisions.len() != pending.approval_call_ids.len() {
            return Err(ApprovalError::LengthMismatch {
                expected: pending.approval_call_ids.len(),
                got: decisions.len(),
            });
        }

        let mut decision_by_id: std::collections::HashMap<&str, &ToolDecision> =
            std::collections::HashMap::new();
        for (id, decision) in pending.approval_call_ids.iter().zip(decisions.iter()) {
            decision_by_id.insert(id.as_str(), decision);
        }

        let mut out = Vec::with_capacity(pending.all_calls.len());
        for call in &pending.all_calls {
            if let Some(decision) = decision_by_id.get(call.id.as_str()) {
                let msg = match decision {
                    ToolDecision::Approve => {
                        Self::invoke_with_events(invoker, call, ctx, &pending.agent_id, events).await
                    }
                    ToolDecision::Edit {
                        edited_name,
                        edited_args,
                    } => {
                        let edited = ToolCallRequest::new(
                            call.id.clone(),
                            edited_name.clone(),
                            edited_args.clone(),
                        );
                        Self::invoke_with_events(invoker, &edited, ctx, &pending.agent_id, events).await
                    }
                    ToolDecision::Reject { message } => {
                        Message::tool(message.clone(), call.id.clone(), call.name.clone())
                    }
                };
                out.push(msg);
            } else {
                out.push(Self::invoke_with_events(invoker, call, ctx, &pending.agent_id, events).await);
            }
        }
        Ok(out)
    }

    async fn invoke_with_events(
        invoker: &Invoker,
        call: &ToolCallRequest,
        ctx: &RuntimeContext,
        agent_id: &str,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Message {
        let _ = events
            .send(StreamEvent::ToolStart {
                tool_name: call.name.clone(),
                tool_input: call.arguments.clone(),
                node: agent_id.to_string(),
            })
            .await;
        let result = invoker.invoke(call, ctx, agent_id).await;
        let _ = events
            .send(StreamEvent::ToolEnd {
                tool_name: call.name.clone(),
                tool_output: result.content().to_string(),
                node: agent_id.to_string(),
            })
            .await;
        result
    }
}

//! Conversation State and the reducer (spec §3 "Conversation State", §4.2).
//!
//! `ConversationState` is the single source of truth checkpointed after every
//! node transition (it plays the role of the `S` in the generic
//! `Checkpointer<S>`/`Checkpoint<S>` substrate, specialized to this runtime's
//! own shape instead of an arbitrary graph state). `merge` is the
//! deterministic, side-effect-free reducer: messages append, scalar fields in
//! the partial overwrite when present (spec §4.2).

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Sentinel meaning "classify via the Router Node" (spec §3 `next_step`).
pub const ROUTER: &str = "ROUTER";
/// Sentinel meaning "this request is finished" (spec §3 `next_step`).
pub const END: &str = "END";

/// Default cap on inter-agent handoffs per request (spec §3, overridable via
/// [`crate::team::executor::GraphExecutor::with_max_handoffs`]).
pub const DEFAULT_MAX_HANDOFFS: u32 = 5;

/// Where execution goes next (spec §3 `next_step`): a named agent, the
/// router, or termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextStep {
    Agent(String),
    Router,
    End,
}

impl Default for NextStep {
    fn default() -> Self {
        NextStep::Router
    }
}

/// One thread's persisted state (spec §3 "Conversation State"). Checkpointed
/// in full after every node transition via `Checkpointer<ConversationState>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    /// The append-only message log (spec §3 "Message log").
    pub messages: Vec<Message>,
    /// Identifier of the most recently executing agent, or empty.
    pub current_agent: String,
    /// Identifier of the agent the next request on this thread should reuse
    /// (sticky routing), or empty before any agent has run.
    pub last_active_manager: String,
    /// Short human-readable string for observability.
    pub routing_reason: String,
    /// Non-negative; reset per user request turn, incremented on every
    /// inter-agent transfer. Invariant: `handoff_count <= MAX_HANDOFFS`.
    pub handoff_count: u32,
    /// Where the executor should go next.
    pub next_step: NextStep,
}

impl ConversationState {
    /// A brand-new thread: the incoming user message appended, routed
    /// through the Router Node (spec §4.8 step 1).
    pub fn new_thread(user_message: Message) -> Self {
        Self {
            messages: vec![user_message],
            current_agent: String::new(),
            last_active_manager: String::new(),
            routing_reason: String::new(),
            handoff_count: 0,
            next_step: NextStep::Router,
        }
    }
}

/// A node's partial output: new messages to append, plus optional scalar
/// overwrites (spec §4.2 "merge(existing, new_partial)").
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub new_messages: Vec<Message>,
    pub current_agent: Option<String>,
    pub last_active_manager: Option<String>,
    pub routing_reason: Option<String>,
    pub handoff_count: Option<u32>,
    pub next_step: Option<NextStep>,
}

impl StateUpdate {
    /// A partial that only appends messages.
    pub fn messages(new_messages: Vec<Message>) -> Self {
        Self {
            new_messages,
            ..Default::default()
        }
    }
}

/// The reducer (spec §4.2): `merge(existing, new_partial)` yields
/// `existing ++ new_partial` for messages; scalar fields in `new_partial`
/// overwrite those in `existing` when present. Deterministic and
/// side-effect-free (testable property #2, "Reducer purity").
pub fn merge(existing: &ConversationState, update: StateUpdate) -> ConversationState {
    let mut next = existing.clone();
    next.messages.extend(update.new_messages);
    if let Some(v) = update.current_agent {
        next.current_agent = v;
    }
    if let Some(v) = update.last_active_manager {
        next.last_active_manager = v;
    }
    if let Some(v) = update.routing_reason {
        next.routing_reason = v;
    }
    if let Some(v) = update.handoff_count {
        next.handoff_count = v;
    }
    if let Some(v) = update.next_step {
        next.next_step = v;
    }
    next
}

/// Combines two partials the way two sequential `merge` calls would, so that
/// `merge(merge(S, P1), P2) == merge(S, merge_partials(P1, P2))` (testable
/// property #2). Messages concatenate in order; scalar fields take `P2`'s
/// value when present, else fall back to `P1`'s.
pub fn merge_partials(p1: StateUpdate, p2: StateUpdate) -> StateUpdate {
    StateUpdate {
        new_messages: p1.new_messages.into_iter().chain(p2.new_messages).collect(),
        current_agent: p2.current_agent.or(p1.current_agent),
        last_active_manager: p2.last_active_manager.or(p1.last_active_manager),
        routing_reason: p2.routing_reason.or(p1.routing_reason),
        handoff_count: p2.handoff_count.or(p1.handoff_count),
        next_step: p2.next_step.or(p1.next_step),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConversationState {
        ConversationState::new_thread(Message::user("hello"))
    }

    #[test]
    fn merge_appends_messages_and_never_mutates_existing_entries() {
        let existing = base();
        let update = StateUpdate::messages(vec![Message::assistant("hi there")]);
        let merged = merge(&existing, update);
        assert_eq!(merged.messages.len(), 2);
        assert_eq!(merged.messages[0], existing.messages[0]);
        assert_eq!(merged.messages[1], Message::assistant("hi there"));
    }

    #[test]
    fn merge_overwrites_scalar_fields_only_when_present() {
        let mut existing = base();
        existing.current_agent = "s".to_string();
        existing.handoff_count = 2;

        let update = StateUpdate {
            routing_reason: Some("continuing".to_string()),
            ..Default::default()
        };
        let merged = merge(&existing, update);
        assert_eq!(merged.current_agent, "s", "absent field is preserved");
        assert_eq!(merged.handoff_count, 2, "absent field is preserved");
        assert_eq!(merged.routing_reason, "continuing");
    }

    #[test]
    fn reducer_purity_two_sequential_merges_equal_one_merge_of_combined_partial() {
        let existing = base();
        let p1 = StateUpdate {
            new_messages: vec![Message::assistant("part one")],
            current_agent: Some("s".to_string()),
            ..Default::default()
        };
        let p2 = StateUpdate {
            new_messages: vec![Message::tool("result", "call_1", "search")],
            handoff_count: Some(1),
            ..Default::default()
        };

        let sequential = merge(&merge(&existing, p1.clone()), p2.clone());
        let combined = merge(&existing, merge_partials(p1, p2));

        assert_eq!(sequential.messages, combined.messages);
        assert_eq!(sequential.current_agent, combined.current_agent);
        assert_eq!(sequential.handoff_count, combined.handoff_count);
    }

    #[test]
    fn monotonic_log_existing_messages_are_a_prefix_after_merge() {
        let existing = base();
        let merged = merge(&existing, StateUpdate::messages(vec![Message::assistant("ok")]));
        assert_eq!(&merged.messages[..existing.messages.len()], &existing.messages[..]);
    }
}

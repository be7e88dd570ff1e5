//! Router Node (spec §4.6, C6).
//!
//! On the first turn of a thread, classifies the request and selects the
//! target agent; on subsequent turns, reuses the last active agent without
//! an LLM call (sticky routing, testable property #4).

use std::sync::Arc;

use crate::llm::{ChatProvider, LlmError};
use crate::message::Message;

/// Fallback target when structured routing fails entirely: manager `m`, used
/// both when no router chain is configured and when the LLM call raises.
pub const ROUTER_FALLBACK_AGENT: &str = "m";

/// Reason string used when no parseable structured output came back at all
/// (as opposed to the LLM call itself failing), matching the literal
/// `"Default fallback"` the original router emits with no further detail
/// appended.
const DEFAULT_FALLBACK_REASON: &str = "Default fallback";

/// Result of one Router Node evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterOutcome {
    pub target_agent: String,
    pub reason: String,
    /// Whether the LLM was invoked to produce this outcome. `false` for
    /// sticky routing; callers use this to decide whether to emit a
    /// `router_decision` event (spec S2: sticky continuation emits none).
    pub llm_invoked: bool,
}

/// Runs the Router Node (spec §4.6).
///
/// `last_active_manager` empty means this is the thread's first turn.
/// `enabled_agents` is the set of valid `target_agent` values the structured
/// decision must choose among.
pub async fn route(
    provider: &Arc<dyn ChatProvider>,
    messages: &[Message],
    last_active_manager: &str,
    enabled_agents: &[String],
) -> RouterOutcome {
    if !last_active_manager.is_empty() {
        return RouterOutcome {
            target_agent: last_active_manager.to_string(),
            reason: "continuing with last active manager".to_string(),
            llm_invoked: false,
        };
    }

    match provider.router_decide(messages, enabled_agents).await {
        Ok(decision) => RouterOutcome {
            target_agent: decision.target_agent,
            reason: decision.reason,
            llm_invoked: true,
        },
        Err(LlmError::RouteParseFailed(_)) => RouterOutcome {
            target_agent: ROUTER_FALLBACK_AGENT.to_string(),
            reason: DEFAULT_FALLBACK_REASON.to_string(),
            llm_invoked: true,
        },
        Err(e) => RouterOutcome {
            target_agent: ROUTER_FALLBACK_AGENT.to_string(),
            reason: format!("Error fallback: {}", e),
            llm_invoked: true,
        },
    }
}

//! Wire shape of the streaming event taxonomy emitted by the orchestration core
//! and consumed by the HTTP/SSE gateway.
//!
//! Each variant serializes to a JSON object tagged by `type`, one per SSE `data:` line.
//! Event ordering and emission rules live with the executor; this module only
//! fixes the shape on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event in the normalized stream taxonomy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Emitted at request start or once the first node yields an agent identity.
    AgentStart { current_agent: String },
    /// Emitted on every transition into a different agent node.
    AgentChange { current_agent: String },
    /// Emitted exactly once when the router node yields.
    RouterDecision { target_agent: String, reason: String },
    /// Per-LLM-streaming-token event for agent nodes only; router tokens are suppressed.
    Token { content: String, current_agent: String },
    /// Emitted at the end of an LLM call; suppressed for the router.
    LlmEnd { full_message: String, node: String },
    /// Emitted before a tool is invoked, after any approval gate has passed.
    ToolStart {
        tool_name: String,
        tool_input: Value,
        node: String,
    },
    /// Emitted after a tool returns.
    ToolEnd {
        tool_name: String,
        tool_output: String,
        node: String,
    },
    /// Emitted when Approval Middleware suspends execution.
    Interrupt {
        interrupt_record: Value,
        thread_id: String,
    },
    /// Emitted at normal completion.
    Done {
        messages_count: usize,
        current_agent: String,
        handoff_count: u32,
    },
    /// Emitted on any surfaced failure.
    Error { error: String, traceback: Option<String> },
    /// Non-error informational event (spec §4.8: loop-limit reached forces
    /// termination "with a diagnostic event" distinct from a normal `done`
    /// and from `error`, since the request still completes successfully).
    Diagnostic { message: String },
}

impl StreamEvent {
    /// Serializes this event to a JSON object (the SSE `data:` payload).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Renders this event as one SSE frame: `data: <json>\n\n`.
    pub fn to_sse_line(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_start_serializes_with_type_tag() {
        let ev = StreamEvent::AgentStart {
            current_agent: "s".to_string(),
        };
        let v = ev.to_value().unwrap();
        assert_eq!(v["type"], "agent_start");
        assert_eq!(v["current_agent"], "s");
    }

    #[test]
    fn router_decision_roundtrip() {
        let ev = StreamEvent::RouterDecision {
            target_agent: "m".to_string(),
            reason: "continuing with last active manager".to_string(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        let parsed: StreamEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            StreamEvent::RouterDecision { target_agent, reason } => {
                assert_eq!(target_agent, "m");
                assert_eq!(reason, "continuing with last active manager");
            }
            _ => panic!("expected router_decision"),
        }
    }

    #[test]
    fn to_sse_line_has_data_prefix_and_blank_line() {
        let ev = StreamEvent::Done {
            messages_count: 4,
            current_agent: "s".to_string(),
            handoff_count: 0,
        };
        let line = ev.to_sse_line().unwrap();
        assert!(line.starts_with("data: "));
        assert!(line.ends_with("\n\n"));
    }

    #[test]
    fn diagnostic_event_serializes_with_type_tag() {
        let ev = StreamEvent::Diagnostic {
            message: "handoff limit reached".to_string(),
        };
        let v = ev.to_value().unwrap();
        assert_eq!(v["type"], "diagnostic");
    }

    #[test]
    fn error_event_traceback_optional() {
        let ev = StreamEvent::Error {
            error: "boom".to_string(),
            traceback: None,
        };
        let v = ev.to_value().unwrap();
        assert_eq!(v["error"], "boom");
        assert!(v.get("traceback").is_none() || v["traceback"].is_null());
    }
}

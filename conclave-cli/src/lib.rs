//! Thin SSE client for a running `conclave-serve` gateway (spec §6.1).
//!
//! Holds everything that can be unit-tested without a live server: SSE frame
//! parsing off a byte stream, and formatting of the taxonomy in
//! `conclave_protocol::StreamEvent` for a terminal. `main.rs` owns the actual
//! HTTP/SSE plumbing and the subcommand wiring.

use serde_json::Value;

/// Incrementally extracts complete SSE `data: ...` payloads from a byte
/// stream. SSE frames are separated by a blank line (`\n\n`); a stream may
/// split that separator across two `reqwest` chunks, so callers feed bytes in
/// as they arrive and drain whatever complete frames are ready.
#[derive(Default)]
pub struct SseFrameReader {
    buf: String,
}

impl SseFrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds newly received bytes and returns the `data:` payload of every
    /// complete frame now available, in order. Ignores comment lines (`:`)
    /// and any frame with no `data:` field, per the SSE spec.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.find("\n\n") {
            let frame = self.buf[..pos].to_string();
            self.buf.drain(..pos + 2);
            let payload: String = frame
                .lines()
                .filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
                .collect::<Vec<_>>()
                .join("\n");
            if !payload.is_empty() {
                out.push(payload);
            }
        }
        out
    }
}

/// Renders one decoded [`conclave_protocol::StreamEvent`] JSON payload as a
/// single terminal line. Unknown `type` values print the raw JSON rather than
/// being dropped, so a gateway running ahead of this client is still legible.
pub fn format_event(event: &Value) -> String {
    let kind = event.get("type").and_then(Value::as_str).unwrap_or("?");
    match kind {
        "agent_start" => format!("-> agent {}", field_str(event, "current_agent")),
        "agent_change" => format!("-> switched to agent {}", field_str(event, "current_agent")),
        "router_decision" => format!(
            "   router chose {} ({})",
            field_str(event, "target_agent"),
            field_str(event, "reason")
        ),
        "token" => field_str(event, "content"),
        "llm_end" => String::new(),
        "tool_start" => format!(
            "   calling {}({})",
            field_str(event, "tool_name"),
            event.get("tool_input").cloned().unwrap_or(Value::Null)
        ),
        "tool_end" => format!(
            "   {} -> {}",
            field_str(event, "tool_name"),
            field_str(event, "tool_output")
        ),
        "interrupt" => format!(
            "!! approval required on thread {}: {}",
            field_str(event, "thread_id"),
            event.get("interrupt_record").cloned().unwrap_or(Value::Null)
        ),
        "done" => format!(
            "done ({} messages, last agent {}, {} handoffs)",
            field_str(event, "messages_count"),
            field_str(event, "current_agent"),
            field_str(event, "handoff_count")
        ),
        "error" => format!("error: {}", field_str(event, "error")),
        "diagnostic" => format!("note: {}", field_str(event, "message")),
        _ => event.to_string(),
    }
}

fn field_str(event: &Value, key: &str) -> String {
    match event.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Builds the `/chat/resume` wire shape for one decision (mirrors
/// `conclave_serve::handlers::WireToolDecision`).
pub fn approve_decision() -> Value {
    serde_json::json!({"type": "approve"})
}

pub fn reject_decision(message: impl Into<String>) -> Value {
    serde_json::json!({"type": "reject", "message": message.into()})
}

pub fn edit_decision(name: impl Into<String>, args: Value) -> Value {
    serde_json::json!({"type": "edit", "edited_action": {"name": name.into(), "args": args}})
}

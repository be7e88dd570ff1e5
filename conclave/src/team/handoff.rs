//! Handoff Detector (spec §4.7, C7) and the handoff sentinel contract (spec §6.4).
//!
//! Scans only the *newly appended* messages from one Agent Node invocation,
//! newest to oldest, for the first Tool message carrying a `HANDOFF_TO_<X>`
//! sentinel. Historical handoffs in older messages must never be re-detected
//! (testable property #6). The caller enforces that by only ever passing
//! this module the slice of messages produced by the node invocation that
//! just ran, never the full log.

/// The literal sentinel prefix a Tool message's content carries to signal a
/// handoff (spec §6.4). Followed by a single uppercase agent-identifier
/// letter, e.g. `HANDOFF_TO_S`.
pub const HANDOFF_SENTINEL_PREFIX: &str = "HANDOFF_TO_";

/// Extracts the target agent id from a sentinel-bearing string, if present.
/// The sentinel is `HANDOFF_TO_` immediately followed by one uppercase
/// letter; that letter, lowercased, is the agent identifier used elsewhere
/// in this crate (`s`, `m`, `i`, ...).
fn extract_target(content: &str) -> Option<String> {
    let idx = content.find(HANDOFF_SENTINEL_PREFIX)?;
    let after = &content[idx + HANDOFF_SENTINEL_PREFIX.len()..];
    let letter = after.chars().next()?;
    if letter.is_ascii_uppercase() {
        Some(letter.to_ascii_lowercase().to_string())
    } else {
        None
    }
}

/// Scans `new_messages` (newest-to-oldest, i.e. reversed) for the first Tool
/// message carrying a handoff sentinel; returns the target agent id, or
/// `None` meaning the next node is `END` (spec §4.7).
///
/// Only the first-found-from-the-end sentinel determines routing even if
/// multiple handoff tool calls occurred in the same turn. Every one of them
/// was still invoked and appended by the Agent Node; this detector just
/// picks which one wins.
pub fn detect_handoff(new_messages: &[crate::message::Message]) -> Option<String> {
    for msg in new_messages.iter().rev() {
        if let crate::message::Message::Tool { content, .. } = msg {
            if let Some(target) = extract_target(content) {
                return Some(target);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn no_handoff_when_no_sentinel_present() {
        let messages = vec![Message::tool("42F", "c1", "get_weather")];
        assert_eq!(detect_handoff(&messages), None);
    }

    #[test]
    fn detects_single_handoff_sentinel() {
        let messages = vec![Message::tool("HANDOFF_TO_S", "c1", "handoff_to_s")];
        assert_eq!(detect_handoff(&messages), Some("s".to_string()));
    }

    #[test]
    fn scans_newest_to_oldest_picking_the_last_one_first() {
        let messages = vec![
            Message::tool("HANDOFF_TO_S", "c1", "handoff_to_s"),
            Message::assistant("thinking"),
            Message::tool("HANDOFF_TO_M", "c2", "handoff_to_m"),
        ];
        // Reversed order visits the HANDOFF_TO_M tool message first.
        assert_eq!(detect_handoff(&messages), Some("m".to_string()));
    }

    #[test]
    fn sentinel_can_appear_anywhere_in_content() {
        let messages = vec![Message::tool(
            "Transferring you now. HANDOFF_TO_I for home automation.",
            "c1",
            "handoff_to_i",
        )];
        assert_eq!(detect_handoff(&messages), Some("i".to_string()));
    }

    #[test]
    fn historical_messages_outside_the_new_slice_are_never_scanned() {
        // Caller contract: only pass the new-message slice. A caller that
        // accidentally replays history would re-detect; this test documents
        // that detect_handoff itself has no notion of "old" vs "new" and
        // trusts its input.
        let historical = vec![Message::tool("HANDOFF_TO_S", "c1", "handoff_to_s")];
        let fresh: Vec<Message> = vec![];
        assert_eq!(detect_handoff(&fresh), None);
        assert_eq!(detect_handoff(&historical), Some("s".to_string()));
    }

    #[test]
    fn non_tool_messages_are_ignored() {
        let messages = vec![Message::assistant("HANDOFF_TO_S mentioned in passing")];
        assert_eq!(detect_handoff(&messages), None);
    }
}

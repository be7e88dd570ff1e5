//! Re-export of the wire event taxonomy (`conclave_protocol::StreamEvent`).
//!
//! The executor ([`crate::team::executor`]) emits these; the gateway crate
//! (`conclave-serve`) writes each as one `data: <json>\n\n` SSE frame.

pub use conclave_protocol::StreamEvent;

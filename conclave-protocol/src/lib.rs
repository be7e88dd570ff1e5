//! Wire types shared between the orchestration executor and the HTTP/SSE gateway.
//!
//! This crate fixes the shape of one stream event ([`StreamEvent`]) on the wire.
//! It has no dependency on `conclave` itself so that a gateway, a CLI client, or
//! a test harness can depend on the wire contract alone.

pub mod event;

pub use event::StreamEvent;

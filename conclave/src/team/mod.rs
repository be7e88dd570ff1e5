//! The multi-agent orchestration runtime (spec §§2-9).
//!
//! Submodules map onto the spec's components:
//!
//! - [`state`]: Conversation State and the reducer (C2).
//! - [`tool`]: Tool Registry & Invoker (C3).
//! - [`approval`]: Approval Middleware and the Interrupt Record (C4).
//! - [`checkpoint`]: Checkpoint Store (C1).
//! - [`agent`]: Agent Node (C5).
//! - [`router`]: Router Node (C6).
//! - [`handoff`]: Handoff Detector (C7).
//! - [`executor`]: Graph Executor (C8), driving C1-C7 together.
//! - [`builtin_tools`]: handoff tools and the illustrative per-agent domain
//!   tools the default three-agent team (`s`, `m`, `i`) ships with.
//!
//! The Streaming Event Emitter (C9) has no dedicated module: its taxonomy is
//! fixed in `conclave_protocol::StreamEvent` and emitted directly by
//! [`agent::run_agent_node`] and [`executor::GraphExecutor`] as they run,
//! rather than as a separate translation pass over a generic trace.

pub mod agent;
pub mod approval;
pub mod builtin_tools;
pub mod checkpoint;
pub mod executor;
pub mod handoff;
pub mod router;
pub mod state;
pub mod tool;

pub use agent::{AgentNode, AgentOutcome};
pub use approval::{ActionRequest, ApprovalError, ApprovalMiddleware, InterruptRecord, PendingApproval, ReviewConfig, ToolDecision};
pub use checkpoint::{
    Checkpoint, CheckpointStore, CheckpointStoreError, InMemoryCheckpointStore, SqliteCheckpointStore,
};
pub use executor::{AgentTeam, ConversationStateView, ExecutorError, GraphExecutor, ThreadStateView};
pub use handoff::{detect_handoff, HANDOFF_SENTINEL_PREFIX};
pub use router::{route, RouterOutcome, ROUTER_FALLBACK_AGENT};
pub use state::{merge, merge_partials, ConversationState, NextStep, StateUpdate, DEFAULT_MAX_HANDOFFS, END, ROUTER};
pub use tool::{DecisionKind, Invoker, RuntimeContext, Tool, ToolError, ToolRegistry};

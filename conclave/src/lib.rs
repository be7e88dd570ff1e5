//! # Conclave
//!
//! The multi-agent orchestration core: a small set of manager agents that share
//! one conversation log, hand off to each other by name, and can pause mid-turn
//! for human approval of a sensitive tool call before resuming exactly where
//! they left off.
//!
//! ## Design principles
//!
//! - **One shared log, many agents**: every agent node reads and appends to the
//!   same [`team::ConversationState`]; nothing is agent-private.
//! - **Sticky routing**: once a manager has taken a turn, follow-up turns stay
//!   with it until it hands off explicitly; see [`team::route`].
//! - **Suspend, don't block**: a tool requiring approval suspends the whole
//!   thread via a [`team::Checkpoint`] rather than blocking a task on a human.
//! - **The graph substrate is generic**: [`graph`]/[`channels`]/[`memory`] form
//!   the underlying state-graph engine the orchestration core (`team`) is
//!   built on top of; they know nothing about agents, handoffs, or approval.
//!
//! ## Main modules
//!
//! - [`team`]: the orchestration core: Checkpoint Store, Message Log &
//!   Reducer, Tool Registry & Invoker, Approval Middleware, Agent Node, Router
//!   Node, Handoff Detector, and the Graph Executor that drives them together.
//! - [`llm`]: [`llm::ChatProvider`] trait, [`llm::MockChatProvider`] test
//!   double, [`llm::ChatOpenAI`] adapter.
//! - [`message`]: [`Message`], the shared log entry type (User / Assistant /
//!   Tool / System).
//! - [`protocol`]: re-exports [`conclave_protocol::StreamEvent`], the wire
//!   taxonomy consumed by the HTTP/SSE gateway.
//! - [`graph`], [`channels`], [`managed`], [`memory`], [`stream`]: the generic
//!   state-graph substrate (nodes, edges, channels, checkpointing, long-term
//!   store) inherited from the underlying graph engine and reused by `team`.
//! - [`error`]: [`AgentError`], the graph-substrate execution error.
//!
//! Key orchestration types are re-exported at crate root for convenience.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use conclave::llm::MockChatProvider;
//! use conclave::team::builtin_tools::build_default_agents;
//! use conclave::team::{AgentTeam, CheckpointStore, GraphExecutor, InMemoryCheckpointStore, RuntimeContext};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let team = Arc::new(AgentTeam::new(build_default_agents()));
//! let provider = Arc::new(MockChatProvider::new(vec![]));
//! let checkpoints: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
//! let executor = GraphExecutor::new(team, provider, checkpoints);
//! let ctx = RuntimeContext {
//!     user_id: "u1".into(),
//!     thread_id: "t1".into(),
//!     session_id: None,
//! };
//! let (tx, _rx) = tokio::sync::mpsc::channel(32);
//! let _ = executor.start("t1", "hello", ctx, tx).await;
//! # }
//! ```

pub mod channels;
pub mod error;
pub mod graph;
pub mod llm;
pub mod managed;
pub mod memory;
pub mod message;
pub mod protocol;
pub mod stream;
pub mod team;

pub use channels::{
    BinaryOperatorAggregate, Channel, ChannelError, EphemeralValue, FieldBasedUpdater, LastValue,
    NamedBarrierValue, StateUpdater, Topic,
};
pub use error::AgentError;
pub use graph::{
    generate_dot, generate_text, log_graph_complete, log_graph_error, log_graph_start,
    log_node_complete, log_node_start, log_state_update, CompilationError, CompiledStateGraph,
    DefaultInterruptHandler, GraphInterrupt, Interrupt, InterruptHandler, LoggingNodeMiddleware,
    NameNode, Next, Node, NodeMiddleware, RetryPolicy, RunContext, Runtime, StateGraph, END, START,
};
pub use llm::ChatOpenAI;
pub use managed::{IsLastStep, ManagedValue};
pub use memory::Embedder;
#[cfg(feature = "lance")]
pub use memory::LanceStore;
pub use memory::OpenAIEmbedder;
pub use memory::{
    Checkpointer, InMemoryStore, JsonSerializer, MemorySaver, Namespace, RunnableConfig, Store,
    StoreError, StoreSearchHit,
};
pub use memory::{SqliteSaver, SqliteStore};
pub use message::Message;
pub use protocol::StreamEvent;
pub use team::{
    AgentNode, AgentOutcome, AgentTeam, ApprovalMiddleware, Checkpoint, CheckpointStore,
    CheckpointStoreError, ConversationState, ExecutorError, GraphExecutor, InMemoryCheckpointStore,
    InterruptRecord, NextStep as TeamNextStep, PendingApproval, SqliteCheckpointStore, ToolDecision,
};

//! Graph Executor (spec §4.8, C8) and the Agent Team it drives.
//!
//! Owns the node-to-node transitions: Router Node on a thread's first turn
//! or after a fresh user message (spec §4.6), Agent Node invocations, the
//! Handoff Detector between them (spec §4.7), loop-prevention (spec §3
//! `handoff_count <= MAX_HANDOFFS`), and a checkpoint write after every
//! transition (spec §4.1). Suspension (spec §4.4) ends the drive loop early;
//! [`GraphExecutor::resume`] re-enters at the suspended agent with the
//! client's decisions folded in.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use conclave_protocol::StreamEvent;

use crate::llm::ChatProvider;
use crate::message::Message;
use crate::team::agent::{run_agent_node, AgentNode, AgentOutcome};
use crate::team::approval::{ApprovalError, ApprovalMiddleware, ToolDecision};
use crate::team::checkpoint::{Checkpoint, CheckpointStore, CheckpointStoreError};
use crate::team::handoff::detect_handoff;
use crate::team::router::route;
use crate::team::state::{merge, ConversationState, NextStep, StateUpdate, DEFAULT_MAX_HANDOFFS};
use crate::team::tool::RuntimeContext;

/// Error surfaced by the Graph Executor (spec §7).
#[derive(Debug, Error, Clone)]
pub enum ExecutorError {
    #[error("checkpoint store failure: {0}")]
    Store(#[from] CheckpointStoreError),
    #[error("unknown thread id")]
    UnknownThread,
    #[error("thread has a pending interrupt; call resume instead of start")]
    ThreadHasPendingInterrupt,
    #[error("thread has no pending interrupt to resume")]
    NoPendingInterrupt,
    #[error("unknown agent id '{0}'")]
    UnknownAgent(String),
    #[error("approval decisions rejected: {0}")]
    Approval(#[from] ApprovalError),
}

/// The process-wide, read-only team of agents (spec §5 "Shared-resource
/// policy": "created once at process start and shared read-only").
pub struct AgentTeam {
    agents: HashMap<String, Arc<AgentNode>>,
    enabled_agents: Vec<String>,
}

impl AgentTeam {
    pub fn new(agents: Vec<Arc<AgentNode>>) -> Self {
        let enabled_agents = agents.iter().map(|a| a.id.clone()).collect();
        let agents = agents.into_iter().map(|a| (a.id.clone(), a)).collect();
        Self {
            agents,
            enabled_agents,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<AgentNode>> {
        self.agents.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn enabled_agents(&self) -> &[String] {
        &self.enabled_agents
    }
}

/// Outcome of driving one Agent Node invocation to completion or suspension,
/// with the post-transition state already merged and checkpointed.
enum StepOutcome {
    Suspended,
    Continue(ConversationState),
    Done(ConversationState),
}

/// Response shape for `GET /state/{thread_id}` (spec §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadStateView {
    pub status: String,
    pub thread_id: String,
    pub state: ConversationStateView,
    pub next_nodes: Vec<String>,
    pub has_interrupt: bool,
    pub interrupts: Vec<serde_json::Value>,
}

/// A serializable projection of [`ConversationState`] for the inspect endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationStateView {
    pub messages: Vec<Message>,
    pub current_agent: String,
    pub last_active_manager: String,
    pub handoff_count: u32,
}

/// Drives node-to-node transitions for one request (spec §4.8).
pub struct GraphExecutor {
    team: Arc<AgentTeam>,
    provider: Arc<dyn ChatProvider>,
    checkpoints: Arc<dyn CheckpointStore>,
    max_handoffs: u32,
}

impl GraphExecutor {
    pub fn new(
        team: Arc<AgentTeam>,
        provider: Arc<dyn ChatProvider>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            team,
            provider,
            checkpoints,
            max_handoffs: DEFAULT_MAX_HANDOFFS,
        }
    }

    pub fn with_max_handoffs(mut self, max_handoffs: u32) -> Self {
        self.max_handoffs = max_handoffs;
        self
    }

    /// Starts or continues a thread with a new user message (spec §4.8 step 1).
    pub async fn start(
        &self,
        thread_id: &str,
        user_message: impl Into<String>,
        ctx: RuntimeContext,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ExecutorError> {
        let existing = self.checkpoints.load_latest(thread_id).await?;
        let state = match existing {
            Some(cp) if cp.pending.is_some() => return Err(ExecutorError::ThreadHasPendingInterrupt),
            Some(cp) => {
                let mut s = cp.state;
                s.messages.push(Message::user(user_message.into()));
                s.handoff_count = 0;
                s.next_step = NextStep::Router;
                s
            }
            None => ConversationState::new_thread(Message::user(user_message.into())),
        };
        self.drive_from(thread_id, state, &ctx, &events, false).await
    }

    /// Resumes a suspended thread with the client's decisions (spec §4.4, §4.8).
    pub async fn resume(
        &self,
        thread_id: &str,
        decisions: Vec<ToolDecision>,
        ctx: RuntimeContext,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ExecutorError> {
        let checkpoint = self
            .checkpoints
            .load_latest(thread_id)
            .await?
            .ok_or(ExecutorError::UnknownThread)?;
        let pending = checkpoint.pending.ok_or(ExecutorError::NoPendingInterrupt)?;
        let agent = self
            .team
            .get(&pending.agent_id)
            .ok_or_else(|| ExecutorError::UnknownAgent(pending.agent_id.clone()))?;

        let mut carry_in = vec![pending.assistant_message.clone()];
        let resolved =
            ApprovalMiddleware::resolve(&agent.invoker, &pending, &decisions, &ctx, &events).await?;
        carry_in.extend(resolved);

        let mut emitted_agent_start = false;
        let outcome = self
            .run_once_agent(
                thread_id,
                &pending.agent_id,
                checkpoint.state,
                carry_in,
                &ctx,
                &events,
                &mut emitted_agent_start,
            )
            .await?;

        match outcome {
            StepOutcome::Suspended => Ok(()),
            StepOutcome::Continue(state) => self.drive_from(thread_id, state, &ctx, &events, true).await,
            StepOutcome::Done(state) => self.drive_from(thread_id, state, &ctx, &events, true).await,
        }
    }

    /// Non-streaming inspection for `GET /state/{thread_id}` (spec §6.1).
    pub async fn inspect(&self, thread_id: &str) -> Result<Option<ThreadStateView>, ExecutorError> {
        let Some(checkpoint) = self.checkpoints.load_latest(thread_id).await? else {
            return Ok(None);
        };
        let has_interrupt = checkpoint.pending.is_some();
        let interrupts = checkpoint
            .pending
            .as_ref()
            .map(|p| vec![serde_json::to_value(&p.interrupt).unwrap_or_default()])
            .unwrap_or_default();
        let next_nodes = match &checkpoint.state.next_step {
            NextStep::End if !has_interrupt => vec![],
            NextStep::Agent(id) => vec![id.clone()],
            _ if has_interrupt => vec![checkpoint
                .pending
                .as_ref()
                .map(|p| p.agent_id.clone())
                .unwrap_or_default()],
            NextStep::Router => vec!["ROUTER".to_string()],
            NextStep::End => vec![],
        };
        Ok(Some(ThreadStateView {
            status: if has_interrupt {
                "interrupted".to_string()
            } else if matches!(checkpoint.state.next_step, NextStep::End) {
                "done".to_string()
            } else {
                "running".to_string()
            },
            thread_id: thread_id.to_string(),
            state: ConversationStateView {
                messages: checkpoint.state.messages.clone(),
                current_agent: checkpoint.state.current_agent.clone(),
                last_active_manager: checkpoint.state.last_active_manager.clone(),
                handoff_count: checkpoint.state.handoff_count,
            },
            next_nodes,
            has_interrupt,
            interrupts,
        }))
    }

    /// The generic transition loop (spec §4.8 step 2): dispatches on
    /// `state.next_step` until `END` or a suspension, checkpointing after
    /// every transition and emitting the matching events.
    async fn drive_from(
        &self,
        thread_id: &str,
        mut state: ConversationState,
        ctx: &RuntimeContext,
        events: &mpsc::Sender<StreamEvent>,
        mut emitted_agent_start: bool,
    ) -> Result<(), ExecutorError> {
        loop {
            match state.next_step.clone() {
                NextStep::End => break,
                NextStep::Router => {
                    let outcome = route(
                        &self.provider,
                        &state.messages,
                        &state.last_active_manager,
                        self.team.enabled_agents(),
                    )
                    .await;
                    if outcome.llm_invoked {
                        let _ = events
                            .send(StreamEvent::RouterDecision {
                                target_agent: outcome.target_agent.clone(),
                                reason: outcome.reason.clone(),
                            })
                            .await;
                    }
                    state = merge(
                        &state,
                        StateUpdate {
                            routing_reason: Some(outcome.reason),
                            next_step: Some(NextStep::Agent(outcome.target_agent)),
                            ..Default::default()
                        },
                    );
                    self.checkpoints.save(thread_id, state.clone(), None).await?;
                }
                NextStep::Agent(agent_id) => {
                    match self
                        .run_once_agent(
                            thread_id,
                            &agent_id,
                            state,
                            vec![],
                            ctx,
                            events,
                            &mut emitted_agent_start,
                        )
                        .await?
                    {
                        StepOutcome::Suspended => return Ok(()),
                        StepOutcome::Continue(s) => state = s,
                        StepOutcome::Done(s) => {
                            state = s;
                            break;
                        }
                    }
                }
            }
        }

        let _ = events
            .send(StreamEvent::Done {
                messages_count: state.messages.len(),
                current_agent: state.current_agent.clone(),
                handoff_count: state.handoff_count,
            })
            .await;
        Ok(())
    }

    /// Runs one Agent Node invocation to completion or suspension, merges the
    /// reducer, persists a checkpoint, and decides (via the Handoff Detector
    /// and loop-prevention policy) what the next transition is (spec §4.7,
    /// §4.8 step 2.c).
    async fn run_once_agent(
        &self,
        thread_id: &str,
        agent_id: &str,
        state: ConversationState,
        carry_in: Vec<Message>,
        ctx: &RuntimeContext,
        events: &mpsc::Sender<StreamEvent>,
        emitted_agent_start: &mut bool,
    ) -> Result<StepOutcome, ExecutorError> {
        if !*emitted_agent_start {
            let _ = events
                .send(StreamEvent::AgentStart {
                    current_agent: agent_id.to_string(),
                })
                .await;
            *emitted_agent_start = true;
        } else if state.current_agent != agent_id {
            let _ = events
                .send(StreamEvent::AgentChange {
                    current_agent: agent_id.to_string(),
                })
                .await;
        }

        let agent = self
            .team
            .get(agent_id)
            .ok_or_else(|| ExecutorError::UnknownAgent(agent_id.to_string()))?;

        match run_agent_node(agent, &state.messages, carry_in, ctx, &self.provider, events).await {
            AgentOutcome::Suspended { new_messages, pending } => {
                let next_state = merge(
                    &state,
                    StateUpdate {
                        new_messages,
                        current_agent: Some(agent_id.to_string()),
                        ..Default::default()
                    },
                );
                self.checkpoints
                    .save(thread_id, next_state, Some(pending.clone()))
                    .await?;
                let _ = events
                    .send(StreamEvent::Interrupt {
                        interrupt_record: serde_json::to_value(&pending.interrupt).unwrap_or_default(),
                        thread_id: thread_id.to_string(),
                    })
                    .await;
                Ok(StepOutcome::Suspended)
            }
            AgentOutcome::Completed { new_messages } => {
                let detected = detect_handoff(&new_messages);
                let mut update = StateUpdate {
                    new_messages,
                    current_agent: Some(agent_id.to_string()),
                    ..Default::default()
                };

                let capped = detected.is_some() && state.handoff_count >= self.max_handoffs;
                if capped {
                    update.next_step = Some(NextStep::End);
                    update.last_active_manager = Some(agent_id.to_string());
                    let next_state = merge(&state, update);
                    self.checkpoints.save(thread_id, next_state.clone(), None).await?;
                    let _ = events
                        .send(StreamEvent::Diagnostic {
                            message: format!(
                                "handoff limit ({}) reached; forcing termination",
                                self.max_handoffs
                            ),
                        })
                        .await;
                    return Ok(StepOutcome::Done(next_state));
                }

                match detected.filter(|target| self.team.contains(target)) {
                    Some(target) => {
                        update.handoff_count = Some(state.handoff_count + 1);
                        update.last_active_manager = Some(target.clone());
                        update.next_step = Some(NextStep::Agent(target));
                        let next_state = merge(&state, update);
                        self.checkpoints.save(thread_id, next_state.clone(), None).await?;
                        Ok(StepOutcome::Continue(next_state))
                    }
                    None => {
                        update.last_active_manager = Some(agent_id.to_string());
                        update.next_step = Some(NextStep::End);
                        let next_state = merge(&state, update);
                        self.checkpoints.save(thread_id, next_state.clone(), None).await?;
                        Ok(StepOutcome::Done(next_state))
                    }
                }
            }
        }
    }
}

//! Process-wide gateway state (spec §4.10/§5 "gateway owns per-process
//! initialization"): the agent team, LLM provider adapter, and checkpoint
//! store are each constructed exactly once and shared read-only via `Arc`.

use std::sync::Arc;

use conclave::team::builtin_tools::build_default_agents;
use conclave::team::CheckpointStore;
use conclave::{
    AgentTeam, ChatOpenAI, GraphExecutor, InMemoryCheckpointStore, SqliteCheckpointStore,
};
use conclave::llm::ChatProvider;
use conclave_config::TeamConfig;
use thiserror::Error;

/// Fatal startup error (spec §7 "Graph misconfiguration... caught at process
/// start, not at request time").
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no agents enabled; refusing to start")]
    NoAgentsEnabled,
    #[error("could not open checkpoint store at '{path}': {source}")]
    CheckpointStore {
        path: String,
        #[source]
        source: conclave::CheckpointStoreError,
    },
}

/// Shared, read-only process state every handler builds a [`GraphExecutor`] from.
pub struct AppState {
    team: Arc<AgentTeam>,
    provider: Arc<dyn ChatProvider>,
    checkpoints: Arc<dyn CheckpointStore>,
    max_handoffs: u32,
}

impl AppState {
    /// Assembles already-constructed process state directly. Used by
    /// `from_config` and by tests that need a [`conclave::llm::MockChatProvider`]
    /// in place of the real `async-openai` adapter.
    pub fn new(
        team: Arc<AgentTeam>,
        provider: Arc<dyn ChatProvider>,
        checkpoints: Arc<dyn CheckpointStore>,
        max_handoffs: u32,
    ) -> Self {
        Self {
            team,
            provider,
            checkpoints,
            max_handoffs,
        }
    }

    /// Builds process state from §6.5's configuration keys. Disabled agents
    /// (`TeamConfig::is_agent_enabled`) are dropped from the default team
    /// before it is handed to the executor; an empty resulting team is a
    /// fatal misconfiguration caught here, not at request time (spec §7).
    pub fn from_config(cfg: &TeamConfig) -> Result<Self, GatewayError> {
        let agents: Vec<_> = build_default_agents()
            .into_iter()
            .filter(|a| cfg.is_agent_enabled(&a.id))
            .collect();
        if agents.is_empty() {
            return Err(GatewayError::NoAgentsEnabled);
        }
        let team = Arc::new(AgentTeam::new(agents));

        let provider: Arc<dyn ChatProvider> = {
            let openai = match &cfg.llm_api_key {
                Some(key) => ChatOpenAI::with_config(
                    async_openai::config::OpenAIConfig::new().with_api_key(key.clone()),
                    cfg.llm_model_name.clone(),
                ),
                None => ChatOpenAI::new(cfg.llm_model_name.clone()),
            }
            .with_temperature(cfg.llm_temperature);
            Arc::new(openai)
        };

        let checkpoints: Arc<dyn CheckpointStore> = match &cfg.checkpoint_connection_string {
            Some(path) if cfg.checkpoint_enabled => {
                Arc::new(SqliteCheckpointStore::new(path).map_err(|source| {
                    GatewayError::CheckpointStore {
                        path: path.clone(),
                        source,
                    }
                })?)
            }
            _ => Arc::new(InMemoryCheckpointStore::new()),
        };

        Ok(Self::new(team, provider, checkpoints, cfg.max_handoffs))
    }

    pub fn executor(&self) -> GraphExecutor {
        GraphExecutor::new(self.team.clone(), self.provider.clone(), self.checkpoints.clone())
            .with_max_handoffs(self.max_handoffs)
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }
}

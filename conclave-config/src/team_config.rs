//! Process-wide settings for the orchestration runtime (spec §6.5).
//!
//! `TeamConfig::from_env` reads the keys below from the process environment,
//! which `load_and_apply` (this crate's XDG/.env loader) should have already
//! populated for anything not set directly in the environment.

use std::collections::HashMap;
use std::env;

/// Default cap on inter-agent handoffs per request (spec §3, `MAX_HANDOFFS`).
pub const DEFAULT_MAX_HANDOFFS: u32 = 5;

/// Default model name used when `LLM_MODEL_NAME` is unset.
pub const DEFAULT_LLM_MODEL_NAME: &str = "gpt-4o-mini";

/// Default sampling temperature used when `LLM_TEMPERATURE` is unset.
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.0;

/// Process-wide configuration loaded once at gateway start (C10).
#[derive(Debug, Clone)]
pub struct TeamConfig {
    /// Cap on transfers per request (`MAX_HANDOFFS`).
    pub max_handoffs: u32,
    /// Chat model identifier passed to the LLM provider adapter.
    pub llm_model_name: String,
    /// Sampling temperature passed to the LLM provider adapter.
    pub llm_temperature: f32,
    /// API key / credential for the LLM provider. `None` means the provider
    /// adapter falls back to its own env var (e.g. `OPENAI_API_KEY`).
    pub llm_api_key: Option<String>,
    /// Checkpoint store connection string. `None` selects the in-process
    /// in-memory checkpointer (single-process mode only, per §4.1).
    pub checkpoint_connection_string: Option<String>,
    /// Whether the checkpoint store is enabled at all; when `false` the
    /// gateway refuses to start serving requests that need durability.
    pub checkpoint_enabled: bool,
    /// Per-agent enable flags (`agent_id -> enabled`). An agent id absent
    /// from this map defaults to enabled, matching the original's three
    /// always-on managers (`s`, `m`, `i`).
    pub agent_enabled: HashMap<String, bool>,
    /// Per-agent credentials for external tools (`agent_id -> env value`),
    /// e.g. the home-automation agent's REST token.
    pub agent_credentials: HashMap<String, String>,
    /// Observability sink credentials, if any. The core never ships a sink
    /// (spec §1 scope), but the key is still read here so per-process init
    /// can hand it to whatever tracing layer the deployment wires up.
    pub observability_credentials: Option<String>,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            max_handoffs: DEFAULT_MAX_HANDOFFS,
            llm_model_name: DEFAULT_LLM_MODEL_NAME.to_string(),
            llm_temperature: DEFAULT_LLM_TEMPERATURE,
            llm_api_key: None,
            checkpoint_connection_string: None,
            checkpoint_enabled: false,
            agent_enabled: HashMap::new(),
            agent_credentials: HashMap::new(),
            observability_credentials: None,
        }
    }
}

impl TeamConfig {
    /// Reads §6.5's keys from the process environment. Missing keys fall back
    /// to defaults; malformed numeric values fall back too rather than erroring,
    /// since a misconfigured gateway should still start serving with sane
    /// defaults (graph misconfiguration, not config misconfiguration, is what
    /// §7 treats as fatal-at-start).
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_handoffs = env::var("MAX_HANDOFFS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_handoffs);

        let llm_model_name =
            env::var("LLM_MODEL_NAME").unwrap_or(defaults.llm_model_name);

        let llm_temperature = env::var("LLM_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.llm_temperature);

        let llm_api_key = env::var("LLM_API_KEY").ok().or_else(|| env::var("OPENAI_API_KEY").ok());

        let checkpoint_connection_string = env::var("CHECKPOINT_CONNECTION_STRING").ok();
        let checkpoint_enabled = env::var("CHECKPOINT_ENABLED")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(checkpoint_connection_string.is_some());

        let mut agent_enabled = HashMap::new();
        for agent_id in ["s", "m", "i", "t"] {
            let key = format!("AGENT_{}_ENABLED", agent_id.to_uppercase());
            if let Ok(v) = env::var(&key) {
                agent_enabled.insert(
                    agent_id.to_string(),
                    v == "1" || v.eq_ignore_ascii_case("true"),
                );
            }
        }

        let mut agent_credentials = HashMap::new();
        for agent_id in ["s", "m", "i", "t"] {
            let key = format!("AGENT_{}_CREDENTIAL", agent_id.to_uppercase());
            if let Ok(v) = env::var(&key) {
                agent_credentials.insert(agent_id.to_string(), v);
            }
        }

        let observability_credentials = env::var("OBSERVABILITY_CREDENTIALS").ok();

        Self {
            max_handoffs,
            llm_model_name,
            llm_temperature,
            llm_api_key,
            checkpoint_connection_string,
            checkpoint_enabled,
            agent_enabled,
            agent_credentials,
            observability_credentials,
        }
    }

    /// Whether `agent_id` is enabled, defaulting to `true` when unconfigured.
    pub fn is_agent_enabled(&self, agent_id: &str) -> bool {
        self.agent_enabled.get(agent_id).copied().unwrap_or(true)
    }
}

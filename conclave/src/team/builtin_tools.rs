//! Handoff tools and the illustrative per-agent domain tools the default
//! three-agent team ships with (`s` search, `m` memory, `i` home-automation;
//! a fourth manager, `t`, exists in the original system but is never wired in).
//!
//! Spec §1 lists the web-search API, vector-store memory backend, and
//! home-automation REST endpoint as external collaborators out of scope for
//! this core. These are deliberately thin in-memory stand-ins, just enough
//! to exercise S1-S6, not production clients.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::memory::{uuid6, InMemoryStore, SearchOptions, Store};
use crate::team::agent::AgentNode;
use crate::team::tool::{DecisionKind, RuntimeContext, Tool, ToolError, ToolRegistry};
use crate::team::tool::Invoker;

/// Namespace the memory agent's facts live under (spec §1's vector-store
/// memory backend is out of scope; this is the `m` agent's own slice of
/// [`Store`], not a per-user/thread namespace scheme).
const MEMORY_NAMESPACE: &[&str] = &["agent_m", "memories"];

/// A `handoff_to_<agent_id>` tool (spec §4.3 "handoff tools"). Pure: never
/// requires approval, never fails, emits the §6.4 sentinel.
pub struct HandoffTool {
    name: String,
    target_letter_upper: char,
}

impl HandoffTool {
    pub fn new(target_agent_id: impl Into<String>) -> Self {
        let target_agent_id = target_agent_id.into();
        let target_letter_upper = target_agent_id
            .chars()
            .next()
            .unwrap_or('?')
            .to_ascii_uppercase();
        Self {
            name: Self::tool_name(&target_agent_id),
            target_letter_upper,
        }
    }

    pub fn tool_name(target_agent_id: &str) -> String {
        format!("handoff_to_{}", target_agent_id)
    }
}

#[async_trait]
impl Tool for HandoffTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Transfers the conversation to another manager agent."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _arguments: Value, _ctx: &RuntimeContext) -> Result<String, ToolError> {
        Ok(format!("HANDOFF_TO_{}", self.target_letter_upper))
    }
}

/// Illustrative web-search tool for the `s` (search) agent.
pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }
    fn description(&self) -> &str {
        "Searches the web for current information (weather, news, facts)."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"],
        })
    }
    async fn call(&self, arguments: Value, _ctx: &RuntimeContext) -> Result<String, ToolError> {
        let query = arguments["query"].as_str().unwrap_or_default();
        Ok(format!("Search results for '{}': sunny, 22C.", query))
    }
}

/// The `m` (memory) agent's long-term memory store: a handle onto any
/// [`Store`] backend, namespaced to this agent's own facts. Defaults to
/// [`InMemoryStore`]; callers wanting persistence can build
/// `MemoryStore::with_store(Arc::new(SqliteStore::open(path)?))` instead.
#[derive(Clone)]
pub struct MemoryStore(Arc<dyn Store>);

impl MemoryStore {
    pub fn new() -> Self {
        Self(Arc::new(InMemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn Store>) -> Self {
        Self(store)
    }

    async fn add(&self, content: String) -> Result<(), crate::memory::StoreError> {
        let key = uuid6().to_string();
        self.0
            .put(&namespace(), &key, &serde_json::json!({"content": content}))
            .await
    }

    async fn recall(&self) -> Result<Vec<String>, crate::memory::StoreError> {
        let hits = self.0.search(&namespace(), SearchOptions::new().with_limit(100)).await?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| hit.item.value["content"].as_str().map(str::to_string))
            .collect())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn namespace() -> Vec<String> {
    MEMORY_NAMESPACE.iter().map(|s| s.to_string()).collect()
}

/// Stores a fact. Requires approval (spec S3-S5: `add_memory` is the
/// HITL-gated tool in every approval scenario).
pub struct AddMemoryTool {
    store: MemoryStore,
}

impl AddMemoryTool {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddMemoryTool {
    fn name(&self) -> &str {
        "add_memory"
    }
    fn description(&self) -> &str {
        "Remembers a fact about the user for future conversations."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"content": {"type": "string"}},
            "required": ["content"],
        })
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn side_effectful(&self) -> bool {
        true
    }
    fn allowed_decisions(&self) -> Vec<DecisionKind> {
        vec![DecisionKind::Approve, DecisionKind::Reject, DecisionKind::Edit]
    }
    async fn call(&self, arguments: Value, _ctx: &RuntimeContext) -> Result<String, ToolError> {
        let content = arguments["content"].as_str().unwrap_or_default().to_string();
        self.store
            .add(content.clone())
            .await
            .map_err(|e| ToolError::HandlerFailed(e.to_string()))?;
        Ok(format!("stored: {}", content))
    }
}

/// Recalls stored facts. Never requires approval; read-only.
pub struct RecallMemoryTool {
    store: MemoryStore,
}

impl RecallMemoryTool {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for RecallMemoryTool {
    fn name(&self) -> &str {
        "recall_memory"
    }
    fn description(&self) -> &str {
        "Lists facts remembered about the user."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn call(&self, _arguments: Value, _ctx: &RuntimeContext) -> Result<String, ToolError> {
        let facts = self
            .store
            .recall()
            .await
            .map_err(|e| ToolError::HandlerFailed(e.to_string()))?;
        if facts.is_empty() {
            Ok("no memories stored yet".to_string())
        } else {
            Ok(facts.join("; "))
        }
    }
}

/// Illustrative home-automation control tool for the `i` agent. Side
/// effectful and approval-gated: flipping a real device is exactly the
/// kind of sensitive operation spec §1 calls out HITL for.
pub struct ControlDeviceTool;

#[async_trait]
impl Tool for ControlDeviceTool {
    fn name(&self) -> &str {
        "control_device"
    }
    fn description(&self) -> &str {
        "Turns a home-automation device on or off."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "device": {"type": "string"},
                "state": {"type": "string"},
            },
            "required": ["device", "state"],
        })
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn side_effectful(&self) -> bool {
        true
    }
    async fn call(&self, arguments: Value, _ctx: &RuntimeContext) -> Result<String, ToolError> {
        let device = arguments["device"].as_str().unwrap_or_default();
        let state = arguments["state"].as_str().unwrap_or_default();
        Ok(format!("{} turned {}", device, state))
    }
}

/// Builds the default three-agent team (`s`, `m`, `i`) with handoff tools
/// wired between every pair. `t` is never constructed, absent from the
/// returned list, per `TeamConfig`'s per-agent enable flags defaulting a
/// configured-but-disabled agent to off.
pub fn build_default_agents() -> Vec<Arc<AgentNode>> {
    let ids = ["s", "m", "i"];
    let memory_store = MemoryStore::new();

    let mut agents = Vec::with_capacity(ids.len());
    for &id in &ids {
        let mut registry = ToolRegistry::new();
        match id {
            "s" => registry.register(Arc::new(WebSearchTool)),
            "m" => {
                registry.register(Arc::new(AddMemoryTool::new(memory_store.clone())));
                registry.register(Arc::new(RecallMemoryTool::new(memory_store.clone())));
            }
            "i" => registry.register(Arc::new(ControlDeviceTool)),
            _ => unreachable!(),
        }
        for &other in &ids {
            if other != id {
                registry.register(Arc::new(HandoffTool::new(other)));
            }
        }

        let system_prompt = match id {
            "s" => "You are the search manager. Use web_search to answer questions that need current information, or hand off to another manager if the request isn't about search.",
            "m" => "You are the memory manager. Use add_memory to remember facts the user shares and recall_memory to retrieve them, or hand off if the request isn't about memory.",
            "i" => "You are the home-automation manager. Use control_device to act on smart-home devices, or hand off if the request isn't about home automation.",
            _ => unreachable!(),
        };

        let invoker = Invoker::new(Arc::new(registry));
        let node = AgentNode::new(id, system_prompt, invoker);
        let node = if id == "m" {
            node.with_recursion_limit(20)
        } else {
            node
        };
        agents.push(Arc::new(node));
    }
    agents
}

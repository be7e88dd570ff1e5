//! Tool Registry & Invoker (spec §4.3, C3).
//!
//! Each tool has a name, argument schema, handler, and two policy flags
//! (`requires_approval`, `side_effectful`). The [`Invoker`] validates
//! arguments against the schema, calls the handler, and converts handler
//! failures into a Tool message the LLM can see and recover from (spec §7).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::llm::ToolDeclaration;
use crate::message::{Message, ToolCallRequest};

/// Per-request values attached to every tool invocation (spec §3 "Runtime Context").
/// Immutable for the duration of a request.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub user_id: String,
    pub thread_id: String,
    pub session_id: Option<String>,
}

/// Error a tool handler can fail with. Never fatal to the request (spec §7);
/// the [`Invoker`] always converts this into a Tool message.
#[derive(Debug, Error, Clone)]
pub enum ToolError {
    #[error("{0}")]
    HandlerFailed(String),
}

/// One kind of human decision a pending tool call can receive (spec §3
/// "Tool Decision").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approve,
    Reject,
    Edit,
}

/// One registered tool: declaration plus policy flags plus handler.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;

    /// Whether invoking this tool must first pass through Approval
    /// Middleware (spec §4.3/§4.4). Defaults to `false`.
    fn requires_approval(&self) -> bool {
        false
    }

    /// Whether this tool performs an effect outside the conversation (spec §4.3).
    fn side_effectful(&self) -> bool {
        false
    }

    /// Decision kinds the Approval Middleware's Review Configuration allows
    /// for this tool. Defaults to `{Approve, Reject}` (spec §4.4 step 2).
    fn allowed_decisions(&self) -> Vec<DecisionKind> {
        vec![DecisionKind::Approve, DecisionKind::Reject]
    }

    /// Executes the tool with validated arguments. Handler failures should be
    /// returned as `Err`, never panicked; the Invoker converts them into a
    /// visible Tool message (spec §7).
    async fn call(&self, arguments: Value, ctx: &RuntimeContext) -> Result<String, ToolError>;
}

/// Looks up tools by name. Built once per agent (its own domain tools plus
/// handoff tools to other enabled agents, spec §4.5) and shared read-only.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Preserves registration order so `declarations()` and prompts that list
    /// tools are stable and match the order agents were configured with.
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Declarations for every registered tool, in registration order: what
    /// the Agent Node passes to the LLM provider (spec §6.2).
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDeclaration {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }
}

/// Minimal required-field validator against a JSON-Schema-shaped
/// `{"required": [...], "properties": {...}}` object. The orchestrator's
/// contract (spec §4.3 "validates arguments against the schema") only needs
/// presence checking to catch malformed tool calls before they reach a
/// handler; full JSON Schema draft support is out of scope for the narrow
/// Tool Registry the spec describes.
fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), String> {
    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    for req in required {
        let Some(key) = req.as_str() else { continue };
        if arguments.get(key).is_none() {
            return Err(format!("missing required argument '{}'", key));
        }
    }
    Ok(())
}

/// Looks up, validates, executes, and converts results/errors into Tool
/// messages (spec §4.3).
pub struct Invoker {
    registry: Arc<ToolRegistry>,
}

impl Invoker {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Invokes `call` and always returns a Tool message, never an error,
    /// per spec §7 ("Tool handler failure... Not fatal"). `agent_id` names
    /// the agent node whose turn this call happened on, used to shape the
    /// error message the way the original system's error-handling middleware
    /// does: `"Error in Manager {agent_id}: {err}"`.
    pub async fn invoke(&self, call: &ToolCallRequest, ctx: &RuntimeContext, agent_id: &str) -> Message {
        let Some(tool) = self.registry.get(&call.name) else {
            return Message::tool(
                format!("Error in Manager {}: unknown tool '{}'", agent_id, call.name),
                call.id.clone(),
                call.name.clone(),
            );
        };

        if let Err(e) = validate_arguments(&tool.input_schema(), &call.arguments) {
            return Message::tool(
                format!("Error in Manager {}: {}", agent_id, e),
                call.id.clone(),
                call.name.clone(),
            );
        }

        match tool.call(call.arguments.clone(), ctx).await {
            Ok(result) => Message::tool(result, call.id.clone(), call.name.clone()),
            Err(e) => Message::tool(
                format!("Error in Manager {}: {}", agent_id, e),
                call.id.clone(),
                call.name.clone(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes the 'text' argument"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
        }
        async fn call(&self, arguments: Value, _ctx: &RuntimeContext) -> Result<String, ToolError> {
            Ok(arguments["text"].as_str().unwrap_or_default().to_string())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn call(&self, _arguments: Value, _ctx: &RuntimeContext) -> Result<String, ToolError> {
            Err(ToolError::HandlerFailed("boom".to_string()))
        }
    }

    fn ctx() -> RuntimeContext {
        RuntimeContext {
            user_id: "u1".to_string(),
            thread_id: "t1".to_string(),
            session_id: None,
        }
    }

    #[tokio::test]
    async fn unknown_tool_produces_tool_message_not_fatal_error() {
        let invoker = Invoker::new(Arc::new(ToolRegistry::new()));
        let call = ToolCallRequest::new("call_1", "missing_tool", serde_json::json!({}));
        let msg = invoker.invoke(&call, &ctx(), "m").await;
        match msg {
            Message::Tool { content, tool_call_id, tool_name } => {
                assert!(content.contains("unknown tool"));
                assert_eq!(tool_call_id, "call_1");
                assert_eq!(tool_name, "missing_tool");
            }
            _ => panic!("expected Tool message"),
        }
    }

    #[tokio::test]
    async fn missing_required_argument_is_caught_before_handler_runs() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let invoker = Invoker::new(Arc::new(registry));
        let call = ToolCallRequest::new("call_1", "echo", serde_json::json!({}));
        let msg = invoker.invoke(&call, &ctx(), "s").await;
        assert!(msg.content().contains("missing required argument"));
    }

    #[tokio::test]
    async fn successful_call_returns_handler_output() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let invoker = Invoker::new(Arc::new(registry));
        let call = ToolCallRequest::new("call_1", "echo", serde_json::json!({"text": "hi"}));
        let msg = invoker.invoke(&call, &ctx(), "s").await;
        assert_eq!(msg.content(), "hi");
    }

    #[tokio::test]
    async fn handler_failure_becomes_tool_message_the_llm_can_see() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool));
        let invoker = Invoker::new(Arc::new(registry));
        let call = ToolCallRequest::new("call_1", "failing", serde_json::json!({}));
        let msg = invoker.invoke(&call, &ctx(), "m").await;
        assert!(msg.content().contains("Error in Manager m"));
        assert!(msg.content().contains("boom"));
    }

    #[test]
    fn declarations_preserve_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(FailingTool));
        let decls = registry.declarations();
        assert_eq!(decls[0].name, "echo");
        assert_eq!(decls[1].name, "failing");
    }
}

//! Drives the default three-agent team through one full turn that requires
//! human approval, using a scripted LLM so the example runs without an API
//! key. Mirrors the suspend/resume cycle `conclave-serve` exposes over HTTP.
//!
//! Run: `cargo run -p conclave-examples --example team_chat`

use std::sync::Arc;

use conclave::llm::{MockChatProvider, RouteDecision, ScriptedTurn};
use conclave::team::builtin_tools::build_default_agents;
use conclave::{AgentTeam, GraphExecutor, InMemoryCheckpointStore, StreamEvent, ToolDecision};

#[tokio::main]
async fn main() {
    let provider = MockChatProvider::new(vec![
        ScriptedTurn::tool_call("c1", "add_memory", serde_json::json!({"content": "I like coffee"})),
        ScriptedTurn::text("Got it, I'll remember that."),
    ])
    .with_routes(vec![RouteDecision {
        target_agent: "m".to_string(),
        reason: "the user is sharing a personal fact".to_string(),
    }]);

    let team = Arc::new(AgentTeam::new(build_default_agents()));
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let executor = GraphExecutor::new(team, Arc::new(provider), checkpoints);

    let ctx = conclave::team::RuntimeContext {
        user_id: "demo-user".to_string(),
        thread_id: "demo-thread".to_string(),
        session_id: None,
    };

    let (tx, mut rx) = tokio::sync::mpsc::channel(32);
    executor
        .start("demo-thread", "remember that I like coffee", ctx.clone(), tx)
        .await
        .expect("start");

    while let Some(event) = rx.recv().await {
        print_event(&event);
    }

    println!("-- resuming with approval --");
    let (tx, mut rx) = tokio::sync::mpsc::channel(32);
    executor
        .resume("demo-thread", vec![ToolDecision::Approve], ctx, tx)
        .await
        .expect("resume");

    while let Some(event) = rx.recv().await {
        print_event(&event);
    }
}

fn print_event(event: &StreamEvent) {
    match event.to_value() {
        Ok(v) => println!("{v}"),
        Err(e) => eprintln!("could not render event: {e}"),
    }
}

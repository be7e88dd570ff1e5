//! End-to-end tests of the HTTP/SSE gateway against a real listener (spec §6.1).
//!
//! Mirrors spec §8's scenarios (S1, S3, S6) but drives them through the
//! gateway's wire protocol instead of calling `GraphExecutor` directly, so a
//! regression in request/response marshalling or SSE framing is caught here
//! even when the executor's own tests still pass.

use std::sync::Arc;

use conclave::llm::{MockChatProvider, RouteDecision, ScriptedTurn};
use conclave::team::builtin_tools::build_default_agents;
use conclave::{AgentTeam, InMemoryCheckpointStore};
use conclave_serve::AppState;

async fn spawn_gateway(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = conclave_serve::router(Arc::new(state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn team_with(ids: &[&str]) -> Arc<AgentTeam> {
    let agents: Vec<_> = build_default_agents()
        .into_iter()
        .filter(|a| ids.contains(&a.id.as_str()))
        .collect();
    Arc::new(AgentTeam::new(agents))
}

#[tokio::test]
async fn liveness_probe_reports_ok() {
    let state = AppState::new(
        team_with(&["s"]),
        Arc::new(MockChatProvider::new(vec![])),
        Arc::new(InMemoryCheckpointStore::new()),
        5,
    );
    let base = spawn_gateway(state).await;

    let resp = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["agent_initialized"], true);
}

#[tokio::test]
async fn chat_stream_s1_simple_routing_ends_in_done() {
    let provider = MockChatProvider::new(vec![
        ScriptedTurn::tool_call("c1", "web_search", serde_json::json!({"query": "weather in Seoul"})),
        ScriptedTurn::text("It's sunny in Seoul."),
    ])
    .with_routes(vec![RouteDecision {
        target_agent: "s".to_string(),
        reason: "weather request".to_string(),
    }]);
    let state = AppState::new(
        team_with(&["s", "m"]),
        Arc::new(provider),
        Arc::new(InMemoryCheckpointStore::new()),
        5,
    );
    let base = spawn_gateway(state).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/chat/stream"))
        .json(&serde_json::json!({
            "message": "search for weather in Seoul",
            "thread_id": "t1",
            "user_id": "u1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();

    assert!(body.contains("\"type\":\"router_decision\""));
    assert!(body.contains("\"type\":\"agent_start\""));
    assert!(body.contains("\"type\":\"done\""));

    let state_resp = reqwest::get(format!("{base}/state/t1")).await.unwrap();
    let state_json: serde_json::Value = state_resp.json().await.unwrap();
    assert_eq!(state_json["status"], "done");
    assert_eq!(state_json["state"]["last_active_manager"], "s");
}

#[tokio::test]
async fn chat_stream_s3_suspends_then_resume_approve_completes() {
    let provider = MockChatProvider::new(vec![
        ScriptedTurn::tool_call("c1", "add_memory", serde_json::json!({"content": "I like coffee"})),
        ScriptedTurn::text("Got it."),
    ])
    .with_routes(vec![RouteDecision {
        target_agent: "m".to_string(),
        reason: "memory request".to_string(),
    }]);
    let state = AppState::new(
        team_with(&["m"]),
        Arc::new(provider),
        Arc::new(InMemoryCheckpointStore::new()),
        5,
    );
    let base = spawn_gateway(state).await;
    let client = reqwest::Client::new();

    let first = client
        .post(format!("{base}/chat/stream"))
        .json(&serde_json::json!({
            "message": "remember that I like coffee",
            "thread_id": "t2",
        }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(first.contains("\"type\":\"interrupt\""));
    assert!(!first.contains("\"type\":\"done\""));

    let mid_state: serde_json::Value = client
        .get(format!("{base}/state/t2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mid_state["status"], "interrupted");
    assert_eq!(mid_state["has_interrupt"], true);

    let resumed = client
        .post(format!("{base}/chat/resume"))
        .json(&serde_json::json!({
            "thread_id": "t2",
            "decisions": [{"type": "approve"}],
        }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(resumed.contains("\"type\":\"done\""));

    let final_state: serde_json::Value = client
        .get(format!("{base}/state/t2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(final_state["status"], "done");
    assert_eq!(final_state["has_interrupt"], false);
}

#[tokio::test]
async fn state_for_unknown_thread_is_404() {
    let state = AppState::new(
        team_with(&["s"]),
        Arc::new(MockChatProvider::new(vec![])),
        Arc::new(InMemoryCheckpointStore::new()),
        5,
    );
    let base = spawn_gateway(state).await;

    let resp = reqwest::get(format!("{base}/state/nope")).await.unwrap();
    assert_eq!(resp.status(), 404);
}

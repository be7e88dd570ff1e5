//! Route handlers for the four endpoints spec §6.1 names.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use conclave::team::RuntimeContext;
use conclave_protocol::StreamEvent;

use crate::state::AppState;

const DEFAULT_USER_ID: &str = "default_user";
/// Matches [`conclave::team::GraphExecutor`]'s internal channel sizing: large
/// enough that a fast producer never blocks on a slow SSE consumer within one
/// request's worth of events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// `GET /` liveness probe (spec §6.1).
pub async fn liveness(State(state): State<Arc<AppState>>) -> Json<Value> {
    let _ = &state;
    Json(serde_json::json!({"status": "ok", "agent_initialized": true}))
}

/// `POST /chat/stream` body (spec §6.1).
#[derive(Debug, Deserialize)]
pub struct ChatStreamRequest {
    pub message: String,
    pub thread_id: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    pub session_id: Option<String>,
}

/// `POST /chat/resume` body (spec §6.1). `decisions` uses the wire shape
/// spec §6.1 specifies literally, which differs from
/// [`conclave::ToolDecision`]'s internal shape only in the `edit` variant
/// (`edited_action: {name, args}` on the wire vs. flat `edited_name`/
/// `edited_args` internally); [`WireToolDecision::into_decision`] bridges it.
#[derive(Debug, Deserialize)]
pub struct ChatResumeRequest {
    pub thread_id: String,
    pub decisions: Vec<WireToolDecision>,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    pub session_id: Option<String>,
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireToolDecision {
    Approve,
    Reject { message: String },
    Edit { edited_action: EditedAction },
}

#[derive(Debug, Deserialize)]
pub struct EditedAction {
    pub name: String,
    pub args: Value,
}

impl WireToolDecision {
    fn into_decision(self) -> conclave::ToolDecision {
        match self {
            WireToolDecision::Approve => conclave::ToolDecision::Approve,
            WireToolDecision::Reject { message } => conclave::ToolDecision::Reject { message },
            WireToolDecision::Edit { edited_action } => conclave::ToolDecision::Edit {
                edited_name: edited_action.name,
                edited_args: edited_action.args,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn sse_stream(
    rx: mpsc::Receiver<StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx).map(|ev| {
        let data = ev.to_value().unwrap_or_else(|e| {
            serde_json::json!({"type": "error", "error": format!("serialization failure: {e}")})
        });
        Ok(Event::default().data(data.to_string()))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// `POST /chat/stream` (spec §6.1): starts or continues a thread, streaming
/// every [`StreamEvent`] as one SSE `data:` line each. Terminates on `done`,
/// `interrupt`, or `error` (the executor's task exits and drops the sender).
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatStreamRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let ctx = RuntimeContext {
        user_id: body.user_id,
        thread_id: body.thread_id.clone(),
        session_id: body.session_id,
    };
    let executor = state.executor();
    tokio::spawn(async move {
        if let Err(e) = executor.start(&body.thread_id, body.message, ctx, tx.clone()).await {
            let _ = tx
                .send(StreamEvent::Error {
                    error: e.to_string(),
                    traceback: None,
                })
                .await;
        }
    });
    sse_stream(rx)
}

/// `POST /chat/resume` (spec §6.1): resumes a suspended thread with the
/// client's decisions. Identical SSE stream semantics to `chat_stream`.
pub async fn chat_resume(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatResumeRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let decisions: Vec<_> = body.decisions.into_iter().map(WireToolDecision::into_decision).collect();
    let ctx = RuntimeContext {
        user_id: body.user_id,
        thread_id: body.thread_id.clone(),
        session_id: body.session_id,
    };
    let executor = state.executor();
    tokio::spawn(async move {
        if let Err(e) = executor.resume(&body.thread_id, decisions, ctx, tx.clone()).await {
            let _ = tx
                .send(StreamEvent::Error {
                    error: e.to_string(),
                    traceback: None,
                })
                .await;
        }
    });
    sse_stream(rx)
}

/// `GET /state/:thread_id` (spec §6.1). Non-streaming.
pub async fn thread_state(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> axum::response::Response {
    let executor = state.executor();
    match executor.inspect(&thread_id).await {
        Ok(Some(view)) => Json(view).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("unknown thread id '{}'", thread_id),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody { error: e.to_string() }),
        )
            .into_response(),
    }
}

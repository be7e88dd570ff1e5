//! `conclave` CLI: a thin SSE client for manually exercising a running
//! `conclave-serve` gateway (spec §6.1). Send a message, watch events stream
//! to the terminal, and supply human-in-the-loop decisions.

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use thiserror::Error;

use conclave_cli::{approve_decision, edit_decision, format_event, reject_decision, SseFrameReader};

const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8080";

#[derive(Parser, Debug)]
#[command(name = "conclave")]
#[command(about = "Thin SSE client for a running conclave-serve gateway")]
struct Args {
    /// Gateway base URL (default http://127.0.0.1:8080 or CONCLAVE_GATEWAY_URL)
    #[arg(long, value_name = "URL", env = "CONCLAVE_GATEWAY_URL")]
    gateway: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message on a thread and stream the resulting events.
    Chat {
        /// User message to send.
        message: String,
        /// Thread to send on (continues an existing conversation, or starts one).
        #[arg(long, value_name = "ID")]
        thread_id: String,
        #[arg(long, value_name = "ID", default_value = "default_user")]
        user_id: String,
    },
    /// Resume a suspended thread with one human-in-the-loop decision.
    Resume {
        #[arg(long, value_name = "ID")]
        thread_id: String,
        #[command(subcommand)]
        decision: Decision,
    },
    /// Fetch the current state of a thread (no streaming).
    State {
        #[arg(value_name = "ID")]
        thread_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum Decision {
    /// Approve the pending tool call as-is.
    Approve,
    /// Reject the pending tool call with a message back to the agent.
    Reject { message: String },
    /// Approve the pending tool call with edited arguments (JSON object).
    Edit { name: String, args: String },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway returned {status}: {body}")]
    GatewayError { status: reqwest::StatusCode, body: String },
    #[error("edited args were not valid JSON: {0}")]
    InvalidArgsJson(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let args = Args::parse();
    let base = args.gateway.unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());
    let client = reqwest::Client::new();

    match args.cmd {
        Command::Chat {
            message,
            thread_id,
            user_id,
        } => {
            let body = serde_json::json!({"message": message, "thread_id": thread_id, "user_id": user_id});
            stream_chat(&client, &format!("{base}/chat/stream"), body).await?;
        }
        Command::Resume { thread_id, decision } => {
            let decision = match decision {
                Decision::Approve => approve_decision(),
                Decision::Reject { message } => reject_decision(message),
                Decision::Edit { name, args } => edit_decision(name, serde_json::from_str(&args)?),
            };
            let body = serde_json::json!({"thread_id": thread_id, "decisions": [decision]});
            stream_chat(&client, &format!("{base}/chat/resume"), body).await?;
        }
        Command::State { thread_id } => {
            let resp = client.get(format!("{base}/state/{thread_id}")).send().await?;
            let status = resp.status();
            let text = resp.text().await?;
            if !status.is_success() {
                return Err(Box::new(CliError::GatewayError { status, body: text }));
            }
            let value: serde_json::Value = serde_json::from_str(&text)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

/// POSTs `body` and prints one formatted line per SSE frame as it arrives.
async fn stream_chat(client: &reqwest::Client, url: &str, body: serde_json::Value) -> Result<(), CliError> {
    let resp = client.post(url).json(&body).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(CliError::GatewayError { status, body: text });
    }

    let mut reader = SseFrameReader::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let text = String::from_utf8_lossy(&chunk);
        for frame in reader.push(&text) {
            match serde_json::from_str::<serde_json::Value>(&frame) {
                Ok(event) => {
                    let line = format_event(&event);
                    if !line.is_empty() {
                        println!("{line}");
                    }
                }
                Err(e) => eprintln!("could not parse event frame: {e}"),
            }
        }
    }
    Ok(())
}

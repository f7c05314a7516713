//! Browser-facing service for `specify`.
//!
//! Serves a small HTML page plus a JSON API that runs whitelisted
//! subcommands and keeps a bounded history of recent invocations.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use super::{find_invalid_arg, SpecifyOutcome, SpecifySubcommand};
use crate::state::{HistoryEntry, SpeckitState};

#[derive(Debug, Serialize)]
struct CommandInfo {
    name: &'static str,
    description: &'static str,
    args: &'static [&'static str],
}

const COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "init",
        description: "Initialize a new Specify project from the latest template",
        args: &["path (optional)"],
    },
    CommandInfo {
        name: "check",
        description: "Check that all required tools are installed",
        args: &[],
    },
    CommandInfo {
        name: "version",
        description: "Display version and system information",
        args: &[],
    },
];

/// 400 with an `{"error": ...}` body.
fn bad_request(message: impl Into<String>) -> Response {
    let message = message.into();
    tracing::debug!("Rejected spec-kit request: {}", message);
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

pub fn router(state: SpeckitState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/commands", get(commands_handler))
        .route("/api/process", post(process_handler))
        .route("/api/history", get(history_handler))
        .route("/api/history/:index", get(history_item_handler))
        .route("/api/clear-history", post(clear_history_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html(include_str!("../../static/speckit.html"))
}

async fn commands_handler() -> Json<Value> {
    Json(json!({ "commands": COMMANDS }))
}

/// Parse `args` from the request body: absent means none.
fn parse_args(value: Option<&Value>) -> Result<Vec<String>, Response> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(bad_request("args must be an array")),
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(String::from)
                .ok_or_else(|| bad_request("Each arg must be a string"))
        })
        .collect()
}

/// POST /api/process
async fn process_handler(
    State(state): State<SpeckitState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body @ Value::Object(_))) => body,
        _ => return bad_request("Request body must be JSON"),
    };

    let command = body
        .get("command")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();
    if command.is_empty() {
        return bad_request("Command is required");
    }

    let sub: SpecifySubcommand = match command.parse() {
        Ok(sub) => sub,
        Err(e) => return bad_request(e.to_string()),
    };

    let args = match parse_args(body.get("args")) {
        Ok(args) => args,
        Err(response) => return response,
    };
    if let Some(arg) = find_invalid_arg(&args) {
        return bad_request(format!("Invalid characters in argument: {}", arg));
    }

    let outcome = state.runner.run(sub, &args).await;

    let mut history = state.history.lock().await;
    history.push(HistoryEntry {
        timestamp: Utc::now(),
        command,
        args,
        result: outcome.clone(),
    });
    tracing::debug!(retained = history.len(), "Recorded spec-kit invocation");
    drop(history);

    Json::<SpecifyOutcome>(outcome).into_response()
}

/// GET /api/history
async fn history_handler(State(state): State<SpeckitState>) -> Json<Value> {
    let history = state.history.lock().await.snapshot();
    Json(json!({ "history": history }))
}

/// GET /api/history/:index
async fn history_item_handler(
    State(state): State<SpeckitState>,
    Path(index): Path<usize>,
) -> Response {
    let history = state.history.lock().await;
    match history.get(index) {
        Some(entry) => Json(entry.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response(),
    }
}

/// POST /api/clear-history
async fn clear_history_handler(State(state): State<SpeckitState>) -> Json<Value> {
    state.history.lock().await.clear();
    tracing::info!("Spec-kit history cleared");
    Json(json!({ "success": true, "message": "History cleared" }))
}

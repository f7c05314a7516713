//! HTTP surface of the command gateway.
//!
//! A non-zero exit from the executed command is still a 200. Only gateway
//! failures (bad input, denial, timeout, I/O) map to error statuses.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::executor::{ExecError, ExecutionResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ExecRequest {
    #[serde(default)]
    pub cmd: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub server: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandsResponse {
    pub commands: Vec<String>,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("no cmd provided")]
    Validation,

    #[error("DENIED: {0} not in allowlist")]
    Denied(String),

    #[error("command timeout")]
    Timeout,

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl From<ExecError> for GatewayError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Empty => GatewayError::Validation,
            ExecError::Denied(cmd) => GatewayError::Denied(cmd),
            ExecError::Timeout(_) => GatewayError::Timeout,
            ExecError::Io(e) => GatewayError::Io(e),
        }
    }
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation => StatusCode::BAD_REQUEST,
            GatewayError::Denied(_) => StatusCode::FORBIDDEN,
            GatewayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let GatewayError::Io(e) = &self {
            tracing::error!("Gateway I/O failure: {}", e);
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/health", get(health_handler))
        .route("/commands", get(commands_handler))
        .route("/exec", post(exec_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        server: state.server_name.to_string(),
    })
}

/// GET /commands
async fn commands_handler(
    State(state): State<AppState>,
) -> Result<Json<CommandsResponse>, GatewayError> {
    let allowlist = state.executor.allowlist().await?;
    Ok(Json(CommandsResponse {
        commands: allowlist.entries().to_vec(),
    }))
}

/// POST /exec
///
/// The body is parsed as JSON whatever the `Content-Type` says.
async fn exec_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ExecutionResult>, GatewayError> {
    let request = match serde_json::from_slice::<ExecRequest>(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("Rejected /exec body: {}", e);
            ExecRequest::default()
        }
    };

    let cmd = request.cmd.unwrap_or_default();
    if cmd.is_empty() {
        tracing::debug!("Rejected /exec without cmd");
        return Err(GatewayError::Validation);
    }

    let result = state.executor.execute(&cmd).await?;
    Ok(Json(result))
}

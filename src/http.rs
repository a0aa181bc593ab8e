//! HTTP server exposing the code runner.
//!
//! `POST /api/run-code` answers `200 {"output": ...}` on success and
//! `400 {"error": ...}` for every kind of failure.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::backend::ExecutionBackend;
use crate::language::Language;
use crate::runner::{CodeRunner, ExecutionRequest};

/// Request body for `POST /api/run-code`.
///
/// Fields are optional so that missing values produce our own 400 message
/// rather than a deserialisation rejection.
#[derive(Debug, Default, Deserialize)]
pub struct RunCodeBody {
    pub code: Option<String>,
    pub language: Option<String>,
    /// Fed to the program's stdin.
    pub input: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunCodeResponse {
    pub output: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub languages: Vec<&'static str>,
    pub timeout_seconds: u64,
}

/// Shared handler state. The runner is built once at startup and injected here.
pub struct AppState<B> {
    pub runner: Arc<CodeRunner<B>>,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
        }
    }
}

/// Build the application router.
pub fn router<B: ExecutionBackend + 'static>(runner: Arc<CodeRunner<B>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/run-code", post(run_code::<B>))
        .route("/api/health", get(health::<B>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { runner })
}

async fn run_code<B: ExecutionBackend + 'static>(
    State(state): State<AppState<B>>,
    payload: Result<Json<RunCodeBody>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected run-code body");
            return bad_request(rejection.body_text());
        }
    };

    let request = match ExecutionRequest::new(body.code, body.language, body.input) {
        Ok(request) => request,
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "Invalid run-code request");
            return bad_request(e.to_string());
        }
    };

    info!(
        language = %request.language,
        code_len = request.code.len(),
        stdin_len = request.stdin.len(),
        "Executing code"
    );

    match state.runner.run(&request).await {
        Ok(out) => (
            StatusCode::OK,
            Json(RunCodeResponse {
                output: out.output,
                truncated: out.truncated,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Code execution error");
            bad_request(e.to_string())
        }
    }
}

async fn health<B: ExecutionBackend + 'static>(
    State(state): State<AppState<B>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        languages: Language::ALL.iter().map(|l| l.as_str()).collect(),
        timeout_seconds: state.runner.timeout().as_secs(),
    })
}

fn bad_request(error: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
}

/// Bind and serve until Ctrl-C or SIGTERM.
pub async fn serve<B: ExecutionBackend + 'static>(
    addr: SocketAddr,
    runner: Arc<CodeRunner<B>>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(addr = %listener.local_addr()?, "Starting HTTP server");

    axum::serve(listener, router(runner))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("Shutdown signal received, draining connections");
}

//! HTTP surface for the two document tools.

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ragdocs_core::Error;
use ragdocs_query::{DocumentTools, RetrieveRequest};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
struct RetrieveResponse {
    context: String,
}

#[derive(Debug, Serialize)]
struct FilesResponse {
    files: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// Routes: `POST /query`, `GET /files`, `GET /health`.
pub fn router(tools: Arc<DocumentTools>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/query", post(query_handler))
        .route("/files", get(files_handler))
        .with_state(tools)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    bind: &str,
    tools: Arc<DocumentTools>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!("Tool API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(tools))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn query_handler(
    State(tools): State<Arc<DocumentTools>>,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, ApiError> {
    let context = tools.retrieve_text(&request).await.map_err(api_error)?;
    Ok(Json(RetrieveResponse { context }))
}

async fn files_handler(
    State(tools): State<Arc<DocumentTools>>,
) -> Result<Json<FilesResponse>, ApiError> {
    let files = tools.search_file_name().await.map_err(api_error)?;
    Ok(Json(FilesResponse { files }))
}

fn api_error(err: Error) -> ApiError {
    let status = match err {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("Request failed: {err}");
    }
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_is_bad_request() {
        let (status, body) = api_error(Error::InvalidInput("prompt must not be empty".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.0.error.contains("prompt"));
    }

    #[test]
    fn test_other_errors_are_internal() {
        let (status, _) = api_error(Error::Other("boom".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

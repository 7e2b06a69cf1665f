//! HTTP exposure of the RPC entry point
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/transfer` | Transfer through `server.default_gateway` |
//! | `POST` | `/gateways/{name}/transfer` | Transfer through a named RPC gateway |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Request and response bodies are [`RpcRequest`] and [`RpcResponse`].
//! Errors follow one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Gateway 'x' does not accept RPC transfers" } }
//! ```

use crate::core::{Edi, RpcRequest, RpcResponse};
use crate::domain::EdiError;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

impl From<EdiError> for AppError {
    fn from(err: EdiError) -> Self {
        match &err {
            EdiError::NotFound(_) => not_found(err.to_string()),
            EdiError::User(_) | EdiError::Validation(_) => bad_request(err.to_string()),
            EdiError::Configuration(_) => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "configuration",
                message: err.to_string(),
            },
            _ => {
                tracing::error!(error = %err, "RPC transfer failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: err.to_string(),
                }
            }
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn transfer(
    edi: &Edi,
    gateway: Option<&str>,
    body: Result<Json<RpcRequest>, JsonRejection>,
) -> Result<Json<RpcResponse>, AppError> {
    let Json(request) = body.map_err(|e| bad_request(e.body_text()))?;
    if let Some(name) = gateway {
        if edi.config().gateway(name).is_none() {
            return Err(not_found(format!("Unknown gateway '{name}'")));
        }
    }
    let response = edi.rpc_transfer(gateway, request).await?;
    tracing::info!(
        documents = response.docs.len(),
        issues = response.errors.len(),
        "RPC transfer handled"
    );
    Ok(Json(response))
}

async fn handle_default_transfer(
    State(edi): State<Edi>,
    body: Result<Json<RpcRequest>, JsonRejection>,
) -> Result<Json<RpcResponse>, AppError> {
    transfer(&edi, None, body).await
}

async fn handle_gateway_transfer(
    State(edi): State<Edi>,
    Path(name): Path<String>,
    body: Result<Json<RpcRequest>, JsonRejection>,
) -> Result<Json<RpcResponse>, AppError> {
    transfer(&edi, Some(&name), body).await
}

/// Routes of the RPC server
pub fn router(edi: Edi) -> Router {
    Router::new()
        .route("/transfer", post(handle_default_transfer))
        .route("/gateways/{name}/transfer", post(handle_gateway_transfer))
        .route("/health", get(handle_health))
        .with_state(edi)
}

/// Serves the RPC routes on `listener` until `shutdown` turns true
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections
pub async fn serve(
    edi: Edi,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "RPC server listening");
    axum::serve(listener, router(edi))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            tracing::info!("RPC server shutting down");
        })
        .await?;
    Ok(())
}

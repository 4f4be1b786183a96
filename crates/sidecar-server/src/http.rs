//! HTTP transport

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::rpc::Dispatcher;

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/rpc", post(rpc_endpoint))
        .route("/health", get(health))
        .route("/ping", get(ping))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

/// Raw body so unparseable JSON still gets a JSON-RPC parse error
async fn rpc_endpoint(State(dispatcher): State<Arc<Dispatcher>>, body: Bytes) -> Response {
    let (status, response) = dispatcher.handle(&body).await;
    (status, Json(response)).into_response()
}

async fn health(State(dispatcher): State<Arc<Dispatcher>>) -> Response {
    match dispatcher.call("health_check", None).await {
        Ok(result) => {
            let status = if result["status"] == "healthy" {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Json(result)).into_response()
        }
        Err(e) => (e.status(), Json(Value::String(e.message))).into_response(),
    }
}

async fn ping(State(dispatcher): State<Arc<Dispatcher>>) -> Response {
    match dispatcher.call("ping", None).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => (e.status(), Json(Value::String(e.message))).into_response(),
    }
}

async fn metrics(State(dispatcher): State<Arc<Dispatcher>>) -> Response {
    match dispatcher.services().metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "metrics rendering failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

//! Gateway HTTP server.
//!
//! # Responsibilities
//! - Create the Axum Router for the capability API
//! - Wire up middleware (tracing, body limit, request ID)
//! - Translate HTTP bodies into dispatcher calls and results back
//!
//! # Endpoints
//! - `POST /v1/capabilities/{capability}`: best server
//! - `POST /v1/capabilities/{capability}/parallel`: all matching servers
//! - `POST /v1/capabilities/{capability}/failover`: rank-ordered fallback
//! - `POST /v1/servers/{server_id}/messages`: direct send

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::schema::ListenerConfig;
use crate::directory::ServerPool;
use crate::dispatch::{CallOptions, Dispatcher};
use crate::routing::Requirements;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub servers: Arc<ServerPool>,
}

/// Per-call options as sent over HTTP.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CallOptionsBody {
    pub timeout_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub requirements: Option<Requirements>,
    pub max_servers: Option<usize>,
}

impl From<CallOptionsBody> for CallOptions {
    fn from(body: CallOptionsBody) -> Self {
        CallOptions {
            timeout: body.timeout_ms.map(Duration::from_millis),
            retry_attempts: body.retry_attempts,
            retry_delay: body.retry_delay_ms.map(Duration::from_millis),
            requirements: body.requirements,
            max_servers: body.max_servers,
        }
    }
}

/// Body of the capability endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CapabilityRequest {
    pub params: Value,
    pub options: CallOptionsBody,
}

/// Body of the direct send endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MessageRequest {
    pub message: Value,
    pub options: CallOptionsBody,
}

/// HTTP server for the capability gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, config: &ListenerConfig) -> Self {
        Self {
            router: Self::build_router(state, config),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState, config: &ListenerConfig) -> Router {
        Router::new()
            .route("/v1/capabilities/{capability}", post(execute_capability))
            .route("/v1/capabilities/{capability}/parallel", post(execute_parallel))
            .route("/v1/capabilities/{capability}/failover", post(execute_failover))
            .route("/v1/servers/{server_id}/messages", post(send_message))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.max_body_bytes))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Gateway server stopped");
        Ok(())
    }
}

async fn execute_capability(
    State(state): State<AppState>,
    Path(capability): Path<String>,
    Json(body): Json<CapabilityRequest>,
) -> Response {
    let options = CallOptions::from(body.options);
    match state
        .dispatcher
        .execute_capability(&capability, body.params, &options)
        .await
    {
        Ok(result) => Json(json!({ "result": result })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn execute_parallel(
    State(state): State<AppState>,
    Path(capability): Path<String>,
    Json(body): Json<CapabilityRequest>,
) -> Response {
    let options = CallOptions::from(body.options);
    let outcomes = state
        .dispatcher
        .execute_capability_parallel(&capability, body.params, &options)
        .await;
    Json(json!({ "outcomes": outcomes })).into_response()
}

async fn execute_failover(
    State(state): State<AppState>,
    Path(capability): Path<String>,
    Json(body): Json<CapabilityRequest>,
) -> Response {
    let options = CallOptions::from(body.options);
    match state
        .dispatcher
        .execute_capability_with_failover(&capability, body.params, &options)
        .await
    {
        Ok(result) => Json(json!({ "result": result })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn send_message(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
    Json(body): Json<MessageRequest>,
) -> Response {
    let options = CallOptions::from(body.options);
    match state
        .dispatcher
        .send_message(&server_id, body.message, &options)
        .await
    {
        Ok(result) => Json(json!({ "result": result })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_body_converts_units() {
        let body: CapabilityRequest = serde_json::from_value(json!({
            "params": {"q": "rust"},
            "options": {
                "timeout_ms": 1500,
                "retry_attempts": 1,
                "requirements": {"labels": {"region": "eu"}},
                "max_servers": 2
            }
        }))
        .unwrap();

        let options = CallOptions::from(body.options);
        assert_eq!(options.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(options.retry_attempts, Some(1));
        assert_eq!(options.retry_delay, None);
        assert_eq!(options.max_servers, Some(2));
        assert_eq!(
            options.requirements,
            Some(Requirements::default().with_label("region", "eu"))
        );
        assert_eq!(body.params, json!({"q": "rust"}));
    }

    #[test]
    fn empty_body_is_valid() {
        let body: CapabilityRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(body.params, Value::Null);
        assert_eq!(CallOptions::from(body.options), CallOptions::default());
    }
}

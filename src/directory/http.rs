//! HTTP delivery of messages to configured servers.
//!
//! Each message is POSTed as JSON to the server's URL and the JSON response
//! body is returned. Non-2xx statuses, connection errors and undecodable
//! bodies are transport failures. There is no timeout here; the executor
//! supplies the deadline.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::Value;
use std::sync::Arc;

use crate::directory::pool::ServerPool;
use crate::directory::ServerDirectory;
use crate::error::TransportError;

/// Upper bound on a buffered response body.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// [`ServerDirectory`] backed by the configured [`ServerPool`] and an HTTP client.
#[derive(Clone)]
pub struct HttpDirectory {
    pool: Arc<ServerPool>,
    client: Client<HttpConnector, Body>,
    max_response_bytes: usize,
}

impl HttpDirectory {
    pub fn new(pool: Arc<ServerPool>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            pool,
            client,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    pub fn with_max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }

    pub fn pool(&self) -> &Arc<ServerPool> {
        &self.pool
    }
}

#[async_trait]
impl ServerDirectory for HttpDirectory {
    fn is_reachable(&self, server_id: &str) -> bool {
        self.pool.is_reachable(server_id)
    }

    async fn send(&self, server_id: &str, message: &Value) -> Result<Value, TransportError> {
        let server = self
            .pool
            .get(server_id)
            .ok_or_else(|| TransportError::new(format!("unknown server {server_id}")))?;

        let payload = serde_json::to_vec(message)
            .map_err(|e| TransportError::new(format!("failed to encode message: {e}")))?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(server.url.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .body(Body::from(payload))
            .map_err(|e| TransportError::new(format!("failed to build request: {e}")))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| TransportError::new(format!("connection error: {e}")))?;

        let status = response.status();
        let bytes = axum::body::to_bytes(Body::new(response.into_body()), self.max_response_bytes)
            .await
            .map_err(|e| TransportError::new(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(TransportError::new(format!(
                "server responded {status}: {}",
                String::from_utf8_lossy(&bytes)
            )));
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| TransportError::new(format!("invalid JSON response: {e}")))
    }
}

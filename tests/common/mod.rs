//! Shared utilities for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;

use capability_proxy::dispatch::{Dispatcher, DispatcherSettings};
use capability_proxy::resilience::RetryPolicy;
use capability_proxy::routing::{CapabilityMatcher, Requirements};
use capability_proxy::{ServerDirectory, TransportError};

/// How a scripted server answers a send.
#[derive(Clone)]
pub enum Script {
    /// Echo the message back as `{"server": id, "echo": message}`.
    Echo,
    /// Fail every send with a transport error.
    Fail,
    /// Fail the first `n` sends, then echo.
    FailTimes(u32),
    /// Never answer.
    Hang,
    /// Echo after a delay.
    Delay(Duration),
}

#[derive(Debug, Clone)]
pub struct SendRecord {
    pub server_id: String,
    pub at: Instant,
}

/// In-memory [`ServerDirectory`] with per-server behaviour.
#[derive(Default)]
pub struct ScriptedDirectory {
    scripts: Mutex<HashMap<String, Script>>,
    unreachable: Mutex<Vec<String>>,
    counts: Mutex<HashMap<String, u32>>,
    log: Mutex<Vec<SendRecord>>,
}

impl ScriptedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, server_id: &str, script: Script) -> Self {
        self.set(server_id, script);
        self
    }

    pub fn set(&self, server_id: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(server_id.to_string(), script);
    }

    pub fn mark_unreachable(&self, server_id: &str) {
        self.unreachable.lock().unwrap().push(server_id.to_string());
    }

    /// Server ids in the order sends reached them.
    pub fn sends(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.server_id.clone())
            .collect()
    }

    pub fn records(&self) -> Vec<SendRecord> {
        self.log.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

#[async_trait]
impl ServerDirectory for ScriptedDirectory {
    fn is_reachable(&self, server_id: &str) -> bool {
        self.scripts.lock().unwrap().contains_key(server_id)
            && !self.unreachable.lock().unwrap().iter().any(|s| s == server_id)
    }

    async fn send(&self, server_id: &str, message: &Value) -> Result<Value, TransportError> {
        self.log.lock().unwrap().push(SendRecord {
            server_id: server_id.to_string(),
            at: Instant::now(),
        });
        let seen = {
            let mut counts = self.counts.lock().unwrap();
            let count = counts.entry(server_id.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(server_id)
            .cloned()
            .ok_or_else(|| TransportError::new(format!("unknown server {server_id}")))?;

        let echo = json!({ "server": server_id, "echo": message });
        match script {
            Script::Echo => Ok(echo),
            Script::Fail => Err(TransportError::new("connection refused")),
            Script::FailTimes(n) if seen <= n => Err(TransportError::new("connection reset")),
            Script::FailTimes(_) => Ok(echo),
            Script::Hang => std::future::pending::<Result<Value, TransportError>>().await,
            Script::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(echo)
            }
        }
    }
}

/// Matcher returning a fixed ranking per capability.
#[derive(Default)]
pub struct FixedMatcher {
    rankings: HashMap<String, Vec<String>>,
}

impl FixedMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: &str, servers: &[&str]) -> Self {
        self.rankings.insert(
            capability.to_string(),
            servers.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

impl CapabilityMatcher for FixedMatcher {
    fn find_servers(&self, capability: &str, _requirements: Option<&Requirements>) -> Vec<String> {
        self.rankings.get(capability).cloned().unwrap_or_default()
    }
}

/// Settings with the documented defaults: threshold 5, reset 60s,
/// 3 attempts, 1000ms base delay, 30s timeout.
pub fn default_settings() -> DispatcherSettings {
    DispatcherSettings {
        failure_threshold: 5,
        reset_timeout: Duration::from_secs(60),
        policy: RetryPolicy {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        },
        event_buffer: 64,
    }
}

pub fn dispatcher(
    matcher: FixedMatcher,
    directory: Arc<ScriptedDirectory>,
) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(
        Arc::new(matcher),
        directory,
        default_settings(),
    ))
}

/// Start an axum capability server on an ephemeral port.
///
/// `respond` receives the request count (1-based) and the posted JSON.
pub async fn start_programmable_server<F, Fut>(respond: F) -> SocketAddr
where
    F: Fn(u32, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (StatusCode, Value)> + Send + 'static,
{
    struct Backend<F> {
        respond: F,
        calls: AtomicU32,
    }

    async fn handle<F, Fut>(
        State(backend): State<Arc<Backend<F>>>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>)
    where
        F: Fn(u32, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = (StatusCode, Value)> + Send + 'static,
    {
        let n = backend.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let (status, value) = (backend.respond)(n, body).await;
        (status, Json(value))
    }

    let backend = Arc::new(Backend {
        respond,
        calls: AtomicU32::new(0),
    });
    let app = Router::new()
        .route("/", post(handle::<F, Fut>))
        .route("/health", axum::routing::get(|| async { "ok" }))
        .with_state(backend);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// A capability server that echoes the posted message under its name.
pub async fn start_echo_server(name: &'static str) -> SocketAddr {
    start_programmable_server(move |_, body| async move {
        (StatusCode::OK, json!({ "server": name, "echo": body }))
    })
    .await
}

/// Start a router on an ephemeral port and return its address.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every server's health path
//! - Update server reachability based on results

use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;
use url::Url;

use crate::config::HealthCheckConfig;
use crate::directory::{Server, ServerPool};
use crate::observability::metrics;

pub struct HealthMonitor {
    servers: Arc<ServerPool>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthMonitor {
    pub fn new(servers: Arc<ServerPool>, config: HealthCheckConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            servers,
            config,
            client,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    pub async fn check_all(&self) {
        for server in self.servers.all() {
            let healthy = self.probe(server).await;

            let changed = if healthy {
                server.mark_success(self.config.healthy_threshold as usize)
            } else {
                server.mark_failure(self.config.unhealthy_threshold as usize)
            };
            if changed {
                tracing::info!(server_id = %server.id, state = server.health().as_str(), "Server reachability changed");
            }

            metrics::record_server_reachable(&server.id, server.is_reachable());
        }
    }

    async fn probe(&self, server: &Server) -> bool {
        let uri = match health_url(&server.url, &self.config.path) {
            Some(uri) => uri,
            None => {
                tracing::error!(server_id = %server.id, path = %self.config.path, "Invalid health check path");
                return false;
            }
        };

        let request = match Request::builder()
            .method("GET")
            .uri(uri.as_str())
            .header("user-agent", "capability-proxy-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(server_id = %server.id, error = %e, "Failed to build health check request");
                return false;
            }
        };

        let timeout = Duration::from_secs(self.config.timeout_secs);
        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(server_id = %server.id, status = %response.status(), "Health check failed: non-success status");
                }
                success
            }
            Ok(Err(e)) => {
                tracing::warn!(server_id = %server.id, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(server_id = %server.id, "Health check failed: timeout");
                false
            }
        }
    }
}

/// Health endpoint on the server's origin.
fn health_url(server_url: &Url, path: &str) -> Option<Url> {
    server_url.join(path).ok()
}

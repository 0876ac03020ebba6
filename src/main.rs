//! Capability proxy binary.
//!
//! ```text
//!     Client ──▶ gateway (http) ──▶ dispatcher ──▶ matcher (routing)
//!                                       │
//!                                       ├─▶ breakers + retries (resilience)
//!                                       ├─▶ request tracker (dispatch)
//!                                       ▼
//!                                   directory ──▶ capability servers
//!
//!     Operator ──▶ admin API ──▶ dispatcher (stats, cancel, breakers)
//!     health monitor ──▶ directory reachability
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use capability_proxy::admin;
use capability_proxy::config::{load_config, ProxyConfig};
use capability_proxy::directory::{HttpDirectory, ServerPool};
use capability_proxy::dispatch::{Dispatcher, DispatcherSettings};
use capability_proxy::health::HealthMonitor;
use capability_proxy::http::{AppState, HttpServer};
use capability_proxy::lifecycle::{wait_for_signal, Shutdown};
use capability_proxy::observability::{logging, metrics};
use capability_proxy::routing::StaticMatcher;

#[derive(Parser)]
#[command(name = "capability-proxy")]
#[command(about = "Capability-routing request proxy", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "CAPABILITY_PROXY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "capability-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        servers = config.servers.len(),
        failure_threshold = config.breaker.failure_threshold,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let pool = Arc::new(ServerPool::from_config(&config.servers));
    let directory = Arc::new(HttpDirectory::new(pool.clone()));
    let matcher = Arc::new(StaticMatcher::new(pool.clone()));
    let dispatcher = Arc::new(Dispatcher::new(
        matcher,
        directory,
        DispatcherSettings::from_config(&config),
    ));
    let state = AppState {
        dispatcher: dispatcher.clone(),
        servers: pool.clone(),
    };

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    let monitor = HealthMonitor::new(pool.clone(), config.health_check.clone());
    tasks.push(tokio::spawn(monitor.run(shutdown.subscribe())));

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let admin_state = state.clone();
        let rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = admin::run_admin(admin_state, listener, rx).await {
                tracing::error!(error = %e, "Admin server failed");
            }
        }));
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let gateway = HttpServer::new(state, &config.listener);
    let rx = shutdown.subscribe();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = gateway.run(listener, rx).await {
            tracing::error!(error = %e, "Gateway server failed");
        }
    }));

    wait_for_signal().await;
    shutdown.trigger();
    let cancelled = dispatcher.cancel_all();
    tracing::info!(cancelled, "Shutting down");

    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

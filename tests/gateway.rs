//! End-to-end tests: gateway and admin API over real HTTP capability servers.

use axum::http::StatusCode;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use capability_proxy::admin::setup_admin_router;
use capability_proxy::config::schema::HealthCheckConfig;
use capability_proxy::config::{ProxyConfig, ServerConfig};
use capability_proxy::directory::{HttpDirectory, ServerPool};
use capability_proxy::dispatch::{Dispatcher, DispatcherSettings};
use capability_proxy::health::HealthMonitor;
use capability_proxy::http::{AppState, HttpServer};
use capability_proxy::routing::StaticMatcher;

mod common;

fn server(id: &str, addr: SocketAddr, capabilities: &[&str], priority: i32) -> ServerConfig {
    ServerConfig {
        id: id.to_string(),
        url: format!("http://{addr}/"),
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        labels: BTreeMap::new(),
        priority,
    }
}

struct Proxy {
    gateway: String,
    admin: String,
    pool: Arc<ServerPool>,
    client: reqwest::Client,
}

async fn start_proxy(servers: Vec<ServerConfig>) -> Proxy {
    let mut config = ProxyConfig::default();
    config.servers = servers;
    config.retries.max_attempts = 1;
    config.retries.base_delay_ms = 10;
    config.timeouts.request_secs = 5;

    let pool = Arc::new(ServerPool::from_config(&config.servers));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(StaticMatcher::new(pool.clone())),
        Arc::new(HttpDirectory::new(pool.clone())),
        DispatcherSettings::from_config(&config),
    ));
    let state = AppState {
        dispatcher,
        servers: pool.clone(),
    };

    let gateway = common::serve(HttpServer::new(state.clone(), &config.listener).router()).await;
    let admin = common::serve(setup_admin_router(state)).await;

    Proxy {
        gateway: format!("http://{gateway}"),
        admin: format!("http://{admin}"),
        pool,
        client: reqwest::Client::builder().no_proxy().build().unwrap(),
    }
}

async fn failing_server() -> SocketAddr {
    common::start_programmable_server(|_, _| async {
        (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"}))
    })
    .await
}

#[tokio::test]
async fn capability_call_reaches_best_server() {
    let low = common::start_echo_server("low").await;
    let high = common::start_echo_server("high").await;
    let proxy = start_proxy(vec![
        server("low", low, &["search"], 1),
        server("high", high, &["search"], 10),
    ])
    .await;

    let res = proxy
        .client
        .post(format!("{}/v1/capabilities/search", proxy.gateway))
        .json(&json!({"params": {"q": "rust"}}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["result"]["server"], "high");
    assert_eq!(
        body["result"]["echo"],
        json!({"capability": "search", "params": {"q": "rust"}})
    );
}

#[tokio::test]
async fn unknown_capability_is_service_unavailable() {
    let a = common::start_echo_server("a").await;
    let proxy = start_proxy(vec![server("a", a, &["search"], 0)]).await;

    let res = proxy
        .client
        .post(format!("{}/v1/capabilities/translate", proxy.gateway))
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 503);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "no_server_available");
}

#[tokio::test]
async fn server_error_maps_to_bad_gateway() {
    let bad = failing_server().await;
    let proxy = start_proxy(vec![server("bad", bad, &["search"], 0)]).await;

    let res = proxy
        .client
        .post(format!("{}/v1/capabilities/search", proxy.gateway))
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "transport_error");
}

#[tokio::test]
async fn failover_falls_through_to_healthy_server() {
    let bad = failing_server().await;
    let good = common::start_echo_server("good").await;
    let proxy = start_proxy(vec![
        server("bad", bad, &["search"], 10),
        server("good", good, &["search"], 0),
    ])
    .await;

    let res = proxy
        .client
        .post(format!("{}/v1/capabilities/search/failover", proxy.gateway))
        .json(&json!({"params": {}}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["result"]["server"], "good");
}

#[tokio::test]
async fn parallel_returns_outcome_records() {
    let bad = failing_server().await;
    let good = common::start_echo_server("good").await;
    let proxy = start_proxy(vec![
        server("bad", bad, &["search"], 10),
        server("good", good, &["search"], 0),
    ])
    .await;

    let res = proxy
        .client
        .post(format!("{}/v1/capabilities/search/parallel", proxy.gateway))
        .json(&json!({"params": {}}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    let outcomes = body["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0]["server_id"], "bad");
    assert_eq!(outcomes[0]["success"], false);
    assert!(outcomes[0]["error"].is_string());
    assert_eq!(outcomes[1]["server_id"], "good");
    assert_eq!(outcomes[1]["success"], true);
    assert_eq!(outcomes[1]["result"]["server"], "good");
}

#[tokio::test]
async fn direct_message_is_passed_through() {
    let a = common::start_echo_server("a").await;
    let proxy = start_proxy(vec![server("a", a, &["search"], 0)]).await;

    let res = proxy
        .client
        .post(format!("{}/v1/servers/a/messages", proxy.gateway))
        .json(&json!({"message": {"op": "ping"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["result"]["echo"], json!({"op": "ping"}));

    let res = proxy
        .client
        .post(format!("{}/v1/servers/ghost/messages", proxy.gateway))
        .json(&json!({"message": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);
}

#[tokio::test]
async fn admin_reports_and_resets_breakers() {
    let bad = failing_server().await;
    let proxy = start_proxy(vec![server("bad", bad, &["search"], 0)]).await;

    for _ in 0..5 {
        let res = proxy
            .client
            .post(format!("{}/v1/servers/bad/messages", proxy.gateway))
            .json(&json!({"message": {}}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 502);
    }

    let res = proxy
        .client
        .post(format!("{}/v1/servers/bad/messages", proxy.gateway))
        .json(&json!({"message": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "circuit_open");

    let breaker: Value = proxy
        .client
        .get(format!("{}/admin/breakers/bad", proxy.admin))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(breaker["state"], "open");
    assert_eq!(breaker["failure_count"], 5);

    let stats: Value = proxy
        .client
        .get(format!("{}/admin/stats", proxy.admin))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_requests"], 5);
    assert_eq!(stats["open_breakers"], 1);
    assert_eq!(stats["in_flight"], 0);

    let reset: Value = proxy
        .client
        .post(format!("{}/admin/breakers/bad/reset", proxy.admin))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reset["state"], "closed");
    assert_eq!(reset["failure_count"], 0);

    let all: Value = proxy
        .client
        .get(format!("{}/admin/breakers", proxy.admin))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all, json!([]));
}

#[tokio::test]
async fn admin_lists_servers_and_rejects_unknown_cancel() {
    let a = common::start_echo_server("a").await;
    let proxy = start_proxy(vec![server("a", a, &["search", "index"], 3)]).await;

    let status: Value = proxy
        .client
        .get(format!("{}/admin/status", proxy.admin))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "operational");

    let servers: Value = proxy
        .client
        .get(format!("{}/admin/servers", proxy.admin))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(servers[0]["id"], "a");
    assert_eq!(servers[0]["capabilities"], json!(["search", "index"]));
    assert_eq!(servers[0]["priority"], 3);
    assert_eq!(servers[0]["breaker"], "closed");

    let requests: Value = proxy
        .client
        .get(format!("{}/admin/requests", proxy.admin))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(requests, json!([]));

    let res = proxy
        .client
        .delete(format!("{}/admin/requests/req-1-0-00000000", proxy.admin))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn health_monitor_removes_dead_servers_from_rotation() {
    let dead = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let alive = common::start_echo_server("alive").await;
    let proxy = start_proxy(vec![
        server("dead", dead, &["search"], 10),
        server("alive", alive, &["search"], 0),
    ])
    .await;

    let monitor = HealthMonitor::new(
        proxy.pool.clone(),
        HealthCheckConfig {
            enabled: true,
            interval_secs: 1,
            timeout_secs: 1,
            path: "/health".into(),
            unhealthy_threshold: 1,
            healthy_threshold: 1,
        },
    );
    monitor.check_all().await;

    assert!(!proxy.pool.is_reachable("dead"));
    assert!(proxy.pool.is_reachable("alive"));

    let res = proxy
        .client
        .post(format!("{}/v1/capabilities/search", proxy.gateway))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["result"]["server"], "alive");
}

//! Minimal capability server for trying the proxy locally.
//!
//! ```text
//! cargo run --example echo_server -- 127.0.0.1:9001 echo-1
//! cargo run -- --config demos/proxy.toml
//! curl -X POST localhost:8080/v1/capabilities/echo -H 'content-type: application/json' \
//!      -d '{"params": {"hello": "world"}}'
//! ```

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let addr: SocketAddr = args
        .next()
        .unwrap_or_else(|| "127.0.0.1:9001".to_string())
        .parse()?;
    let name = args.next().unwrap_or_else(|| "echo-1".to_string());

    let app = Router::new()
        .route(
            "/",
            post(move |Json(message): Json<Value>| async move {
                Json(json!({ "server": name, "echo": message }))
            }),
        )
        .route("/health", get(|| async { "ok" }));

    println!("Echo server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use tokio::time::Instant;

use crate::dispatch::{InFlightRequest, ProxyStats};
use crate::http::server::AppState;
use crate::resilience::{BreakerStatus, CircuitState};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct BreakerView {
    pub server_id: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_ms_ago: Option<u64>,
    pub retry_in_ms: Option<u64>,
}

impl BreakerView {
    pub fn new(server_id: String, status: BreakerStatus) -> Self {
        let now = Instant::now();
        Self {
            server_id,
            state: status.state,
            failure_count: status.failure_count,
            last_failure_ms_ago: status
                .last_failure_time
                .map(|t| now.saturating_duration_since(t).as_millis() as u64),
            retry_in_ms: status
                .next_retry_time
                .map(|t| t.saturating_duration_since(now).as_millis() as u64),
        }
    }
}

#[derive(Serialize)]
pub struct ServerStatus {
    pub id: String,
    pub url: String,
    pub capabilities: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub priority: i32,
    pub health: &'static str,
    pub breaker: CircuitState,
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn get_stats(State(state): State<AppState>) -> Json<ProxyStats> {
    Json(state.dispatcher.stats())
}

pub async fn get_requests(State(state): State<AppState>) -> Json<Vec<InFlightRequest>> {
    Json(state.dispatcher.in_flight_requests())
}

pub async fn cancel_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Response {
    if state.dispatcher.cancel_request(&request_id) {
        Json(json!({ "request_id": request_id, "cancelled": true })).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "request_id": request_id, "cancelled": false })),
        )
            .into_response()
    }
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerView>> {
    let views = state
        .dispatcher
        .circuit_breakers()
        .into_iter()
        .map(|(server_id, status)| BreakerView::new(server_id, status))
        .collect();
    Json(views)
}

pub async fn get_breaker(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
) -> Json<BreakerView> {
    let status = state.dispatcher.circuit_breaker_status(&server_id);
    Json(BreakerView::new(server_id, status))
}

pub async fn reset_breaker(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
) -> Json<BreakerView> {
    state.dispatcher.reset_circuit_breaker(&server_id);
    let status = state.dispatcher.circuit_breaker_status(&server_id);
    Json(BreakerView::new(server_id, status))
}

pub async fn get_servers(State(state): State<AppState>) -> Json<Vec<ServerStatus>> {
    let statuses = state
        .servers
        .all()
        .iter()
        .map(|s| ServerStatus {
            id: s.id.clone(),
            url: s.url.to_string(),
            capabilities: s.capabilities.clone(),
            labels: s.labels.clone(),
            priority: s.priority,
            health: s.health().as_str(),
            breaker: state.dispatcher.circuit_breaker_status(&s.id).state,
        })
        .collect();
    Json(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn breaker_view_reports_relative_times() {
        let failed_at = Instant::now();
        tokio::time::advance(Duration::from_secs(2)).await;
        let status = BreakerStatus {
            state: CircuitState::Open,
            failure_count: 5,
            last_failure_time: Some(failed_at),
            next_retry_time: Some(failed_at + Duration::from_secs(60)),
        };

        let view = BreakerView::new("a".into(), status);
        assert_eq!(view.last_failure_ms_ago, Some(2000));
        assert_eq!(view.retry_in_ms, Some(58_000));
    }
}

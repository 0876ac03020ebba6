//! Mapping of dispatch errors onto HTTP responses.
//!
//! | error                           | status |
//! |---------------------------------|--------|
//! | NoServerAvailable               | 503    |
//! | CircuitOpen                     | 503    |
//! | Timeout                         | 504    |
//! | Transport                       | 502    |
//! | Cancelled                       | 499    |
//! | AllFailoverAttemptsExhausted    | 502    |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::ProxyError;

/// Non-standard "client closed request" status.
const CLIENT_CLOSED_REQUEST: u16 = 499;

pub fn status_for(error: &ProxyError) -> StatusCode {
    match error {
        ProxyError::NoServerAvailable { .. } | ProxyError::CircuitOpen { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ProxyError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ProxyError::Transport { .. } | ProxyError::AllFailoverAttemptsExhausted { .. } => {
            StatusCode::BAD_GATEWAY
        }
        ProxyError::Cancelled { .. } => {
            StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST)
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

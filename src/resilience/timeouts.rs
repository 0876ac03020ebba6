//! Deadline and cancellation enforcement for a single attempt.
//!
//! A pending send resolves with whichever comes first: the server's answer,
//! the attempt deadline, or the caller's cancellation token. Cancellation is
//! cooperative; a message already delivered to the server is not recalled.

use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{ProxyError, TransportError};

/// Settled state of one bounded attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    Completed(Result<Value, TransportError>),
    TimedOut,
    Cancelled,
}

/// Race `send` against `timeout` and `cancel`.
pub async fn bounded<F>(send: F, timeout: Duration, cancel: &CancellationToken) -> AttemptOutcome
where
    F: Future<Output = Result<Value, TransportError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => AttemptOutcome::Cancelled,
        res = tokio::time::timeout(timeout, send) => match res {
            Ok(result) => AttemptOutcome::Completed(result),
            Err(_) => AttemptOutcome::TimedOut,
        },
    }
}

/// Sleep for `delay` unless cancelled first. Returns false on cancellation.
pub async fn cancellable_sleep(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

impl AttemptOutcome {
    /// Convert into the dispatcher's error space.
    pub fn into_result(
        self,
        server_id: &str,
        request_id: &str,
        timeout: Duration,
    ) -> Result<Value, ProxyError> {
        match self {
            AttemptOutcome::Completed(Ok(value)) => Ok(value),
            AttemptOutcome::Completed(Err(source)) => Err(ProxyError::Transport {
                server_id: server_id.to_string(),
                source,
            }),
            AttemptOutcome::TimedOut => Err(ProxyError::Timeout {
                server_id: server_id.to_string(),
                timeout,
            }),
            AttemptOutcome::Cancelled => Err(ProxyError::Cancelled {
                request_id: request_id.to_string(),
            }),
        }
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check server ids are unique and urls parse as plain http
//! - Validate value ranges (thresholds, attempts, timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("servers[{index}]: id must not be empty")]
    EmptyServerId { index: usize },

    #[error("servers: duplicate id '{0}'")]
    DuplicateServerId(String),

    #[error("server '{id}': invalid url '{url}'")]
    InvalidServerUrl { id: String, url: String },

    #[error("server '{id}': unsupported url scheme '{scheme}' (only http)")]
    UnsupportedScheme { id: String, scheme: String },

    #[error("server '{0}': capability names must not be empty")]
    EmptyCapability(String),

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }
    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    let mut seen = HashSet::new();
    for (index, server) in config.servers.iter().enumerate() {
        if server.id.trim().is_empty() {
            errors.push(ValidationError::EmptyServerId { index });
            continue;
        }
        if !seen.insert(server.id.as_str()) {
            errors.push(ValidationError::DuplicateServerId(server.id.clone()));
        }
        match Url::parse(&server.url) {
            Ok(url) if url.scheme() != "http" => {
                errors.push(ValidationError::UnsupportedScheme {
                    id: server.id.clone(),
                    scheme: url.scheme().to_string(),
                });
            }
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::InvalidServerUrl {
                id: server.id.clone(),
                url: server.url.clone(),
            }),
        }
        if server.capabilities.iter().any(|c| c.trim().is_empty()) {
            errors.push(ValidationError::EmptyCapability(server.id.clone()));
        }
    }

    let positives = [
        ("breaker.failure_threshold", config.breaker.failure_threshold as u64),
        ("breaker.reset_timeout_secs", config.breaker.reset_timeout_secs),
        ("retries.max_attempts", config.retries.max_attempts as u64),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("observability.event_buffer", config.observability.event_buffer as u64),
    ];
    for (field, value) in positives {
        if value == 0 {
            errors.push(ValidationError::MustBePositive(field));
        }
    }

    if config.health_check.enabled {
        let checks = [
            ("health_check.interval_secs", config.health_check.interval_secs),
            ("health_check.timeout_secs", config.health_check.timeout_secs),
            ("health_check.unhealthy_threshold", config.health_check.unhealthy_threshold as u64),
            ("health_check.healthy_threshold", config.health_check.healthy_threshold as u64),
        ];
        for (field, value) in checks {
            if value == 0 {
                errors.push(ValidationError::MustBePositive(field));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rates finite and positive, durations > 0)
//! - Check the bind and metrics addresses are socket addresses
//! - Check trusted CORS origins are usable header values
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::config::schema::AppConfig;

/// Longest accepted idle sweep period (one day).
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 86_400;

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g. `rate_limit.burst`).
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }

    let rate_limit = &config.rate_limit;
    if !rate_limit.requests_per_second.is_finite() || rate_limit.requests_per_second <= 0.0 {
        errors.push(ValidationError::new(
            "rate_limit.requests_per_second",
            "must be a finite number greater than 0",
        ));
    }
    if rate_limit.burst == 0 {
        errors.push(ValidationError::new("rate_limit.burst", "must be at least 1"));
    }
    if !(1..=MAX_SWEEP_INTERVAL_SECS).contains(&rate_limit.sweep_interval_secs) {
        errors.push(ValidationError::new(
            "rate_limit.sweep_interval_secs",
            format!("must be between 1 and {MAX_SWEEP_INTERVAL_SECS}"),
        ));
    }
    if rate_limit.idle_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.idle_timeout_secs",
            "must be greater than 0",
        ));
    }

    if config.shutdown.timeout_secs == 0 {
        errors.push(ValidationError::new("shutdown.timeout_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    for origin in &config.cors.trusted_origins {
        if origin.is_empty() || origin == "*" || HeaderValue::from_str(origin).is_err() {
            errors.push(ValidationError::new(
                "cors.trusted_origins",
                format!("{origin:?} is not a valid origin"),
            ));
        }
    }

    if config.observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "{:?} is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

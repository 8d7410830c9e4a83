//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, header names and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TrackerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::{StoreKind, TrackerConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("tracking.header_name: {0:?} is not a valid HTTP header name")]
    InvalidHeaderName(String),

    #[error("store.directory must be set when store.kind = \"file\"")]
    MissingStoreDirectory,

    #[error("upstream.request_timeout_secs must be greater than zero")]
    ZeroTimeout,
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &TrackerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address("listener.bind_address", &config.listener.bind_address, &mut errors);
    check_address("upstream.address", &config.upstream.address, &mut errors);
    if config.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    if HeaderName::from_bytes(config.tracking.header_name.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeaderName(
            config.tracking.header_name.clone(),
        ));
    }

    if config.store.kind == StoreKind::File && config.store.directory.trim().is_empty() {
        errors.push(ValidationError::MissingStoreDirectory);
    }

    if config.upstream.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

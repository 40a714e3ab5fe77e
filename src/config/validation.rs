//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (waits > 0, idle sleep within max wait)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::ServiceConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("worker.thread_name must not be empty")]
    EmptyThreadName,

    #[error("worker.max_wait_ms must be greater than zero")]
    ZeroMaxWait,

    #[error("worker.idle_sleep_ms must be greater than zero")]
    ZeroIdleSleep,

    #[error("worker.idle_sleep_ms ({idle_ms}) exceeds worker.max_wait_ms ({max_ms})")]
    IdleSleepExceedsMaxWait { idle_ms: u64, max_ms: u64 },

    #[error("transport.max_connections must be greater than zero")]
    ZeroConnections,

    #[error("transport.connect_timeout_secs must be greater than zero")]
    ZeroConnectTimeout,

    #[error("observability.log_level `{0}` is not one of trace, debug, info, warn, error")]
    UnknownLogLevel(String),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let worker = &config.worker;

    if worker.thread_name.trim().is_empty() {
        errors.push(ValidationError::EmptyThreadName);
    }
    if worker.max_wait_ms == 0 {
        errors.push(ValidationError::ZeroMaxWait);
    }
    if worker.idle_sleep_ms == 0 {
        errors.push(ValidationError::ZeroIdleSleep);
    }
    if worker.max_wait_ms > 0 && worker.idle_sleep_ms > worker.max_wait_ms {
        errors.push(ValidationError::IdleSleepExceedsMaxWait {
            idle_ms: worker.idle_sleep_ms,
            max_ms: worker.max_wait_ms,
        });
    }

    if config.transport.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }
    if config.transport.connect_timeout_secs == 0 {
        errors.push(ValidationError::ZeroConnectTimeout);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
//! Error types for the adaptive rate limiting engine

use thiserror::Error;

/// Failures raised by engine construction and the engine's external
/// collaborators.
///
/// Apart from [`EngineError::Config`], none of these reach the caller of
/// [`IntelligentRateLimiter::intelligent_rate_limit`](crate::engine::IntelligentRateLimiter::intelligent_rate_limit);
/// they are logged and turned into a degraded decision.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Base limiter error: {0}")]
    BaseLimiter(String),

    #[error("Rate limit stats unavailable: {0}")]
    Stats(String),

    #[error("System load sampling failed: {0}")]
    LoadSample(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Invalid engine configuration: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EngineError>;

// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Adaptive Rate Limiter
//!
//! This crate wraps a fixed-policy rate limiter with a threat-aware
//! decision layer that only ever tightens the base verdict:
//!
//! - Threat intelligence (suspicious, bot and trusted IPs, geo risk)
//! - Per-client behavior tracking with bot detection
//! - Four-level threat assessment
//! - Adaptive quota scaling from latency, error rate and host load
//! - Forced lockouts for critical and high threat traffic
//! - Background intelligence refresh, pattern sweep and load sampling

pub mod behavior;
pub mod cache;
pub mod config;
pub mod engine;
pub mod enhancer;
pub mod error;
pub mod handlers;
pub mod intel;
pub mod limiter;
pub mod load;
pub mod maintenance;
pub mod metrics;
pub mod multiplier;
pub mod ports;
pub mod threat;

pub use cache::MemoryCache;
pub use config::Config;
pub use engine::{IntelligenceAnalytics, IntelligentRateLimiter};
pub use enhancer::RateLimitDecision;
pub use error::{EngineError, Result};
pub use limiter::TokenBucketLimiter;
pub use ports::{BaseRateLimiter, BaseVerdict, MultiplierCache};
pub use threat::{RequestContext, ThreatLevel};

// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Final decision assembly.
//!
//! Combines the base limiter verdict with the threat level and adaptive
//! multiplier. A base denial is never turned into an allow.

use crate::config::AdaptiveRateLimitConfig;
use crate::ports::BaseVerdict;
use crate::threat::ThreatLevel;
use serde::Serialize;
use std::collections::BTreeMap;

pub const HEADER_REASON: &str = "X-RateLimit-Reason";
pub const HEADER_THREAT_LEVEL: &str = "X-RateLimit-ThreatLevel";
pub const HEADER_MULTIPLIER: &str = "X-RateLimit-Adaptive-Multiplier";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";
pub const HEADER_DEGRADED: &str = "X-RateLimit-Degraded";

/// Final, request-scoped rate limit decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Seconds to wait before retrying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    pub headers: BTreeMap<String, String>,
    pub threat_level: ThreatLevel,
    pub multiplier: f64,
}

impl RateLimitDecision {
    /// Pass a base verdict through untouched apart from the threat level.
    pub fn from_base(base: BaseVerdict, threat_level: ThreatLevel) -> Self {
        Self {
            allowed: base.allowed,
            remaining: base.remaining,
            retry_after: base.retry_after,
            headers: base.headers,
            threat_level,
            multiplier: 1.0,
        }
    }

    /// Why the request was blocked by the intelligent layer, if it was.
    pub fn reason(&self) -> Option<&str> {
        self.headers.get(HEADER_REASON).map(String::as_str)
    }
}

/// Whether the intelligent layer blocks outright.
fn should_block(level: ThreatLevel, multiplier: f64, config: &AdaptiveRateLimitConfig) -> bool {
    if !config.intelligent_blocking {
        return false;
    }
    match level {
        ThreatLevel::Critical => true,
        ThreatLevel::High => multiplier < config.scoring.high_threat_block_below,
        _ => false,
    }
}

/// Combine the base verdict, threat level and multiplier.
pub fn enhance(
    base: BaseVerdict,
    threat_level: ThreatLevel,
    multiplier: f64,
    config: &AdaptiveRateLimitConfig,
) -> RateLimitDecision {
    if !base.allowed {
        return RateLimitDecision::from_base(base, threat_level);
    }

    let mut decision = RateLimitDecision {
        remaining: (base.remaining as f64 * multiplier).floor() as u32,
        multiplier,
        ..RateLimitDecision::from_base(base, threat_level)
    };

    if should_block(threat_level, multiplier, config) {
        let retry_after = decision
            .retry_after
            .unwrap_or(0)
            .max(config.scoring.min_block_secs);
        decision.allowed = false;
        decision.remaining = 0;
        decision.retry_after = Some(retry_after);
        decision.headers.insert(
            HEADER_REASON.to_string(),
            format!("Blocked due to {threat_level} threat level"),
        );
        decision
            .headers
            .insert(HEADER_RETRY_AFTER.to_string(), retry_after.to_string());
    } else {
        decision
            .headers
            .insert(HEADER_MULTIPLIER.to_string(), format!("{multiplier:.2}"));
    }

    decision
        .headers
        .insert(HEADER_THREAT_LEVEL.to_string(), threat_level.to_string());
    decision
        .headers
        .insert(HEADER_REMAINING.to_string(), decision.remaining.to_string());
    decision
}

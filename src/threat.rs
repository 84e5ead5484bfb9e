// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Threat classification.
//!
//! Combines static intelligence, geo risk, user-agent heuristics and the
//! client's behavior risk score into one additive score, then maps it onto
//! a [`ThreatLevel`]. The score is deliberately left unclamped.

use crate::behavior::BehaviorTracker;
use crate::config::{AdaptiveRateLimitConfig, ScoringWeights};
use crate::intel::ThreatIntelligence;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Case-insensitive tokens that identify automated clients.
const BOT_UA_TOKENS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "scraper",
    "curl",
    "wget",
    "python",
    "php",
    "automated",
    "headless",
];

/// At least one of these is present in every mainstream browser UA.
const BROWSER_UA_TOKENS: &[&str] = &["mozilla", "chrome", "safari", "firefox", "edge", "opera"];

const ATTACK_UA_TOKENS: &[&str] = &[
    "sqlmap",
    "nikto",
    "nmap",
    "masscan",
    "zgrab",
    "acunetix",
    "<script",
    "union select",
    "../",
];

const MIN_UA_LEN: usize = 10;
const MAX_UA_LEN: usize = 500;

/// Threat classification for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Map a raw score onto a level.
    pub fn from_score(score: f64, weights: &ScoringWeights) -> Self {
        if score >= weights.critical_at {
            Self::Critical
        } else if score >= weights.high_at {
            Self::High
        } else if score >= weights.medium_at {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional request metadata. Every field missing means "no signal".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub geo_location: Option<String>,
}

impl RequestContext {
    pub fn with_ip(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            ..Default::default()
        }
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn geo_location(mut self, region: impl Into<String>) -> Self {
        self.geo_location = Some(region.into());
        self
    }
}

/// True if the user agent names a known automation tool.
pub fn is_bot_user_agent(user_agent: &str) -> bool {
    let ua = user_agent.to_lowercase();
    BOT_UA_TOKENS.iter().any(|token| ua.contains(token))
}

/// True if the user agent is implausibly sized, lacks every browser token,
/// or carries an attack signature.
pub fn is_suspicious_user_agent(user_agent: &str) -> bool {
    let len = user_agent.chars().count();
    if !(MIN_UA_LEN..=MAX_UA_LEN).contains(&len) {
        return true;
    }
    let ua = user_agent.to_lowercase();
    if !BROWSER_UA_TOKENS.iter().any(|token| ua.contains(token)) {
        return true;
    }
    ATTACK_UA_TOKENS.iter().any(|token| ua.contains(token))
}

/// Stateless scorer over the engine's intelligence and behavior state.
pub struct ThreatAssessor<'a> {
    config: &'a AdaptiveRateLimitConfig,
}

impl<'a> ThreatAssessor<'a> {
    pub fn new(config: &'a AdaptiveRateLimitConfig) -> Self {
        Self { config }
    }

    /// Raw additive score, before sensitivity scaling.
    pub fn score(
        &self,
        key: &str,
        context: &RequestContext,
        intel: &ThreatIntelligence,
        behavior: &BehaviorTracker,
    ) -> f64 {
        let weights = &self.config.scoring;
        let mut score = 0.0;

        if let Some(ip) = context.ip.as_deref() {
            if intel.is_suspicious(ip) {
                score += weights.suspicious_ip;
            }
            if intel.is_known_bot(ip) {
                score += weights.known_bot_ip;
            }
            if intel.is_trusted(ip) {
                score -= weights.trusted_ip;
            }
        }

        if let Some(region) = context.geo_location.as_deref() {
            score += intel.geo_risk(region);
        }

        if let Some(ua) = context.user_agent.as_deref() {
            if is_bot_user_agent(ua) {
                score += weights.bot_user_agent;
            }
            if is_suspicious_user_agent(ua) {
                score += weights.suspicious_user_agent;
            }
        }

        if let Some(risk) = behavior.risk_score(key) {
            score += risk;
        }

        score
    }

    /// Classify a request. Without any context the request is `Low`.
    pub fn assess(
        &self,
        key: &str,
        context: Option<&RequestContext>,
        intel: &ThreatIntelligence,
        behavior: &BehaviorTracker,
    ) -> ThreatLevel {
        let Some(context) = context else {
            return ThreatLevel::Low;
        };

        let score = self.score(key, context, intel, behavior) * self.config.sensitivity;
        let level = ThreatLevel::from_score(score, &self.config.scoring);
        debug!(key = %key, score, threat_level = %level, "Threat assessed");
        level
    }
}

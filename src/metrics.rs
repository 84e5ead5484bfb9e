// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for the engine.
//!
//! Metrics live in a registry owned by each engine instance, so isolated
//! engines never share counters.

use crate::error::Result;
use crate::threat::ThreatLevel;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct EngineMetrics {
    registry: Registry,
    decisions: IntCounterVec,
    fallbacks: IntCounter,
    forced_denials: IntCounter,
    behavior_patterns: IntGauge,
    suspicious_ips: IntGauge,
}

impl EngineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let decisions = IntCounterVec::new(
            Opts::new("arle_decisions_total", "Rate limit decisions by outcome and threat level"),
            &["outcome", "threat_level"],
        )?;
        let fallbacks = IntCounter::new(
            "arle_fallbacks_total",
            "Decisions that fell back to the base limiter after an internal failure",
        )?;
        let forced_denials = IntCounter::new(
            "arle_forced_denials_total",
            "Requests allowed by the base limiter but denied on threat level",
        )?;
        let behavior_patterns =
            IntGauge::new("arle_behavior_patterns", "Client keys with a tracked behavior pattern")?;
        let suspicious_ips =
            IntGauge::new("arle_suspicious_ips", "Identifiers flagged as suspicious")?;

        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(fallbacks.clone()))?;
        registry.register(Box::new(forced_denials.clone()))?;
        registry.register(Box::new(behavior_patterns.clone()))?;
        registry.register(Box::new(suspicious_ips.clone()))?;

        Ok(Self {
            registry,
            decisions,
            fallbacks,
            forced_denials,
            behavior_patterns,
            suspicious_ips,
        })
    }

    pub fn record_decision(&self, allowed: bool, threat_level: ThreatLevel) {
        let outcome = if allowed { "allowed" } else { "denied" };
        self.decisions
            .with_label_values(&[outcome, threat_level.as_str()])
            .inc();
    }

    pub fn record_fallback(&self) {
        self.fallbacks.inc();
    }

    pub fn record_forced_denial(&self) {
        self.forced_denials.inc();
    }

    pub fn set_behavior_patterns(&self, count: usize) {
        self.behavior_patterns.set(count as i64);
    }

    pub fn set_suspicious_ips(&self, count: usize) {
        self.suspicious_ips.set(count as i64);
    }

    pub fn decisions(&self, allowed: bool, threat_level: ThreatLevel) -> u64 {
        let outcome = if allowed { "allowed" } else { "denied" };
        self.decisions
            .with_label_values(&[outcome, threat_level.as_str()])
            .get()
    }

    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.get()
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

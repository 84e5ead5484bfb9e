// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Adaptive multiplier calculation.
//!
//! The multiplier scales the base limiter's remaining quota. It is the
//! product of a performance part (latency, error rate, CPU, memory) and a
//! threat part, clamped to the configured bounds. The performance part is
//! cached per key and endpoint; the threat part is always applied fresh.

use crate::config::{AdaptiveRateLimitConfig, ScoringWeights};
use crate::error::Result;
use crate::ports::MultiplierCache;
use crate::threat::ThreatLevel;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Latency samples kept for the global average.
pub const MAX_LATENCY_SAMPLES: usize = 1000;

/// How long a computed performance multiplier stays valid.
pub const MULTIPLIER_TTL: Duration = Duration::from_secs(60);

/// Sampled host utilisation, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SystemLoad {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

#[derive(Debug, Clone, Copy)]
struct KeyCounters {
    requests: u64,
    errors: u64,
    last_seen: DateTime<Utc>,
}

/// Observed response performance, global and per key.
#[derive(Debug, Default)]
pub struct PerformanceMetrics {
    response_times: VecDeque<f64>,
    per_key: HashMap<String, KeyCounters>,
    system_load: SystemLoad,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed request for `key`.
    pub fn record_response(&mut self, key: &str, latency_ms: f64, is_error: bool, at: DateTime<Utc>) {
        if latency_ms.is_finite() && latency_ms >= 0.0 {
            self.response_times.push_back(latency_ms);
            while self.response_times.len() > MAX_LATENCY_SAMPLES {
                self.response_times.pop_front();
            }
        }

        let counters = self.per_key.entry(key.to_string()).or_insert(KeyCounters {
            requests: 0,
            errors: 0,
            last_seen: at,
        });
        counters.requests += 1;
        if is_error {
            counters.errors += 1;
        }
        counters.last_seen = at;
    }

    /// Mean latency over the retained samples, 0 when none.
    pub fn average_response_time(&self) -> f64 {
        if self.response_times.is_empty() {
            return 0.0;
        }
        self.response_times.iter().sum::<f64>() / self.response_times.len() as f64
    }

    pub fn sample_count(&self) -> usize {
        self.response_times.len()
    }

    /// Error ratio for a key, 0 when the key has no recorded responses.
    pub fn error_rate(&self, key: &str) -> f64 {
        match self.per_key.get(key) {
            Some(c) if c.requests > 0 => c.errors as f64 / c.requests as f64,
            _ => 0.0,
        }
    }

    pub fn set_system_load(&mut self, load: SystemLoad) {
        self.system_load = load;
    }

    pub fn system_load(&self) -> SystemLoad {
        self.system_load
    }

    /// Drop per-key counters idle for longer than `max_age`.
    pub fn sweep_stale(&mut self, now: DateTime<Utc>, max_age: ChronoDuration) -> usize {
        let cutoff = now - max_age;
        let before = self.per_key.len();
        self.per_key.retain(|_, c| c.last_seen >= cutoff);
        before - self.per_key.len()
    }
}

/// Damping factor for a threat level.
pub fn threat_factor(level: ThreatLevel, weights: &ScoringWeights) -> f64 {
    match level {
        ThreatLevel::Critical => weights.critical_threat_factor,
        ThreatLevel::High => weights.high_threat_factor,
        ThreatLevel::Medium => weights.medium_threat_factor,
        ThreatLevel::Low => 1.0,
    }
}

/// Compounding performance factor for `key`.
pub fn performance_factor(
    config: &AdaptiveRateLimitConfig,
    metrics: &PerformanceMetrics,
    key: &str,
) -> f64 {
    let weights = &config.scoring;
    let thresholds = &config.thresholds;
    let load = metrics.system_load();
    let mut factor = 1.0;

    if metrics.average_response_time() > thresholds.response_time_ms {
        factor *= weights.slow_response_factor;
    }
    if metrics.error_rate(key) > thresholds.error_rate {
        factor *= weights.error_rate_factor;
    }
    if load.cpu_percent > thresholds.cpu_percent {
        factor *= weights.cpu_factor;
    }
    if load.memory_percent > thresholds.memory_percent {
        factor *= weights.memory_factor;
    }
    factor
}

/// Apply the threat factor and clamp.
pub fn combine(base: f64, threat: Option<ThreatLevel>, weights: &ScoringWeights) -> f64 {
    let mut multiplier = base;
    if let Some(level) = threat {
        multiplier *= threat_factor(level, weights);
    }
    if !multiplier.is_finite() {
        multiplier = 1.0;
    }
    multiplier.clamp(weights.min_multiplier, weights.max_multiplier)
}

/// Cache key for a client's performance multiplier on one endpoint.
pub fn cache_key(key: &str, endpoint: &str) -> String {
    format!("adaptive_multiplier:{key}:{endpoint}")
}

/// Computes multipliers, consulting the cache for the performance part.
pub struct MultiplierCalculator<'a> {
    config: &'a AdaptiveRateLimitConfig,
    cache: &'a dyn MultiplierCache,
}

impl<'a> MultiplierCalculator<'a> {
    pub fn new(config: &'a AdaptiveRateLimitConfig, cache: &'a dyn MultiplierCache) -> Self {
        Self { config, cache }
    }

    /// Multiplier for `key` on `endpoint`, always within the configured bounds.
    pub async fn calculate(
        &self,
        key: &str,
        endpoint: &str,
        threat: Option<ThreatLevel>,
        metrics: &RwLock<PerformanceMetrics>,
    ) -> Result<f64> {
        let weights = &self.config.scoring;
        if !self.config.adaptive_throttling {
            return Ok(combine(1.0, None, weights));
        }

        let base = if self.config.performance_scaling {
            let cache_key = cache_key(key, endpoint);
            match self.cache.get(&cache_key).await? {
                Some(cached) => cached,
                None => {
                    let factor = performance_factor(self.config, &*metrics.read().await, key);
                    self.cache.set(&cache_key, factor, MULTIPLIER_TTL).await?;
                    factor
                }
            }
        } else {
            1.0
        };

        let multiplier = combine(base, threat, weights);
        debug!(%key, %endpoint, base, multiplier, "Adaptive multiplier computed");
        Ok(multiplier)
    }
}

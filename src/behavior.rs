// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Per-client behavior tracking.
//!
//! Each client key keeps a rolling window of request timestamps, visited
//! endpoints and derived requests-per-second samples. From these the tracker
//! derives a bot flag and a 0..=100 risk score on every update.

use crate::config::ScoringWeights;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

pub const MAX_FREQUENCY_SAMPLES: usize = 20;
pub const MAX_ENDPOINTS: usize = 50;
pub const MAX_TIMESTAMPS: usize = 100;

/// Timestamps used for the average inter-arrival interval.
const FREQUENCY_WINDOW: usize = 10;
/// Timestamps used for the periodicity check.
const PERIODICITY_WINDOW: usize = 5;
/// Endpoints used for the repetition check.
const REPETITION_WINDOW: usize = 10;
/// Minimum endpoints before diversity counts toward risk.
const DIVERSITY_MIN_SAMPLES: usize = 5;

/// Rolling behavior history for one client key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BehaviorPattern {
    pub request_frequency: VecDeque<f64>,
    pub endpoint_pattern: VecDeque<String>,
    pub timing_pattern: VecDeque<DateTime<Utc>>,
    pub user_agent: Option<String>,
    pub is_bot: bool,
    pub risk_score: f64,
}

/// Aggregate view over all tracked patterns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BehaviorSummary {
    pub total_patterns: usize,
    pub bot_patterns: usize,
    pub average_risk_score: f64,
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, cap: usize) {
    queue.push_back(value);
    while queue.len() > cap {
        queue.pop_front();
    }
}

fn unique_ratio<'a>(endpoints: impl Iterator<Item = &'a String>) -> f64 {
    let mut total = 0usize;
    let mut unique = HashSet::new();
    for endpoint in endpoints {
        total += 1;
        unique.insert(endpoint.as_str());
    }
    if total == 0 {
        1.0
    } else {
        unique.len() as f64 / total as f64
    }
}

impl BehaviorPattern {
    /// Intervals in milliseconds between the newest `window` timestamps.
    fn recent_intervals_ms(&self, window: usize) -> Vec<f64> {
        let skip = self.timing_pattern.len().saturating_sub(window);
        let recent: Vec<_> = self.timing_pattern.iter().skip(skip).collect();
        recent
            .windows(2)
            .map(|pair| (*pair[1] - *pair[0]).num_milliseconds() as f64)
            .collect()
    }

    /// Newest request timestamp.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.timing_pattern.back().copied()
    }

    pub fn peak_frequency(&self) -> f64 {
        self.request_frequency.iter().copied().fold(0.0, f64::max)
    }

    pub fn mean_frequency(&self) -> f64 {
        if self.request_frequency.is_empty() {
            return 0.0;
        }
        self.request_frequency.iter().sum::<f64>() / self.request_frequency.len() as f64
    }

    fn record(&mut self, endpoint: Option<&str>, user_agent: Option<&str>, at: DateTime<Utc>) {
        push_bounded(&mut self.timing_pattern, at, MAX_TIMESTAMPS);

        if let Some(endpoint) = endpoint {
            push_bounded(&mut self.endpoint_pattern, endpoint.to_string(), MAX_ENDPOINTS);
        }
        if let Some(ua) = user_agent {
            self.user_agent = Some(ua.to_string());
        }

        if self.timing_pattern.len() >= 2 {
            let intervals = self.recent_intervals_ms(FREQUENCY_WINDOW);
            let avg = intervals.iter().sum::<f64>() / intervals.len() as f64;
            // Same-millisecond bursts carry no rate information.
            if avg > 0.0 {
                push_bounded(&mut self.request_frequency, 1000.0 / avg, MAX_FREQUENCY_SAMPLES);
            }
        }
    }

    fn detect_bot(&self, weights: &ScoringWeights) -> bool {
        if self.timing_pattern.len() >= PERIODICITY_WINDOW {
            let intervals = self.recent_intervals_ms(PERIODICITY_WINDOW);
            let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
            let variance = intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>()
                / intervals.len() as f64;
            if variance < weights.periodic_variance_ms2 {
                return true;
            }
        }

        if self.mean_frequency() > weights.bot_frequency_rps {
            return true;
        }

        if self.endpoint_pattern.len() >= REPETITION_WINDOW {
            let skip = self.endpoint_pattern.len() - REPETITION_WINDOW;
            if unique_ratio(self.endpoint_pattern.iter().skip(skip))
                < weights.repetitive_endpoint_ratio
            {
                return true;
            }
        }

        false
    }

    fn compute_risk(&self, weights: &ScoringWeights) -> f64 {
        let mut risk = 0.0;
        if self.is_bot {
            risk += weights.bot_behavior_risk;
        }
        risk += (self.peak_frequency() * weights.frequency_risk_per_rps)
            .min(weights.frequency_risk_cap);
        if self.endpoint_pattern.len() >= DIVERSITY_MIN_SAMPLES
            && unique_ratio(self.endpoint_pattern.iter()) < weights.low_diversity_ratio
        {
            risk += weights.low_diversity_risk;
        }
        risk.clamp(0.0, 100.0)
    }
}

/// Behavior patterns keyed by client identifier.
#[derive(Debug, Default)]
pub struct BehaviorTracker {
    patterns: HashMap<String, BehaviorPattern>,
}

impl BehaviorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request for `key` at `at` and recompute its signals.
    pub fn analyze(
        &mut self,
        key: &str,
        endpoint: Option<&str>,
        user_agent: Option<&str>,
        at: DateTime<Utc>,
        weights: &ScoringWeights,
    ) -> &BehaviorPattern {
        let pattern = self.patterns.entry(key.to_string()).or_default();
        pattern.record(endpoint, user_agent, at);
        pattern.is_bot = pattern.detect_bot(weights);
        pattern.risk_score = pattern.compute_risk(weights);

        debug!(
            key = %key,
            is_bot = pattern.is_bot,
            risk_score = pattern.risk_score,
            "Behavior pattern updated"
        );
        pattern
    }

    pub fn get(&self, key: &str) -> Option<&BehaviorPattern> {
        self.patterns.get(key)
    }

    pub fn risk_score(&self, key: &str) -> Option<f64> {
        self.patterns.get(key).map(|p| p.risk_score)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Drop patterns whose newest timestamp is older than `max_age`.
    /// Returns the number of patterns removed.
    pub fn sweep_stale(&mut self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let cutoff = now - max_age;
        let before = self.patterns.len();
        self.patterns
            .retain(|_, pattern| pattern.last_seen().is_some_and(|seen| seen >= cutoff));
        before - self.patterns.len()
    }

    pub fn summary(&self) -> BehaviorSummary {
        let total = self.patterns.len();
        if total == 0 {
            return BehaviorSummary::default();
        }
        let bots = self.patterns.values().filter(|p| p.is_bot).count();
        let risk_sum: f64 = self.patterns.values().map(|p| p.risk_score).sum();
        BehaviorSummary {
            total_patterns: total,
            bot_patterns: bots,
            average_risk_score: risk_sum / total as f64,
        }
    }
}

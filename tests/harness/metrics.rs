// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Metrics collection for traffic simulation results.

use adaptive_rate_limiter::{RateLimitDecision, ThreatLevel};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Collects metrics during traffic simulation.
#[derive(Debug, Default)]
pub struct AttackMetrics {
    /// Start time of the run
    start_time: Option<Instant>,
    /// End time of the run
    end_time: Option<Instant>,
    /// Count of requests by outcome
    outcomes: HashMap<Outcome, usize>,
    /// Count of requests by threat level
    threat_levels: HashMap<ThreatLevel, usize>,
    /// Count of requests by IP
    requests_per_ip: HashMap<String, usize>,
    /// Decision latency samples (microseconds)
    latencies: Vec<u64>,
}

/// Possible outcomes for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Allowed,
    /// Denied by the base limiter's quota or burst cooldown
    BaseLimited,
    /// Denied by the threat-aware layer despite base quota
    ThreatBlocked,
}

impl Outcome {
    pub fn of(decision: &RateLimitDecision) -> Self {
        if decision.allowed {
            Outcome::Allowed
        } else if decision.reason().is_some() {
            Outcome::ThreatBlocked
        } else {
            Outcome::BaseLimited
        }
    }
}

impl AttackMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Instant::now());
    }

    /// Record a decision.
    pub fn record(&mut self, decision: &RateLimitDecision, ip: &str, latency: Duration) {
        *self.outcomes.entry(Outcome::of(decision)).or_insert(0) += 1;
        *self.threat_levels.entry(decision.threat_level).or_insert(0) += 1;
        *self.requests_per_ip.entry(ip.to_string()).or_insert(0) += 1;
        self.latencies.push(latency.as_micros() as u64);
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    pub fn threat_count(&self, level: ThreatLevel) -> usize {
        self.threat_levels.get(&level).copied().unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.outcomes.values().sum()
    }

    /// Highest threat level observed during the run.
    pub fn peak_threat(&self) -> Option<ThreatLevel> {
        self.threat_levels.keys().copied().max()
    }

    pub fn duration(&self) -> Duration {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end.duration_since(start),
            _ => Duration::ZERO,
        }
    }

    /// Block rate (0.0-1.0).
    pub fn block_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        1.0 - self.count(Outcome::Allowed) as f64 / total as f64
    }

    pub fn median_latency_us(&self) -> u64 {
        self.percentile_us(0.5)
    }

    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_us(0.99)
    }

    fn percentile_us(&self, p: f64) -> u64 {
        if self.latencies.is_empty() {
            return 0;
        }
        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();
        let idx = (sorted.len() as f64 * p) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn unique_ips(&self) -> usize {
        self.requests_per_ip.len()
    }

    /// Generate a summary report.
    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            total_requests: self.total_requests(),
            allowed: self.count(Outcome::Allowed),
            base_limited: self.count(Outcome::BaseLimited),
            threat_blocked: self.count(Outcome::ThreatBlocked),
            peak_threat: self.peak_threat(),
            duration_ms: self.duration().as_millis() as u64,
            block_rate: self.block_rate(),
            median_latency_us: self.median_latency_us(),
            p99_latency_us: self.p99_latency_us(),
            unique_ips: self.unique_ips(),
        }
    }
}

/// Summary report of simulation metrics.
#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub total_requests: usize,
    pub allowed: usize,
    pub base_limited: usize,
    pub threat_blocked: usize,
    pub peak_threat: Option<ThreatLevel>,
    pub duration_ms: u64,
    pub block_rate: f64,
    pub median_latency_us: u64,
    pub p99_latency_us: u64,
    pub unique_ips: usize,
}

impl std::fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let allowed_pct = if self.total_requests == 0 {
            0.0
        } else {
            self.allowed as f64 / self.total_requests as f64 * 100.0
        };
        writeln!(f, "=== Traffic Simulation Report ===")?;
        writeln!(f, "Duration:          {} ms", self.duration_ms)?;
        writeln!(f, "Total Requests:    {}", self.total_requests)?;
        writeln!(f)?;
        writeln!(f, "--- Outcomes ---")?;
        writeln!(f, "Allowed:           {} ({:.1}%)", self.allowed, allowed_pct)?;
        writeln!(f, "Base Limited:      {}", self.base_limited)?;
        writeln!(f, "Threat Blocked:    {}", self.threat_blocked)?;
        writeln!(f, "Block Rate:        {:.1}%", self.block_rate * 100.0)?;
        match self.peak_threat {
            Some(level) => writeln!(f, "Peak Threat:       {}", level)?,
            None => writeln!(f, "Peak Threat:       -")?,
        }
        writeln!(f)?;
        writeln!(f, "--- Latency ---")?;
        writeln!(f, "Median:            {} us", self.median_latency_us)?;
        writeln!(f, "P99:               {} us", self.p99_latency_us)?;
        writeln!(f)?;
        writeln!(f, "--- Distribution ---")?;
        writeln!(f, "Unique IPs:        {}", self.unique_ips)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_rate_limiter::BaseVerdict;

    fn decision(allowed: bool, blocked_by_threat: bool, level: ThreatLevel) -> RateLimitDecision {
        let base = if allowed {
            BaseVerdict::allow(10)
        } else {
            BaseVerdict::deny(5)
        };
        let mut decision = RateLimitDecision::from_base(base, level);
        if blocked_by_threat {
            decision.allowed = false;
            decision
                .headers
                .insert("X-RateLimit-Reason".to_string(), "blocked".to_string());
        }
        decision
    }

    #[test]
    fn test_metrics_collection() {
        let mut metrics = AttackMetrics::new();
        metrics.start();

        metrics.record(&decision(true, false, ThreatLevel::Low), "10.0.0.1", Duration::from_micros(100));
        metrics.record(&decision(false, false, ThreatLevel::Medium), "10.0.0.1", Duration::from_micros(150));
        metrics.record(&decision(true, true, ThreatLevel::Critical), "10.0.0.2", Duration::from_micros(50));

        metrics.finish();

        assert_eq!(metrics.total_requests(), 3);
        assert_eq!(metrics.count(Outcome::Allowed), 1);
        assert_eq!(metrics.count(Outcome::BaseLimited), 1);
        assert_eq!(metrics.count(Outcome::ThreatBlocked), 1);
        assert_eq!(metrics.peak_threat(), Some(ThreatLevel::Critical));
        assert_eq!(metrics.unique_ips(), 2);
    }

    #[test]
    fn test_block_rate() {
        let mut metrics = AttackMetrics::new();
        for _ in 0..3 {
            metrics.record(&decision(true, false, ThreatLevel::Low), "10.0.0.1", Duration::ZERO);
        }
        for _ in 0..7 {
            metrics.record(&decision(false, false, ThreatLevel::Low), "10.0.0.1", Duration::ZERO);
        }

        assert!((metrics.block_rate() - 0.7).abs() < 0.01);
    }
}

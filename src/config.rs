// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the adaptive rate limiting engine.
//!
//! Every heuristic weight lives in [`ScoringWeights`] so the scoring policy
//! can be tuned and tested without touching the decision code.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("{field} must be {expected}, got {actual}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        actual: f64,
    },

    #[error("Unknown default tier: {0}")]
    UnknownTier(String),
}

/// Top-level configuration for the rate limiting service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Adaptive engine configuration
    #[serde(default)]
    pub engine: AdaptiveRateLimitConfig,

    /// Base limiter tiers
    #[serde(default)]
    pub base_limit: BaseLimitConfig,

    /// Background task intervals
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Adaptive engine configuration. Immutable once the engine is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveRateLimitConfig {
    /// Scale remaining quota by the adaptive multiplier (default: true)
    #[serde(default = "default_true")]
    pub adaptive_throttling: bool,

    /// Force denials for critical / high threat traffic (default: true)
    #[serde(default = "default_true")]
    pub intelligent_blocking: bool,

    /// Let latency, error rate and system load shrink the multiplier (default: true)
    #[serde(default = "default_true")]
    pub performance_scaling: bool,

    /// Track per-key behavior patterns (default: true)
    #[serde(default = "default_true")]
    pub behavior_analysis: bool,

    /// Scalar applied to the raw threat score before thresholding (default: 1.0)
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,

    /// Performance thresholds
    #[serde(default)]
    pub thresholds: PerformanceThresholds,

    /// Heuristic weights
    #[serde(default)]
    pub scoring: ScoringWeights,
}

/// Thresholds above which performance scaling kicks in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceThresholds {
    /// Average response time in milliseconds (default: 1000)
    #[serde(default = "default_response_time_ms")]
    pub response_time_ms: f64,

    /// Per-key error ratio in 0..=1 (default: 0.05)
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,

    /// CPU utilisation percent (default: 80)
    #[serde(default = "default_cpu_percent")]
    pub cpu_percent: f64,

    /// Memory utilisation percent (default: 85)
    #[serde(default = "default_memory_percent")]
    pub memory_percent: f64,
}

/// Score weights and cut-offs used by the threat assessor, behavior tracker
/// and multiplier calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub suspicious_ip: f64,
    pub known_bot_ip: f64,
    /// Subtracted for trusted IPs
    pub trusted_ip: f64,
    pub bot_user_agent: f64,
    pub suspicious_user_agent: f64,

    pub critical_at: f64,
    pub high_at: f64,
    pub medium_at: f64,

    /// Interval variance (ms²) below which timing is considered periodic
    pub periodic_variance_ms2: f64,
    /// Mean requests per second above which a client is considered a bot
    pub bot_frequency_rps: f64,
    /// Unique/total endpoint ratio below which traffic is considered repetitive
    pub repetitive_endpoint_ratio: f64,
    /// Unique/total endpoint ratio below which diversity is considered low
    pub low_diversity_ratio: f64,
    pub bot_behavior_risk: f64,
    pub frequency_risk_per_rps: f64,
    pub frequency_risk_cap: f64,
    pub low_diversity_risk: f64,

    pub slow_response_factor: f64,
    pub error_rate_factor: f64,
    pub cpu_factor: f64,
    pub memory_factor: f64,
    pub medium_threat_factor: f64,
    pub high_threat_factor: f64,
    pub critical_threat_factor: f64,
    pub min_multiplier: f64,
    pub max_multiplier: f64,

    /// Multiplier below which high threat traffic is denied
    pub high_threat_block_below: f64,
    /// Minimum lockout for forced denials, in seconds
    pub min_block_secs: u64,
}

/// Named tier quotas for the built-in token bucket limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseLimitConfig {
    /// Requests per minute per tier (default: free=60, standard=300, premium=1200)
    #[serde(default = "default_tiers")]
    pub tiers: HashMap<String, u32>,

    /// Tier used when a caller names an unknown tier (default: free)
    #[serde(default = "default_tier")]
    pub default_tier: String,

    /// Cooldown period after burst detection in milliseconds (default: 30000)
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_on_burst_ms: u64,

    /// Burst threshold multiplier (default: 3x normal rate in 10s window)
    #[serde(default = "default_burst_threshold")]
    pub burst_threshold_multiplier: f32,

    /// Number of violators reported by stats (default: 20)
    #[serde(default = "default_top_violators")]
    pub top_violators: usize,

    /// Denial counts for a key are forgotten after this many idle seconds (default: 3600)
    #[serde(default = "default_violation_window_secs")]
    pub violation_window_secs: u64,
}

/// Intervals for the background maintainers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Threat intelligence refresh interval in seconds (default: 300)
    #[serde(default = "default_intel_refresh_secs")]
    pub intel_refresh_secs: u64,

    /// Stale pattern sweep interval in seconds (default: 3600)
    #[serde(default = "default_pattern_sweep_secs")]
    pub pattern_sweep_secs: u64,

    /// Patterns idle for longer than this are swept, in seconds (default: 86400)
    #[serde(default = "default_pattern_max_age_secs")]
    pub pattern_max_age_secs: u64,

    /// System load sampling interval in seconds (default: 30)
    #[serde(default = "default_load_sample_secs")]
    pub load_sample_secs: u64,

    /// Violation count above which a key is flagged suspicious (default: 100)
    #[serde(default = "default_violation_threshold")]
    pub violation_threshold: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sensitivity() -> f64 {
    1.0
}

fn default_response_time_ms() -> f64 {
    1000.0
}

fn default_error_rate() -> f64 {
    0.05
}

fn default_cpu_percent() -> f64 {
    80.0
}

fn default_memory_percent() -> f64 {
    85.0
}

fn default_tiers() -> HashMap<String, u32> {
    HashMap::from([
        ("free".to_string(), 60),
        ("standard".to_string(), 300),
        ("premium".to_string(), 1200),
    ])
}

fn default_tier() -> String {
    "free".to_string()
}

fn default_cooldown_ms() -> u64 {
    30000
}

fn default_burst_threshold() -> f32 {
    3.0
}

fn default_top_violators() -> usize {
    20
}

fn default_violation_window_secs() -> u64 {
    3600
}

fn default_intel_refresh_secs() -> u64 {
    300
}

fn default_pattern_sweep_secs() -> u64 {
    3600
}

fn default_pattern_max_age_secs() -> u64 {
    24 * 60 * 60
}

fn default_load_sample_secs() -> u64 {
    30
}

fn default_violation_threshold() -> u64 {
    100
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            engine: AdaptiveRateLimitConfig::default(),
            base_limit: BaseLimitConfig::default(),
            maintenance: MaintenanceConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for AdaptiveRateLimitConfig {
    fn default() -> Self {
        Self {
            adaptive_throttling: true,
            intelligent_blocking: true,
            performance_scaling: true,
            behavior_analysis: true,
            sensitivity: default_sensitivity(),
            thresholds: PerformanceThresholds::default(),
            scoring: ScoringWeights::default(),
        }
    }
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            response_time_ms: default_response_time_ms(),
            error_rate: default_error_rate(),
            cpu_percent: default_cpu_percent(),
            memory_percent: default_memory_percent(),
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            suspicious_ip: 30.0,
            known_bot_ip: 20.0,
            trusted_ip: 20.0,
            bot_user_agent: 15.0,
            suspicious_user_agent: 25.0,

            critical_at: 70.0,
            high_at: 50.0,
            medium_at: 30.0,

            periodic_variance_ms2: 10_000.0,
            bot_frequency_rps: 10.0,
            repetitive_endpoint_ratio: 0.3,
            low_diversity_ratio: 0.5,
            bot_behavior_risk: 40.0,
            frequency_risk_per_rps: 2.0,
            frequency_risk_cap: 30.0,
            low_diversity_risk: 20.0,

            slow_response_factor: 0.8,
            error_rate_factor: 0.7,
            cpu_factor: 0.6,
            memory_factor: 0.6,
            medium_threat_factor: 0.6,
            high_threat_factor: 0.3,
            critical_threat_factor: 0.1,
            min_multiplier: 0.1,
            max_multiplier: 2.0,

            high_threat_block_below: 0.5,
            min_block_secs: 300,
        }
    }
}

impl Default for BaseLimitConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            default_tier: default_tier(),
            cooldown_on_burst_ms: default_cooldown_ms(),
            burst_threshold_multiplier: default_burst_threshold(),
            violation_window_secs: default_violation_window_secs(),
            top_violators: default_top_violators(),
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            intel_refresh_secs: default_intel_refresh_secs(),
            pattern_sweep_secs: default_pattern_sweep_secs(),
            pattern_max_age_secs: default_pattern_max_age_secs(),
            load_sample_secs: default_load_sample_secs(),
            violation_threshold: default_violation_threshold(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr;
        }

        let engine = &mut config.engine;
        read_var(&lookup, "SENSITIVITY", &mut engine.sensitivity)?;
        read_var(
            &lookup,
            "RESPONSE_TIME_THRESHOLD_MS",
            &mut engine.thresholds.response_time_ms,
        )?;
        read_var(&lookup, "ERROR_RATE_THRESHOLD", &mut engine.thresholds.error_rate)?;
        read_var(&lookup, "CPU_THRESHOLD", &mut engine.thresholds.cpu_percent)?;
        read_var(&lookup, "MEMORY_THRESHOLD", &mut engine.thresholds.memory_percent)?;
        read_var(&lookup, "ENABLE_ADAPTIVE_THROTTLING", &mut engine.adaptive_throttling)?;
        read_var(&lookup, "ENABLE_INTELLIGENT_BLOCKING", &mut engine.intelligent_blocking)?;
        read_var(&lookup, "ENABLE_PERFORMANCE_SCALING", &mut engine.performance_scaling)?;
        read_var(&lookup, "ENABLE_BEHAVIOR_ANALYSIS", &mut engine.behavior_analysis)?;

        let mut default_rpm: Option<u32> = None;
        read_var(&lookup, "DEFAULT_TIER_RPM", &mut default_rpm)?;
        if let Some(rpm) = default_rpm {
            let tier = config.base_limit.default_tier.clone();
            config.base_limit.tiers.insert(tier, rpm);
        }

        read_var(&lookup, "COOLDOWN_MS", &mut config.base_limit.cooldown_on_burst_ms)?;
        read_var(&lookup, "METRICS_ENABLED", &mut config.metrics.enabled)?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        for (field, secs) in [
            ("maintenance.intel_refresh_secs", self.maintenance.intel_refresh_secs),
            ("maintenance.pattern_sweep_secs", self.maintenance.pattern_sweep_secs),
            ("maintenance.load_sample_secs", self.maintenance.load_sample_secs),
            ("base_limit.violation_window_secs", self.base_limit.violation_window_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::OutOfRange {
                    field,
                    expected: "at least 1 second",
                    actual: 0.0,
                });
            }
        }
        if !self.base_limit.tiers.contains_key(&self.base_limit.default_tier) {
            return Err(ConfigError::UnknownTier(self.base_limit.default_tier.clone()));
        }
        Ok(())
    }
}

impl AdaptiveRateLimitConfig {
    /// Check the engine's own value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sensitivity > 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "sensitivity",
                expected: "greater than 0",
                actual: self.sensitivity,
            });
        }
        if !(0.0..=1.0).contains(&self.thresholds.error_rate) {
            return Err(ConfigError::OutOfRange {
                field: "thresholds.error_rate",
                expected: "within 0..=1",
                actual: self.thresholds.error_rate,
            });
        }
        for (field, value) in [
            ("thresholds.cpu_percent", self.thresholds.cpu_percent),
            ("thresholds.memory_percent", self.thresholds.memory_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field,
                    expected: "within 0..=100",
                    actual: value,
                });
            }
        }
        if !(self.thresholds.response_time_ms > 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "thresholds.response_time_ms",
                expected: "greater than 0",
                actual: self.thresholds.response_time_ms,
            });
        }
        let scoring = &self.scoring;
        if !(scoring.min_multiplier.is_finite() && scoring.min_multiplier >= 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "scoring.min_multiplier",
                expected: "a finite number of at least 0",
                actual: scoring.min_multiplier,
            });
        }
        if !(scoring.max_multiplier.is_finite() && scoring.min_multiplier <= scoring.max_multiplier)
        {
            return Err(ConfigError::OutOfRange {
                field: "scoring.max_multiplier",
                expected: "finite and at least scoring.min_multiplier",
                actual: scoring.max_multiplier,
            });
        }
        Ok(())
    }
}

/// Overwrite `slot` with the parsed variable when it is set.
fn read_var<F, T>(lookup: &F, var: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: ParseVar,
{
    if let Some(raw) = lookup(var) {
        *slot = T::parse_var(raw.trim()).ok_or(ConfigError::InvalidValue { var, value: raw })?;
    }
    Ok(())
}

trait ParseVar: Sized {
    fn parse_var(raw: &str) -> Option<Self>;
}

impl ParseVar for f64 {
    fn parse_var(raw: &str) -> Option<Self> {
        f64::from_str(raw).ok().filter(|v| v.is_finite())
    }
}

impl ParseVar for u64 {
    fn parse_var(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl ParseVar for bool {
    fn parse_var(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

impl ParseVar for Option<u32> {
    fn parse_var(raw: &str) -> Option<Self> {
        raw.parse().ok().map(Some)
    }
}

impl BaseLimitConfig {
    /// Get the cooldown duration
    pub fn cooldown_duration(&self) -> Duration {
        Duration::from_millis(self.cooldown_on_burst_ms)
    }

    pub fn violation_window(&self) -> Duration {
        Duration::from_secs(self.violation_window_secs)
    }
}

impl MaintenanceConfig {
    pub fn intel_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.intel_refresh_secs)
    }

    pub fn pattern_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.pattern_sweep_secs)
    }

    pub fn pattern_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pattern_max_age_secs as i64)
    }

    pub fn load_sample_interval(&self) -> Duration {
        Duration::from_secs(self.load_sample_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.scoring.critical_at, 70.0);
        assert_eq!(config.base_limit.tiers["free"], 60);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("SENSITIVITY", "1.5"),
            ("ENABLE_INTELLIGENT_BLOCKING", "off"),
            ("DEFAULT_TIER_RPM", "10"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ]))
        .unwrap();

        assert_eq!(config.engine.sensitivity, 1.5);
        assert!(!config.engine.intelligent_blocking);
        assert_eq!(config.base_limit.tiers["free"], 10);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn test_invalid_env_value_rejected() {
        let err = Config::from_lookup(lookup_from(&[("CPU_THRESHOLD", "lots")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                var: "CPU_THRESHOLD",
                value: "lots".to_string()
            }
        );
    }

    #[test]
    fn test_out_of_range_rejected() {
        let result = Config::from_lookup(lookup_from(&[("ERROR_RATE_THRESHOLD", "1.5")]));
        assert!(matches!(result, Err(ConfigError::OutOfRange { .. })));

        let result = Config::from_lookup(lookup_from(&[("SENSITIVITY", "0")]));
        assert!(matches!(result, Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn test_engine_multiplier_bounds_rejected() {
        let mut engine = AdaptiveRateLimitConfig::default();
        engine.scoring.min_multiplier = 3.0;
        assert!(matches!(
            engine.validate(),
            Err(ConfigError::OutOfRange { field: "scoring.max_multiplier", .. })
        ));

        engine.scoring.min_multiplier = f64::NAN;
        assert!(matches!(
            engine.validate(),
            Err(ConfigError::OutOfRange { field: "scoring.min_multiplier", .. })
        ));

        engine.scoring.min_multiplier = 0.1;
        engine.scoring.max_multiplier = f64::INFINITY;
        assert!(engine.validate().is_err());
    }

    #[test]
    fn test_zero_violation_window_rejected() {
        let mut config = Config::default();
        config.base_limit.violation_window_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"engine": {"sensitivity": 2.0, "scoring": {"min_block_secs": 600}}}"#)
                .unwrap();
        assert_eq!(config.engine.sensitivity, 2.0);
        assert_eq!(config.engine.scoring.min_block_secs, 600);
        assert_eq!(config.engine.scoring.suspicious_ip, 30.0);
        assert!(config.engine.behavior_analysis);
    }
}

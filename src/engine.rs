// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! The adaptive rate limiting engine.
//!
//! Per request the engine updates the client's behavior pattern, assesses a
//! threat level, computes the adaptive multiplier, asks the base limiter for
//! its verdict and combines the three. Any internal failure degrades to the
//! plain base limiter verdict.

use crate::behavior::{BehaviorPattern, BehaviorSummary, BehaviorTracker};
use crate::config::{AdaptiveRateLimitConfig, MaintenanceConfig};
use crate::enhancer::{self, RateLimitDecision, HEADER_DEGRADED};
use crate::error::Result;
use crate::intel::{IntelCounts, ThreatIntelligence};
use crate::load::LoadSource;
use crate::metrics::EngineMetrics;
use crate::multiplier::{MultiplierCalculator, PerformanceMetrics, SystemLoad};
use crate::ports::{BaseRateLimiter, MultiplierCache};
use crate::threat::{RequestContext, ThreatAssessor, ThreatLevel};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Performance part of the analytics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub average_response_time_ms: f64,
    pub system_load: SystemLoad,
    pub cached_multipliers: usize,
}

/// Observability snapshot returned by
/// [`IntelligentRateLimiter::intelligence_analytics`].
#[derive(Debug, Clone, Serialize)]
pub struct IntelligenceAnalytics {
    pub threat_intelligence: IntelCounts,
    pub behavior_patterns: BehaviorSummary,
    pub performance: PerformanceSnapshot,
    pub generated_at: DateTime<Utc>,
}

/// Extract the address from an `ip:`-prefixed limiter key.
///
/// Accepts `ip:<addr>` and `ip:<addr>:<suffix>` for both IPv4 and IPv6.
pub fn violator_ip(key: &str) -> Option<&str> {
    let rest = key.strip_prefix("ip:")?;
    if rest.parse::<IpAddr>().is_ok() {
        return Some(rest);
    }
    [rest.split_once(':'), rest.rsplit_once(':')]
        .into_iter()
        .flatten()
        .map(|(head, _)| head)
        .find(|head| head.parse::<IpAddr>().is_ok())
}

/// Adaptive, threat-aware wrapper around a base rate limiter.
pub struct IntelligentRateLimiter {
    config: AdaptiveRateLimitConfig,
    maintenance: MaintenanceConfig,
    base: Arc<dyn BaseRateLimiter>,
    cache: Arc<dyn MultiplierCache>,
    intel: RwLock<ThreatIntelligence>,
    behavior: RwLock<BehaviorTracker>,
    performance: RwLock<PerformanceMetrics>,
    metrics: EngineMetrics,
}

impl IntelligentRateLimiter {
    /// Create an engine with empty intelligence and default maintenance settings.
    ///
    /// Fails with [`EngineError::Config`](crate::error::EngineError::Config) when
    /// the configuration is out of range.
    pub fn new(
        config: AdaptiveRateLimitConfig,
        base: Arc<dyn BaseRateLimiter>,
        cache: Arc<dyn MultiplierCache>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            maintenance: MaintenanceConfig::default(),
            base,
            cache,
            intel: RwLock::new(ThreatIntelligence::new()),
            behavior: RwLock::new(BehaviorTracker::new()),
            performance: RwLock::new(PerformanceMetrics::new()),
            metrics: EngineMetrics::new()?,
        })
    }

    pub fn with_maintenance(mut self, maintenance: MaintenanceConfig) -> Self {
        self.maintenance = maintenance;
        self
    }

    pub fn config(&self) -> &AdaptiveRateLimitConfig {
        &self.config
    }

    pub fn maintenance_config(&self) -> &MaintenanceConfig {
        &self.maintenance
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Decide whether a request may proceed.
    ///
    /// Never fails: internal errors fall back to the base limiter's verdict
    /// with threat level `low`.
    pub async fn intelligent_rate_limit(
        &self,
        key: &str,
        tier: &str,
        endpoint: &str,
        context: Option<&RequestContext>,
    ) -> RateLimitDecision {
        let decision = match self.decide(key, tier, endpoint, context).await {
            Ok(decision) => decision,
            Err(err) => {
                error!(%key, %tier, %endpoint, error = %err, "Adaptive rate limiting failed, using base limiter");
                self.metrics.record_fallback();
                self.fallback(key, tier, endpoint).await
            }
        };
        self.metrics
            .record_decision(decision.allowed, decision.threat_level);
        decision
    }

    async fn decide(
        &self,
        key: &str,
        tier: &str,
        endpoint: &str,
        context: Option<&RequestContext>,
    ) -> Result<RateLimitDecision> {
        // The current request is part of the pattern it is judged by.
        if self.config.behavior_analysis {
            self.analyze_behavior(key, Some(endpoint), context, Utc::now())
                .await;
        }

        let threat_level = self.assess_threat_level(key, context).await;
        let multiplier = self
            .calculate_adaptive_multiplier(key, endpoint, Some(threat_level))
            .await?;

        let base = self.base.check_rate_limit(key, tier, endpoint).await?;
        let base_allowed = base.allowed;
        let decision = enhancer::enhance(base, threat_level, multiplier, &self.config);

        if base_allowed && !decision.allowed {
            self.metrics.record_forced_denial();
            info!(
                %key,
                %endpoint,
                threat_level = %threat_level,
                multiplier,
                retry_after = ?decision.retry_after,
                "Request blocked by threat assessment"
            );
        } else {
            debug!(
                %key,
                allowed = decision.allowed,
                remaining = decision.remaining,
                threat_level = %threat_level,
                multiplier,
                "Rate limit decision"
            );
        }
        Ok(decision)
    }

    async fn fallback(&self, key: &str, tier: &str, endpoint: &str) -> RateLimitDecision {
        match self.base.check_rate_limit(key, tier, endpoint).await {
            Ok(base) => RateLimitDecision::from_base(base, ThreatLevel::Low),
            Err(err) => {
                error!(%key, error = %err, "Base limiter unavailable, failing open");
                let mut decision = RateLimitDecision::from_base(
                    crate::ports::BaseVerdict::allow(0),
                    ThreatLevel::Low,
                );
                decision
                    .headers
                    .insert(HEADER_DEGRADED.to_string(), "true".to_string());
                decision
            }
        }
    }

    /// Record one request in the client's behavior pattern.
    pub async fn analyze_behavior(
        &self,
        key: &str,
        endpoint: Option<&str>,
        context: Option<&RequestContext>,
        at: DateTime<Utc>,
    ) {
        let user_agent = context.and_then(|c| c.user_agent.as_deref());
        let mut behavior = self.behavior.write().await;
        behavior.analyze(key, endpoint, user_agent, at, &self.config.scoring);
        self.metrics.set_behavior_patterns(behavior.len());
    }

    pub async fn assess_threat_level(
        &self,
        key: &str,
        context: Option<&RequestContext>,
    ) -> ThreatLevel {
        let intel = self.intel.read().await;
        let behavior = self.behavior.read().await;
        ThreatAssessor::new(&self.config).assess(key, context, &intel, &behavior)
    }

    pub async fn calculate_adaptive_multiplier(
        &self,
        key: &str,
        endpoint: &str,
        threat_level: Option<ThreatLevel>,
    ) -> Result<f64> {
        MultiplierCalculator::new(&self.config, self.cache.as_ref())
            .calculate(key, endpoint, threat_level, &self.performance)
            .await
    }

    pub async fn add_trusted_ip(&self, ip: &str) {
        let mut intel = self.intel.write().await;
        intel.add_trusted_ip(ip);
        self.metrics.set_suspicious_ips(intel.counts().suspicious_ips);
        info!(%ip, "Added trusted IP");
    }

    pub async fn add_suspicious_ip(&self, ip: &str) {
        let mut intel = self.intel.write().await;
        intel.add_suspicious_ip(ip);
        self.metrics.set_suspicious_ips(intel.counts().suspicious_ips);
        info!(%ip, "Added suspicious IP");
    }

    pub async fn add_known_bot(&self, ip: &str) {
        self.intel.write().await.add_known_bot(ip);
        info!(%ip, "Added known bot");
    }

    pub async fn set_geo_risk(&self, region: &str, risk: f64) {
        self.intel.write().await.set_geo_risk(region, risk);
        info!(%region, risk, "Geo risk updated");
    }

    pub async fn remove_geo_risk(&self, region: &str) -> bool {
        self.intel.write().await.remove_geo_risk(region)
    }

    pub async fn is_trusted(&self, ip: &str) -> bool {
        self.intel.read().await.is_trusted(ip)
    }

    pub async fn is_suspicious(&self, ip: &str) -> bool {
        self.intel.read().await.is_suspicious(ip)
    }

    /// Feed a completed request's latency and outcome into performance scaling.
    pub async fn record_response(&self, key: &str, latency_ms: f64, is_error: bool) {
        self.performance
            .write()
            .await
            .record_response(key, latency_ms, is_error, Utc::now());
    }

    pub async fn update_system_load(&self, load: SystemLoad) {
        self.performance.write().await.set_system_load(load);
    }

    /// Take one sample from `source` and store it.
    pub async fn sample_system_load(&self, source: &dyn LoadSource) -> Result<SystemLoad> {
        let load = source.sample()?;
        self.update_system_load(load).await;
        debug!(cpu = load.cpu_percent, memory = load.memory_percent, "System load sampled");
        Ok(load)
    }

    /// Flag heavy violators from the base limiter's stats as suspicious.
    /// Returns the number of newly flagged identifiers.
    pub async fn refresh_threat_intelligence(&self) -> Result<usize> {
        let stats = self.base.rate_limit_stats().await?;
        let threshold = self.maintenance.violation_threshold;

        let mut intel = self.intel.write().await;
        let mut flagged = 0;
        for violator in stats.top_violators.iter().filter(|v| v.count > threshold) {
            let Some(ip) = violator_ip(&violator.key) else {
                continue;
            };
            if intel.is_trusted(ip) {
                debug!(%ip, count = violator.count, "Trusted IP exceeds violation threshold");
                continue;
            }
            if !intel.is_suspicious(ip) {
                intel.add_suspicious_ip(ip);
                flagged += 1;
                warn!(%ip, count = violator.count, "Flagged IP as suspicious");
            }
        }
        self.metrics.set_suspicious_ips(intel.counts().suspicious_ips);
        Ok(flagged)
    }

    /// Remove behavior patterns and performance counters idle past the max age.
    pub async fn sweep_stale_patterns(&self) -> usize {
        self.sweep_stale_patterns_at(Utc::now()).await
    }

    pub async fn sweep_stale_patterns_at(&self, now: DateTime<Utc>) -> usize {
        let max_age = self.maintenance.pattern_max_age();
        let removed = {
            let mut behavior = self.behavior.write().await;
            let removed = behavior.sweep_stale(now, max_age);
            self.metrics.set_behavior_patterns(behavior.len());
            removed
        };
        self.performance.write().await.sweep_stale(now, max_age);
        if removed > 0 {
            info!(removed, "Swept stale behavior patterns");
        }
        removed
    }

    pub async fn behavior_pattern(&self, key: &str) -> Option<BehaviorPattern> {
        self.behavior.read().await.get(key).cloned()
    }

    pub async fn intelligence_analytics(&self) -> IntelligenceAnalytics {
        let threat_intelligence = self.intel.read().await.counts();
        let behavior_patterns = self.behavior.read().await.summary();
        let (average_response_time_ms, system_load) = {
            let perf = self.performance.read().await;
            (perf.average_response_time(), perf.system_load())
        };
        let cached_multipliers = match self.cache.entry_count().await {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "Multiplier cache size unavailable");
                0
            }
        };

        IntelligenceAnalytics {
            threat_intelligence,
            behavior_patterns,
            performance: PerformanceSnapshot {
                average_response_time_ms,
                system_load,
                cached_multipliers,
            },
            generated_at: Utc::now(),
        }
    }
}

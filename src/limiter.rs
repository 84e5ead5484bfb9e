// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Tiered token bucket limiter.
//!
//! The built-in [`BaseRateLimiter`]: one bucket per client key and tier,
//! refilled continuously at the tier's per-minute rate. Includes burst
//! detection with configurable cooldown and per-key violation accounting
//! for the threat intelligence refresh.

use crate::config::BaseLimitConfig;
use crate::error::Result;
use crate::ports::{BaseRateLimiter, BaseVerdict, RateLimitStats, Violator};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Token bucket for rate limiting.
#[derive(Debug)]
struct TokenBucket {
    /// Available tokens
    tokens: f64,
    /// Maximum tokens (bucket capacity)
    max_tokens: f64,
    /// Token refill rate per second
    refill_rate: f64,
    /// Last time tokens were refilled
    last_refill: Instant,
    /// Request timestamps for burst detection
    request_times: Vec<Instant>,
}

impl TokenBucket {
    fn new(max_rate_per_minute: u32) -> Self {
        let max_tokens = max_rate_per_minute as f64;
        let refill_rate = max_tokens / 60.0; // tokens per second

        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate,
            last_refill: Instant::now(),
            request_times: Vec::new(),
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Try to consume a token. Returns true if successful.
    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            self.request_times.push(Instant::now());
            true
        } else {
            false
        }
    }

    fn remaining(&self) -> u32 {
        self.tokens.floor() as u32
    }

    fn time_until_available(&self) -> Duration {
        if self.tokens >= 1.0 || self.refill_rate <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }

    /// Check if burst activity detected in the last 10 seconds.
    fn detect_burst(&mut self, threshold_multiplier: f32) -> bool {
        let now = Instant::now();
        let window = Duration::from_secs(10);

        self.request_times
            .retain(|t| now.duration_since(*t) < window);

        // 10s = 1/6 of a minute
        let expected_in_window = (self.max_tokens / 6.0).max(1.0);
        let threshold = (expected_in_window * threshold_multiplier as f64).max(3.0) as usize;

        self.request_times.len() > threshold
    }
}

/// Denials for one key inside the current violation window.
#[derive(Debug, Clone, Copy)]
struct ViolationRecord {
    count: u64,
    last_at: Instant,
}

/// Whole seconds to wait, never zero for a denial.
fn retry_secs(wait: Duration) -> u64 {
    wait.as_secs_f64().ceil().max(1.0) as u64
}

/// In-memory tiered limiter.
#[derive(Clone)]
pub struct TokenBucketLimiter {
    config: BaseLimitConfig,
    /// Buckets keyed by `tier:key`
    buckets: Arc<RwLock<HashMap<String, TokenBucket>>>,
    /// Keys in cooldown after a burst
    cooldowns: Arc<RwLock<HashMap<String, Instant>>>,
    /// Denial counts per key, dropped once idle for a full window
    violations: Arc<RwLock<HashMap<String, ViolationRecord>>>,
}

impl TokenBucketLimiter {
    pub fn new(config: BaseLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(RwLock::new(HashMap::new())),
            cooldowns: Arc::new(RwLock::new(HashMap::new())),
            violations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolve a tier name, falling back to the default tier.
    fn tier_quota<'a>(&'a self, tier: &'a str) -> (&'a str, u32) {
        match self.config.tiers.get(tier) {
            Some(rpm) => (tier, *rpm),
            None => {
                let default = self.config.default_tier.as_str();
                (default, self.config.tiers.get(default).copied().unwrap_or(0))
            }
        }
    }

    async fn record_violation(&self, key: &str) {
        let now = Instant::now();
        let window = self.config.violation_window();
        let mut violations = self.violations.write().await;
        let record = violations.entry(key.to_string()).or_insert(ViolationRecord {
            count: 0,
            last_at: now,
        });
        // A key that went quiet for a whole window starts over
        if now.duration_since(record.last_at) >= window {
            record.count = 0;
        }
        record.count += 1;
        record.last_at = now;
    }

    /// Clean up idle buckets, expired cooldowns and stale violation counts
    /// (should be called periodically).
    pub async fn cleanup(&self) {
        self.cleanup_at(Instant::now()).await;
    }

    pub async fn cleanup_at(&self, now: Instant) {
        let stale_threshold = Duration::from_secs(300);
        let window = self.config.violation_window();

        {
            let mut buckets = self.buckets.write().await;
            buckets.retain(|_, bucket| now.duration_since(bucket.last_refill) < stale_threshold);
        }

        {
            let mut cooldowns = self.cooldowns.write().await;
            cooldowns.retain(|_, until| now < *until);
        }

        let removed = {
            let mut violations = self.violations.write().await;
            let before = violations.len();
            violations.retain(|_, record| now.duration_since(record.last_at) < window);
            before - violations.len()
        };
        if removed > 0 {
            debug!(removed, "Dropped stale violation counts");
        }
    }

    pub async fn violation_count(&self, key: &str) -> u64 {
        self.violations
            .read()
            .await
            .get(key)
            .map_or(0, |record| record.count)
    }

    /// Forget all violation counts.
    pub async fn reset_violations(&self) {
        self.violations.write().await.clear();
    }
}

#[async_trait]
impl BaseRateLimiter for TokenBucketLimiter {
    async fn check_rate_limit(
        &self,
        key: &str,
        tier: &str,
        endpoint: &str,
    ) -> Result<BaseVerdict> {
        let (tier, rpm) = self.tier_quota(tier);

        {
            let cooldowns = self.cooldowns.read().await;
            if let Some(until) = cooldowns.get(key) {
                let now = Instant::now();
                if now < *until {
                    let retry_after = until.duration_since(now);
                    debug!(%key, ?retry_after, "Key in cooldown");
                    drop(cooldowns);
                    self.record_violation(key).await;
                    return Ok(limited(rpm, tier, retry_secs(retry_after)));
                }
            }
        }

        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .entry(format!("{tier}:{key}"))
            .or_insert_with(|| TokenBucket::new(rpm));

        if bucket.detect_burst(self.config.burst_threshold_multiplier) {
            warn!(%key, %tier, %endpoint, "Burst detected, applying cooldown");
            let cooldown = self.config.cooldown_duration();
            drop(buckets);

            self.cooldowns
                .write()
                .await
                .insert(key.to_string(), Instant::now() + cooldown);
            self.record_violation(key).await;
            return Ok(limited(rpm, tier, retry_secs(cooldown)));
        }

        if bucket.try_consume() {
            let remaining = bucket.remaining();
            let mut verdict = BaseVerdict::allow(remaining);
            verdict.headers = quota_headers(rpm, tier, remaining);
            Ok(verdict)
        } else {
            let retry_after = bucket.time_until_available();
            drop(buckets);
            debug!(%key, %tier, %endpoint, ?retry_after, "Rate limit exceeded");
            self.record_violation(key).await;
            Ok(limited(rpm, tier, retry_secs(retry_after)))
        }
    }

    async fn rate_limit_stats(&self) -> Result<RateLimitStats> {
        let now = Instant::now();
        let window = self.config.violation_window();
        let violations = self.violations.read().await;
        let mut top_violators: Vec<Violator> = violations
            .iter()
            .filter(|(_, record)| now.duration_since(record.last_at) < window)
            .map(|(key, record)| Violator {
                key: key.clone(),
                count: record.count,
            })
            .collect();
        top_violators.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        top_violators.truncate(self.config.top_violators);
        Ok(RateLimitStats { top_violators })
    }
}

fn quota_headers(
    limit: u32,
    tier: &str,
    remaining: u32,
) -> std::collections::BTreeMap<String, String> {
    [
        ("X-RateLimit-Limit".to_string(), limit.to_string()),
        ("X-RateLimit-Remaining".to_string(), remaining.to_string()),
        ("X-RateLimit-Tier".to_string(), tier.to_string()),
    ]
    .into_iter()
    .collect()
}

fn limited(limit: u32, tier: &str, retry_after: u64) -> BaseVerdict {
    let mut verdict = BaseVerdict::deny(retry_after);
    verdict.headers = quota_headers(limit, tier, 0);
    verdict
        .headers
        .insert("Retry-After".to_string(), retry_after.to_string());
    verdict
}

// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Traffic patterns for security testing.

use super::generators;
use chrono::{DateTime, Duration, Utc};

/// Traffic pattern configuration.
///
/// Request timestamps are synthetic: client `c` sends its `n`th request at
/// `start + n * interval_ms + jitter(n)`, so behavior analysis sees the
/// same timing on every run.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of requests to send
    pub total_requests: usize,
    /// Number of unique client IPs
    pub unique_ips: usize,
    /// Number of unique endpoints each client cycles through
    pub unique_endpoints: usize,
    /// Gap between one client's requests in milliseconds
    pub interval_ms: i64,
    /// Maximum timing jitter in milliseconds (0 = perfectly periodic)
    pub jitter_ms: i64,
    /// User agent sent by every client
    pub user_agent: &'static str,
    /// Region code attached to every request
    pub geo_location: Option<&'static str>,
    /// Whether the client IPs are pre-loaded as suspicious
    pub suspicious_ips: bool,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            unique_ips: 1,
            unique_endpoints: 1,
            interval_ms: 1000,
            jitter_ms: 0,
            user_agent: generators::CHROME_UA,
            geo_location: None,
            suspicious_ips: false,
        }
    }
}

/// Predefined traffic patterns.
impl AttackConfig {
    /// Single-client scraper hammering one page with a scripting client.
    pub fn scraper_flood() -> Self {
        Self {
            total_requests: 200,
            interval_ms: 50,
            user_agent: generators::PYTHON_UA,
            ..Default::default()
        }
    }

    /// Browser-looking client polling on a fixed clock.
    pub fn periodic_bot() -> Self {
        Self {
            total_requests: 20,
            unique_endpoints: 10,
            interval_ms: 2000,
            ..Default::default()
        }
    }

    /// Known-bad addresses using command-line tooling.
    pub fn suspicious_network() -> Self {
        Self {
            total_requests: 50,
            unique_ips: 10,
            unique_endpoints: 5,
            interval_ms: 1000,
            user_agent: generators::CURL_UA,
            suspicious_ips: true,
            ..Default::default()
        }
    }

    /// Many addresses, two requests each, from a risky region.
    pub fn distributed_scrape(region: &'static str) -> Self {
        Self {
            total_requests: 100,
            unique_ips: 50,
            unique_endpoints: 20,
            interval_ms: 3000,
            user_agent: generators::DECLARED_SCRAPER_UA,
            geo_location: Some(region),
            ..Default::default()
        }
    }

    /// Human browsing: irregular gaps and varied pages.
    pub fn legitimate_browsing() -> Self {
        Self {
            total_requests: 100,
            unique_ips: 20,
            unique_endpoints: 10,
            interval_ms: 5000,
            jitter_ms: 4000,
            ..Default::default()
        }
    }

    /// Timestamp of a client's `seq`th request.
    pub fn request_time(&self, start: DateTime<Utc>, seq: usize) -> DateTime<Utc> {
        let seq = seq as i64;
        // Deterministic spread over 0..=jitter_ms in quarter steps
        let jitter = (seq * 3 % 5) * self.jitter_ms / 4;
        start + Duration::milliseconds(seq * self.interval_ms + jitter)
    }

    /// Simulated wall-clock span of the whole pattern.
    pub fn expected_duration(&self) -> Duration {
        let per_client = self.total_requests.div_ceil(self.unique_ips.max(1));
        Duration::milliseconds(per_client as i64 * self.interval_ms + self.jitter_ms)
    }
}

/// Expected outcomes for different traffic patterns.
pub struct AttackExpectations {
    /// Maximum ratio of requests that should be allowed
    pub max_allowed_ratio: f64,
    /// Minimum ratio that should be allowed
    pub min_allowed_ratio: f64,
    /// Description of expected behavior
    pub description: &'static str,
}

impl AttackConfig {
    /// Get expected outcomes for this traffic pattern.
    pub fn expectations(&self) -> AttackExpectations {
        if self.suspicious_ips {
            AttackExpectations {
                max_allowed_ratio: 0.0,
                min_allowed_ratio: 0.0,
                description: "Suspicious IPs with tooling user agents are critical",
            }
        } else if self.geo_location.is_some() {
            AttackExpectations {
                max_allowed_ratio: 0.0,
                min_allowed_ratio: 0.0,
                description: "Geo risk lifts declared bots to high threat and blocks them",
            }
        } else if self.jitter_ms == 0 && self.interval_ms < 100 {
            AttackExpectations {
                max_allowed_ratio: 0.05,
                min_allowed_ratio: 0.0,
                description: "High-frequency scripted client is blocked after first contact",
            }
        } else if self.jitter_ms == 0 {
            AttackExpectations {
                max_allowed_ratio: 1.0,
                min_allowed_ratio: 1.0,
                description: "Periodic client is throttled, not blocked",
            }
        } else {
            AttackExpectations {
                max_allowed_ratio: 1.0,
                min_allowed_ratio: 1.0,
                description: "Human traffic passes untouched",
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jittered_timestamps_increase() {
        let config = AttackConfig::legitimate_browsing();
        let start = Utc::now();
        let times: Vec<_> = (0..10).map(|seq| config.request_time(start, seq)).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_periodic_timestamps_are_even() {
        let config = AttackConfig::periodic_bot();
        let start = Utc::now();
        assert_eq!(
            config.request_time(start, 3) - config.request_time(start, 2),
            Duration::milliseconds(2000)
        );
    }
}

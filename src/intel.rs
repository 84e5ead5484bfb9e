// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! In-memory threat intelligence.
//!
//! Holds the sets of suspicious, bot and trusted identifiers plus per-region
//! geo risk. Trusted and suspicious membership is mutually exclusive.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Upper bound for a single region's risk contribution.
const MAX_GEO_RISK: f64 = 100.0;

/// Threat intelligence owned by one engine instance.
#[derive(Debug, Default, Clone)]
pub struct ThreatIntelligence {
    suspicious_ips: HashSet<String>,
    known_bots: HashSet<String>,
    trusted_ips: HashSet<String>,
    geo_threats: HashMap<String, f64>,
}

/// Set sizes for analytics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntelCounts {
    pub suspicious_ips: usize,
    pub known_bots: usize,
    pub trusted_ips: usize,
    pub geo_threats: usize,
}

impl ThreatIntelligence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an identifier as trusted, clearing any suspicious flag.
    pub fn add_trusted_ip(&mut self, ip: &str) {
        self.suspicious_ips.remove(ip);
        self.trusted_ips.insert(ip.to_string());
    }

    /// Mark an identifier as suspicious, clearing any trusted flag.
    pub fn add_suspicious_ip(&mut self, ip: &str) {
        self.trusted_ips.remove(ip);
        self.suspicious_ips.insert(ip.to_string());
    }

    pub fn add_known_bot(&mut self, ip: &str) {
        self.known_bots.insert(ip.to_string());
    }

    /// Set a region's risk contribution, clamped to 0..=100.
    pub fn set_geo_risk(&mut self, region: &str, risk: f64) {
        let risk = if risk.is_finite() { risk.clamp(0.0, MAX_GEO_RISK) } else { 0.0 };
        self.geo_threats.insert(region.to_ascii_uppercase(), risk);
    }

    pub fn remove_geo_risk(&mut self, region: &str) -> bool {
        self.geo_threats.remove(&region.to_ascii_uppercase()).is_some()
    }

    pub fn is_suspicious(&self, ip: &str) -> bool {
        self.suspicious_ips.contains(ip)
    }

    pub fn is_known_bot(&self, ip: &str) -> bool {
        self.known_bots.contains(ip)
    }

    pub fn is_trusted(&self, ip: &str) -> bool {
        self.trusted_ips.contains(ip)
    }

    /// Risk for a region code; unknown regions contribute nothing.
    pub fn geo_risk(&self, region: &str) -> f64 {
        self.geo_threats
            .get(&region.to_ascii_uppercase())
            .copied()
            .unwrap_or(0.0)
    }

    pub fn counts(&self) -> IntelCounts {
        IntelCounts {
            suspicious_ips: self.suspicious_ips.len(),
            known_bots: self.known_bots.len(),
            trusted_ips: self.trusted_ips.len(),
            geo_threats: self.geo_threats.len(),
        }
    }
}

// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Collaborators the engine depends on but does not own.
//!
//! The engine only ever tightens what a [`BaseRateLimiter`] decides, and keeps
//! its short-lived multiplier values in a [`MultiplierCache`].

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Verdict from the base limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseVerdict {
    pub allowed: bool,
    /// Remaining requests in current window
    pub remaining: u32,
    /// Suggested wait before retrying, in seconds
    #[serde(default)]
    pub retry_after: Option<u64>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl BaseVerdict {
    pub fn allow(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn deny(retry_after: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after: Some(retry_after),
            headers: BTreeMap::new(),
        }
    }
}

/// A key and how many times it was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violator {
    pub key: String,
    pub count: u64,
}

/// Aggregate statistics from the base limiter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStats {
    pub top_violators: Vec<Violator>,
}

/// Fixed-policy limiter wrapped by the engine.
#[async_trait]
pub trait BaseRateLimiter: Send + Sync {
    /// Check and consume quota for `key` under the named tier.
    async fn check_rate_limit(&self, key: &str, tier: &str, endpoint: &str)
        -> Result<BaseVerdict>;

    /// Keys with the most denials, highest first.
    async fn rate_limit_stats(&self) -> Result<RateLimitStats>;
}

/// Short-lived storage for computed multipliers.
#[async_trait]
pub trait MultiplierCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<f64>>;

    async fn set(&self, key: &str, value: f64, ttl: Duration) -> Result<()>;

    /// Number of live entries.
    async fn entry_count(&self) -> Result<usize>;
}

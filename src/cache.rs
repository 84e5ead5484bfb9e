// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! In-memory TTL cache for adaptive multipliers.

use crate::error::Result;
use crate::ports::MultiplierCache;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: f64,
    expires_at: Instant,
}

/// Process-local [`MultiplierCache`]. Expired entries are dropped lazily on
/// read and in bulk by [`MemoryCache::purge_expired`].
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

#[async_trait]
impl MultiplierCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<f64>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value)),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: f64, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn entry_count(&self) -> Result<usize> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries.values().filter(|e| e.expires_at > now).count())
    }
}

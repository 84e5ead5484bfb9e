// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Host load sampling for performance-based scaling.

use crate::error::{EngineError, Result};
use crate::multiplier::SystemLoad;
use std::fs;
use std::io;
use std::num::NonZeroUsize;

/// Source of CPU and memory utilisation samples.
pub trait LoadSource: Send + Sync {
    fn sample(&self) -> Result<SystemLoad>;
}

/// Reads `/proc/loadavg` and `/proc/meminfo`.
///
/// CPU is the one-minute load average as a share of available cores, capped
/// at 100.
#[derive(Debug, Clone)]
pub struct ProcLoadSource {
    cores: usize,
}

impl Default for ProcLoadSource {
    fn default() -> Self {
        Self {
            cores: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

impl ProcLoadSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadSource for ProcLoadSource {
    fn sample(&self) -> Result<SystemLoad> {
        let loadavg = fs::read_to_string("/proc/loadavg")?;
        let meminfo = fs::read_to_string("/proc/meminfo")?;
        Ok(SystemLoad {
            cpu_percent: parse_cpu_percent(&loadavg, self.cores)?,
            memory_percent: parse_memory_percent(&meminfo)?,
        })
    }
}

/// A source that always reports the same load.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLoadSource(pub SystemLoad);

impl LoadSource for FixedLoadSource {
    fn sample(&self) -> Result<SystemLoad> {
        Ok(self.0)
    }
}

fn malformed(message: String) -> EngineError {
    io::Error::new(io::ErrorKind::InvalidData, message).into()
}

fn parse_cpu_percent(loadavg: &str, cores: usize) -> Result<f64> {
    let one_minute: f64 = loadavg
        .split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| malformed(format!("malformed loadavg: {loadavg:?}")))?;
    Ok((one_minute / cores.max(1) as f64 * 100.0).min(100.0))
}

fn parse_memory_percent(meminfo: &str) -> Result<f64> {
    let field = |name: &str| -> Option<f64> {
        meminfo
            .lines()
            .find_map(|line| line.strip_prefix(name))
            .and_then(|rest| rest.trim_start_matches(':').split_whitespace().next())
            .and_then(|kb| kb.parse().ok())
    };

    match (field("MemTotal"), field("MemAvailable")) {
        (Some(total), Some(available)) if total > 0.0 => {
            Ok(((total - available) / total * 100.0).clamp(0.0, 100.0))
        }
        _ => Err(malformed("meminfo lacks MemTotal/MemAvailable".to_string())),
    }
}

// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Adaptive Rate Limiter Service
//!
//! A threat-aware rate limiting check service. A reverse proxy calls
//! `/check` for every inbound request and receives an allow/deny decision
//! that combines:
//!
//! - A tiered token bucket base limit
//! - Threat intelligence (suspicious, bot and trusted IPs, geo risk)
//! - Per-client behavior analysis
//! - Adaptive quota scaling from latency, error rate and host load
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `SENSITIVITY`: Threat score scalar (default: 1.0)
//! - `RESPONSE_TIME_THRESHOLD_MS`, `ERROR_RATE_THRESHOLD`, `CPU_THRESHOLD`,
//!   `MEMORY_THRESHOLD`: performance scaling thresholds
//! - `ENABLE_ADAPTIVE_THROTTLING`, `ENABLE_INTELLIGENT_BLOCKING`,
//!   `ENABLE_PERFORMANCE_SCALING`, `ENABLE_BEHAVIOR_ANALYSIS`: feature toggles
//! - `DEFAULT_TIER_RPM`: requests per minute for the default tier (default: 60)
//! - `COOLDOWN_MS`: Burst cooldown in milliseconds (default: 30000)
//! - `METRICS_ENABLED`: expose Prometheus metrics (default: true)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use adaptive_rate_limiter::{
    config::Config,
    handlers::{router, AppState},
    load::ProcLoadSource,
    maintenance, IntelligentRateLimiter, MemoryCache, TokenBucketLimiter,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        bind_addr = %config.bind_addr,
        sensitivity = config.engine.sensitivity,
        intelligent_blocking = config.engine.intelligent_blocking,
        performance_scaling = config.engine.performance_scaling,
        default_tier = %config.base_limit.default_tier,
        "Starting adaptive rate limiter"
    );

    let base = Arc::new(TokenBucketLimiter::new(config.base_limit.clone()));
    let cache = Arc::new(MemoryCache::new());
    let engine = Arc::new(
        IntelligentRateLimiter::new(config.engine.clone(), base.clone(), cache.clone())?
            .with_maintenance(config.maintenance.clone()),
    );

    let maintainers = maintenance::spawn(engine.clone(), Arc::new(ProcLoadSource::new()));

    // Base limiter and cache housekeeping
    let cleanup = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            base.cleanup().await;
            let purged = cache.purge_expired().await;
            tracing::debug!(purged, "Housekeeping complete");
        }
    });

    let state = Arc::new(AppState {
        engine,
        config: config.clone(),
    });
    let app = router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup.abort();
    maintainers.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

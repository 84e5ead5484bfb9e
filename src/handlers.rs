// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the adaptive rate limiter service.
//!
//! The service runs as an external check service: a reverse proxy calls
//! `/check` before forwarding a request, and reports the upstream outcome
//! to `/outcome` so performance scaling sees real latencies.

use crate::config::Config;
use crate::engine::{IntelligenceAnalytics, IntelligentRateLimiter};
use crate::threat::{RequestContext, ThreatLevel};
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared application state.
pub struct AppState {
    pub engine: Arc<IntelligentRateLimiter>,
    pub config: Config,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Rate limit check request.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// Limiter key; defaults to `ip:<ip>`
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub geo_location: Option<String>,
}

fn default_endpoint() -> String {
    "/".to_string()
}

/// Rate limit check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub remaining: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    pub threat_level: ThreatLevel,
    pub multiplier: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub headers: BTreeMap<String, String>,
}

/// Upstream outcome report.
#[derive(Debug, Deserialize)]
pub struct OutcomeRequest {
    pub key: String,
    pub latency_ms: f64,
    #[serde(default)]
    pub error: bool,
}

#[derive(Debug, Deserialize)]
pub struct IpRequest {
    pub ip: String,
}

#[derive(Debug, Deserialize)]
pub struct GeoRiskRequest {
    pub region: String,
    pub risk: f64,
}

fn bad_request(error: impl Into<String>, code: &'static str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.into(),
            code,
        }),
    )
        .into_response()
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/check", post(check))
        .route("/outcome", post(outcome))
        .route("/analytics", get(analytics))
        .route("/admin/trusted", post(add_trusted))
        .route("/admin/suspicious", post(add_suspicious))
        .route("/admin/geo", put(set_geo_risk));

    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "adaptive-rate-limiter",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Decide whether a proxied request may proceed.
///
/// Always answers 200 for well-formed requests so the proxy can read the
/// body; the decision is in `allowed`.
pub async fn check(State(state): State<Arc<AppState>>, Json(req): Json<CheckRequest>) -> Response {
    if let Some(ip) = req.ip.as_deref() {
        if ip.parse::<IpAddr>().is_err() {
            warn!(%ip, "Invalid IP address format");
            return bad_request("Invalid IP address format", "INVALID_IP");
        }
    }

    let key = match (req.key.as_deref(), req.ip.as_deref()) {
        (Some(key), _) => key.to_string(),
        (None, Some(ip)) => format!("ip:{ip}"),
        (None, None) => return bad_request("Either key or ip is required", "MISSING_KEY"),
    };
    let tier = req
        .tier
        .as_deref()
        .unwrap_or(state.config.base_limit.default_tier.as_str());

    let context = (req.ip.is_some() || req.user_agent.is_some() || req.geo_location.is_some())
        .then(|| RequestContext {
            ip: req.ip.clone(),
            user_agent: req.user_agent.clone(),
            geo_location: req.geo_location.clone(),
        });

    debug!(%key, %tier, endpoint = %req.endpoint, "Processing rate limit check");
    let decision = state
        .engine
        .intelligent_rate_limit(&key, tier, &req.endpoint, context.as_ref())
        .await;

    let mut headers = HeaderMap::new();
    for (name, value) in &decision.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }

    let body = CheckResponse {
        allowed: decision.allowed,
        remaining: decision.remaining,
        retry_after_secs: decision.retry_after,
        threat_level: decision.threat_level,
        multiplier: decision.multiplier,
        reason: decision.reason().map(str::to_string),
        headers: decision.headers,
    };
    (StatusCode::OK, headers, Json(body)).into_response()
}

/// Record an upstream response for performance scaling.
pub async fn outcome(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OutcomeRequest>,
) -> Response {
    if !req.latency_ms.is_finite() || req.latency_ms < 0.0 {
        return bad_request("latency_ms must be a non-negative number", "INVALID_LATENCY");
    }
    state
        .engine
        .record_response(&req.key, req.latency_ms, req.error)
        .await;
    StatusCode::NO_CONTENT.into_response()
}

pub async fn analytics(State(state): State<Arc<AppState>>) -> Json<IntelligenceAnalytics> {
    Json(state.engine.intelligence_analytics().await)
}

pub async fn add_trusted(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IpRequest>,
) -> Response {
    if req.ip.parse::<IpAddr>().is_err() {
        return bad_request("Invalid IP address format", "INVALID_IP");
    }
    state.engine.add_trusted_ip(&req.ip).await;
    StatusCode::NO_CONTENT.into_response()
}

pub async fn add_suspicious(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IpRequest>,
) -> Response {
    if req.ip.parse::<IpAddr>().is_err() {
        return bad_request("Invalid IP address format", "INVALID_IP");
    }
    state.engine.add_suspicious_ip(&req.ip).await;
    StatusCode::NO_CONTENT.into_response()
}

pub async fn set_geo_risk(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GeoRiskRequest>,
) -> Response {
    let region = req.region.trim();
    if region.is_empty() || !region.chars().all(|c| c.is_ascii_alphanumeric()) {
        return bad_request("Region must be an alphanumeric code", "INVALID_REGION");
    }
    if !req.risk.is_finite() {
        return bad_request("risk must be a number", "INVALID_RISK");
    }
    state.engine.set_geo_risk(region, req.risk).await;
    info!(%region, risk = req.risk, "Geo risk set via admin API");
    StatusCode::NO_CONTENT.into_response()
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.engine.metrics().encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

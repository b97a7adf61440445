//! Health check endpoints
//!
//! Kubernetes-style probes:
//! - /health, /healthz - liveness (is the service running?)
//! - /ready, /readyz - readiness (can it serve authoritative state?)
//!
//! Liveness always returns 200 while the process is up. Readiness requires
//! a persistent store outside dev mode - a production instance running on
//! the in-memory store must not take traffic, since balances would vanish
//! on restart.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::server::AppState;
use crate::routes::respond::json_response;

/// Health response for probes and the ops dashboard
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall health status (true if service is running)
    pub healthy: bool,
    /// 'online' when fully operational, 'degraded' on the volatile store
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
    /// Seconds since process start
    pub uptime: u64,
    /// Current timestamp
    pub timestamp: String,
    /// Operating mode
    pub mode: String,
    /// Node identifier
    pub node_id: String,
    /// Store status
    pub store: StoreHealth,
    /// Whether the SAKA economy is switched on for this deployment
    pub saka_enabled: bool,
}

/// Store connection health details
#[derive(Serialize)]
pub struct StoreHealth {
    /// Whether state survives a restart (MongoDB-backed)
    pub persistent: bool,
    /// Whether NATS cycle triggers are available
    pub messaging: bool,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let args = &state.args;
    let persistent = state.store.is_persistent();

    let status = if persistent || args.dev_mode {
        "online"
    } else {
        "degraded"
    };

    HealthResponse {
        healthy: true,
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if args.dev_mode {
            "development".to_string()
        } else {
            "production".to_string()
        },
        node_id: args.node_id.to_string(),
        store: StoreHealth {
            persistent,
            messaging: state.nats.is_some(),
        },
        saka_enabled: args.features.saka_enabled,
    }
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(&state))
}

/// Handle readiness probe (/ready, /readyz)
///
/// Ready when the store is persistent, or always in dev mode.
pub fn readiness_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let response = build_health_response(&state);
    let is_ready = response.store.persistent || state.args.dev_mode;

    let status = if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    json_response(status, &response)
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    /// Cargo package version
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    /// Build timestamp
    pub build_time: &'static str,
    /// Service name
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
            build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
            service: "granary",
        },
    )
}

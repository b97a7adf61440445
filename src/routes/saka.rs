//! SAKA economy endpoints
//!
//! ## Routes
//!
//! - `POST /api/saka/earn/` - credit the caller for platform activity
//! - `GET /api/saka/silo/` - common pool snapshot
//! - `GET /api/saka/compost-preview/` - per-caller decay preview
//! - `POST /api/saka/compost-run/` - admin compost trigger (dry or live)
//! - `GET /api/saka/stats/` - global stats, daily series, leaderboards
//! - `GET /api/saka/compost-logs/` - recent run logs
//! - `GET /api/saka/cycles/` - closed season records

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::{CompostLogDoc, CycleDoc, RunSource};
use crate::nats::{CycleKind, CycleTrigger};
use crate::routes::respond::{
    error_response, json_response, parse_query_params, read_json, read_json_or_default,
    require_admin, require_user,
};
use crate::server::AppState;
use crate::stats::{DEFAULT_STATS_DAYS, DEFAULT_TOP_LIMIT};
use crate::types::GranaryError;

/// Default page size for log listings
const DEFAULT_LOG_LIMIT: usize = 20;

// ============================================================================
// Earn
// ============================================================================

#[derive(Deserialize)]
struct EarnRequest {
    amount: i64,
    #[serde(default)]
    reason: Option<String>,
}

/// Handle `POST /api/saka/earn/`
///
/// Internal credit endpoint called by the content hub when a user earns
/// grains (reading, contributing). Creates the wallet on first harvest.
pub async fn handle_earn(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: Option<&str>,
) -> Response<Full<Bytes>> {
    let user_id = match require_user(user_id) {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };

    if !state.args.features.saka_enabled {
        return error_response(&GranaryError::FeatureDisabled("saka"));
    }

    let request: EarnRequest = match read_json(req).await {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    let reason = request
        .reason
        .unwrap_or_else(|| "content consumption".to_string());

    match state.ledger.credit(user_id, request.amount, reason).await {
        Ok(wallet) => json_response(
            StatusCode::OK,
            &json!({
                "success": true,
                "balance": wallet.balance,
                "total_harvested": wallet.total_harvested,
            }),
        ),
        Err(e) => error_response(&e),
    }
}

// ============================================================================
// Silo
// ============================================================================

/// Handle `GET /api/saka/silo/`
pub async fn handle_silo(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.silo.snapshot(state.args.features.saka_enabled).await {
        Ok(snapshot) => json_response(StatusCode::OK, &snapshot),
        Err(e) => error_response(&e),
    }
}

// ============================================================================
// Compost preview
// ============================================================================

/// Handle `GET /api/saka/compost-preview/`
pub async fn handle_compost_preview(
    state: Arc<AppState>,
    user_id: Option<&str>,
) -> Response<Full<Bytes>> {
    let user_id = match require_user(user_id) {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };

    if !state.args.saka_compost_active() {
        // Disabled deployments degrade quietly: nothing will ever compost
        return json_response(
            StatusCode::OK,
            &json!({
                "enabled": false,
                "eligible": false,
                "amount": 0,
                "days_until_eligible": null,
                "last_activity_date": null,
            }),
        );
    }

    match state.compost.preview(user_id).await {
        Ok(preview) => json_response(
            StatusCode::OK,
            &json!({
                "enabled": true,
                "eligible": preview.eligible,
                "amount": preview.amount,
                "days_until_eligible": preview.days_until_eligible,
                "last_activity_date": preview.last_activity_date,
            }),
        ),
        Err(e) => error_response(&e),
    }
}

// ============================================================================
// Compost run (admin)
// ============================================================================

#[derive(Deserialize)]
struct CompostRunRequest {
    /// Defaults to true: an explicit `false` is required to move grains
    #[serde(default = "default_dry_run")]
    dry_run: bool,
}

fn default_dry_run() -> bool {
    true
}

impl Default for CompostRunRequest {
    fn default() -> Self {
        Self { dry_run: true }
    }
}

/// Handle `POST /api/saka/compost-run/`
///
/// Dry runs execute inline and return the would-be counts for admin
/// preview. Live runs are dispatched to the cycle worker over NATS; when
/// messaging is absent (dev mode) they execute inline instead.
pub async fn handle_compost_run(
    req: Request<Incoming>,
    state: Arc<AppState>,
    admin_key: Option<&str>,
) -> Response<Full<Bytes>> {
    if let Err(e) = require_admin(&state, admin_key) {
        return error_response(&e);
    }

    if !state.args.saka_compost_active() {
        return error_response(&GranaryError::FeatureDisabled("saka_compost"));
    }

    let request: CompostRunRequest = match read_json_or_default(req).await {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    if request.dry_run {
        return match state.compost.run(true, RunSource::Manual).await {
            Ok(log) => json_response(
                StatusCode::OK,
                &json!({
                    "ok": true,
                    "dry_run": true,
                    "wallets_affected": log.wallets_affected,
                    "total_composted": log.total_composted,
                }),
            ),
            Err(e) => error_response(&e),
        };
    }

    // Live run: hand off to the worker when messaging is available
    if let Some(ref nats) = state.nats {
        let trigger = CycleTrigger::manual(CycleKind::Compost, None);
        let payload = match serde_json::to_vec(&trigger) {
            Ok(p) => p,
            Err(e) => return error_response(&GranaryError::Internal(e.to_string())),
        };

        return match nats.publish(trigger.kind.subject(), payload.into()).await {
            Ok(()) => {
                info!(trigger_id = %trigger.trigger_id, "Compost cycle trigger queued");
                json_response(
                    StatusCode::ACCEPTED,
                    &json!({
                        "ok": true,
                        "reason": "cycle trigger queued",
                        "trigger_id": trigger.trigger_id,
                    }),
                )
            }
            Err(e) => error_response(&e),
        };
    }

    // No messaging (dev mode): run inline
    match state.compost.run(false, RunSource::Manual).await {
        Ok(log) => json_response(
            StatusCode::OK,
            &json!({
                "ok": true,
                "dry_run": false,
                "wallets_affected": log.wallets_affected,
                "total_composted": log.total_composted,
            }),
        ),
        Err(e) => error_response(&e),
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Handle `GET /api/saka/stats/?days=&limit=`
pub async fn handle_stats(state: Arc<AppState>, query: Option<&str>) -> Response<Full<Bytes>> {
    let params = parse_query_params(query.unwrap_or(""));
    let days = params
        .get("days")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(DEFAULT_STATS_DAYS);
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_TOP_LIMIT);

    match state.stats.stats(days, limit).await {
        Ok(stats) => json_response(StatusCode::OK, &stats),
        Err(e) => error_response(&e),
    }
}

// ============================================================================
// Compost logs
// ============================================================================

/// Run log shaped for the API (timestamps as RFC 3339)
#[derive(Serialize)]
struct CompostLogResponse {
    run_id: String,
    started_at: String,
    finished_at: Option<String>,
    dry_run: bool,
    wallets_scanned: i64,
    wallets_affected: i64,
    wallets_skipped: i64,
    total_composted: i64,
    source: RunSource,
}

impl From<CompostLogDoc> for CompostLogResponse {
    fn from(log: CompostLogDoc) -> Self {
        Self {
            run_id: log.run_id,
            started_at: log.started_at.to_chrono().to_rfc3339(),
            finished_at: log.finished_at.map(|d| d.to_chrono().to_rfc3339()),
            dry_run: log.dry_run,
            wallets_scanned: log.wallets_scanned,
            wallets_affected: log.wallets_affected,
            wallets_skipped: log.wallets_skipped,
            total_composted: log.total_composted,
            source: log.source,
        }
    }
}

/// Handle `GET /api/saka/compost-logs/?limit=`
pub async fn handle_compost_logs(
    state: Arc<AppState>,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let params = parse_query_params(query.unwrap_or(""));
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .min(100);

    match state.store.list_compost_logs(limit).await {
        Ok(logs) => {
            let logs: Vec<CompostLogResponse> = logs.into_iter().map(Into::into).collect();
            json_response(StatusCode::OK, &logs)
        }
        Err(e) => error_response(&e),
    }
}

// ============================================================================
// Cycles
// ============================================================================

/// Season record shaped for the API
#[derive(Serialize)]
struct CycleResponse {
    cycle_number: i64,
    composted: i64,
    redistributed: i64,
    closed_at: String,
}

impl From<CycleDoc> for CycleResponse {
    fn from(cycle: CycleDoc) -> Self {
        Self {
            cycle_number: cycle.cycle_number,
            composted: cycle.composted,
            redistributed: cycle.redistributed,
            closed_at: cycle.closed_at.to_chrono().to_rfc3339(),
        }
    }
}

/// Handle `GET /api/saka/cycles/`
pub async fn handle_cycles(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.store.list_cycles(50).await {
        Ok(cycles) => {
            let cycles: Vec<CycleResponse> = cycles.into_iter().map(Into::into).collect();
            json_response(StatusCode::OK, &cycles)
        }
        Err(e) => error_response(&e),
    }
}

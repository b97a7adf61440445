//! Global assets endpoint
//!
//! Serves the per-user asset summary the impact dashboard renders. Cash is
//! custodied by the external treasury service and only echoed here; SAKA
//! grains are non-monetary and the two must never read as convertible, so
//! every payload that co-locates them carries the disclaimer.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::routes::respond::{error_response, json_response, require_user};
use crate::server::AppState;
use crate::stats::impact_score;

/// Fixed compliance disclaimer for any SAKA + currency co-display
pub const SAKA_DISCLAIMER: &str = "SAKA grains are non-monetary and non-convertible";

/// SAKA slice of the assets payload
#[derive(Serialize)]
pub struct SakaAssets {
    pub balance: i64,
    pub total_harvested: i64,
    pub total_planted: i64,
    pub total_composted: i64,
}

/// Response for `GET /api/impact/global-assets/`
#[derive(Serialize)]
pub struct GlobalAssetsResponse {
    /// Reported by the external treasury; granary holds no currency
    pub cash_balance: f64,
    pub saka: SakaAssets,
    pub impact_score: i64,
    pub saka_disclaimer: &'static str,
}

/// Handle `GET /api/impact/global-assets/`
pub async fn handle_global_assets(
    state: Arc<AppState>,
    user_id: Option<&str>,
) -> Response<Full<Bytes>> {
    let user_id = match require_user(user_id) {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };

    let wallet = match state.ledger.snapshot(user_id).await {
        Ok(w) => w,
        Err(e) => return error_response(&e),
    };

    // A user with no wallet yet simply has zero grains everywhere
    let (saka, score) = match wallet {
        Some(w) => (
            SakaAssets {
                balance: w.balance,
                total_harvested: w.total_harvested,
                total_planted: w.total_planted,
                total_composted: w.total_composted,
            },
            impact_score(&w),
        ),
        None => (
            SakaAssets {
                balance: 0,
                total_harvested: 0,
                total_planted: 0,
                total_composted: 0,
            },
            0,
        ),
    };

    json_response(
        StatusCode::OK,
        &GlobalAssetsResponse {
            cash_balance: 0.0,
            saka,
            impact_score: score,
            saka_disclaimer: SAKA_DISCLAIMER,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_never_shows_currency_symbols() {
        let response = GlobalAssetsResponse {
            cash_balance: 120.5,
            saka: SakaAssets {
                balance: 350,
                total_harvested: 400,
                total_planted: 50,
                total_composted: 0,
            },
            impact_score: 500,
            saka_disclaimer: SAKA_DISCLAIMER,
        };

        let json = serde_json::to_string(&response).unwrap();
        // SAKA amounts are never presented as currency
        assert!(!json.contains('€'));
        assert!(!json.contains("EUR"));
        assert!(json.contains("non-monetary"));
    }
}

//! Poll voting endpoint
//!
//! `POST /api/polls/{id}/vote/` - record a quadratic vote with optional
//! SAKA-funded intensity. The debit and the vote record are all-or-nothing;
//! an insufficient balance leaves no trace and returns the shortfall hint.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::db::schemas::Allocation;
use crate::routes::respond::{error_response, json_response, read_json, require_user};
use crate::server::AppState;

#[derive(Deserialize)]
struct VoteRequest {
    votes: Vec<VoteAllocation>,
    #[serde(default)]
    intensity: Option<i32>,
}

#[derive(Deserialize)]
struct VoteAllocation {
    option_id: String,
    points: i64,
}

/// Handle `POST /api/polls/{id}/vote/`
pub async fn handle_vote(
    req: Request<Incoming>,
    state: Arc<AppState>,
    poll_id: &str,
    user_id: Option<&str>,
) -> Response<Full<Bytes>> {
    let user_id = match require_user(user_id) {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };

    let request: VoteRequest = match read_json(req).await {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    let allocations: Vec<Allocation> = request
        .votes
        .into_iter()
        .map(|v| Allocation {
            option_id: v.option_id,
            points: v.points,
        })
        .collect();

    match state
        .votes
        .cast_vote(poll_id, user_id, allocations, request.intensity)
        .await
    {
        Ok(receipt) if receipt.saka_applied => json_response(
            StatusCode::OK,
            &json!({
                "success": true,
                "saka_info": {
                    "weight": receipt.weight,
                    "saka_spent": receipt.saka_spent,
                },
            }),
        ),
        // SAKA voting disabled: plain success, no saka_info block
        Ok(_) => json_response(StatusCode::OK, &json!({ "success": true })),
        Err(e) => error_response(&e),
    }
}

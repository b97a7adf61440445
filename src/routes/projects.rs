//! Project boost endpoint
//!
//! `POST /api/projets/{id}/boost/` - plant grains into a project. The
//! French route segment is part of the published contract and is kept
//! verbatim.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::routes::respond::{error_response, json_response, read_json, require_user};
use crate::server::AppState;

#[derive(Deserialize)]
struct BoostRequest {
    amount: i64,
}

/// Handle `POST /api/projets/{id}/boost/`
pub async fn handle_boost(
    req: Request<Incoming>,
    state: Arc<AppState>,
    project_id: &str,
    user_id: Option<&str>,
) -> Response<Full<Bytes>> {
    let user_id = match require_user(user_id) {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };

    let request: BoostRequest = match read_json(req).await {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    match state
        .votes
        .boost_project(project_id, user_id, request.amount)
        .await
    {
        Ok(receipt) => json_response(
            StatusCode::OK,
            &json!({
                "success": true,
                "new_saka_score": receipt.new_saka_score,
                "new_saka_supporters_count": receipt.new_saka_supporters_count,
                "saka_spent": receipt.saka_spent,
            }),
        ),
        Err(e) => error_response(&e),
    }
}

//! Feature flag endpoint
//!
//! The frontend reads these once at boot and degrades its SAKA surfaces
//! when a flag is off, rather than surfacing errors.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::routes::respond::json_response;
use crate::server::AppState;

/// Flags served by `GET /api/config/features/`
#[derive(Serialize)]
pub struct FeatureFlagsResponse {
    pub saka_enabled: bool,
    pub saka_vote_enabled: bool,
    pub saka_compost_enabled: bool,
    pub saka_project_boost_enabled: bool,
    /// Whether the shared pool surface is live (follows the compost flag -
    /// a silo without compost inflow has nothing to show)
    pub saka_silo_enabled: bool,
}

/// Handle `GET /api/config/features/`
pub fn handle_feature_flags(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let f = &state.args.features;
    json_response(
        StatusCode::OK,
        &FeatureFlagsResponse {
            saka_enabled: f.saka_enabled,
            saka_vote_enabled: state.args.saka_vote_active(),
            saka_compost_enabled: state.args.saka_compost_active(),
            saka_project_boost_enabled: state.args.saka_boost_active(),
            saka_silo_enabled: state.args.saka_compost_active(),
        },
    )
}

//! HTTP server implementation
//!
//! hyper http1 with TokioIo for async handling; routing is a plain match
//! over method and normalized path.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::compost::{CompostConfig, CompostPolicy};
use crate::config::Args;
use crate::ledger::WalletLedger;
use crate::nats::NatsClient;
use crate::routes;
use crate::silo::SiloService;
use crate::stats::StatsService;
use crate::store::SakaStore;
use crate::types::GranaryError;
use crate::votes::{VoteConfig, VoteService};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<SakaStore>,
    /// Cycle trigger messaging; absent in dev mode without NATS
    pub nats: Option<NatsClient>,
    pub ledger: WalletLedger,
    pub silo: SiloService,
    /// Compost serves the preview endpoint and inline dry runs; live
    /// redistribution belongs to the worker binary alone
    pub compost: Arc<CompostPolicy>,
    pub votes: VoteService,
    pub stats: StatsService,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Wire up all services over one store
    pub fn new(args: Args, store: Arc<SakaStore>, nats: Option<NatsClient>) -> Self {
        let economy = &args.economy;

        let compost = Arc::new(CompostPolicy::new(
            Arc::clone(&store),
            CompostConfig {
                rate: economy.compost_rate,
                inactivity_threshold_days: economy.inactivity_threshold_days,
            },
        ));
        let votes = VoteService::new(
            Arc::clone(&store),
            VoteConfig {
                saka_vote_enabled: args.saka_vote_active(),
                boost_enabled: args.saka_boost_active(),
                cost_per_intensity: economy.saka_cost_per_intensity,
            },
        );

        Self {
            ledger: WalletLedger::new(Arc::clone(&store)),
            silo: SiloService::new(Arc::clone(&store)),
            compost,
            votes,
            stats: StatsService::new(Arc::clone(&store)),
            args,
            store,
            nats,
            started_at: Instant::now(),
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), GranaryError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Granary listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());

    debug!("[{}] {} {}", addr, method, path);

    // Identity headers, injected by the platform edge
    let user_id = req
        .headers()
        .get("x-user-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let admin_key = req
        .headers()
        .get("x-admin-key")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    // The observed frontend contract uses trailing slashes; accept both
    let norm = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path.as_str()
    };

    let response = match (method, norm) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Readiness probe - 503 while the store is volatile in production
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(Arc::clone(&state))
        }

        // Version info for deployment verification
        (Method::GET, "/version") => routes::version_info(),

        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        // Feature flags the frontend reads at boot
        (Method::GET, "/api/config/features") => {
            routes::handle_feature_flags(Arc::clone(&state))
        }

        // Per-user asset summary for the impact dashboard
        (Method::GET, "/api/impact/global-assets") => {
            routes::handle_global_assets(Arc::clone(&state), user_id.as_deref()).await
        }

        // ====================================================================
        // SAKA economy
        // ====================================================================
        (Method::POST, "/api/saka/earn") => {
            routes::handle_earn(req, Arc::clone(&state), user_id.as_deref()).await
        }

        (Method::GET, "/api/saka/silo") => routes::handle_silo(Arc::clone(&state)).await,

        (Method::GET, "/api/saka/compost-preview") => {
            routes::handle_compost_preview(Arc::clone(&state), user_id.as_deref()).await
        }

        (Method::POST, "/api/saka/compost-run") => {
            routes::handle_compost_run(req, Arc::clone(&state), admin_key.as_deref()).await
        }

        (Method::GET, "/api/saka/stats") => {
            routes::handle_stats(Arc::clone(&state), query.as_deref()).await
        }

        (Method::GET, "/api/saka/compost-logs") => {
            routes::handle_compost_logs(Arc::clone(&state), query.as_deref()).await
        }

        (Method::GET, "/api/saka/cycles") => routes::handle_cycles(Arc::clone(&state)).await,

        // ====================================================================
        // Voting and boosting
        // ====================================================================
        (Method::POST, p) if p.starts_with("/api/polls/") && p.ends_with("/vote") => {
            let poll_id = p
                .strip_prefix("/api/polls/")
                .and_then(|s| s.strip_suffix("/vote"))
                .unwrap_or("");
            routes::handle_vote(req, Arc::clone(&state), poll_id, user_id.as_deref()).await
        }

        (Method::POST, p) if p.starts_with("/api/projets/") && p.ends_with("/boost") => {
            let project_id = p
                .strip_prefix("/api/projets/")
                .and_then(|s| s.strip_suffix("/boost"))
                .unwrap_or("");
            routes::handle_boost(req, Arc::clone(&state), project_id, user_id.as_deref()).await
        }

        _ => not_found_response(norm),
    };

    Ok(response)
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header(
            "Access-Control-Allow-Headers",
            "Content-Type, X-User-Id, X-Admin-Key",
        )
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

/// 404 response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": format!("Not found: {}", path),
        "code": "NOT_FOUND",
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn test_state() -> AppState {
        let args = Args::parse_from(["granary", "--dev-mode", "true"]);
        AppState::new(args, Arc::new(SakaStore::memory_only()), None)
    }

    #[tokio::test]
    async fn test_state_wires_services_over_one_store() {
        let state = test_state();

        // A credit through the ledger is visible to the stats service
        state
            .ledger
            .credit("alice", 42, "content consumption")
            .await
            .unwrap();
        let stats = state.stats.stats(7, 10).await.unwrap();
        assert_eq!(stats.global.circulating_balance, 42);
    }

    #[test]
    fn test_not_found_shape() {
        let resp = not_found_response("/nope");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

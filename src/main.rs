//! Granary - SAKA grain economy service for EGOEJO
//!
//! "What falls to the ground feeds the next season"

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use granary::{
    config::Args,
    db::MongoClient,
    nats::NatsClient,
    server,
    store::SakaStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("granary={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Granary - SAKA economy service");
    info!("  \"What falls to the ground feeds the next season\"");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}", args.mongodb_uri);
    info!("NATS: {}", args.nats.nats_url);
    info!(
        "Economy: compost {}%/cycle after {}d, redistribution {}% to {}d-active, intensity {} grains/level",
        args.economy.compost_rate * 100.0,
        args.economy.inactivity_threshold_days,
        args.economy.redistribution_rate * 100.0,
        args.economy.redistribution_window_days,
        args.economy.saka_cost_per_intensity,
    );
    info!(
        "Features: saka={} vote={} compost={} boost={}",
        args.features.saka_enabled,
        args.saka_vote_active(),
        args.saka_compost_active(),
        args.saka_boost_active(),
    );
    info!("======================================");

    // Connect to MongoDB (optional in dev mode)
    let store = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Arc::new(SakaStore::new(client).await?)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                Arc::new(SakaStore::memory_only())
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    // Connect to NATS (optional in dev mode)
    let nats = match NatsClient::new(&args.nats, &format!("granary-{}", args.node_id)).await {
        Ok(client) => {
            info!("NATS connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("NATS connection failed (dev mode, cycle triggers run inline): {}", e);
                None
            } else {
                error!("NATS connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let state = Arc::new(server::AppState::new(args, store, nats));

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}

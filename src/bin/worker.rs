//! Granary Worker - scheduled SAKA cycle runner
//!
//! Runs the compost and redistribution cycles on their configured
//! intervals and listens for manual cycle triggers dispatched by the API
//! over NATS. Runs alongside the `granary` API server against the same
//! MongoDB.
//!
//! Usage:
//!   granary-worker --mongodb-uri mongodb://localhost:27017
//!
//! Environment variables mirror the API server's (MONGODB_URI, NATS_URL,
//! COMPOST_RATE, COMPOST_INTERVAL_HOURS, ...).

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use granary::{
    config::Args,
    db::MongoClient,
    nats::NatsClient,
    store::SakaStore,
    worker::CycleWorker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,granary=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!(
        "Starting granary worker (node {}, compost every {}h, redistribution every {}h)",
        args.node_id,
        args.economy.compost_interval_hours,
        args.economy.redistribution_interval_hours,
    );

    // The worker is pointless without persistent state outside dev mode
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

    let nats = match NatsClient::new(&args.nats, &format!("granary-worker-{}", args.node_id)).await
    {
        Ok(client) => {
            info!("NATS connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("NATS connection failed (dev mode, manual triggers disabled): {}", e);
                None
            } else {
                error!("NATS connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let worker = CycleWorker::new(&args, store, nats);

    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker.run().await {
            error!("Worker error: {}", e);
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = worker_handle => {
            if let Err(e) = result {
                error!("Worker task error: {}", e);
            }
        }
    }

    info!("Worker shutting down");
    Ok(())
}

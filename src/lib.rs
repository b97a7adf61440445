//! Granary - SAKA grain economy service for EGOEJO
//!
//! "What falls to the ground feeds the next season"
//!
//! Granary is the authoritative backend for the SAKA point economy: a
//! non-monetary grain currency that is harvested (earned), planted (spent),
//! composted (decayed from inactive wallets into a shared pool) and
//! redistributed back to active wallets.
//!
//! ## Services
//!
//! - **Ledger**: per-wallet balance custody with an append-only entry log
//! - **Compost**: inactivity decay cycles feeding the Silo
//! - **Silo**: the shared pool of composted grains
//! - **Redistribution**: periodic Silo payouts to active wallets
//! - **Votes**: quadratic vote weighting with SAKA-funded intensity
//! - **Worker**: scheduled cycle runner (see `granary-worker` binary)

pub mod compost;
pub mod config;
pub mod db;
pub mod ledger;
pub mod nats;
pub mod redistribution;
pub mod routes;
pub mod server;
pub mod silo;
pub mod stats;
pub mod store;
pub mod types;
pub mod votes;
pub mod worker;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GranaryError, Result};

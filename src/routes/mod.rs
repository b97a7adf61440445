//! HTTP route handlers

pub mod assets;
pub mod features;
pub mod health;
pub mod polls;
pub mod projects;
pub mod respond;
pub mod saka;

pub use assets::handle_global_assets;
pub use features::handle_feature_flags;
pub use health::{health_check, readiness_check, version_info};
pub use polls::handle_vote;
pub use projects::handle_boost;
pub use saka::{
    handle_compost_logs, handle_compost_preview, handle_compost_run, handle_cycles, handle_earn,
    handle_silo, handle_stats,
};

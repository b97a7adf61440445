//! Configuration for Granary
//!
//! CLI arguments and environment variable handling using clap.
//! Every economy parameter is runtime configuration - rates and thresholds
//! are deployment policy, not code.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Granary - SAKA grain economy service for EGOEJO
///
/// "What falls to the ground feeds the next season"
#[derive(Parser, Debug, Clone)]
#[command(name = "granary")]
#[command(about = "SAKA grain economy service for the EGOEJO platform")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory store allowed, admin auth relaxed)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "granary")]
    pub mongodb_db: String,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// API key for admin access (required in production)
    #[arg(long, env = "API_KEY_ADMIN")]
    pub api_key_admin: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Economy parameters
    #[command(flatten)]
    pub economy: EconomyArgs,

    /// Feature flags
    #[command(flatten)]
    pub features: FeatureArgs,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,
}

/// SAKA economy parameters
///
/// Observed production values are the defaults; operators tune per
/// deployment. Rates are fractions in [0, 1].
#[derive(Parser, Debug, Clone)]
pub struct EconomyArgs {
    /// Fraction of an inactive wallet's balance composted per cycle
    #[arg(long, env = "COMPOST_RATE", default_value = "0.10")]
    pub compost_rate: f64,

    /// Days without wallet activity before compost eligibility
    #[arg(long, env = "INACTIVITY_THRESHOLD_DAYS", default_value = "90")]
    pub inactivity_threshold_days: i64,

    /// Fraction of the Silo balance distributed per redistribution cycle
    #[arg(long, env = "REDISTRIBUTION_RATE", default_value = "0.10")]
    pub redistribution_rate: f64,

    /// Recency window (days) qualifying a wallet for redistribution
    #[arg(long, env = "REDISTRIBUTION_WINDOW_DAYS", default_value = "30")]
    pub redistribution_window_days: i64,

    /// Grains debited per vote intensity level
    #[arg(long, env = "SAKA_COST_PER_INTENSITY", default_value = "5")]
    pub saka_cost_per_intensity: i64,

    /// Hours between scheduled compost runs
    #[arg(long, env = "COMPOST_INTERVAL_HOURS", default_value = "24")]
    pub compost_interval_hours: u64,

    /// Hours between scheduled redistribution runs
    #[arg(long, env = "REDISTRIBUTION_INTERVAL_HOURS", default_value = "24")]
    pub redistribution_interval_hours: u64,
}

/// Feature flags for the SAKA subsystem
///
/// `saka_enabled = false` turns the whole economy off: reads report
/// disabled, votes fall back to plain point counting, cycles no-op.
#[derive(Parser, Debug, Clone)]
pub struct FeatureArgs {
    /// Master switch for the SAKA economy
    #[arg(long, env = "SAKA_ENABLED", default_value = "true")]
    pub saka_enabled: bool,

    /// SAKA-funded vote intensity
    #[arg(long, env = "SAKA_VOTE_ENABLED", default_value = "true")]
    pub saka_vote_enabled: bool,

    /// Compost cycles
    #[arg(long, env = "SAKA_COMPOST_ENABLED", default_value = "true")]
    pub saka_compost_enabled: bool,

    /// Project boosting
    #[arg(long, env = "SAKA_PROJECT_BOOST_ENABLED", default_value = "true")]
    pub saka_project_boost_enabled: bool,
}

impl Args {
    /// Whether SAKA vote intensity is active (master switch gates all features)
    pub fn saka_vote_active(&self) -> bool {
        self.features.saka_enabled && self.features.saka_vote_enabled
    }

    /// Whether compost cycles are active
    pub fn saka_compost_active(&self) -> bool {
        self.features.saka_enabled && self.features.saka_compost_enabled
    }

    /// Whether project boosting is active
    pub fn saka_boost_active(&self) -> bool {
        self.features.saka_enabled && self.features.saka_project_boost_enabled
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.api_key_admin.is_none() {
            return Err("API_KEY_ADMIN is required in production mode".to_string());
        }

        let e = &self.economy;
        if !(0.0..=1.0).contains(&e.compost_rate) {
            return Err("COMPOST_RATE must be within [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&e.redistribution_rate) {
            return Err("REDISTRIBUTION_RATE must be within [0, 1]".to_string());
        }
        if e.inactivity_threshold_days <= 0 {
            return Err("INACTIVITY_THRESHOLD_DAYS must be positive".to_string());
        }
        if e.redistribution_window_days <= 0 {
            return Err("REDISTRIBUTION_WINDOW_DAYS must be positive".to_string());
        }
        // Redistribution recipients must be a strict subset of non-compostable
        // wallets, otherwise a wallet could be composted and paid in one cycle.
        if e.redistribution_window_days >= e.inactivity_threshold_days {
            return Err(
                "REDISTRIBUTION_WINDOW_DAYS must be below INACTIVITY_THRESHOLD_DAYS".to_string(),
            );
        }
        if e.saka_cost_per_intensity <= 0 {
            return Err("SAKA_COST_PER_INTENSITY must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["granary", "--dev-mode", "true"])
    }

    #[test]
    fn test_defaults_are_valid() {
        let args = base_args();
        assert!(args.validate().is_ok());
        assert_eq!(args.economy.compost_rate, 0.10);
        assert_eq!(args.economy.inactivity_threshold_days, 90);
        assert_eq!(args.economy.saka_cost_per_intensity, 5);
    }

    #[test]
    fn test_production_requires_admin_key() {
        let args = Args::parse_from(["granary"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["granary", "--api-key-admin", "secret"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_rate_bounds() {
        let mut args = base_args();
        args.economy.compost_rate = 1.5;
        assert!(args.validate().is_err());

        let mut args = base_args();
        args.economy.redistribution_rate = -0.1;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_window_must_be_below_threshold() {
        let mut args = base_args();
        args.economy.redistribution_window_days = 90;
        assert!(args.validate().is_err());

        args.economy.redistribution_window_days = 89;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_master_switch_gates_features() {
        let mut args = base_args();
        assert!(args.saka_vote_active());
        args.features.saka_enabled = false;
        assert!(!args.saka_vote_active());
        assert!(!args.saka_compost_active());
        assert!(!args.saka_boost_active());
    }
}

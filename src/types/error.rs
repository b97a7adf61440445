//! Error types for Granary

use hyper::StatusCode;

/// Main error type for Granary operations
#[derive(Debug, thiserror::Error)]
pub enum GranaryError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A wallet debit exceeded the available balance. Carries the shortfall
    /// so the client can tell the user how many more grains are needed.
    #[error("Insufficient SAKA balance: {required} grains required, {available} available")]
    InsufficientBalance { required: i64, available: i64 },

    /// The Silo cannot cover a withdrawal. Internal - a redistribution run
    /// asked for more than the pool holds, which indicates a scheduling bug.
    #[error("Insufficient Silo balance: {requested} requested, {available} available")]
    InsufficientSilo { requested: i64, available: i64 },

    /// A vote allocated more points than the poll budget allows.
    #[error("Point budget exceeded: {allocated} points allocated, poll allows {max_points}")]
    PointBudgetExceeded { allocated: i64, max_points: i64 },

    /// The SAKA subsystem (or one of its features) is disabled for this
    /// deployment. Handlers degrade to non-SAKA behavior where possible.
    #[error("Feature disabled: {0}")]
    FeatureDisabled(&'static str),

    #[error("NATS error: {0}")]
    Nats(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GranaryError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
            Self::InsufficientSilo { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PointBudgetExceeded { .. } => StatusCode::BAD_REQUEST,
            Self::FeatureDisabled(_) => StatusCode::FORBIDDEN,
            Self::Nats(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the JSON error body
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_SAKA",
            Self::InsufficientSilo { .. } => "INSUFFICIENT_SILO",
            Self::PointBudgetExceeded { .. } => "POINT_BUDGET_EXCEEDED",
            Self::FeatureDisabled(_) => "FEATURE_DISABLED",
            Self::Nats(_) => "MESSAGING_UNAVAILABLE",
            Self::Database(_) => "DATABASE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Remediation hint surfaced alongside user-facing errors
    ///
    /// Insufficient balance is the only error a user can act on directly:
    /// grains are earned by engaging with content, never purchased.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::InsufficientBalance { required, available } => Some(format!(
                "You need {} more grains. Read and engage with content to harvest more SAKA.",
                required - available
            )),
            _ => None,
        }
    }
}

// From conversions for common error types

impl From<std::io::Error> for GranaryError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for GranaryError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for GranaryError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<async_nats::Error> for GranaryError {
    fn from(err: async_nats::Error) -> Self {
        Self::Nats(err.to_string())
    }
}

/// Result type alias for Granary operations
pub type Result<T> = std::result::Result<T, GranaryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_balance_hint_shows_shortfall() {
        let err = GranaryError::InsufficientBalance {
            required: 15,
            available: 5,
        };
        let hint = err.hint().unwrap();
        assert!(hint.contains("10 more grains"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "INSUFFICIENT_SAKA");
    }

    #[test]
    fn test_silo_error_is_internal() {
        let err = GranaryError::InsufficientSilo {
            requested: 100,
            available: 40,
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.hint().is_none());
    }

    #[test]
    fn test_budget_error_message() {
        let err = GranaryError::PointBudgetExceeded {
            allocated: 120,
            max_points: 100,
        };
        assert!(err.to_string().contains("120"));
        assert!(err.to_string().contains("100"));
    }
}

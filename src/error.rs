//! Error types for the trading-safety core

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the trading-safety core
#[derive(Error, Debug)]
pub enum Error {
    // Venue errors
    #[error("Venue {venue} unreachable: {message}")]
    Connectivity { venue: String, message: String },

    #[error("Venue {venue} rejected request: {reason}")]
    Rejection { venue: String, reason: String },

    #[error("Order not found on {venue}: {order_id}")]
    OrderNotFound { venue: String, order_id: String },

    // Routing errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Market data / pipeline errors
    #[error("Insufficient market data: {0}")]
    InsufficientData(String),

    #[error("Market data unavailable: {0}")]
    MarketData(String),

    // Risk errors
    #[error("Risk assessment failed: {0}")]
    RiskAssessment(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    pub fn connectivity(venue: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Connectivity {
            venue: venue.into(),
            message: message.into(),
        }
    }

    pub fn rejection(venue: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Rejection {
            venue: venue.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is retryable (transient)
    ///
    /// Only connectivity failures are retried. A venue that explicitly refused
    /// a request will refuse it again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connectivity { .. })
    }

    /// Check if the venue explicitly refused the request
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Rejection { .. } | Error::OrderNotFound { .. })
    }

    /// Venue this error is isolated to, if any
    pub fn venue(&self) -> Option<&str> {
        match self {
            Error::Connectivity { venue, .. }
            | Error::Rejection { venue, .. }
            | Error::OrderNotFound { venue, .. } => Some(venue),
            _ => None,
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connectivity_is_retryable() {
        assert!(Error::connectivity("binance", "timeout").is_retryable());
        assert!(!Error::rejection("binance", "insufficient balance").is_retryable());
        assert!(!Error::Configuration("unknown intent".into()).is_retryable());
    }

    #[test]
    fn test_rejection_classification() {
        let err = Error::rejection("kraken", "min notional");
        assert!(err.is_rejection());
        assert_eq!(err.venue(), Some("kraken"));
        assert_eq!(
            err.to_string(),
            "Venue kraken rejected request: min notional"
        );
    }
}

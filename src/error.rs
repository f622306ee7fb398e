//! Error types for the trading engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the trading engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    // Discovery feed errors
    #[error("Discovery feed error: {0}")]
    Feed(String),

    #[error("Discovery feed timeout after {0}ms")]
    FeedTimeout(u64),

    // Quote provider errors
    #[error("Quote request failed: {0}")]
    Quote(String),

    #[error("No route for swap: {0}")]
    NoRoute(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    // Trading errors
    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Transaction send failed: {0}")]
    TransactionSend(String),

    #[error("Slippage exceeded: {0}")]
    SlippageExceeded(String),

    // Position management errors
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("State persistence failed: {0}")]
    Persistence(String),

    #[error("Insufficient balance: {available} USD available, {required} USD required")]
    InsufficientBalance { available: f64, required: f64 },

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
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Feed(_)
                | Error::FeedTimeout(_)
                | Error::Rpc(_)
                | Error::RpcTimeout(_)
                | Error::TransactionSend(_)
        )
    }

    /// Check if this error means the swap has no viable route
    pub fn is_no_route(&self) -> bool {
        matches!(self, Error::NoRoute(_))
    }
}

/// Classified failure kind of a submitted swap.
///
/// Collaborators report submission failures as free-form strings, so the
/// classification lives behind this one adapter with an explicit signature
/// table instead of ad hoc matching at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitErrorKind {
    /// The chain rejected the swap because the price moved past the budget
    SlippageExceeded,
    /// The router could not find a viable path for the swap
    NoRoute,
    /// Any other failure
    Other,
}

lazy_static::lazy_static! {
    /// Substrings that identify a slippage rejection across routers.
    /// 0x1771 is Jupiter's SlippageToleranceExceeded custom error code.
    static ref SLIPPAGE_SIGNATURES: Vec<&'static str> = vec![
        "slippage tolerance exceeded",
        "exceeds desired slippage",
        "slippageexceeded",
        "custom program error: 0x1771",
        "error code: 6001",
    ];

    /// Substrings that identify a missing-route response.
    static ref NO_ROUTE_SIGNATURES: Vec<&'static str> = vec![
        "could_not_find_any_route",
        "no route found",
        "no routes found",
    ];
}

/// Map a collaborator's error message onto a structured failure kind.
pub fn classify_submit_error(message: &str) -> SubmitErrorKind {
    let lowered = message.to_lowercase();

    if SLIPPAGE_SIGNATURES.iter().any(|s| lowered.contains(s)) {
        return SubmitErrorKind::SlippageExceeded;
    }

    if NO_ROUTE_SIGNATURES.iter().any(|s| lowered.contains(s)) {
        return SubmitErrorKind::NoRoute;
    }

    SubmitErrorKind::Other
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

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_slippage_signatures() {
        assert_eq!(
            classify_submit_error("Transaction failed: custom program error: 0x1771"),
            SubmitErrorKind::SlippageExceeded
        );
        assert_eq!(
            classify_submit_error("Slippage tolerance exceeded"),
            SubmitErrorKind::SlippageExceeded
        );
        assert_eq!(
            classify_submit_error("swap output exceeds desired slippage limit"),
            SubmitErrorKind::SlippageExceeded
        );
    }

    #[test]
    fn test_classify_no_route() {
        assert_eq!(
            classify_submit_error("COULD_NOT_FIND_ANY_ROUTE"),
            SubmitErrorKind::NoRoute
        );
        assert_eq!(
            classify_submit_error("no route found for mint"),
            SubmitErrorKind::NoRoute
        );
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(
            classify_submit_error("blockhash not found"),
            SubmitErrorKind::Other
        );
        assert_eq!(classify_submit_error(""), SubmitErrorKind::Other);
    }

    #[test]
    fn test_retryable() {
        assert!(Error::Rpc("x".into()).is_retryable());
        assert!(Error::FeedTimeout(5000).is_retryable());
        assert!(!Error::NoRoute("x".into()).is_retryable());
        assert!(!Error::Config("x".into()).is_retryable());
    }
}

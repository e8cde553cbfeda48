use thiserror::Error;

/// Raised by the indicator math when the bucketed series is too short.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("Not enough data for {indicator}: need {needed} buckets, have {available}")]
    InsufficientData {
        indicator: &'static str,
        needed: usize,
        available: usize,
    },
}

/// Failure of one analysis cycle for one pair.
///
/// None of these are fatal for the control loop: the pair is skipped until
/// the next tick.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    InsufficientData(#[from] IndicatorError),

    #[error("No price stored for token {0}")]
    NoPrice(i32),

    #[error("Price store error: {0}")]
    Store(String),
}

/// Reason a trade attempt was abandoned.
///
/// Only `Unconfirmed` may leave a transaction in flight on chain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("Quote mismatch: {0}")]
    QuoteMismatch(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Transaction failed on chain: {0}")]
    Failed(String),

    #[error("Transaction {0} expired before landing")]
    Expired(String),

    #[error("Transaction {0} outcome unknown")]
    Unconfirmed(String),
}

impl From<GatewayError> for ExecutionError {
    fn from(e: GatewayError) -> Self {
        ExecutionError::Transport(e.to_string())
    }
}

/// Errors surfaced by the Market and Wallet gateway adapters.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("No price returned for {0}")]
    MissingPrice(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message() {
        let err = IndicatorError::InsufficientData {
            indicator: "EMA",
            needed: 20,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "Not enough data for EMA: need 20 buckets, have 3"
        );

        let analysis: AnalysisError = err.clone().into();
        assert!(matches!(analysis, AnalysisError::InsufficientData(e) if e == err));
    }

    #[test]
    fn test_gateway_error_becomes_transport_failure() {
        let err: ExecutionError = GatewayError::MissingPrice("SOL".to_string()).into();
        assert!(matches!(err, ExecutionError::Transport(msg) if msg.contains("SOL")));
    }
}

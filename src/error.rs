//! Domain errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("strategy '{0}' is not registered")]
    UnknownPolicy(String),

    #[error("invalid market window for {symbol}: {reason}")]
    InvalidWindow { symbol: String, reason: String },

    #[error("insufficient history: need {needed} periods, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    #[error("current price unavailable for {0}")]
    PriceUnavailable(String),

    #[error("venue error: {0}")]
    Venue(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("market data error: {0}")]
    Data(String),

    #[error("{operation} timed out after {attempts} attempt(s)")]
    Timeout { operation: String, attempts: usize },
}

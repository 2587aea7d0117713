// Error types for the trading bot

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("{what} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        what: String,
        attempts: u32,
        last: String,
    },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Bot '{0}' is already running")]
    AlreadyRunning(String),

    #[error("No bot named '{0}'")]
    UnknownBot(String),

    #[error("Strategy error: {0}")]
    Strategy(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Transient errors are worth retrying; everything else fails the cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BotError::Network(_) | BotError::Timeout(_) | BotError::Exchange(_)
        )
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BotError::Timeout(err.to_string())
        } else if err.is_connect() {
            BotError::Network(err.to_string())
        } else {
            BotError::Exchange(err.to_string())
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Persistence(err.to_string())
    }
}

pub type BotResult<T> = Result<T, BotError>;

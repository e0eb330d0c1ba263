use crate::types::RewardEvent;
use thiserror::Error;

/// Reward store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate reward for idempotency key")]
    Duplicate,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Price source errors.
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Price unavailable for {symbol}: {reason}")]
    Unavailable { symbol: String, reason: String },
}

/// Errors surfaced by the reward and aggregation services.
#[derive(Debug, Error)]
pub enum RewardError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// The idempotency key was already used; carries the reward recorded first.
    #[error("Duplicate reward: {}", .0.id)]
    Duplicate(Box<RewardEvent>),

    /// A sum or product left the representable decimal range.
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pricing(#[from] PriceError),
}

impl RewardError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RewardError::Validation(msg.into())
    }

    pub fn overflow(what: impl Into<String>) -> Self {
        RewardError::Overflow(what.into())
    }
}

pub type Result<T> = std::result::Result<T, RewardError>;

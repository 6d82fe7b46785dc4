//! Error types for the PC28 game engine
//!
//! One root error with nested categories. Store failures are transient and get
//! retried by the next scheduler tick; invalid input is a wiring bug; placement
//! errors are the only ones surfaced synchronously to callers.

use crate::games::types::{RoundStatus, UserId};
use thiserror::Error;

/// Root error type for all engine operations
#[derive(Debug, Error)]
pub enum Pc28Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Placement rejected: {0}")]
    Placement(#[from] PlacementError),

    /// Programming-error guard, e.g. a draw too short to derive a result from
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Record store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness or single-open-round constraint would be violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The row moved on since it was read (e.g. round no longer open)
    #[error("Stale state: {0}")]
    StaleState(String),
}

/// Reasons a wager placement is refused
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("Unknown bet category: {0}")]
    UnknownCategory(String),

    #[error("Bet value {0} is outside 0-27")]
    ValueOutOfRange(u8),

    #[error("Stake must be positive")]
    NonPositiveStake,

    #[error("Round {0} not found")]
    RoundNotFound(u64),

    #[error("Round {round_id} is not accepting bets (status {status})")]
    RoundNotOpen { round_id: u64, status: RoundStatus },

    #[error("Account {0} not found")]
    AccountNotFound(UserId),

    #[error("Insufficient balance: need {need}, have {available}")]
    InsufficientBalance { need: String, available: String },
}

impl From<rocksdb::Error> for Pc28Error {
    fn from(e: rocksdb::Error) -> Self {
        Pc28Error::Storage(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for Pc28Error {
    fn from(e: serde_json::Error) -> Self {
        Pc28Error::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

impl Pc28Error {
    /// Transient failures worth retrying on the next tick
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Pc28Error::Storage(
                StorageError::ReadFailed(_)
                    | StorageError::WriteFailed(_)
                    | StorageError::DatabaseOpenFailed(_)
            )
        )
    }
}

pub type Pc28Result<T> = Result<T, Pc28Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err: Pc28Error = StorageError::WriteFailed("disk full".to_string()).into();
        assert!(err.to_string().contains("Storage error"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_placement_error_details() {
        let err = PlacementError::RoundNotOpen {
            round_id: 7,
            status: RoundStatus::Closed,
        };
        assert!(err.to_string().contains("Round 7"));
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_error_source() {
        let err: Pc28Error = ConfigurationError::LoadFailed("missing".to_string()).into();
        assert!(err.source().is_some());
    }

    #[test]
    fn test_transient_classification() {
        assert!(Pc28Error::from(StorageError::ReadFailed("io".into())).is_transient());
        assert!(!Pc28Error::from(StorageError::Conflict("dup".into())).is_transient());
        assert!(!Pc28Error::InvalidInput("short draw".into()).is_transient());
    }
}

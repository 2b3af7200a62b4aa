//! Error types for the Meridian Router core

use crate::store::StoreError;
use thiserror::Error;

/// Main error type for the router core
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Adapter error on ledger {ledger_id}: {message}")]
    Adapter { ledger_id: String, message: String },

    #[error("Ledger {ledger_id} is not supported")]
    LedgerNotSupported { ledger_id: String },

    #[error("Ledger {ledger_id} is not connected")]
    LedgerNotConnected { ledger_id: String },

    #[error(
        "Insufficient balance on ledger {ledger_id}: requested {requested}, available {available}"
    )]
    InsufficientBalance {
        ledger_id: String,
        requested: u64,
        available: u64,
    },

    #[error("Reservation {reservation_id} not found")]
    ReservationNotFound { reservation_id: String },

    #[error("Cross-ledger operation {operation_id} not found")]
    OperationNotFound { operation_id: String },

    #[error("Swap {swap_id} not found")]
    SwapNotFound { swap_id: String },

    #[error("Asset {asset_id} not found")]
    AssetNotFound { asset_id: String },

    #[error("Confirmation record {confirmation_id} not found")]
    ConfirmationNotFound { confirmation_id: String },

    #[error("Asset {asset_id} is already registered")]
    AlreadyRegistered { asset_id: String },

    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RouterError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RouterError::Store(_)
                | RouterError::Adapter { .. }
                | RouterError::LedgerNotConnected { .. }
                | RouterError::Timeout { .. }
        )
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            RouterError::InsufficientBalance { .. }
                | RouterError::InvalidTransition { .. }
                | RouterError::Unauthorized { .. }
        )
    }
}

/// Result type for router operations
pub type RouterResult<T> = Result<T, RouterError>;

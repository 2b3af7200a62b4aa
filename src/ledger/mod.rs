//! Ledger module - adapter capability and balance/reservation management
//!
//! This module provides:
//! - The `LedgerAdapter` trait the core consumes for every on-ledger action
//! - An in-memory reference adapter for tests and the default wiring
//! - `LedgerManager`: balance reservations, locks, and cross-ledger
//!   operation bookkeeping built on top of registered adapters

pub mod manager;
pub mod memory;

pub use manager::{BalanceReservation, CrossLedgerOperation, LedgerManager, OperationStatus};
pub use memory::InMemoryLedgerAdapter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reference to a submitted ledger transaction
pub type TxRef = String;

/// Asset description as the core sees it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub id: String,
    pub home_ledger: String,
    pub symbol: String,
    pub decimals: u8,
}

/// A transaction as reported back by an adapter lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub tx_ref: TxRef,
    pub from_account: String,
    pub to_account: String,
    pub asset_id: String,
    pub amount: u64,
    pub confirmed: bool,
}

/// Errors raised by adapter implementations
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("not connected")]
    NotConnected,

    #[error("unknown account {0}")]
    UnknownAccount(String),

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u64, available: u64 },

    #[error("transaction {0} not found")]
    TxNotFound(String),

    #[error("ledger rejected operation: {0}")]
    Rejected(String),
}

/// Trait defining the necessary interactions with an underlying ledger.
/// This allows mocking or interfacing with real chains and token systems.
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    /// Ledger this adapter fronts
    fn ledger_id(&self) -> &str;

    async fn connect(&self) -> Result<(), AdapterError>;
    async fn disconnect(&self) -> Result<(), AdapterError>;
    async fn is_connected(&self) -> bool;

    /// Account balance as the ledger reports it, inclusive of any locked
    /// portion. Spendable = available minus locked.
    async fn available_balance(&self, account: &str, asset_id: &str)
        -> Result<u64, AdapterError>;

    /// Balance currently locked on-ledger
    async fn locked_balance(&self, account: &str, asset_id: &str) -> Result<u64, AdapterError>;

    /// Make funds unspendable pending swap completion or unlock
    async fn lock_asset(
        &self,
        account: &str,
        asset_id: &str,
        amount: u64,
    ) -> Result<TxRef, AdapterError>;

    /// Release a previous lock
    async fn unlock_asset(
        &self,
        account: &str,
        asset_id: &str,
        amount: u64,
    ) -> Result<TxRef, AdapterError>;

    async fn transfer(
        &self,
        from_account: &str,
        to_account: &str,
        asset_id: &str,
        amount: u64,
    ) -> Result<TxRef, AdapterError>;

    async fn get_transaction(&self, tx_ref: &str) -> Result<LedgerTransaction, AdapterError>;
}

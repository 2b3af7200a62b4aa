//! Confirmation module - dual-router transfer confirmation
//!
//! This module provides:
//! - Durable per-router confirmation records with rollback
//! - The dual-confirmation status derived from both router roles' records
//! - A bounded-concurrency processor that creates records off the critical path
//! - Regulatory report generation with CSV export

pub mod processor;
pub mod registry;
pub mod report;

pub use processor::{ConfirmationTaskProcessor, ProcessorMetrics, TaskPriority};
pub use registry::ConfirmationRegistry;
pub use report::RegulatoryReport;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Which confirmation slot this router fills for a transfer.
///
/// Configured explicitly; role is never inferred from router naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterRole {
    First,
    Second,
}

/// Status of a single router's confirmation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Failed,
    RolledBack,
}

impl ConfirmationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationStatus::Pending => "pending",
            ConfirmationStatus::Confirmed => "confirmed",
            ConfirmationStatus::Failed => "failed",
            ConfirmationStatus::RolledBack => "rolled_back",
        }
    }
}

/// Transfer details a confirmation record describes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferDetails {
    pub transfer_id: String,
    pub from_account: String,
    pub to_account: String,
    pub asset_id: String,
    pub amount: u64,
}

/// Metadata frozen into a confirmation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationMetadata {
    pub from_account: String,
    pub to_account: String,
    pub asset_id: String,
    pub amount: u64,
    pub ledger_tx_hash: Option<String>,
}

/// One router's durable statement about a transfer.
///
/// Owned by exactly one router; immutable except for the single rollback
/// transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRecord {
    pub id: String,
    pub transfer_id: String,
    pub router_id: String,
    pub status: ConfirmationStatus,
    pub timestamp: DateTime<Utc>,
    pub signature: String,
    pub metadata: ConfirmationMetadata,
    pub rollback_reason: Option<String>,
    pub rolled_back_at: Option<DateTime<Utc>>,
}

/// One role's entry inside a dual-confirmation status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationSlot {
    pub confirmation_id: String,
    pub router_id: String,
    pub status: ConfirmationStatus,
    pub timestamp: DateTime<Utc>,
}

/// Agreement level between the two router roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DualStatus {
    Pending,
    PartialConfirmed,
    DualConfirmed,
    Failed,
}

/// Derived per-transfer consistency status. Always recomputed from the two
/// slots, never independently mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualConfirmationStatus {
    pub transfer_id: String,
    pub first: Option<ConfirmationSlot>,
    pub second: Option<ConfirmationSlot>,
    pub status: DualStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DualConfirmationStatus {
    pub fn empty(transfer_id: impl Into<String>) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            first: None,
            second: None,
            status: DualStatus::Pending,
            completed_at: None,
        }
    }

    pub fn slot(&self, role: RouterRole) -> Option<&ConfirmationSlot> {
        match role {
            RouterRole::First => self.first.as_ref(),
            RouterRole::Second => self.second.as_ref(),
        }
    }

    pub fn set_slot(&mut self, role: RouterRole, slot: ConfirmationSlot) {
        match role {
            RouterRole::First => self.first = Some(slot),
            RouterRole::Second => self.second = Some(slot),
        }
    }
}

/// Pure derivation of the dual status from the two slots.
///
/// Failure (or rollback) of either present slot dominates; dual confirmation
/// needs both slots present and confirmed; one present non-failed slot is
/// partial. Commutative in slot order and idempotent under replay.
pub fn derive_dual_status(
    first: Option<&ConfirmationSlot>,
    second: Option<&ConfirmationSlot>,
) -> DualStatus {
    let bad = |slot: &ConfirmationSlot| {
        matches!(
            slot.status,
            ConfirmationStatus::Failed | ConfirmationStatus::RolledBack
        )
    };

    if first.map(bad).unwrap_or(false) || second.map(bad).unwrap_or(false) {
        return DualStatus::Failed;
    }

    match (first, second) {
        (Some(a), Some(b))
            if a.status == ConfirmationStatus::Confirmed
                && b.status == ConfirmationStatus::Confirmed =>
        {
            DualStatus::DualConfirmed
        }
        (Some(_), None) | (None, Some(_)) => DualStatus::PartialConfirmed,
        _ => DualStatus::Pending,
    }
}

/// Signing capability for confirmation records
pub trait Signer: Send + Sync {
    fn sign(&self, payload: &[u8]) -> String;
}

/// Keyed Keccak-256 digest signer.
///
/// Stands in for the external signing primitives; the registry only needs a
/// stable, key-dependent signature string.
pub struct KeccakSigner {
    key: Vec<u8>,
}

impl KeccakSigner {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    pub fn from_hex(hex_key: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self::new(hex::decode(hex_key)?))
    }
}

impl Signer for KeccakSigner {
    fn sign(&self, payload: &[u8]) -> String {
        let mut hasher = Keccak256::new();
        hasher.update(&self.key);
        hasher.update(payload);
        hex::encode(hasher.finalize())
    }
}

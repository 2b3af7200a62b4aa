//! Atomic swap types and state machine
//!
//! A swap moves two asset legs between an initiator and a responder. Status
//! only moves forward: pending → locking → locked → completed, or diverts
//! once through expired → rolling_back → rolled_back.

pub mod coordinator;

pub use coordinator::SwapCoordinator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ledger::TxRef;

/// Swap lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    Pending,
    /// Responder leg locked, waiting on the initiator side
    LockingInitiator,
    /// Initiator leg locked, waiting on the responder side
    LockingResponder,
    Locked,
    RollingBack,
    RolledBack,
    Completed,
    Expired,
}

impl SwapStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwapStatus::Completed | SwapStatus::RolledBack)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::Pending => "pending",
            SwapStatus::LockingInitiator => "locking_initiator",
            SwapStatus::LockingResponder => "locking_responder",
            SwapStatus::Locked => "locked",
            SwapStatus::RollingBack => "rolling_back",
            SwapStatus::RolledBack => "rolled_back",
            SwapStatus::Completed => "completed",
            SwapStatus::Expired => "expired",
        }
    }
}

/// One side of a swap: one ledger, one asset, one amount
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapLeg {
    pub ledger_id: String,
    pub asset_id: String,
    pub amount: u64,
    /// Account that locks funds on this leg
    pub account: String,
    pub required_confirmations: u32,
    pub lock_tx: Option<TxRef>,
    pub unlock_tx: Option<TxRef>,
    pub complete_tx: Option<TxRef>,
}

/// A named sub-stage inside the progress record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressStep {
    pub completed: bool,
    pub tx: Option<TxRef>,
    pub at: Option<DateTime<Utc>>,
}

/// Caller-facing progress record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapProgress {
    pub stage: String,
    pub percent: u8,
    pub steps: BTreeMap<String, ProgressStep>,
}

impl SwapProgress {
    pub fn new(stage: &str, percent: u8) -> Self {
        Self {
            stage: stage.to_string(),
            percent,
            steps: BTreeMap::new(),
        }
    }

    pub fn advance(&mut self, stage: &str, percent: u8) {
        self.stage = stage.to_string();
        self.percent = percent;
    }

    pub fn complete_step(&mut self, name: &str, tx: Option<TxRef>, at: DateTime<Utc>) {
        self.steps.insert(
            name.to_string(),
            ProgressStep {
                completed: true,
                tx,
                at: Some(at),
            },
        );
    }
}

/// Deadline data for a swap. Enforced by explicit comparisons, never by
/// opaque timer callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapTimeout {
    pub deadline: DateTime<Utc>,
    pub leg_deadlines: BTreeMap<String, DateTime<Utc>>,
    pub expired: bool,
}

/// Per-leg rollback bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackLeg {
    pub required: bool,
    pub completed: bool,
    pub tx: Option<TxRef>,
}

/// Rollback record for a swap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRollback {
    /// Set once both legs lock, or when expiry begins rolling back locked legs
    pub eligible: bool,
    pub legs: BTreeMap<String, RollbackLeg>,
    pub reason: Option<String>,
    /// Set when a leg's unlock never confirms within the grace window;
    /// surfaces the swap for operator attention
    pub unresolved: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for SwapRollback {
    fn default() -> Self {
        Self {
            eligible: false,
            legs: BTreeMap::new(),
            reason: None,
            unresolved: false,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Append-only event log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapLogEntry {
    pub at: DateTime<Utc>,
    pub event: String,
}

/// The full swap state machine record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicSwap {
    pub id: String,
    pub initiator: String,
    pub responder: String,
    pub initiator_leg: SwapLeg,
    pub responder_leg: SwapLeg,
    pub status: SwapStatus,
    pub progress: SwapProgress,
    pub timeout: SwapTimeout,
    pub rollback: SwapRollback,
    pub event_log: Vec<SwapLogEntry>,
    pub created_at: DateTime<Utc>,
}

impl AtomicSwap {
    pub fn both_legs_locked(&self) -> bool {
        self.initiator_leg.lock_tx.is_some() && self.responder_leg.lock_tx.is_some()
    }

    pub fn any_leg_locked(&self) -> bool {
        self.initiator_leg.lock_tx.is_some() || self.responder_leg.lock_tx.is_some()
    }
}

/// Definition of one leg in a swap request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegSpec {
    pub ledger_id: String,
    pub asset_id: String,
    pub amount: u64,
    pub account: String,
    pub required_confirmations: u32,
}

/// Request to open a swap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequest {
    pub initiator: String,
    pub responder: String,
    pub initiator_leg: LegSpec,
    pub responder_leg: LegSpec,
    /// Explicit deadline in minutes; wins over the block-count hint
    pub timeout_minutes: Option<i64>,
    /// Rough block count until the slower chain confirms, used to estimate a
    /// deadline when no explicit timeout is given
    pub block_count_hint: Option<i64>,
}

/// Returned to the caller on swap creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapHandle {
    pub swap_id: String,
    pub estimated_completion: DateTime<Utc>,
}

/// Logical debit/credit entry recorded at completion. Bookkeeping only; the
/// ledger-side settlement happened through the leg transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipTransfer {
    pub swap_id: String,
    pub ledger_id: String,
    pub asset_id: String,
    pub amount: u64,
    pub from: String,
    pub to: String,
    pub at: DateTime<Utc>,
}

//! Domain events emitted by the swap coordinator
//!
//! Outbound events are broadcast for the transport/adapters layer to act on.
//! The one inbound signal, an unlock confirmation, travels back through a
//! typed mpsc inbox rather than a shared event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::TxRef;

/// Events emitted as a swap moves through its lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SwapEvent {
    /// Swap created and supervision started
    SwapInitiated {
        swap_id: String,
        deadline: DateTime<Utc>,
    },

    /// One leg's lock transaction recorded
    LegLocked {
        swap_id: String,
        ledger_id: String,
        tx_hash: TxRef,
    },

    /// Both legs locked and completion performed
    SwapCompleted { swap_id: String, tx_hash: TxRef },

    /// Deadline passed before completion
    SwapExpired { swap_id: String },

    /// Rollback began for the listed legs
    RollbackStarted {
        swap_id: String,
        ledger_ids: Vec<String>,
    },

    /// The adapters layer should unlock this leg
    UnlockRequested {
        swap_id: String,
        ledger_id: String,
        account: String,
        asset_id: String,
        amount: u64,
    },

    /// Every required leg reported its unlock
    RollbackCompleted { swap_id: String },
}

impl SwapEvent {
    /// Get the swap ID for this event
    pub fn swap_id(&self) -> &str {
        match self {
            SwapEvent::SwapInitiated { swap_id, .. } => swap_id,
            SwapEvent::LegLocked { swap_id, .. } => swap_id,
            SwapEvent::SwapCompleted { swap_id, .. } => swap_id,
            SwapEvent::SwapExpired { swap_id } => swap_id,
            SwapEvent::RollbackStarted { swap_id, .. } => swap_id,
            SwapEvent::UnlockRequested { swap_id, .. } => swap_id,
            SwapEvent::RollbackCompleted { swap_id } => swap_id,
        }
    }

    /// Get event name for metrics
    pub fn name(&self) -> &'static str {
        match self {
            SwapEvent::SwapInitiated { .. } => "swap_initiated",
            SwapEvent::LegLocked { .. } => "leg_locked",
            SwapEvent::SwapCompleted { .. } => "swap_completed",
            SwapEvent::SwapExpired { .. } => "swap_expired",
            SwapEvent::RollbackStarted { .. } => "rollback_started",
            SwapEvent::UnlockRequested { .. } => "unlock_requested",
            SwapEvent::RollbackCompleted { .. } => "rollback_completed",
        }
    }
}

/// Inbound report that a leg's on-ledger unlock landed.
///
/// Produced by the adapter-facing listener, consumed by the swap
/// coordinator's unlock inbox to drive rollback completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockConfirmation {
    pub swap_id: String,
    pub ledger_id: String,
    pub tx_hash: TxRef,
}

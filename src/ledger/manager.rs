//! Balance reservations, locks, and cross-ledger operation bookkeeping

use super::{LedgerAdapter, TxRef};
use crate::clock::Clock;
use crate::config::ReservationConfig;
use crate::error::{RouterError, RouterResult};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A soft, in-memory hold against a ledger balance.
///
/// Distinct from an on-ledger lock: a reservation only constrains what this
/// router will promise to other callers. It lives until released or swept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceReservation {
    pub id: String,
    pub ledger_id: String,
    pub account: String,
    pub asset_id: String,
    pub amount: u64,
    pub created_at: DateTime<Utc>,
    /// Set once the reservation has been locked on-ledger
    pub lock_tx: Option<TxRef>,
}

/// Status of a cross-ledger operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Locked,
    Completed,
    Failed,
    RolledBack,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::RolledBack
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Locked => "locked",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::RolledBack => "rolled_back",
        }
    }
}

/// A transfer moving value between two ledgers, owning its reservations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossLedgerOperation {
    pub id: String,
    pub from_ledger: String,
    pub to_ledger: String,
    pub from_account: String,
    pub to_account: String,
    pub asset_id: String,
    pub amount: u64,
    pub reservation_ids: Vec<String>,
    pub status: OperationStatus,
    pub transfer_tx: Option<TxRef>,
    pub created_at: DateTime<Utc>,
}

/// Per-ledger adapter registry plus reservation and operation state
pub struct LedgerManager {
    /// Adapters indexed by ledger ID
    adapters: DashMap<String, Arc<dyn LedgerAdapter>>,
    /// Live reservations indexed by reservation ID
    reservations: DashMap<String, BalanceReservation>,
    /// Cross-ledger operations indexed by operation ID
    operations: DashMap<String, CrossLedgerOperation>,
    clock: Arc<dyn Clock>,
    config: ReservationConfig,
}

impl LedgerManager {
    pub fn new(clock: Arc<dyn Clock>, config: ReservationConfig) -> Self {
        Self {
            adapters: DashMap::new(),
            reservations: DashMap::new(),
            operations: DashMap::new(),
            clock,
            config,
        }
    }

    /// Register an adapter for a ledger
    pub fn register_adapter(&self, adapter: Arc<dyn LedgerAdapter>) {
        let ledger_id = adapter.ledger_id().to_string();
        info!("Registered adapter for ledger {}", ledger_id);
        self.adapters.insert(ledger_id, adapter);
    }

    /// Look up a registered, connected adapter
    async fn adapter(&self, ledger_id: &str) -> RouterResult<Arc<dyn LedgerAdapter>> {
        let adapter = self
            .adapters
            .get(ledger_id)
            .map(|a| a.clone())
            .ok_or_else(|| RouterError::LedgerNotSupported {
                ledger_id: ledger_id.to_string(),
            })?;

        if !adapter.is_connected().await {
            return Err(RouterError::LedgerNotConnected {
                ledger_id: ledger_id.to_string(),
            });
        }

        Ok(adapter)
    }

    /// Sum of live, not-yet-locked reservations for a (ledger, account, asset)
    /// tuple. Locked reservations are already reflected in the adapter's
    /// locked-balance figure, so counting them again would double-book.
    fn reserved_total(&self, ledger_id: &str, account: &str, asset_id: &str) -> u64 {
        self.reservations
            .iter()
            .filter(|r| {
                r.ledger_id == ledger_id
                    && r.account == account
                    && r.asset_id == asset_id
                    && r.lock_tx.is_none()
            })
            .map(|r| r.amount)
            .sum()
    }

    /// Balance the router can still promise: adapter-available minus live
    /// reservations minus on-ledger locks.
    ///
    /// This is a check-then-act read; a reservation created between this read
    /// and the caller's write can race it. Accepted soft-consistency gap.
    pub async fn truly_available(
        &self,
        ledger_id: &str,
        account: &str,
        asset_id: &str,
    ) -> RouterResult<u64> {
        let adapter = self.adapter(ledger_id).await?;

        let available = adapter
            .available_balance(account, asset_id)
            .await
            .map_err(|e| RouterError::Adapter {
                ledger_id: ledger_id.to_string(),
                message: e.to_string(),
            })?;

        let locked = adapter
            .locked_balance(account, asset_id)
            .await
            .map_err(|e| RouterError::Adapter {
                ledger_id: ledger_id.to_string(),
                message: e.to_string(),
            })?;

        let reserved = self.reserved_total(ledger_id, account, asset_id);

        Ok(available.saturating_sub(reserved).saturating_sub(locked))
    }

    /// Check whether an amount could be reserved right now
    pub async fn validate_balance_availability(
        &self,
        ledger_id: &str,
        account: &str,
        asset_id: &str,
        amount: u64,
    ) -> RouterResult<bool> {
        Ok(self.truly_available(ledger_id, account, asset_id).await? >= amount)
    }

    /// Reserve balance for a pending transfer, returning the reservation ID
    pub async fn reserve_balance(
        &self,
        ledger_id: &str,
        account: &str,
        asset_id: &str,
        amount: u64,
    ) -> RouterResult<String> {
        if amount == 0 {
            return Err(RouterError::Internal(
                "reservation amount must be positive".to_string(),
            ));
        }

        let available = self.truly_available(ledger_id, account, asset_id).await?;
        if amount > available {
            return Err(RouterError::InsufficientBalance {
                ledger_id: ledger_id.to_string(),
                requested: amount,
                available,
            });
        }

        let reservation = BalanceReservation {
            id: Uuid::new_v4().to_string(),
            ledger_id: ledger_id.to_string(),
            account: account.to_string(),
            asset_id: asset_id.to_string(),
            amount,
            created_at: self.clock.now(),
            lock_tx: None,
        };

        let id = reservation.id.clone();
        debug!(
            "Reserved {} {} for {} on ledger {} (reservation {})",
            amount, asset_id, account, ledger_id, id
        );
        self.reservations.insert(id.clone(), reservation);
        crate::metrics::record_active_reservations(self.reservations.len());

        Ok(id)
    }

    /// Lock a reservation on-ledger. Idempotent: repeated calls return the
    /// already-recorded lock reference.
    pub async fn lock_reserved_balance(&self, reservation_id: &str) -> RouterResult<TxRef> {
        let (ledger_id, account, asset_id, amount) = {
            let reservation = self.reservations.get(reservation_id).ok_or_else(|| {
                RouterError::ReservationNotFound {
                    reservation_id: reservation_id.to_string(),
                }
            })?;

            if let Some(tx) = &reservation.lock_tx {
                return Ok(tx.clone());
            }

            (
                reservation.ledger_id.clone(),
                reservation.account.clone(),
                reservation.asset_id.clone(),
                reservation.amount,
            )
        };

        let adapter = self.adapter(&ledger_id).await?;
        let tx = adapter
            .lock_asset(&account, &asset_id, amount)
            .await
            .map_err(|e| RouterError::Adapter {
                ledger_id: ledger_id.clone(),
                message: e.to_string(),
            })?;

        if let Some(mut reservation) = self.reservations.get_mut(reservation_id) {
            reservation.lock_tx = Some(tx.clone());
        }

        info!(
            "Locked reservation {} on ledger {}: {}",
            reservation_id, ledger_id, tx
        );
        Ok(tx)
    }

    /// Release a reservation, optionally undoing its on-ledger lock.
    ///
    /// The unlock is best-effort: the reservation must be freed even if the
    /// courtesy unlock fails.
    pub async fn release_reservation(
        &self,
        reservation_id: &str,
        unlock: bool,
    ) -> RouterResult<()> {
        let (_, reservation) = self.reservations.remove(reservation_id).ok_or_else(|| {
            RouterError::ReservationNotFound {
                reservation_id: reservation_id.to_string(),
            }
        })?;
        crate::metrics::record_active_reservations(self.reservations.len());

        if unlock {
            if let Some(lock_tx) = &reservation.lock_tx {
                match self.adapter(&reservation.ledger_id).await {
                    Ok(adapter) => {
                        if let Err(e) = adapter
                            .unlock_asset(
                                &reservation.account,
                                &reservation.asset_id,
                                reservation.amount,
                            )
                            .await
                        {
                            warn!(
                                "Unlock failed for reservation {} (lock {}): {}",
                                reservation_id, lock_tx, e
                            );
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Unlock skipped for reservation {}: {}",
                            reservation_id, e
                        );
                    }
                }
            }
        }

        debug!("Released reservation {}", reservation_id);
        Ok(())
    }

    /// Create a cross-ledger transfer: validates both ledgers, reserves on the
    /// source, and records the operation as pending.
    pub async fn initiate_cross_ledger_transfer(
        &self,
        from_ledger: &str,
        to_ledger: &str,
        from_account: &str,
        to_account: &str,
        asset_id: &str,
        amount: u64,
    ) -> RouterResult<CrossLedgerOperation> {
        if amount == 0 {
            return Err(RouterError::Internal(
                "transfer amount must be positive".to_string(),
            ));
        }

        // Both ends must be reachable before anything is reserved
        self.adapter(from_ledger).await?;
        self.adapter(to_ledger).await?;

        let reservation_id = self
            .reserve_balance(from_ledger, from_account, asset_id, amount)
            .await?;

        let operation = CrossLedgerOperation {
            id: Uuid::new_v4().to_string(),
            from_ledger: from_ledger.to_string(),
            to_ledger: to_ledger.to_string(),
            from_account: from_account.to_string(),
            to_account: to_account.to_string(),
            asset_id: asset_id.to_string(),
            amount,
            reservation_ids: vec![reservation_id],
            status: OperationStatus::Pending,
            transfer_tx: None,
            created_at: self.clock.now(),
        };

        info!(
            "Initiated cross-ledger transfer {} ({} {} from {}/{} to {}/{})",
            operation.id, amount, asset_id, from_ledger, from_account, to_ledger, to_account
        );
        self.operations.insert(operation.id.clone(), operation.clone());

        Ok(operation)
    }

    /// Lock every reservation owned by a pending operation
    pub async fn lock_cross_ledger_operation(&self, operation_id: &str) -> RouterResult<()> {
        let reservation_ids = {
            let operation = self.operations.get(operation_id).ok_or_else(|| {
                RouterError::OperationNotFound {
                    operation_id: operation_id.to_string(),
                }
            })?;

            if operation.status != OperationStatus::Pending {
                return Err(RouterError::InvalidTransition {
                    from: operation.status.as_str().to_string(),
                    to: "locked".to_string(),
                });
            }

            operation.reservation_ids.clone()
        };

        for reservation_id in &reservation_ids {
            self.lock_reserved_balance(reservation_id).await?;
        }

        if let Some(mut operation) = self.operations.get_mut(operation_id) {
            operation.status = OperationStatus::Locked;
        }

        Ok(())
    }

    /// Mark an operation completed after the settlement transfer landed.
    ///
    /// Reservations are released without unlock: the locked funds were
    /// consumed by the settlement itself.
    pub async fn complete_cross_ledger_operation(
        &self,
        operation_id: &str,
        transfer_tx: Option<TxRef>,
    ) -> RouterResult<()> {
        let reservation_ids = {
            let operation = self.operations.get(operation_id).ok_or_else(|| {
                RouterError::OperationNotFound {
                    operation_id: operation_id.to_string(),
                }
            })?;

            if operation.status.is_terminal() {
                return Err(RouterError::InvalidTransition {
                    from: operation.status.as_str().to_string(),
                    to: "completed".to_string(),
                });
            }

            operation.reservation_ids.clone()
        };

        for reservation_id in &reservation_ids {
            // Already-released reservations were freed exactly once elsewhere
            match self.release_reservation(reservation_id, false).await {
                Ok(()) | Err(RouterError::ReservationNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        if let Some(mut operation) = self.operations.get_mut(operation_id) {
            operation.status = OperationStatus::Completed;
            operation.transfer_tx = transfer_tx;
        }

        info!("Cross-ledger operation {} completed", operation_id);
        Ok(())
    }

    /// Roll back a non-terminal operation, releasing and unlocking every
    /// owned reservation.
    pub async fn rollback_cross_ledger_operation(&self, operation_id: &str) -> RouterResult<()> {
        let reservation_ids = {
            let operation = self.operations.get(operation_id).ok_or_else(|| {
                RouterError::OperationNotFound {
                    operation_id: operation_id.to_string(),
                }
            })?;

            if operation.status.is_terminal() {
                return Err(RouterError::InvalidTransition {
                    from: operation.status.as_str().to_string(),
                    to: "rolled_back".to_string(),
                });
            }

            operation.reservation_ids.clone()
        };

        for reservation_id in &reservation_ids {
            match self.release_reservation(reservation_id, true).await {
                Ok(()) | Err(RouterError::ReservationNotFound { .. }) => {}
                Err(e) => warn!(
                    "Rollback of operation {}: releasing reservation {} failed: {}",
                    operation_id, reservation_id, e
                ),
            }
        }

        if let Some(mut operation) = self.operations.get_mut(operation_id) {
            operation.status = OperationStatus::RolledBack;
        }

        info!("Cross-ledger operation {} rolled back", operation_id);
        Ok(())
    }

    /// Get a cross-ledger operation by ID
    pub fn get_operation(&self, operation_id: &str) -> Option<CrossLedgerOperation> {
        self.operations.get(operation_id).map(|o| o.clone())
    }

    /// Get a reservation by ID
    pub fn get_reservation(&self, reservation_id: &str) -> Option<BalanceReservation> {
        self.reservations.get(reservation_id).map(|r| r.clone())
    }

    /// Release-with-unlock every reservation older than the configured
    /// timeout. The defense against abandoned reservations; the caller loop
    /// decides the cadence.
    pub async fn sweep_expired_reservations(&self) -> usize {
        let cutoff = self.clock.now()
            - chrono::Duration::seconds(self.config.timeout_secs as i64);

        let expired: Vec<String> = self
            .reservations
            .iter()
            .filter(|r| r.created_at < cutoff)
            .map(|r| r.id.clone())
            .collect();

        let mut released = 0;
        for reservation_id in expired {
            warn!("Sweeping expired reservation {}", reservation_id);
            match self.release_reservation(&reservation_id, true).await {
                Ok(()) => released += 1,
                Err(RouterError::ReservationNotFound { .. }) => {}
                Err(e) => warn!("Sweep failed for reservation {}: {}", reservation_id, e),
            }
        }

        if released > 0 {
            info!("Reservation sweep released {} expired reservations", released);
            crate::metrics::record_reservations_swept(released);
        }
        released
    }
}

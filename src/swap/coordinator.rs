//! Swap coordinator - owns the swap state machines
//!
//! All state lives on the coordinator instance. Deadlines are plain data
//! checked lazily on access and periodically by the liveness loop; nothing
//! fires from background timers holding swap locks.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::SwapConfig;
use crate::error::{RouterError, RouterResult};
use crate::events::{SwapEvent, UnlockConfirmation};
use crate::ledger::TxRef;

use super::{
    AtomicSwap, LegSpec, OwnershipTransfer, RollbackLeg, SwapHandle, SwapLeg, SwapLogEntry,
    SwapProgress, SwapRequest, SwapRollback, SwapStatus, SwapTimeout,
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Coordinates atomic swap lifecycles across two ledgers
pub struct SwapCoordinator {
    swaps: DashMap<String, AtomicSwap>,
    clock: Arc<dyn Clock>,
    config: SwapConfig,
    event_tx: broadcast::Sender<SwapEvent>,
    ownership_log: DashMap<String, Vec<OwnershipTransfer>>,
}

impl SwapCoordinator {
    pub fn new(clock: Arc<dyn Clock>, config: SwapConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            swaps: DashMap::new(),
            clock,
            config,
            event_tx,
            ownership_log: DashMap::new(),
        }
    }

    /// Subscribe to outbound swap events
    pub fn subscribe(&self) -> broadcast::Receiver<SwapEvent> {
        self.event_tx.subscribe()
    }

    /// Create a swap and start supervising its deadline
    pub fn execute_atomic_swap(&self, request: SwapRequest) -> RouterResult<SwapHandle> {
        if request.initiator_leg.amount == 0 || request.responder_leg.amount == 0 {
            return Err(RouterError::Config(
                "swap leg amount must be positive".to_string(),
            ));
        }
        if request.initiator_leg.ledger_id == request.responder_leg.ledger_id {
            return Err(RouterError::Config(
                "swap legs must live on different ledgers".to_string(),
            ));
        }

        let now = self.clock.now();
        let deadline = now + self.timeout_duration(&request);
        let swap_id = Uuid::new_v4().to_string();

        let mut timeout = SwapTimeout {
            deadline,
            leg_deadlines: Default::default(),
            expired: false,
        };
        timeout
            .leg_deadlines
            .insert(request.initiator_leg.ledger_id.clone(), deadline);
        timeout
            .leg_deadlines
            .insert(request.responder_leg.ledger_id.clone(), deadline);

        let swap = AtomicSwap {
            id: swap_id.clone(),
            initiator: request.initiator.clone(),
            responder: request.responder.clone(),
            initiator_leg: Self::leg_from_spec(&request.initiator_leg),
            responder_leg: Self::leg_from_spec(&request.responder_leg),
            status: SwapStatus::Pending,
            progress: {
                let mut p = SwapProgress::new("initiated", 10);
                p.complete_step("initiated", None, now);
                p
            },
            timeout,
            rollback: SwapRollback::default(),
            event_log: vec![SwapLogEntry {
                at: now,
                event: "swap_initiated".to_string(),
            }],
            created_at: now,
        };

        info!(
            swap_id = %swap_id,
            initiator_ledger = %swap.initiator_leg.ledger_id,
            responder_ledger = %swap.responder_leg.ledger_id,
            deadline = %deadline,
            "Atomic swap initiated"
        );

        self.swaps.insert(swap_id.clone(), swap);
        crate::metrics::record_active_swaps(self.swaps.len());
        self.emit(SwapEvent::SwapInitiated {
            swap_id: swap_id.clone(),
            deadline,
        });

        Ok(SwapHandle {
            swap_id,
            estimated_completion: deadline,
        })
    }

    /// Record a leg's lock transaction. Commutative across legs; replaying
    /// the same leg is a no-op.
    pub fn lock_swap_assets(
        &self,
        swap_id: &str,
        ledger_id: &str,
        tx_hash: TxRef,
    ) -> RouterResult<AtomicSwap> {
        self.maybe_expire(swap_id);

        let mut entry = self
            .swaps
            .get_mut(swap_id)
            .ok_or_else(|| RouterError::SwapNotFound {
                swap_id: swap_id.to_string(),
            })?;
        let swap = entry.value_mut();

        if !matches!(
            swap.status,
            SwapStatus::Pending | SwapStatus::LockingInitiator | SwapStatus::LockingResponder
        ) {
            return Err(RouterError::InvalidTransition {
                from: swap.status.as_str().to_string(),
                to: "locked".to_string(),
            });
        }

        let now = self.clock.now();
        let (leg, step) = if swap.initiator_leg.ledger_id == ledger_id {
            (&mut swap.initiator_leg, "initiator_locked")
        } else if swap.responder_leg.ledger_id == ledger_id {
            (&mut swap.responder_leg, "responder_locked")
        } else {
            return Err(RouterError::LedgerNotSupported {
                ledger_id: ledger_id.to_string(),
            });
        };

        if leg.lock_tx.is_some() {
            debug!(swap_id, ledger_id, "Leg already locked, ignoring replay");
            return Ok(swap.clone());
        }

        leg.lock_tx = Some(tx_hash.clone());
        swap.progress.complete_step(step, Some(tx_hash.clone()), now);
        swap.event_log.push(SwapLogEntry {
            at: now,
            event: format!("leg_locked:{}", ledger_id),
        });

        if swap.both_legs_locked() {
            swap.status = SwapStatus::Locked;
            swap.progress.advance("locked", 70);
            swap.rollback.eligible = true;
            info!(swap_id, "Both legs locked, swap ready for completion");
        } else {
            // Status names the side still to lock
            swap.status = if swap.initiator_leg.lock_tx.is_some() {
                SwapStatus::LockingResponder
            } else {
                SwapStatus::LockingInitiator
            };
            swap.progress.advance("locking", 40);
        }

        let snapshot = swap.clone();
        drop(entry);

        self.emit(SwapEvent::LegLocked {
            swap_id: swap_id.to_string(),
            ledger_id: ledger_id.to_string(),
            tx_hash,
        });
        Ok(snapshot)
    }

    /// Complete a fully locked swap and record the ownership handover
    pub fn complete_atomic_swap(&self, swap_id: &str, tx_hash: TxRef) -> RouterResult<AtomicSwap> {
        self.maybe_expire(swap_id);

        let mut entry = self
            .swaps
            .get_mut(swap_id)
            .ok_or_else(|| RouterError::SwapNotFound {
                swap_id: swap_id.to_string(),
            })?;
        let swap = entry.value_mut();

        if swap.status != SwapStatus::Locked {
            return Err(RouterError::InvalidTransition {
                from: swap.status.as_str().to_string(),
                to: "completed".to_string(),
            });
        }

        let now = self.clock.now();
        swap.status = SwapStatus::Completed;
        swap.initiator_leg.complete_tx = Some(tx_hash.clone());
        swap.responder_leg.complete_tx = Some(tx_hash.clone());
        swap.progress.advance("completed", 100);
        swap.progress
            .complete_step("completed", Some(tx_hash.clone()), now);
        // Terminal status ends deadline supervision; the data stays for audit
        swap.timeout.expired = false;
        swap.event_log.push(SwapLogEntry {
            at: now,
            event: "swap_completed".to_string(),
        });

        let transfers = vec![
            OwnershipTransfer {
                swap_id: swap_id.to_string(),
                ledger_id: swap.initiator_leg.ledger_id.clone(),
                asset_id: swap.initiator_leg.asset_id.clone(),
                amount: swap.initiator_leg.amount,
                from: swap.initiator.clone(),
                to: swap.responder.clone(),
                at: now,
            },
            OwnershipTransfer {
                swap_id: swap_id.to_string(),
                ledger_id: swap.responder_leg.ledger_id.clone(),
                asset_id: swap.responder_leg.asset_id.clone(),
                amount: swap.responder_leg.amount,
                from: swap.responder.clone(),
                to: swap.initiator.clone(),
                at: now,
            },
        ];

        info!(swap_id, tx_hash = %tx_hash, "Atomic swap completed");
        let snapshot = swap.clone();
        drop(entry);

        self.ownership_log.insert(swap_id.to_string(), transfers);
        crate::metrics::record_swap_completed();
        self.emit(SwapEvent::SwapCompleted {
            swap_id: swap_id.to_string(),
            tx_hash,
        });
        Ok(snapshot)
    }

    /// Fetch a swap, applying any pending expiry first
    pub fn get_swap(&self, swap_id: &str) -> RouterResult<AtomicSwap> {
        self.maybe_expire(swap_id);
        self.swaps
            .get(swap_id)
            .map(|s| s.clone())
            .ok_or_else(|| RouterError::SwapNotFound {
                swap_id: swap_id.to_string(),
            })
    }

    /// Ownership handover entries recorded when a swap completed
    pub fn ownership_transfers(&self, swap_id: &str) -> Vec<OwnershipTransfer> {
        self.ownership_log
            .get(swap_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Periodic deadline pass. Returns how many swaps newly expired.
    pub fn check_expirations(&self) -> usize {
        let ids: Vec<String> = self.swaps.iter().map(|e| e.key().clone()).collect();
        let mut expired = 0;
        for id in ids {
            if self.maybe_expire(&id) {
                expired += 1;
            }
            self.flag_stalled_rollback(&id);
        }
        expired
    }

    /// Apply expiry to one swap if its deadline has passed. Returns true only
    /// on the transition, never on replay.
    fn maybe_expire(&self, swap_id: &str) -> bool {
        let now = self.clock.now();
        let mut events = Vec::new();

        let transitioned = {
            let Some(mut entry) = self.swaps.get_mut(swap_id) else {
                return false;
            };
            let swap = entry.value_mut();

            if swap.status.is_terminal()
                || swap.status == SwapStatus::RollingBack
                || swap.status == SwapStatus::Expired
                || swap.timeout.expired
                || now <= swap.timeout.deadline
            {
                return false;
            }

            swap.timeout.expired = true;
            swap.event_log.push(SwapLogEntry {
                at: now,
                event: "swap_expired".to_string(),
            });
            events.push(SwapEvent::SwapExpired {
                swap_id: swap_id.to_string(),
            });

            if swap.any_leg_locked() {
                // Locked funds must come back: expiry hands off to rollback
                swap.status = SwapStatus::RollingBack;
                swap.progress.advance("rolling_back", 20);
                swap.rollback.eligible = true;
                swap.rollback.started_at = Some(now);
                swap.rollback.reason = Some("deadline exceeded".to_string());

                let mut ledger_ids = Vec::new();
                for leg in [&swap.initiator_leg, &swap.responder_leg] {
                    let required = leg.lock_tx.is_some();
                    swap.rollback.legs.insert(
                        leg.ledger_id.clone(),
                        RollbackLeg {
                            required,
                            completed: false,
                            tx: None,
                        },
                    );
                    if required {
                        ledger_ids.push(leg.ledger_id.clone());
                        events.push(SwapEvent::UnlockRequested {
                            swap_id: swap_id.to_string(),
                            ledger_id: leg.ledger_id.clone(),
                            account: leg.account.clone(),
                            asset_id: leg.asset_id.clone(),
                            amount: leg.amount,
                        });
                    }
                }
                events.insert(
                    1,
                    SwapEvent::RollbackStarted {
                        swap_id: swap_id.to_string(),
                        ledger_ids,
                    },
                );
                warn!(swap_id, "Swap expired with locked legs, rolling back");
            } else {
                swap.status = SwapStatus::Expired;
                swap.progress.advance("expired", 100);
                warn!(swap_id, "Swap expired before any leg locked");
            }
            true
        };

        for event in events {
            self.emit(event);
        }
        if transitioned {
            crate::metrics::record_swap_expired();
        }
        transitioned
    }

    /// Surface a rollback that has not finished within a full timeout window
    fn flag_stalled_rollback(&self, swap_id: &str) {
        let now = self.clock.now();
        let Some(mut entry) = self.swaps.get_mut(swap_id) else {
            return;
        };
        let swap = entry.value_mut();
        if swap.status != SwapStatus::RollingBack || swap.rollback.unresolved {
            return;
        }
        let Some(started) = swap.rollback.started_at else {
            return;
        };
        if now - started > Duration::minutes(self.config.default_timeout_minutes) {
            swap.rollback.unresolved = true;
            error!(
                swap_id,
                started = %started,
                "Rollback has outstanding unlocks past the grace window"
            );
        }
    }

    /// Apply one inbound unlock confirmation to a rolling-back swap.
    ///
    /// Late or duplicate confirmations are tolerated silently; the ledgers
    /// may re-deliver.
    pub fn handle_unlock_confirmation(
        &self,
        confirmation: UnlockConfirmation,
    ) -> RouterResult<()> {
        let mut done = false;
        {
            let mut entry = self.swaps.get_mut(&confirmation.swap_id).ok_or_else(|| {
                RouterError::SwapNotFound {
                    swap_id: confirmation.swap_id.clone(),
                }
            })?;
            let swap = entry.value_mut();

            if swap.status != SwapStatus::RollingBack {
                debug!(
                    swap_id = %confirmation.swap_id,
                    status = swap.status.as_str(),
                    "Ignoring unlock confirmation outside rollback"
                );
                return Ok(());
            }

            let now = self.clock.now();
            match swap.rollback.legs.get_mut(&confirmation.ledger_id) {
                Some(leg) if leg.required && !leg.completed => {
                    leg.completed = true;
                    leg.tx = Some(confirmation.tx_hash.clone());
                }
                _ => {
                    debug!(
                        swap_id = %confirmation.swap_id,
                        ledger_id = %confirmation.ledger_id,
                        "Ignoring duplicate or unrequired unlock confirmation"
                    );
                    return Ok(());
                }
            }

            if swap.initiator_leg.ledger_id == confirmation.ledger_id {
                swap.initiator_leg.unlock_tx = Some(confirmation.tx_hash.clone());
            } else if swap.responder_leg.ledger_id == confirmation.ledger_id {
                swap.responder_leg.unlock_tx = Some(confirmation.tx_hash.clone());
            }
            swap.event_log.push(SwapLogEntry {
                at: now,
                event: format!("leg_unlocked:{}", confirmation.ledger_id),
            });

            let all_done = swap
                .rollback
                .legs
                .values()
                .filter(|l| l.required)
                .all(|l| l.completed);
            if all_done {
                swap.status = SwapStatus::RolledBack;
                swap.progress.advance("rolled_back", 100);
                swap.rollback.completed_at = Some(now);
                info!(swap_id = %confirmation.swap_id, "Rollback completed, all legs unlocked");
                done = true;
            }
        }

        if done {
            crate::metrics::record_swap_rolled_back();
            self.emit(SwapEvent::RollbackCompleted {
                swap_id: confirmation.swap_id,
            });
        }
        Ok(())
    }

    /// Consume the unlock confirmation inbox until it closes
    pub async fn run_unlock_listener(
        self: Arc<Self>,
        mut inbox: mpsc::UnboundedReceiver<UnlockConfirmation>,
    ) {
        info!("Unlock confirmation listener started");
        while let Some(confirmation) = inbox.recv().await {
            if let Err(e) = self.handle_unlock_confirmation(confirmation.clone()) {
                warn!(
                    swap_id = %confirmation.swap_id,
                    error = %e,
                    "Failed to apply unlock confirmation"
                );
            }
        }
        info!("Unlock confirmation inbox closed, listener stopping");
    }

    fn timeout_duration(&self, request: &SwapRequest) -> Duration {
        if let Some(minutes) = request.timeout_minutes {
            Duration::minutes(minutes)
        } else if let Some(blocks) = request.block_count_hint {
            Duration::seconds(blocks * self.config.block_time_secs)
        } else {
            Duration::minutes(self.config.default_timeout_minutes)
        }
    }

    fn leg_from_spec(spec: &LegSpec) -> SwapLeg {
        SwapLeg {
            ledger_id: spec.ledger_id.clone(),
            asset_id: spec.asset_id.clone(),
            amount: spec.amount,
            account: spec.account.clone(),
            required_confirmations: spec.required_confirmations,
            lock_tx: None,
            unlock_tx: None,
            complete_tx: None,
        }
    }

    fn emit(&self, event: SwapEvent) {
        crate::metrics::record_swap_event(event.name());
        // No subscribers is fine; events are advisory
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn coordinator() -> (Arc<SwapCoordinator>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let coordinator = Arc::new(SwapCoordinator::new(clock.clone(), SwapConfig::default()));
        (coordinator, clock)
    }

    fn request() -> SwapRequest {
        SwapRequest {
            initiator: "alice".to_string(),
            responder: "bob".to_string(),
            initiator_leg: LegSpec {
                ledger_id: "sui-local".to_string(),
                asset_id: "sui".to_string(),
                amount: 1_000,
                account: "alice".to_string(),
                required_confirmations: 1,
            },
            responder_leg: LegSpec {
                ledger_id: "hedera-local".to_string(),
                asset_id: "hbar".to_string(),
                amount: 2_000,
                account: "bob".to_string(),
                required_confirmations: 1,
            },
            timeout_minutes: Some(60),
            block_count_hint: None,
        }
    }

    #[tokio::test]
    async fn test_lock_order_is_commutative() {
        let (coord, _) = coordinator();

        let a = coord.execute_atomic_swap(request()).unwrap();
        coord
            .lock_swap_assets(&a.swap_id, "hedera-local", "hl-1".to_string())
            .unwrap();
        let swap_a = coord
            .lock_swap_assets(&a.swap_id, "sui-local", "sl-1".to_string())
            .unwrap();

        let b = coord.execute_atomic_swap(request()).unwrap();
        coord
            .lock_swap_assets(&b.swap_id, "sui-local", "sl-2".to_string())
            .unwrap();
        let swap_b = coord
            .lock_swap_assets(&b.swap_id, "hedera-local", "hl-2".to_string())
            .unwrap();

        assert_eq!(swap_a.status, SwapStatus::Locked);
        assert_eq!(swap_b.status, SwapStatus::Locked);
        assert_eq!(swap_a.progress.percent, 70);
        assert_eq!(swap_b.progress.percent, 70);
    }

    #[tokio::test]
    async fn test_intermediate_status_names_side_still_to_lock() {
        let (coord, _) = coordinator();
        let handle = coord.execute_atomic_swap(request()).unwrap();

        let swap = coord
            .lock_swap_assets(&handle.swap_id, "sui-local", "sl-1".to_string())
            .unwrap();
        assert_eq!(swap.status, SwapStatus::LockingResponder);
        assert_eq!(swap.progress.percent, 40);
        // One locked leg does not yet make the swap rollback-eligible
        assert!(!swap.rollback.eligible);

        let swap = coord
            .lock_swap_assets(&handle.swap_id, "hedera-local", "hl-1".to_string())
            .unwrap();
        assert_eq!(swap.status, SwapStatus::Locked);
        assert!(swap.rollback.eligible);
    }

    #[tokio::test]
    async fn test_replayed_lock_is_noop() {
        let (coord, _) = coordinator();
        let handle = coord.execute_atomic_swap(request()).unwrap();

        coord
            .lock_swap_assets(&handle.swap_id, "sui-local", "sl-1".to_string())
            .unwrap();
        let swap = coord
            .lock_swap_assets(&handle.swap_id, "sui-local", "sl-other".to_string())
            .unwrap();

        assert_eq!(swap.initiator_leg.lock_tx.as_deref(), Some("sl-1"));
        assert_eq!(swap.status, SwapStatus::LockingResponder);
    }

    #[tokio::test]
    async fn test_complete_requires_both_locks() {
        let (coord, _) = coordinator();
        let handle = coord.execute_atomic_swap(request()).unwrap();

        let err = coord
            .complete_atomic_swap(&handle.swap_id, "tx-final".to_string())
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidTransition { .. }));

        coord
            .lock_swap_assets(&handle.swap_id, "sui-local", "sl-1".to_string())
            .unwrap();
        coord
            .lock_swap_assets(&handle.swap_id, "hedera-local", "hl-1".to_string())
            .unwrap();
        let swap = coord
            .complete_atomic_swap(&handle.swap_id, "tx-final".to_string())
            .unwrap();

        assert_eq!(swap.status, SwapStatus::Completed);
        assert_eq!(swap.progress.percent, 100);

        let transfers = coord.ownership_transfers(&handle.swap_id);
        assert_eq!(transfers.len(), 2);
        assert!(transfers
            .iter()
            .any(|t| t.from == "alice" && t.to == "bob" && t.asset_id == "sui"));
        assert!(transfers
            .iter()
            .any(|t| t.from == "bob" && t.to == "alice" && t.asset_id == "hbar"));
    }

    #[tokio::test]
    async fn test_expiry_without_locks_is_plain_expired() {
        let (coord, clock) = coordinator();
        let handle = coord.execute_atomic_swap(request()).unwrap();

        clock.advance(Duration::minutes(61));
        assert_eq!(coord.check_expirations(), 1);

        let swap = coord.get_swap(&handle.swap_id).unwrap();
        assert_eq!(swap.status, SwapStatus::Expired);
        assert!(swap.timeout.expired);

        // Replay does not double-count
        assert_eq!(coord.check_expirations(), 0);
    }

    #[tokio::test]
    async fn test_expiry_with_locked_leg_starts_rollback() {
        let (coord, clock) = coordinator();
        let mut events = coord.subscribe();
        let handle = coord.execute_atomic_swap(request()).unwrap();
        coord
            .lock_swap_assets(&handle.swap_id, "sui-local", "sl-1".to_string())
            .unwrap();

        clock.advance(Duration::minutes(61));
        assert_eq!(coord.check_expirations(), 1);

        let swap = coord.get_swap(&handle.swap_id).unwrap();
        assert_eq!(swap.status, SwapStatus::RollingBack);
        assert_eq!(swap.progress.percent, 20);
        let leg = &swap.rollback.legs["sui-local"];
        assert!(leg.required && !leg.completed);
        assert!(!swap.rollback.legs["hedera-local"].required);

        let mut saw_unlock_request = false;
        while let Ok(event) = events.try_recv() {
            if let SwapEvent::UnlockRequested { ledger_id, amount, .. } = event {
                assert_eq!(ledger_id, "sui-local");
                assert_eq!(amount, 1_000);
                saw_unlock_request = true;
            }
        }
        assert!(saw_unlock_request);
    }

    #[tokio::test]
    async fn test_unlock_confirmations_complete_rollback() {
        let (coord, clock) = coordinator();
        let handle = coord.execute_atomic_swap(request()).unwrap();
        coord
            .lock_swap_assets(&handle.swap_id, "sui-local", "sl-1".to_string())
            .unwrap();
        coord
            .lock_swap_assets(&handle.swap_id, "hedera-local", "hl-1".to_string())
            .unwrap();

        clock.advance(Duration::minutes(61));
        coord.check_expirations();
        assert_eq!(
            coord.get_swap(&handle.swap_id).unwrap().status,
            SwapStatus::RollingBack
        );

        coord
            .handle_unlock_confirmation(UnlockConfirmation {
                swap_id: handle.swap_id.clone(),
                ledger_id: "sui-local".to_string(),
                tx_hash: "su-1".to_string(),
            })
            .unwrap();
        assert_eq!(
            coord.get_swap(&handle.swap_id).unwrap().status,
            SwapStatus::RollingBack
        );

        coord
            .handle_unlock_confirmation(UnlockConfirmation {
                swap_id: handle.swap_id.clone(),
                ledger_id: "hedera-local".to_string(),
                tx_hash: "hu-1".to_string(),
            })
            .unwrap();

        let swap = coord.get_swap(&handle.swap_id).unwrap();
        assert_eq!(swap.status, SwapStatus::RolledBack);
        assert_eq!(swap.progress.percent, 100);
        assert!(swap.rollback.completed_at.is_some());
        assert_eq!(swap.initiator_leg.unlock_tx.as_deref(), Some("su-1"));
    }

    #[tokio::test]
    async fn test_stalled_rollback_is_flagged_unresolved() {
        let (coord, clock) = coordinator();
        let handle = coord.execute_atomic_swap(request()).unwrap();
        coord
            .lock_swap_assets(&handle.swap_id, "sui-local", "sl-1".to_string())
            .unwrap();

        clock.advance(Duration::minutes(61));
        assert_eq!(coord.check_expirations(), 1);
        let swap = coord.get_swap(&handle.swap_id).unwrap();
        assert_eq!(swap.status, SwapStatus::RollingBack);
        assert!(!swap.rollback.unresolved);

        // The unlock never confirms; a later pass past the grace window
        // surfaces the swap for operators without changing its status
        clock.advance(Duration::minutes(61));
        assert_eq!(coord.check_expirations(), 0);
        let swap = coord.get_swap(&handle.swap_id).unwrap();
        assert_eq!(swap.status, SwapStatus::RollingBack);
        assert!(swap.rollback.unresolved);

        // A late unlock still finishes the rollback
        coord
            .handle_unlock_confirmation(UnlockConfirmation {
                swap_id: handle.swap_id.clone(),
                ledger_id: "sui-local".to_string(),
                tx_hash: "su-late".to_string(),
            })
            .unwrap();
        let swap = coord.get_swap(&handle.swap_id).unwrap();
        assert_eq!(swap.status, SwapStatus::RolledBack);
        assert!(swap.rollback.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_lock_after_expiry_rejected() {
        let (coord, clock) = coordinator();
        let handle = coord.execute_atomic_swap(request()).unwrap();

        clock.advance(Duration::minutes(61));
        let err = coord
            .lock_swap_assets(&handle.swap_id, "sui-local", "sl-late".to_string())
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_terminal_swap_never_expires() {
        let (coord, clock) = coordinator();
        let handle = coord.execute_atomic_swap(request()).unwrap();
        coord
            .lock_swap_assets(&handle.swap_id, "sui-local", "sl-1".to_string())
            .unwrap();
        coord
            .lock_swap_assets(&handle.swap_id, "hedera-local", "hl-1".to_string())
            .unwrap();
        coord
            .complete_atomic_swap(&handle.swap_id, "tx-final".to_string())
            .unwrap();

        clock.advance(Duration::days(2));
        assert_eq!(coord.check_expirations(), 0);
        assert_eq!(
            coord.get_swap(&handle.swap_id).unwrap().status,
            SwapStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_block_hint_deadline() {
        let (coord, clock) = coordinator();
        let mut req = request();
        req.timeout_minutes = None;
        req.block_count_hint = Some(20);

        let handle = coord.execute_atomic_swap(req).unwrap();
        // 20 blocks at 15s each
        assert_eq!(
            handle.estimated_completion,
            clock.now() + Duration::seconds(300)
        );
    }

    #[tokio::test]
    async fn test_unlock_listener_drives_rollback() {
        let (coord, clock) = coordinator();
        let handle = coord.execute_atomic_swap(request()).unwrap();
        coord
            .lock_swap_assets(&handle.swap_id, "sui-local", "sl-1".to_string())
            .unwrap();
        clock.advance(Duration::minutes(61));
        coord.check_expirations();

        let (tx, rx) = mpsc::unbounded_channel();
        let listener = tokio::spawn(coord.clone().run_unlock_listener(rx));

        tx.send(UnlockConfirmation {
            swap_id: handle.swap_id.clone(),
            ledger_id: "sui-local".to_string(),
            tx_hash: "su-1".to_string(),
        })
        .unwrap();
        drop(tx);
        listener.await.unwrap();

        assert_eq!(
            coord.get_swap(&handle.swap_id).unwrap().status,
            SwapStatus::RolledBack
        );
    }
}

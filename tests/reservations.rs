//! Balance reservation and cross-ledger operation scenarios

use std::sync::Arc;

use chrono::Duration;

use meridian_router::clock::ManualClock;
use meridian_router::config::ReservationConfig;
use meridian_router::error::RouterError;
use meridian_router::ledger::{InMemoryLedgerAdapter, LedgerAdapter, LedgerManager, OperationStatus};

async fn setup() -> (Arc<LedgerManager>, Arc<InMemoryLedgerAdapter>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let manager = Arc::new(LedgerManager::new(
        clock.clone(),
        ReservationConfig::default(),
    ));

    let source = Arc::new(InMemoryLedgerAdapter::new("sui-local"));
    source.connect().await.unwrap();
    source.credit("alice", "usdc", 1_000);
    manager.register_adapter(source.clone());

    let target = Arc::new(InMemoryLedgerAdapter::new("hedera-local"));
    target.connect().await.unwrap();
    manager.register_adapter(target);

    (manager, source, clock)
}

#[tokio::test]
async fn reservation_blocks_second_transfer_until_released() {
    let (manager, _, _) = setup().await;

    // First operation reserves the full balance
    let op_a = manager
        .initiate_cross_ledger_transfer("sui-local", "hedera-local", "alice", "bob", "usdc", 1_000)
        .await
        .unwrap();
    assert_eq!(op_a.status, OperationStatus::Pending);

    // Second operation for the same funds must fail immediately
    let err = manager
        .initiate_cross_ledger_transfer("sui-local", "hedera-local", "alice", "bob", "usdc", 1_000)
        .await
        .unwrap_err();
    match err {
        RouterError::InsufficientBalance {
            requested,
            available,
            ..
        } => {
            assert_eq!(requested, 1_000);
            assert_eq!(available, 0);
        }
        other => panic!("expected InsufficientBalance, got {other}"),
    }

    // Rolling the first back frees the reservation
    manager
        .rollback_cross_ledger_operation(&op_a.id)
        .await
        .unwrap();
    assert_eq!(
        manager.get_operation(&op_a.id).unwrap().status,
        OperationStatus::RolledBack
    );

    let op_b = manager
        .initiate_cross_ledger_transfer("sui-local", "hedera-local", "alice", "bob", "usdc", 1_000)
        .await
        .unwrap();
    assert_eq!(op_b.status, OperationStatus::Pending);
}

#[tokio::test]
async fn truly_available_subtracts_reservations_and_locks() {
    let (manager, adapter, _) = setup().await;

    let r1 = manager
        .reserve_balance("sui-local", "alice", "usdc", 300)
        .await
        .unwrap();
    assert_eq!(
        manager
            .truly_available("sui-local", "alice", "usdc")
            .await
            .unwrap(),
        700
    );

    // Locking moves the hold from the reservation ledger to the adapter;
    // the total promise must not change
    manager.lock_reserved_balance(&r1).await.unwrap();
    assert_eq!(adapter.locked_balance("alice", "usdc").await.unwrap(), 300);
    assert_eq!(
        manager
            .truly_available("sui-local", "alice", "usdc")
            .await
            .unwrap(),
        700
    );
}

#[tokio::test]
async fn lock_is_idempotent() {
    let (manager, _, _) = setup().await;

    let r1 = manager
        .reserve_balance("sui-local", "alice", "usdc", 200)
        .await
        .unwrap();
    let tx_a = manager.lock_reserved_balance(&r1).await.unwrap();
    let tx_b = manager.lock_reserved_balance(&r1).await.unwrap();
    assert_eq!(tx_a, tx_b);
}

#[tokio::test]
async fn rollback_unlocks_locked_reservations() {
    let (manager, adapter, _) = setup().await;

    let op = manager
        .initiate_cross_ledger_transfer("sui-local", "hedera-local", "alice", "bob", "usdc", 400)
        .await
        .unwrap();
    manager.lock_cross_ledger_operation(&op.id).await.unwrap();
    assert_eq!(adapter.locked_balance("alice", "usdc").await.unwrap(), 400);

    manager
        .rollback_cross_ledger_operation(&op.id)
        .await
        .unwrap();
    assert_eq!(adapter.locked_balance("alice", "usdc").await.unwrap(), 0);
    assert_eq!(
        manager
            .truly_available("sui-local", "alice", "usdc")
            .await
            .unwrap(),
        1_000
    );
}

#[tokio::test]
async fn rollback_of_terminal_operation_is_rejected() {
    let (manager, _, _) = setup().await;

    let op = manager
        .initiate_cross_ledger_transfer("sui-local", "hedera-local", "alice", "bob", "usdc", 100)
        .await
        .unwrap();
    manager
        .complete_cross_ledger_operation(&op.id, None)
        .await
        .unwrap();

    let err = manager
        .rollback_cross_ledger_operation(&op.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::InvalidTransition { .. }));
}

#[tokio::test]
async fn sweep_releases_only_expired_reservations() {
    let (manager, _, clock) = setup().await;

    let old = manager
        .reserve_balance("sui-local", "alice", "usdc", 500)
        .await
        .unwrap();
    clock.advance(Duration::seconds(301));
    let fresh = manager
        .reserve_balance("sui-local", "alice", "usdc", 200)
        .await
        .unwrap();

    assert_eq!(manager.sweep_expired_reservations().await, 1);
    assert!(manager.get_reservation(&old).is_none());
    assert!(manager.get_reservation(&fresh).is_some());

    // Idempotent on replay
    assert_eq!(manager.sweep_expired_reservations().await, 0);
}

#[tokio::test]
async fn sweep_unlocks_abandoned_locked_reservation() {
    let (manager, adapter, clock) = setup().await;

    let r1 = manager
        .reserve_balance("sui-local", "alice", "usdc", 500)
        .await
        .unwrap();
    manager.lock_reserved_balance(&r1).await.unwrap();
    assert_eq!(adapter.locked_balance("alice", "usdc").await.unwrap(), 500);

    clock.advance(Duration::seconds(301));
    assert_eq!(manager.sweep_expired_reservations().await, 1);
    assert_eq!(adapter.locked_balance("alice", "usdc").await.unwrap(), 0);
}

#[tokio::test]
async fn adapter_failure_does_not_strand_reservation() {
    let (manager, adapter, _) = setup().await;

    let op = manager
        .initiate_cross_ledger_transfer("sui-local", "hedera-local", "alice", "bob", "usdc", 300)
        .await
        .unwrap();

    adapter.set_fail_operations(true);
    assert!(manager.lock_cross_ledger_operation(&op.id).await.is_err());

    // Rollback still frees the reservation even though the unlock call fails
    manager
        .rollback_cross_ledger_operation(&op.id)
        .await
        .unwrap();
    adapter.set_fail_operations(false);
    assert_eq!(
        manager
            .truly_available("sui-local", "alice", "usdc")
            .await
            .unwrap(),
        1_000
    );
}

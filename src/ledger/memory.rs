//! In-memory ledger adapter
//!
//! Reference implementation of [`LedgerAdapter`] with seedable balances and
//! optional failure injection. Backs the "memory" adapter kind in the default
//! wiring and every integration test.

use super::{AdapterError, LedgerAdapter, LedgerTransaction, TxRef};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Per-(account, asset) balance. `balance` is the gross figure the ledger
/// reports; `locked` is the portion of it made unspendable by a lock.
#[derive(Debug, Default, Clone)]
struct Balance {
    balance: u64,
    locked: u64,
}

impl Balance {
    fn spendable(&self) -> u64 {
        self.balance.saturating_sub(self.locked)
    }
}

/// Simulated ledger holding balances and a transaction log in memory
pub struct InMemoryLedgerAdapter {
    ledger_id: String,
    connected: AtomicBool,
    balances: DashMap<(String, String), Balance>,
    transactions: DashMap<String, LedgerTransaction>,
    tx_counter: AtomicU64,
    /// When set, lock/unlock/transfer calls fail with a rejection
    fail_operations: AtomicBool,
}

impl InMemoryLedgerAdapter {
    pub fn new(ledger_id: impl Into<String>) -> Self {
        Self {
            ledger_id: ledger_id.into(),
            connected: AtomicBool::new(false),
            balances: DashMap::new(),
            transactions: DashMap::new(),
            tx_counter: AtomicU64::new(0),
            fail_operations: AtomicBool::new(false),
        }
    }

    /// Seed an account balance
    pub fn credit(&self, account: &str, asset_id: &str, amount: u64) {
        let mut bal = self
            .balances
            .entry((account.to_string(), asset_id.to_string()))
            .or_default();
        bal.balance += amount;
    }

    /// Toggle failure injection for mutating operations
    pub fn set_fail_operations(&self, fail: bool) {
        self.fail_operations.store(fail, Ordering::SeqCst);
    }

    fn next_tx_ref(&self, kind: &str) -> TxRef {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}-{}", self.ledger_id, kind, n)
    }

    fn check_failure(&self) -> Result<(), AdapterError> {
        if self.fail_operations.load(Ordering::SeqCst) {
            return Err(AdapterError::Rejected("injected failure".to_string()));
        }
        Ok(())
    }

    fn record_tx(&self, tx_ref: &str, from: &str, to: &str, asset_id: &str, amount: u64) {
        let tx = LedgerTransaction {
            tx_ref: tx_ref.to_string(),
            from_account: from.to_string(),
            to_account: to.to_string(),
            asset_id: asset_id.to_string(),
            amount,
            confirmed: true,
        };
        self.transactions.insert(tx_ref.to_string(), tx);
    }
}

#[async_trait]
impl LedgerAdapter for InMemoryLedgerAdapter {
    fn ledger_id(&self) -> &str {
        &self.ledger_id
    }

    async fn connect(&self) -> Result<(), AdapterError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn available_balance(
        &self,
        account: &str,
        asset_id: &str,
    ) -> Result<u64, AdapterError> {
        Ok(self
            .balances
            .get(&(account.to_string(), asset_id.to_string()))
            .map(|b| b.balance)
            .unwrap_or(0))
    }

    async fn locked_balance(&self, account: &str, asset_id: &str) -> Result<u64, AdapterError> {
        Ok(self
            .balances
            .get(&(account.to_string(), asset_id.to_string()))
            .map(|b| b.locked)
            .unwrap_or(0))
    }

    async fn lock_asset(
        &self,
        account: &str,
        asset_id: &str,
        amount: u64,
    ) -> Result<TxRef, AdapterError> {
        self.check_failure()?;

        let mut bal = self
            .balances
            .get_mut(&(account.to_string(), asset_id.to_string()))
            .ok_or_else(|| AdapterError::UnknownAccount(account.to_string()))?;

        if bal.spendable() < amount {
            return Err(AdapterError::InsufficientFunds {
                requested: amount,
                available: bal.spendable(),
            });
        }

        bal.locked += amount;
        drop(bal);

        let tx_ref = self.next_tx_ref("lock");
        self.record_tx(&tx_ref, account, account, asset_id, amount);
        Ok(tx_ref)
    }

    async fn unlock_asset(
        &self,
        account: &str,
        asset_id: &str,
        amount: u64,
    ) -> Result<TxRef, AdapterError> {
        self.check_failure()?;

        let mut bal = self
            .balances
            .get_mut(&(account.to_string(), asset_id.to_string()))
            .ok_or_else(|| AdapterError::UnknownAccount(account.to_string()))?;

        let unlocked = amount.min(bal.locked);
        bal.locked -= unlocked;
        drop(bal);

        let tx_ref = self.next_tx_ref("unlock");
        self.record_tx(&tx_ref, account, account, asset_id, unlocked);
        Ok(tx_ref)
    }

    async fn transfer(
        &self,
        from_account: &str,
        to_account: &str,
        asset_id: &str,
        amount: u64,
    ) -> Result<TxRef, AdapterError> {
        self.check_failure()?;

        {
            let mut from = self
                .balances
                .get_mut(&(from_account.to_string(), asset_id.to_string()))
                .ok_or_else(|| AdapterError::UnknownAccount(from_account.to_string()))?;

            // A transfer settling a swap consumes the lock placed earlier
            if from.locked >= amount {
                from.balance -= amount;
                from.locked -= amount;
            } else if from.spendable() >= amount {
                from.balance -= amount;
            } else {
                return Err(AdapterError::InsufficientFunds {
                    requested: amount,
                    available: from.spendable(),
                });
            }
        }

        let mut to = self
            .balances
            .entry((to_account.to_string(), asset_id.to_string()))
            .or_default();
        to.balance += amount;
        drop(to);

        let tx_ref = self.next_tx_ref("xfer");
        self.record_tx(&tx_ref, from_account, to_account, asset_id, amount);
        Ok(tx_ref)
    }

    async fn get_transaction(&self, tx_ref: &str) -> Result<LedgerTransaction, AdapterError> {
        self.transactions
            .get(tx_ref)
            .map(|t| t.clone())
            .ok_or_else(|| AdapterError::TxNotFound(tx_ref.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_reduces_spendable_not_balance() {
        let adapter = InMemoryLedgerAdapter::new("l1");
        adapter.connect().await.unwrap();
        adapter.credit("alice", "usdc", 1000);

        let tx = adapter.lock_asset("alice", "usdc", 400).await.unwrap();
        assert_eq!(adapter.available_balance("alice", "usdc").await.unwrap(), 1000);
        assert_eq!(adapter.locked_balance("alice", "usdc").await.unwrap(), 400);

        let recorded = adapter.get_transaction(&tx).await.unwrap();
        assert_eq!(recorded.amount, 400);

        // Only the unlocked remainder can be locked again
        assert!(adapter.lock_asset("alice", "usdc", 700).await.is_err());
    }

    #[tokio::test]
    async fn test_unlock_restores_spendable() {
        let adapter = InMemoryLedgerAdapter::new("l1");
        adapter.credit("alice", "usdc", 100);
        adapter.lock_asset("alice", "usdc", 100).await.unwrap();
        adapter.unlock_asset("alice", "usdc", 100).await.unwrap();
        assert_eq!(adapter.locked_balance("alice", "usdc").await.unwrap(), 0);
        assert!(adapter.lock_asset("alice", "usdc", 100).await.is_ok());
    }

    #[tokio::test]
    async fn test_transfer_consumes_lock_first() {
        let adapter = InMemoryLedgerAdapter::new("l1");
        adapter.credit("alice", "usdc", 500);
        adapter.lock_asset("alice", "usdc", 500).await.unwrap();
        adapter.transfer("alice", "bob", "usdc", 500).await.unwrap();

        assert_eq!(adapter.available_balance("alice", "usdc").await.unwrap(), 0);
        assert_eq!(adapter.locked_balance("alice", "usdc").await.unwrap(), 0);
        assert_eq!(adapter.available_balance("bob", "usdc").await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let adapter = InMemoryLedgerAdapter::new("l1");
        adapter.credit("alice", "usdc", 100);
        adapter.set_fail_operations(true);
        assert!(adapter.lock_asset("alice", "usdc", 10).await.is_err());
        adapter.set_fail_operations(false);
        assert!(adapter.lock_asset("alice", "usdc", 10).await.is_ok());
    }
}

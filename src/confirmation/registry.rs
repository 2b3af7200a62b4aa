//! Durable confirmation records and dual-status recomputation

use super::{
    derive_dual_status, ConfirmationMetadata, ConfirmationRecord, ConfirmationSlot,
    ConfirmationStatus, DualConfirmationStatus, DualStatus, RouterRole, Signer, TransferDetails,
};
use crate::clock::Clock;
use crate::error::{RouterError, RouterResult};
use crate::store::{Store, StoreError};

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

fn record_key(confirmation_id: &str) -> String {
    format!("confirmation:{}", confirmation_id)
}

fn router_index_key(router_id: &str) -> String {
    format!("confirmations:router:{}", router_id)
}

fn account_index_key(account: &str) -> String {
    format!("confirmations:account:{}", account)
}

fn asset_index_key(asset_id: &str) -> String {
    format!("confirmations:asset:{}", asset_id)
}

fn dual_status_key(transfer_id: &str) -> String {
    format!("confirmation:dual:{}", transfer_id)
}

/// Store-backed registry of this router's confirmation records
pub struct ConfirmationRegistry {
    router_id: String,
    role: RouterRole,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    signer: Arc<dyn Signer>,
}

impl ConfirmationRegistry {
    pub fn new(
        router_id: impl Into<String>,
        role: RouterRole,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            router_id: router_id.into(),
            role,
            store,
            clock,
            signer,
        }
    }

    pub fn router_id(&self) -> &str {
        &self.router_id
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Create, sign, store, and index a confirmation record for this router,
    /// then fold it into the transfer's dual-confirmation status.
    pub async fn create_confirmation_record(
        &self,
        transfer: &TransferDetails,
        status: ConfirmationStatus,
        ledger_tx_hash: Option<String>,
    ) -> RouterResult<ConfirmationRecord> {
        let now = self.clock.now();
        let metadata = ConfirmationMetadata {
            from_account: transfer.from_account.clone(),
            to_account: transfer.to_account.clone(),
            asset_id: transfer.asset_id.clone(),
            amount: transfer.amount,
            ledger_tx_hash,
        };

        let mut record = ConfirmationRecord {
            id: Uuid::new_v4().to_string(),
            transfer_id: transfer.transfer_id.clone(),
            router_id: self.router_id.clone(),
            status,
            timestamp: now,
            signature: String::new(),
            metadata,
            rollback_reason: None,
            rolled_back_at: None,
        };
        record.signature = self.sign_record(&record)?;

        self.persist_record(&record).await?;

        self.store
            .set_add(&router_index_key(&self.router_id), &record.id)
            .await?;
        self.store
            .set_add(&account_index_key(&record.metadata.from_account), &record.id)
            .await?;
        self.store
            .set_add(&asset_index_key(&record.metadata.asset_id), &record.id)
            .await?;

        info!(
            "Confirmation {} recorded for transfer {} as {}",
            record.id,
            record.transfer_id,
            record.status.as_str()
        );
        crate::metrics::record_confirmation_created(record.status.as_str());

        self.recompute_dual_status(&record).await?;

        Ok(record)
    }

    fn sign_record(&self, record: &ConfirmationRecord) -> RouterResult<String> {
        let payload = serde_json::to_vec(&(
            &record.id,
            &record.transfer_id,
            &record.router_id,
            record.status.as_str(),
            &record.metadata,
        ))
        .map_err(StoreError::from)?;
        Ok(self.signer.sign(&payload))
    }

    async fn persist_record(&self, record: &ConfirmationRecord) -> RouterResult<()> {
        let serialized = serde_json::to_string(record).map_err(StoreError::from)?;
        self.store.set(&record_key(&record.id), &serialized).await?;
        Ok(())
    }

    /// Read-merge-write the dual status for a record's transfer.
    ///
    /// Last-write-wins per transfer: two near-simultaneous writes from the
    /// two roles may interleave, but each write merges the latest persisted
    /// state, so the final status converges once both land.
    async fn recompute_dual_status(
        &self,
        record: &ConfirmationRecord,
    ) -> RouterResult<DualConfirmationStatus> {
        let key = dual_status_key(&record.transfer_id);

        let mut dual = match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(StoreError::from)?,
            None => DualConfirmationStatus::empty(record.transfer_id.clone()),
        };

        dual.set_slot(
            self.role,
            ConfirmationSlot {
                confirmation_id: record.id.clone(),
                router_id: record.router_id.clone(),
                status: record.status,
                timestamp: record.timestamp,
            },
        );

        dual.status = derive_dual_status(dual.first.as_ref(), dual.second.as_ref());
        if dual.status == DualStatus::DualConfirmed && dual.completed_at.is_none() {
            dual.completed_at = Some(self.clock.now());
        }

        let serialized = serde_json::to_string(&dual).map_err(StoreError::from)?;
        self.store.set(&key, &serialized).await?;

        debug!(
            "Dual status for transfer {} is now {:?}",
            record.transfer_id, dual.status
        );
        Ok(dual)
    }

    /// Roll back a single confirmed record. One-way: already failed or
    /// rolled-back records are rejected.
    pub async fn rollback_confirmation(
        &self,
        confirmation_id: &str,
        reason: &str,
    ) -> RouterResult<ConfirmationRecord> {
        let mut record = self
            .get_record(confirmation_id)
            .await?
            .ok_or_else(|| RouterError::ConfirmationNotFound {
                confirmation_id: confirmation_id.to_string(),
            })?;

        if record.status != ConfirmationStatus::Confirmed {
            return Err(RouterError::InvalidTransition {
                from: record.status.as_str().to_string(),
                to: "rolled_back".to_string(),
            });
        }

        record.status = ConfirmationStatus::RolledBack;
        record.rollback_reason = Some(reason.to_string());
        record.rolled_back_at = Some(self.clock.now());

        self.persist_record(&record).await?;
        self.recompute_dual_status(&record).await?;

        info!(
            "Confirmation {} rolled back: {}",
            confirmation_id, reason
        );
        Ok(record)
    }

    /// Get a single record by ID
    pub async fn get_record(
        &self,
        confirmation_id: &str,
    ) -> RouterResult<Option<ConfirmationRecord>> {
        match self.store.get(&record_key(confirmation_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).map_err(StoreError::from)?)),
            None => Ok(None),
        }
    }

    /// All records owned by this router
    pub async fn records_for_router(&self) -> RouterResult<Vec<ConfirmationRecord>> {
        self.load_indexed(&router_index_key(&self.router_id)).await
    }

    /// Records touching an account, newest first
    pub async fn records_by_account(
        &self,
        account: &str,
    ) -> RouterResult<Vec<ConfirmationRecord>> {
        let mut records = self.load_indexed(&account_index_key(account)).await?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    /// Records for an asset, newest first
    pub async fn records_by_asset(
        &self,
        asset_id: &str,
    ) -> RouterResult<Vec<ConfirmationRecord>> {
        let mut records = self.load_indexed(&asset_index_key(asset_id)).await?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    async fn load_indexed(&self, index_key: &str) -> RouterResult<Vec<ConfirmationRecord>> {
        let ids = self.store.set_members(index_key).await?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get_record(&id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Dual-confirmation status for a transfer
    pub async fn dual_status(
        &self,
        transfer_id: &str,
    ) -> RouterResult<Option<DualConfirmationStatus>> {
        match self.store.get(&dual_status_key(transfer_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).map_err(StoreError::from)?)),
            None => Ok(None),
        }
    }

    /// Irreversibly delete records older than the cutoff. Returns the number
    /// removed.
    pub async fn cleanup_old_records(&self, older_than_days: i64) -> RouterResult<usize> {
        let cutoff = self.clock.now() - chrono::Duration::days(older_than_days);
        let records = self.records_for_router().await?;

        let mut removed = 0;
        for record in records {
            if record.timestamp < cutoff {
                self.store.delete(&record_key(&record.id)).await?;
                self.store
                    .set_remove(&router_index_key(&self.router_id), &record.id)
                    .await?;
                self.store
                    .set_remove(&account_index_key(&record.metadata.from_account), &record.id)
                    .await?;
                self.store
                    .set_remove(&asset_index_key(&record.metadata.asset_id), &record.id)
                    .await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Cleanup removed {} confirmation records", removed);
        }
        Ok(removed)
    }
}

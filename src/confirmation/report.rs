//! Regulatory reporting over this router's confirmation records

use super::{ConfirmationRecord, ConfirmationRegistry, ConfirmationStatus};
use crate::error::RouterResult;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Per-asset confirmed volume inside the report window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetVolume {
    pub asset_id: String,
    pub confirmed_volume: u64,
    pub record_count: usize,
}

/// Per-account activity inside the report window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountActivity {
    pub account: String,
    pub record_count: usize,
}

/// Flat, exportable audit report. Stable output contract: report id,
/// generation timestamp, period, per-router totals, per-asset confirmed
/// volume, compliance flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulatoryReport {
    pub report_id: String,
    pub router_id: String,
    pub generated_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_records: usize,
    pub confirmed_count: usize,
    pub failed_count: usize,
    pub rolled_back_count: usize,
    pub asset_volumes: Vec<AssetVolume>,
    pub account_activity: Vec<AccountActivity>,
    /// False if the window contains any failed or rolled-back record
    pub compliant: bool,
}

impl RegulatoryReport {
    /// Render the report as CSV, one asset volume row per line after a
    /// header block.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str("report_id,router_id,generated_at,period_start,period_end,total_records,confirmed,failed,rolled_back,compliant\n");
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            self.report_id,
            self.router_id,
            self.generated_at.to_rfc3339(),
            self.period_start.to_rfc3339(),
            self.period_end.to_rfc3339(),
            self.total_records,
            self.confirmed_count,
            self.failed_count,
            self.rolled_back_count,
            self.compliant,
        ));
        out.push_str("asset_id,confirmed_volume,record_count\n");
        for volume in &self.asset_volumes {
            out.push_str(&format!(
                "{},{},{}\n",
                volume.asset_id, volume.confirmed_volume, volume.record_count
            ));
        }
        out
    }
}

impl ConfirmationRegistry {
    /// Build an audit report over this router's records in the window
    pub async fn generate_regulatory_report(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> RouterResult<RegulatoryReport> {
        let records: Vec<ConfirmationRecord> = self
            .records_for_router()
            .await?
            .into_iter()
            .filter(|r| r.timestamp >= period_start && r.timestamp <= period_end)
            .collect();

        let mut by_asset: BTreeMap<String, AssetVolume> = BTreeMap::new();
        let mut by_account: BTreeMap<String, usize> = BTreeMap::new();
        let mut confirmed = 0;
        let mut failed = 0;
        let mut rolled_back = 0;

        for record in &records {
            match record.status {
                ConfirmationStatus::Confirmed => confirmed += 1,
                ConfirmationStatus::Failed => failed += 1,
                ConfirmationStatus::RolledBack => rolled_back += 1,
                ConfirmationStatus::Pending => {}
            }

            let entry = by_asset
                .entry(record.metadata.asset_id.clone())
                .or_insert_with(|| AssetVolume {
                    asset_id: record.metadata.asset_id.clone(),
                    confirmed_volume: 0,
                    record_count: 0,
                });
            entry.record_count += 1;
            if record.status == ConfirmationStatus::Confirmed {
                entry.confirmed_volume += record.metadata.amount;
            }

            *by_account
                .entry(record.metadata.from_account.clone())
                .or_default() += 1;
        }

        Ok(RegulatoryReport {
            report_id: Uuid::new_v4().to_string(),
            router_id: self.router_id().to_string(),
            generated_at: self.clock().now(),
            period_start,
            period_end,
            total_records: records.len(),
            confirmed_count: confirmed,
            failed_count: failed,
            rolled_back_count: rolled_back,
            asset_volumes: by_asset.into_values().collect(),
            account_activity: by_account
                .into_iter()
                .map(|(account, record_count)| AccountActivity {
                    account,
                    record_count,
                })
                .collect(),
            compliant: failed == 0 && rolled_back == 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::confirmation::{KeccakSigner, RouterRole, TransferDetails};
    use crate::store::MemoryStore;
    use chrono::Duration;
    use std::sync::Arc;

    fn transfer(id: &str, asset: &str, amount: u64) -> TransferDetails {
        TransferDetails {
            transfer_id: id.to_string(),
            from_account: "alice".to_string(),
            to_account: "bob".to_string(),
            asset_id: asset.to_string(),
            amount,
        }
    }

    #[tokio::test]
    async fn test_report_sums_confirmed_volume_per_asset() {
        let clock = Arc::new(ManualClock::default());
        let reg = ConfirmationRegistry::new(
            "router-a",
            RouterRole::First,
            Arc::new(MemoryStore::new()),
            clock.clone(),
            Arc::new(KeccakSigner::new(vec![1; 32])),
        );

        let start = clock.now() - Duration::hours(1);
        reg.create_confirmation_record(&transfer("t1", "usdc", 100), ConfirmationStatus::Confirmed, None)
            .await
            .unwrap();
        reg.create_confirmation_record(&transfer("t2", "usdc", 50), ConfirmationStatus::Confirmed, None)
            .await
            .unwrap();
        reg.create_confirmation_record(&transfer("t3", "hbar", 75), ConfirmationStatus::Failed, None)
            .await
            .unwrap();
        let end = clock.now() + Duration::hours(1);

        let report = reg.generate_regulatory_report(start, end).await.unwrap();
        assert_eq!(report.total_records, 3);
        assert_eq!(report.confirmed_count, 2);
        assert_eq!(report.failed_count, 1);
        assert!(!report.compliant);

        let usdc = report
            .asset_volumes
            .iter()
            .find(|v| v.asset_id == "usdc")
            .unwrap();
        assert_eq!(usdc.confirmed_volume, 150);
        // Failed records contribute no confirmed volume
        let hbar = report
            .asset_volumes
            .iter()
            .find(|v| v.asset_id == "hbar")
            .unwrap();
        assert_eq!(hbar.confirmed_volume, 0);
        assert_eq!(hbar.record_count, 1);

        let csv = report.to_csv();
        assert!(csv.contains("usdc,150,2"));
        assert!(csv.contains("hbar,0,1"));
    }

    #[tokio::test]
    async fn test_report_window_excludes_outside_records() {
        let clock = Arc::new(ManualClock::default());
        let reg = ConfirmationRegistry::new(
            "router-a",
            RouterRole::First,
            Arc::new(MemoryStore::new()),
            clock.clone(),
            Arc::new(KeccakSigner::new(vec![1; 32])),
        );

        reg.create_confirmation_record(&transfer("t1", "usdc", 10), ConfirmationStatus::Confirmed, None)
            .await
            .unwrap();
        clock.advance(Duration::days(2));
        let start = clock.now() - Duration::hours(1);
        let end = clock.now() + Duration::hours(1);

        let report = reg.generate_regulatory_report(start, end).await.unwrap();
        assert_eq!(report.total_records, 0);
        assert!(report.compliant);
    }

    #[tokio::test]
    async fn test_report_timestamp_follows_registry_clock() {
        let clock = Arc::new(ManualClock::default());
        let reg = ConfirmationRegistry::new(
            "router-a",
            RouterRole::First,
            Arc::new(MemoryStore::new()),
            clock.clone(),
            Arc::new(KeccakSigner::new(vec![1; 32])),
        );

        clock.advance(Duration::days(3));
        let report = reg
            .generate_regulatory_report(clock.now() - Duration::hours(1), clock.now())
            .await
            .unwrap();
        assert_eq!(report.generated_at, clock.now());
    }
}

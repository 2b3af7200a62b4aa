//! Asset authority registry with heartbeat failover
//!
//! Tracks which router is primary (and which are backups) for each asset and
//! answers "may this router act on this asset right now". A backup is only
//! authorized while the primary's heartbeat is stale. Registrations and
//! heartbeats live in the shared store so both router roles see one truth.

use crate::clock::Clock;
use crate::config::AuthorityConfig;
use crate::error::{RouterError, RouterResult};
use crate::store::Store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

fn registration_key(asset_id: &str) -> String {
    format!("authority:asset:{}", asset_id)
}

fn heartbeat_key(router_id: &str) -> String {
    format!("authority:heartbeat:{}", router_id)
}

/// Descriptive metadata carried by a registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub asset_type: String,
    pub chain: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Which router owns an asset, and who stands by
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRegistration {
    pub asset_id: String,
    pub primary_router: String,
    pub backup_routers: Vec<String>,
    pub metadata: AssetMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of an authority check
#[derive(Debug, Clone)]
pub struct AuthorityDecision {
    pub authorized: bool,
    pub reason: Option<String>,
    pub primary_router: String,
    pub backup_routers: Vec<String>,
}

/// Read-only snapshot of validation counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationMetrics {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
}

/// Primary/backup authority registry for assets
pub struct AuthorityRegistry {
    router_id: String,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: AuthorityConfig,
    validations_total: AtomicU64,
    validations_ok: AtomicU64,
    validations_failed: AtomicU64,
}

impl AuthorityRegistry {
    pub fn new(
        router_id: impl Into<String>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        config: AuthorityConfig,
    ) -> Self {
        Self {
            router_id: router_id.into(),
            store,
            clock,
            config,
            validations_total: AtomicU64::new(0),
            validations_ok: AtomicU64::new(0),
            validations_failed: AtomicU64::new(0),
        }
    }

    /// Register an asset with this router as primary
    pub async fn register_asset(
        &self,
        asset_id: &str,
        metadata: AssetMetadata,
        backup_routers: Vec<String>,
    ) -> RouterResult<AssetRegistration> {
        let key = registration_key(asset_id);

        if self.store.get(&key).await?.is_some() {
            return Err(RouterError::AlreadyRegistered {
                asset_id: asset_id.to_string(),
            });
        }

        let now = self.clock.now();
        let registration = AssetRegistration {
            asset_id: asset_id.to_string(),
            primary_router: self.router_id.clone(),
            backup_routers,
            metadata,
            created_at: now,
            updated_at: now,
        };

        let serialized = serde_json::to_string(&registration)
            .map_err(crate::store::StoreError::from)?;
        self.store.set(&key, &serialized).await?;

        info!(
            "Registered asset {} with primary {} and {} backups",
            asset_id,
            registration.primary_router,
            registration.backup_routers.len()
        );
        Ok(registration)
    }

    /// Get a registration, if any
    pub async fn get_registration(&self, asset_id: &str) -> RouterResult<Option<AssetRegistration>> {
        match self.store.get(&registration_key(asset_id)).await? {
            Some(raw) => {
                let registration = serde_json::from_str(&raw)
                    .map_err(crate::store::StoreError::from)?;
                Ok(Some(registration))
            }
            None => Ok(None),
        }
    }

    /// Refresh this router's liveness heartbeat
    pub async fn record_heartbeat(&self) -> RouterResult<()> {
        let now = self.clock.now().to_rfc3339();
        self.store
            .set(&heartbeat_key(&self.router_id), &now)
            .await?;
        debug!("Heartbeat recorded for router {}", self.router_id);
        Ok(())
    }

    /// Is the primary for this asset alive right now?
    ///
    /// A missing or unparsable heartbeat counts as unavailable.
    pub async fn check_primary_availability(&self, asset_id: &str) -> RouterResult<bool> {
        let registration = self
            .get_registration(asset_id)
            .await?
            .ok_or_else(|| RouterError::AssetNotFound {
                asset_id: asset_id.to_string(),
            })?;

        Ok(self
            .heartbeat_is_live(&registration.primary_router)
            .await)
    }

    async fn heartbeat_is_live(&self, router_id: &str) -> bool {
        let raw = match self.store.get(&heartbeat_key(router_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                // Best-effort read: an unreachable store must not grant
                // failover by accident, so treat the primary as unavailable
                // and let the caller's reason string say why.
                warn!("Heartbeat read failed for router {}: {}", router_id, e);
                return false;
            }
        };

        let last = match DateTime::parse_from_rfc3339(&raw) {
            Ok(t) => t.with_timezone(&Utc),
            Err(_) => return false,
        };

        let age = self.clock.now().signed_duration_since(last);
        age.num_seconds() < self.config.liveness_window_secs
    }

    /// Decide whether a router may act on an asset now
    pub async fn validate_authority(
        &self,
        asset_id: &str,
        requesting_router: &str,
    ) -> RouterResult<AuthorityDecision> {
        self.validations_total.fetch_add(1, Ordering::Relaxed);

        let registration = match self.get_registration(asset_id).await? {
            Some(r) => r,
            None => {
                self.validations_failed.fetch_add(1, Ordering::Relaxed);
                return Err(RouterError::AssetNotFound {
                    asset_id: asset_id.to_string(),
                });
            }
        };

        let decision = if requesting_router == registration.primary_router {
            AuthorityDecision {
                authorized: true,
                reason: None,
                primary_router: registration.primary_router.clone(),
                backup_routers: registration.backup_routers.clone(),
            }
        } else if registration
            .backup_routers
            .iter()
            .any(|b| b == requesting_router)
        {
            let primary_live = self.heartbeat_is_live(&registration.primary_router).await;
            if primary_live {
                AuthorityDecision {
                    authorized: false,
                    reason: Some(format!(
                        "primary router {} is available",
                        registration.primary_router
                    )),
                    primary_router: registration.primary_router.clone(),
                    backup_routers: registration.backup_routers.clone(),
                }
            } else {
                info!(
                    "Backup {} authorized for asset {}: primary {} heartbeat stale",
                    requesting_router, asset_id, registration.primary_router
                );
                AuthorityDecision {
                    authorized: true,
                    reason: Some(format!(
                        "primary router {} is unavailable",
                        registration.primary_router
                    )),
                    primary_router: registration.primary_router.clone(),
                    backup_routers: registration.backup_routers.clone(),
                }
            }
        } else {
            AuthorityDecision {
                authorized: false,
                reason: Some(format!(
                    "router {} is neither primary nor backup for asset {}",
                    requesting_router, asset_id
                )),
                primary_router: registration.primary_router.clone(),
                backup_routers: registration.backup_routers.clone(),
            }
        };

        if decision.authorized {
            self.validations_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.validations_failed.fetch_add(1, Ordering::Relaxed);
        }
        crate::metrics::record_authority_validation(decision.authorized);

        Ok(decision)
    }

    /// Hand the primary role to a listed backup. Only the current primary may
    /// call this; the old primary joins the backup list.
    pub async fn transfer_authority(
        &self,
        asset_id: &str,
        requesting_router: &str,
        new_primary: &str,
    ) -> RouterResult<AssetRegistration> {
        let mut registration = self
            .get_registration(asset_id)
            .await?
            .ok_or_else(|| RouterError::AssetNotFound {
                asset_id: asset_id.to_string(),
            })?;

        if requesting_router != registration.primary_router {
            return Err(RouterError::Unauthorized {
                reason: format!(
                    "only primary router {} may transfer authority for asset {}",
                    registration.primary_router, asset_id
                ),
            });
        }

        if !registration.backup_routers.iter().any(|b| b == new_primary) {
            return Err(RouterError::Unauthorized {
                reason: format!(
                    "router {} is not a registered backup for asset {}",
                    new_primary, asset_id
                ),
            });
        }

        let old_primary = std::mem::replace(
            &mut registration.primary_router,
            new_primary.to_string(),
        );
        registration.backup_routers.retain(|b| b != new_primary);
        registration.backup_routers.push(old_primary);
        registration.updated_at = self.clock.now();

        let serialized = serde_json::to_string(&registration)
            .map_err(crate::store::StoreError::from)?;
        self.store
            .set(&registration_key(asset_id), &serialized)
            .await?;

        info!(
            "Authority for asset {} transferred to {}",
            asset_id, registration.primary_router
        );
        Ok(registration)
    }

    /// Running validation counters
    pub fn validation_metrics(&self) -> ValidationMetrics {
        ValidationMetrics {
            total: self.validations_total.load(Ordering::Relaxed),
            successful: self.validations_ok.load(Ordering::Relaxed),
            failed: self.validations_failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn metadata() -> AssetMetadata {
        AssetMetadata {
            asset_type: "token".to_string(),
            chain: "l1".to_string(),
            symbol: "USDC".to_string(),
            decimals: 6,
        }
    }

    fn registry_with(router_id: &str, store: Arc<MemoryStore>, clock: Arc<ManualClock>) -> AuthorityRegistry {
        AuthorityRegistry::new(
            router_id,
            store,
            clock,
            AuthorityConfig {
                liveness_window_secs: 30,
            },
        )
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let registry = registry_with("router-a", store, clock);

        registry
            .register_asset("usdc", metadata(), vec!["router-b".into()])
            .await
            .unwrap();
        let err = registry
            .register_asset("usdc", metadata(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::AlreadyRegistered { .. }));
    }

    #[tokio::test]
    async fn test_primary_always_authorized() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let registry = registry_with("router-a", store, clock);

        registry
            .register_asset("usdc", metadata(), vec!["router-b".into()])
            .await
            .unwrap();

        let decision = registry.validate_authority("usdc", "router-a").await.unwrap();
        assert!(decision.authorized);
        assert_eq!(registry.validation_metrics().successful, 1);
    }

    #[tokio::test]
    async fn test_backup_denied_while_primary_live() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let primary = registry_with("router-a", store.clone(), clock.clone());
        let backup = registry_with("router-b", store, clock.clone());

        primary
            .register_asset("usdc", metadata(), vec!["router-b".into()])
            .await
            .unwrap();
        primary.record_heartbeat().await.unwrap();

        clock.advance(Duration::seconds(29));
        let decision = backup.validate_authority("usdc", "router-b").await.unwrap();
        assert!(!decision.authorized);
        assert!(decision.reason.unwrap().contains("router-a"));

        clock.advance(Duration::seconds(2));
        let decision = backup.validate_authority("usdc", "router-b").await.unwrap();
        assert!(decision.authorized);
    }

    #[tokio::test]
    async fn test_missing_heartbeat_means_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let registry = registry_with("router-a", store, clock);

        registry
            .register_asset("usdc", metadata(), vec![])
            .await
            .unwrap();
        assert!(!registry.check_primary_availability("usdc").await.unwrap());
    }

    #[tokio::test]
    async fn test_transfer_authority_rules() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let registry = registry_with("router-a", store, clock);

        registry
            .register_asset("usdc", metadata(), vec!["router-b".into()])
            .await
            .unwrap();

        // Non-primary caller rejected
        let err = registry
            .transfer_authority("usdc", "router-b", "router-b")
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Unauthorized { .. }));

        // New primary must already be a backup
        let err = registry
            .transfer_authority("usdc", "router-a", "router-c")
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Unauthorized { .. }));

        let updated = registry
            .transfer_authority("usdc", "router-a", "router-b")
            .await
            .unwrap();
        assert_eq!(updated.primary_router, "router-b");
        assert_eq!(updated.backup_routers, vec!["router-a".to_string()]);
    }
}

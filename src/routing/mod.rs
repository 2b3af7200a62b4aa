//! Minimal routing path selector
//!
//! Picks the ledger hops a transfer should take: a direct hop when the two
//! ledgers are linked, otherwise a detour through the asset's home ledger.

use dashmap::DashMap;
use std::collections::HashSet;

use crate::error::{RouterError, RouterResult};
use crate::ledger::Asset;

pub struct RoutingEngine {
    assets: DashMap<String, Asset>,
    ledgers: DashMap<String, HashSet<String>>,
}

impl RoutingEngine {
    pub fn new() -> Self {
        Self {
            assets: DashMap::new(),
            ledgers: DashMap::new(),
        }
    }

    pub fn register_ledger(&self, ledger_id: impl Into<String>) {
        self.ledgers.entry(ledger_id.into()).or_default();
    }

    pub fn register_asset(&self, asset: Asset) {
        self.assets.insert(asset.id.clone(), asset);
    }

    /// Declare a bidirectional link between two registered ledgers
    pub fn link(&self, a: &str, b: &str) -> RouterResult<()> {
        for (from, to) in [(a, b), (b, a)] {
            let mut entry =
                self.ledgers
                    .get_mut(from)
                    .ok_or_else(|| RouterError::LedgerNotSupported {
                        ledger_id: from.to_string(),
                    })?;
            entry.insert(to.to_string());
        }
        Ok(())
    }

    /// Resolve the ledger hops for moving an asset between two ledgers.
    ///
    /// Same-ledger requests yield a single hop. A linked pair yields a direct
    /// two-hop path. Anything else detours through the asset's home ledger,
    /// which must be linked to both ends.
    pub fn resolve_path(
        &self,
        asset_id: &str,
        from_ledger: &str,
        to_ledger: &str,
    ) -> RouterResult<Vec<String>> {
        let asset = self
            .assets
            .get(asset_id)
            .ok_or_else(|| RouterError::AssetNotFound {
                asset_id: asset_id.to_string(),
            })?;

        for ledger in [from_ledger, to_ledger] {
            if !self.ledgers.contains_key(ledger) {
                return Err(RouterError::LedgerNotSupported {
                    ledger_id: ledger.to_string(),
                });
            }
        }

        if from_ledger == to_ledger {
            return Ok(vec![from_ledger.to_string()]);
        }

        if self.linked(from_ledger, to_ledger) {
            return Ok(vec![from_ledger.to_string(), to_ledger.to_string()]);
        }

        let home = &asset.home_ledger;
        if home != from_ledger
            && home != to_ledger
            && self.linked(from_ledger, home)
            && self.linked(home, to_ledger)
        {
            return Ok(vec![
                from_ledger.to_string(),
                home.clone(),
                to_ledger.to_string(),
            ]);
        }

        Err(RouterError::LedgerNotSupported {
            ledger_id: to_ledger.to_string(),
        })
    }

    fn linked(&self, from: &str, to: &str) -> bool {
        self.ledgers
            .get(from)
            .map(|links| links.contains(to))
            .unwrap_or(false)
    }
}

impl Default for RoutingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: &str, home: &str) -> Asset {
        Asset {
            id: id.to_string(),
            home_ledger: home.to_string(),
            symbol: id.to_uppercase(),
            decimals: 8,
        }
    }

    fn engine() -> RoutingEngine {
        let engine = RoutingEngine::new();
        for ledger in ["sui-local", "hedera-local", "hub"] {
            engine.register_ledger(ledger);
        }
        engine.register_asset(asset("usdc", "hub"));
        engine
    }

    #[test]
    fn test_direct_path_when_linked() {
        let engine = engine();
        engine.link("sui-local", "hedera-local").unwrap();

        let path = engine
            .resolve_path("usdc", "sui-local", "hedera-local")
            .unwrap();
        assert_eq!(path, vec!["sui-local", "hedera-local"]);
    }

    #[test]
    fn test_detour_via_home_ledger() {
        let engine = engine();
        engine.link("sui-local", "hub").unwrap();
        engine.link("hub", "hedera-local").unwrap();

        let path = engine
            .resolve_path("usdc", "sui-local", "hedera-local")
            .unwrap();
        assert_eq!(path, vec!["sui-local", "hub", "hedera-local"]);
    }

    #[test]
    fn test_unknown_asset_and_ledger_fail() {
        let engine = engine();
        assert!(matches!(
            engine.resolve_path("doge", "sui-local", "hub"),
            Err(RouterError::AssetNotFound { .. })
        ));
        assert!(matches!(
            engine.resolve_path("usdc", "sui-local", "solana"),
            Err(RouterError::LedgerNotSupported { .. })
        ));
    }

    #[test]
    fn test_unreachable_pair_fails() {
        let engine = engine();
        // No links registered at all
        assert!(engine
            .resolve_path("usdc", "sui-local", "hedera-local")
            .is_err());
    }
}

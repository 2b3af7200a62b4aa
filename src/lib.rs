//! Meridian Router - cross-ledger transfer coordination core
//!
//! The router moves assets between independent ledgers through atomic swaps.
//! It owns the swap state machines, the balance reservation protocol, the
//! dual-router confirmation registry, and the per-asset authority records
//! that decide which router instance may validate a given asset.
//!
//! The crate is transport-agnostic: ledger access and durable storage sit
//! behind the [`ledger::LedgerAdapter`] and [`store::Store`] traits, and the
//! in-memory implementations back both the test suite and local runs.

pub mod authority;
pub mod clock;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod events;
pub mod ledger;
pub mod metrics;
pub mod routing;
pub mod store;
pub mod swap;

pub use authority::AuthorityRegistry;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Settings;
pub use confirmation::{
    ConfirmationRegistry, ConfirmationTaskProcessor, RouterRole, TaskPriority,
};
pub use error::{RouterError, RouterResult};
pub use ledger::LedgerManager;
pub use routing::RoutingEngine;
pub use swap::SwapCoordinator;

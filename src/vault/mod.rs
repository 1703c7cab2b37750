//! Vault orchestration
//!
//! `StrategyVault` validates authorization and lifecycle, consults the limits
//! ledger and share accounting, and commits each operation as one unit.
//! `VaultRegistry` owns the instances and serializes access per vault.

pub mod engine;
pub mod events;
pub mod position;
pub mod rebalance;
pub mod registry;
pub mod share_mint;
pub mod strategy;
pub mod valuation;

pub use engine::{InitializeParams, StrategyVault};
pub use events::{EventLog, VaultEvent, VaultEventKind};
pub use position::PositionManager;
pub use rebalance::{RebalanceCoordinator, RebalanceOutcome};
pub use registry::{VaultHandle, VaultRegistry};
pub use share_mint::ShareMint;
pub use strategy::StrategyState;
pub use valuation::{ValuationSnapshot, Valuator};

pub mod accounting;
pub mod cli;
pub mod config;
pub mod custody;
pub mod derivation;
pub mod domain;
pub mod error;
pub mod logging;
pub mod vault;
pub mod venue;

pub use accounting::{LimitsLedger, LimitsUpdate, RetroactivePolicy, WhitelistEntry};
pub use config::AppConfig;
pub use custody::{AssetCustody, InMemoryCustody};
pub use derivation::{AddressBook, ProgramIds, Role};
pub use domain::{MarketInfo, RebalanceDirection, VaultStatus};
pub use error::{LimitKind, Result, VaultError};
pub use vault::{InitializeParams, StrategyVault, VaultRegistry};
pub use venue::{MarginValuation, MarginVenue, PaperVenue};

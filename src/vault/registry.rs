use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::engine::{InitializeParams, StrategyVault};
use super::rebalance::RebalanceOutcome;
use super::valuation::ValuationSnapshot;
use crate::accounting::{LimitsUpdate, RetroactivePolicy};
use crate::custody::AssetCustody;
use crate::derivation::{AddressBook, ProgramIds};
use crate::domain::{ExecutionReport, RebalanceDirection};
use crate::error::{Result, VaultError};
use crate::venue::MarginVenue;

pub type VaultHandle = Arc<Mutex<StrategyVault>>;

/// Owns every vault instance.
///
/// Each vault sits behind its own lock: operations on one vault serialize,
/// operations on different vaults run concurrently.
pub struct VaultRegistry {
    programs: ProgramIds,
    retroactive_policy: RetroactivePolicy,
    custody: Arc<dyn AssetCustody>,
    venue: Arc<dyn MarginVenue>,
    addresses: Mutex<AddressBook>,
    vaults: DashMap<Pubkey, VaultHandle>,
}

impl VaultRegistry {
    pub fn new(
        programs: ProgramIds,
        retroactive_policy: RetroactivePolicy,
        custody: Arc<dyn AssetCustody>,
        venue: Arc<dyn MarginVenue>,
    ) -> Self {
        Self {
            programs,
            retroactive_policy,
            custody,
            venue,
            addresses: Mutex::new(AddressBook::new(programs)),
            vaults: DashMap::new(),
        }
    }

    pub fn programs(&self) -> &ProgramIds {
        &self.programs
    }

    /// Initialize a vault; an identity can be initialized exactly once.
    ///
    /// The identity's sub-accounts are claimed first, so of two racing calls
    /// for one identity only one reaches the venue.
    pub async fn initialize(&self, params: InitializeParams) -> Result<VaultHandle> {
        let bumps = {
            let mut addresses = self.addresses.lock().await;
            addresses
                .claim(&params.identity, &params.margin_account)
                .inspect_err(|e| {
                    warn!(identity = %params.identity, error = %e, "initialize rejected");
                })?
        };

        let vault = match StrategyVault::initialize(
            params,
            self.programs,
            bumps,
            self.retroactive_policy,
            self.custody.clone(),
            self.venue.clone(),
        )
        .await
        {
            Ok(vault) => vault,
            Err(e) => {
                warn!(identity = %params.identity, error = %e, "initialize failed, releasing claim");
                self.addresses.lock().await.release(&params.identity);
                return Err(e);
            }
        };

        match self.vaults.entry(params.identity) {
            Entry::Occupied(_) => Err(VaultError::AlreadyInitialized(params.identity)),
            Entry::Vacant(slot) => {
                let handle = Arc::new(Mutex::new(vault));
                slot.insert(handle.clone());
                info!(identity = %params.identity, vaults = self.vaults.len(), "vault registered");
                Ok(handle)
            }
        }
    }

    pub fn get(&self, identity: &Pubkey) -> Result<VaultHandle> {
        self.vaults
            .get(identity)
            .map(|entry| entry.value().clone())
            .ok_or(VaultError::VaultNotFound(*identity))
    }

    pub fn contains(&self, identity: &Pubkey) -> bool {
        self.vaults.contains_key(identity)
    }

    pub fn identities(&self) -> Vec<Pubkey> {
        self.vaults.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }

    pub async fn deposit(&self, identity: &Pubkey, depositor: &Pubkey, amount: u64) -> Result<u64> {
        let vault = self.get(identity)?;
        let mut vault = vault.lock().await;
        vault.deposit(depositor, amount).await
    }

    pub async fn withdraw(
        &self,
        identity: &Pubkey,
        depositor: &Pubkey,
        share_amount: u64,
    ) -> Result<u64> {
        let vault = self.get(identity)?;
        let mut vault = vault.lock().await;
        vault.withdraw(depositor, share_amount).await
    }

    pub async fn set_limits(
        &self,
        identity: &Pubkey,
        caller: &Pubkey,
        update: LimitsUpdate,
    ) -> Result<()> {
        let vault = self.get(identity)?;
        let mut vault = vault.lock().await;
        vault.set_limits(caller, update).await
    }

    pub async fn drop_limits(&self, identity: &Pubkey, caller: &Pubkey) -> Result<()> {
        let vault = self.get(identity)?;
        let mut vault = vault.lock().await;
        vault.drop_limits(caller)
    }

    pub async fn rebalance_mango(
        &self,
        identity: &Pubkey,
        caller: &Pubkey,
        amount: u64,
        direction: RebalanceDirection,
    ) -> Result<RebalanceOutcome> {
        let vault = self.get(identity)?;
        let mut vault = vault.lock().await;
        vault.rebalance_mango(caller, amount, direction).await
    }

    pub async fn adjust_position_spot(
        &self,
        identity: &Pubkey,
        caller: &Pubkey,
        size: i64,
        limit_price: Option<u64>,
    ) -> Result<ExecutionReport> {
        let vault = self.get(identity)?;
        let mut vault = vault.lock().await;
        vault.adjust_position_spot(caller, size, limit_price).await
    }

    pub async fn adjust_position_perp(
        &self,
        identity: &Pubkey,
        caller: &Pubkey,
        size: i64,
        reduce_only: bool,
    ) -> Result<ExecutionReport> {
        let vault = self.get(identity)?;
        let mut vault = vault.lock().await;
        vault.adjust_position_perp(caller, size, reduce_only).await
    }

    pub async fn valuation(&self, identity: &Pubkey) -> Result<ValuationSnapshot> {
        let vault = self.get(identity)?;
        let vault = vault.lock().await;
        vault.valuation().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::InMemoryCustody;
    use crate::domain::MarketInfo;
    use crate::venue::PaperVenue;
    use rust_decimal_macros::dec;

    async fn registry() -> (Arc<VaultRegistry>, PaperVenue) {
        let custody = InMemoryCustody::new();
        let venue = PaperVenue::new(Arc::new(custody.clone()));
        venue
            .list_market(&MarketInfo::default(), dec!(1), dec!(1))
            .await;
        let programs = ProgramIds {
            strategy_program: Pubkey::new_unique(),
            venue_program: Pubkey::new_unique(),
            venue_group: Pubkey::new_unique(),
            margin_account_num: 1,
            open_orders_sub_index: 2,
        };
        let registry = VaultRegistry::new(
            programs,
            RetroactivePolicy::Reject,
            Arc::new(custody),
            Arc::new(venue.clone()),
        );
        (Arc::new(registry), venue)
    }

    fn params() -> InitializeParams {
        InitializeParams {
            identity: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            trigger_server: Pubkey::new_unique(),
            market_info: MarketInfo::default(),
            margin_account: Pubkey::new_unique(),
        }
    }

    #[tokio::test]
    async fn test_identity_initializes_once() {
        let (registry, _) = registry().await;
        let params = params();

        registry.initialize(params).await.unwrap();
        let err = registry.initialize(params).await.err().unwrap();
        assert!(matches!(err, VaultError::AlreadyInitialized(id) if id == params.identity));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_shared_margin_account_collides() {
        let (registry, _) = registry().await;
        let first = params();
        let second = InitializeParams {
            margin_account: first.margin_account,
            ..params()
        };

        registry.initialize(first).await.unwrap();
        assert!(matches!(
            registry.initialize(second).await,
            Err(VaultError::AlreadyInitialized(_))
        ));
        assert!(!registry.contains(&second.identity));
    }

    #[tokio::test]
    async fn test_retry_with_fresh_margin_account_after_collision() {
        let (registry, _) = registry().await;
        let first = params();
        let second = InitializeParams {
            margin_account: first.margin_account,
            ..params()
        };

        registry.initialize(first).await.unwrap();
        assert!(registry.initialize(second).await.is_err());

        let retry = InitializeParams {
            margin_account: Pubkey::new_unique(),
            ..second
        };
        registry.initialize(retry).await.unwrap();
        assert!(registry.contains(&second.identity));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_initialize_releases_claim() {
        let (registry, venue) = registry().await;
        let params = params();

        venue.fail_next("rpc unavailable").await;
        assert!(matches!(
            registry.initialize(params).await,
            Err(VaultError::ExternalVenueFailure(_))
        ));
        assert!(registry.is_empty());

        registry.initialize(params).await.unwrap();
        assert!(registry.contains(&params.identity));
    }

    #[tokio::test]
    async fn test_unknown_vault() {
        let (registry, _) = registry().await;
        let missing = Pubkey::new_unique();
        assert!(matches!(
            registry.deposit(&missing, &Pubkey::new_unique(), 1).await,
            Err(VaultError::VaultNotFound(id)) if id == missing
        ));
    }
}

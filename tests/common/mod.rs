#![allow(dead_code)]

use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use strategy_vault::vault::VaultHandle;
use strategy_vault::{
    InMemoryCustody, InitializeParams, MarketInfo, PaperVenue, ProgramIds, RetroactivePolicy,
    VaultRegistry,
};

/// One registry wired to a paper venue and in-memory custody
pub struct Harness {
    pub registry: Arc<VaultRegistry>,
    pub custody: InMemoryCustody,
    pub venue: PaperVenue,
}

/// An initialized vault and its principals
#[derive(Clone, Copy)]
pub struct TestVault {
    pub identity: Pubkey,
    pub owner: Pubkey,
    pub trigger_server: Pubkey,
    pub margin_account: Pubkey,
}

pub fn programs() -> ProgramIds {
    ProgramIds {
        strategy_program: Pubkey::new_unique(),
        venue_program: Pubkey::new_unique(),
        venue_group: Pubkey::new_unique(),
        margin_account_num: 1,
        open_orders_sub_index: 2,
    }
}

impl Harness {
    pub async fn new(policy: RetroactivePolicy) -> Self {
        Self::with_prices(policy, Decimal::ONE, Decimal::ONE).await
    }

    pub async fn with_prices(policy: RetroactivePolicy, spot: Decimal, perp: Decimal) -> Self {
        let custody = InMemoryCustody::new();
        let venue = PaperVenue::new(Arc::new(custody.clone()));
        venue.list_market(&MarketInfo::default(), spot, perp).await;
        let registry = VaultRegistry::new(
            programs(),
            policy,
            Arc::new(custody.clone()),
            Arc::new(venue.clone()),
        );
        Self {
            registry: Arc::new(registry),
            custody,
            venue,
        }
    }

    pub fn params() -> InitializeParams {
        InitializeParams {
            identity: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            trigger_server: Pubkey::new_unique(),
            market_info: MarketInfo::default(),
            margin_account: Pubkey::new_unique(),
        }
    }

    pub async fn vault(&self) -> TestVault {
        let params = Self::params();
        self.registry
            .initialize(params)
            .await
            .expect("initialize vault");
        TestVault {
            identity: params.identity,
            owner: params.owner,
            trigger_server: params.trigger_server,
            margin_account: params.margin_account,
        }
    }

    pub fn handle(&self, vault: &TestVault) -> VaultHandle {
        self.registry.get(&vault.identity).expect("registered vault")
    }

    /// A fresh principal holding `balance` of the stable asset
    pub async fn wallet(&self, balance: u64) -> Pubkey {
        let wallet = Pubkey::new_unique();
        self.custody
            .credit(&wallet, balance)
            .await
            .expect("credit wallet");
        wallet
    }

    /// Simulate yield by crediting the vault token account directly
    pub async fn accrue(&self, vault: &TestVault, amount: u64) {
        let token_account = self
            .handle(vault)
            .lock()
            .await
            .state()
            .vault_token_account()
            .expect("vault token account");
        self.custody
            .credit(&token_account, amount)
            .await
            .expect("credit vault");
    }

    /// Total value and shares, failing the test if they disagree on emptiness
    pub async fn checked(&self, vault: &TestVault) -> (u64, u64) {
        let snapshot = self
            .handle(vault)
            .lock()
            .await
            .check_invariants()
            .await
            .expect("shares and value agree");
        (snapshot.total_value, snapshot.total_shares)
    }
}

//! Stable-asset token accounts
//!
//! The vault never holds balances itself: depositor wallets, the vault token
//! account and the venue's token vault all live behind `AssetCustody`.

mod memory;

pub use memory::InMemoryCustody;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::error::Result;

#[async_trait]
pub trait AssetCustody: Send + Sync {
    /// Balance of a token account (0 for unknown accounts)
    async fn balance(&self, account: &Pubkey) -> Result<u64>;

    /// Move `amount` between two token accounts.
    ///
    /// Fails with `InsufficientFunds` and moves nothing if `from` cannot cover it.
    async fn transfer(&self, from: &Pubkey, to: &Pubkey, amount: u64) -> Result<()>;
}

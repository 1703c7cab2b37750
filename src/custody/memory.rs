use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::AssetCustody;
use crate::error::{Result, VaultError};

/// In-process token ledger for simulation and tests
#[derive(Clone, Default)]
pub struct InMemoryCustody {
    balances: Arc<RwLock<HashMap<Pubkey, u64>>>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint stable asset into an account (faucet)
    pub async fn credit(&self, account: &Pubkey, amount: u64) -> Result<u64> {
        let mut balances = self.balances.write().await;
        let balance = balances.entry(*account).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(VaultError::MathOverflow)?;
        Ok(*balance)
    }

    /// Sum of every balance
    pub async fn total_supply(&self) -> Result<u64> {
        self.balances
            .read()
            .await
            .values()
            .try_fold(0u64, |total, balance| total.checked_add(*balance))
            .ok_or(VaultError::MathOverflow)
    }
}

#[async_trait]
impl AssetCustody for InMemoryCustody {
    async fn balance(&self, account: &Pubkey) -> Result<u64> {
        Ok(self.balances.read().await.get(account).copied().unwrap_or(0))
    }

    async fn transfer(&self, from: &Pubkey, to: &Pubkey, amount: u64) -> Result<()> {
        let mut balances = self.balances.write().await;

        let available = balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(VaultError::InsufficientFunds {
                required: amount,
                available,
            });
        }
        if from == to {
            return Ok(());
        }

        let credited = balances
            .get(to)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(VaultError::MathOverflow)?;
        balances.insert(*from, available - amount);
        balances.insert(*to, credited);

        debug!(from = %from, to = %to, amount, "custody transfer");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transfer_moves_balance() {
        let custody = InMemoryCustody::new();
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();

        custody.credit(&alice, 100).await.unwrap();
        custody.transfer(&alice, &bob, 40).await.unwrap();

        assert_eq!(custody.balance(&alice).await.unwrap(), 60);
        assert_eq!(custody.balance(&bob).await.unwrap(), 40);
        assert_eq!(custody.total_supply().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_insufficient_funds_moves_nothing() {
        let custody = InMemoryCustody::new();
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();
        custody.credit(&alice, 10).await.unwrap();

        let err = custody.transfer(&alice, &bob, 11).await.unwrap_err();
        assert!(matches!(
            err,
            VaultError::InsufficientFunds {
                required: 11,
                available: 10
            }
        ));
        assert_eq!(custody.balance(&alice).await.unwrap(), 10);
        assert_eq!(custody.balance(&bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_account_has_zero_balance() {
        let custody = InMemoryCustody::new();
        assert_eq!(custody.balance(&Pubkey::new_unique()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_total_supply_overflow_is_an_error() {
        let custody = InMemoryCustody::new();
        custody.credit(&Pubkey::new_unique(), u64::MAX).await.unwrap();
        custody.credit(&Pubkey::new_unique(), 1).await.unwrap();

        assert!(matches!(
            custody.total_supply().await,
            Err(VaultError::MathOverflow)
        ));
    }
}

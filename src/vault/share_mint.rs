use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;

use crate::error::{Result, VaultError};

/// Strategy share token: supply plus holder balances
#[derive(Debug, Clone, Default)]
pub struct ShareMint {
    supply: u64,
    balances: HashMap<Pubkey, u64>,
}

impl ShareMint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supply(&self) -> u64 {
        self.supply
    }

    pub fn balance_of(&self, holder: &Pubkey) -> u64 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    pub fn holders(&self) -> usize {
        self.balances.len()
    }

    /// Fails with `MathOverflow` if minting `amount` to `holder` would overflow
    pub fn ensure_mintable(&self, holder: &Pubkey, amount: u64) -> Result<()> {
        self.supply
            .checked_add(amount)
            .and_then(|_| self.balance_of(holder).checked_add(amount))
            .map(|_| ())
            .ok_or(VaultError::MathOverflow)
    }

    /// Fails with `InsufficientFunds` if `holder` has fewer than `amount` shares
    pub fn ensure_burnable(&self, holder: &Pubkey, amount: u64) -> Result<()> {
        let held = self.balance_of(holder);
        if held < amount {
            return Err(VaultError::InsufficientFunds {
                required: amount,
                available: held,
            });
        }
        Ok(())
    }

    pub fn mint(&mut self, holder: &Pubkey, amount: u64) -> Result<()> {
        self.ensure_mintable(holder, amount)?;
        self.supply += amount;
        *self.balances.entry(*holder).or_insert(0) += amount;
        Ok(())
    }

    pub fn burn(&mut self, holder: &Pubkey, amount: u64) -> Result<()> {
        self.ensure_burnable(holder, amount)?;
        let remaining = self.balance_of(holder) - amount;
        if remaining == 0 {
            self.balances.remove(holder);
        } else {
            self.balances.insert(*holder, remaining);
        }
        self.supply -= amount;
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::strategy::StrategyState;
use crate::accounting::share_price;
use crate::custody::AssetCustody;
use crate::error::{Result, VaultError};
use crate::venue::{MarginValuation, MarginVenue};

/// One consistent reading of a vault's value.
///
/// An operation takes exactly one snapshot and makes every decision from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    /// Stable asset in the vault token account
    pub custody_balance: u64,
    pub margin: MarginValuation,
    /// Mark-to-market equity of the margin account
    pub margin_value: u64,
    pub total_value: u64,
    pub total_shares: u64,
    pub taken_at: DateTime<Utc>,
}

impl ValuationSnapshot {
    pub fn share_price(&self) -> Decimal {
        share_price(self.total_value, self.total_shares)
    }

    /// Custody plus signed margin equity, without the zero floor applied to
    /// `total_value`. Custody moves leave this unchanged even when the margin
    /// account is underwater.
    pub fn signed_value(&self) -> Result<Decimal> {
        Decimal::from(self.custody_balance)
            .checked_add(self.margin.equity()?)
            .ok_or(VaultError::MathOverflow)
    }
}

/// Reads custody and venue state into a `ValuationSnapshot`
#[derive(Clone)]
pub struct Valuator {
    custody: Arc<dyn AssetCustody>,
    venue: Arc<dyn MarginVenue>,
}

impl Valuator {
    pub fn new(custody: Arc<dyn AssetCustody>, venue: Arc<dyn MarginVenue>) -> Self {
        Self { custody, venue }
    }

    pub async fn snapshot(
        &self,
        state: &StrategyState,
        total_shares: u64,
    ) -> Result<ValuationSnapshot> {
        let vault_token_account = state.vault_token_account()?;
        let custody_balance = self.custody.balance(&vault_token_account).await?;
        let margin = self
            .venue
            .valuation(&state.margin_account, &state.market_info)
            .await?;
        let margin_value = margin.net_value()?;
        let total_value = custody_balance
            .checked_add(margin_value)
            .ok_or(VaultError::MathOverflow)?;

        debug!(
            identity = %state.identity,
            custody_balance,
            margin_value,
            total_value,
            total_shares,
            "valuation snapshot"
        );

        Ok(ValuationSnapshot {
            custody_balance,
            margin,
            margin_value,
            total_value,
            total_shares,
            taken_at: Utc::now(),
        })
    }
}

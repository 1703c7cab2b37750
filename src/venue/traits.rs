use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::domain::{ExecutionReport, MarketInfo, PerpOrder, SpotOrder};
use crate::error::{Result, VaultError};

/// Mark-to-market view of a margin account for one market pair
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MarginValuation {
    /// Quote (stable asset) deposits, net of spot trading
    pub quote_deposits: Decimal,
    /// Signed spot base balance; negative means borrowed
    pub spot_base_position: i64,
    /// Spot oracle price in quote per base unit
    pub spot_price: Decimal,
    /// Signed perp base position
    pub perp_base_position: i64,
    /// Perp PnL not yet settled into quote deposits
    pub perp_pnl: Decimal,
}

impl MarginValuation {
    /// Signed equity in the stable asset; negative when the account is underwater
    pub fn equity(&self) -> Result<Decimal> {
        let spot_value = Decimal::from(self.spot_base_position)
            .checked_mul(self.spot_price)
            .ok_or(VaultError::MathOverflow)?;
        self.quote_deposits
            .checked_add(spot_value)
            .and_then(|v| v.checked_add(self.perp_pnl))
            .ok_or(VaultError::MathOverflow)
    }

    /// Equity in the stable asset, truncated toward zero and floored at zero
    pub fn net_value(&self) -> Result<u64> {
        let equity = self.equity()?;
        if equity.is_sign_negative() {
            return Ok(0);
        }
        equity.trunc().to_u64().ok_or(VaultError::MathOverflow)
    }
}

/// The external margin-trading venue.
///
/// Every call is one atomic step from the vault's point of view; failures come
/// back as `ExternalVenueFailure` and are surfaced to the caller unchanged.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarginVenue: Send + Sync {
    async fn create_margin_account(&self, margin_account: &Pubkey, owner: &Pubkey) -> Result<()>;

    async fn create_open_orders(
        &self,
        margin_account: &Pubkey,
        open_orders: &Pubkey,
        spot_market_index: u8,
    ) -> Result<()>;

    /// Pull `amount` of the stable asset from `source` into the margin account
    async fn deposit(&self, margin_account: &Pubkey, source: &Pubkey, amount: u64) -> Result<()>;

    /// Pay `amount` of free collateral out of the margin account into `destination`
    async fn withdraw(
        &self,
        margin_account: &Pubkey,
        destination: &Pubkey,
        amount: u64,
    ) -> Result<()>;

    async fn place_spot_order(
        &self,
        margin_account: &Pubkey,
        open_orders: &Pubkey,
        order: &SpotOrder,
    ) -> Result<ExecutionReport>;

    async fn place_perp_order(
        &self,
        margin_account: &Pubkey,
        order: &PerpOrder,
    ) -> Result<ExecutionReport>;

    async fn valuation(
        &self,
        margin_account: &Pubkey,
        market: &MarketInfo,
    ) -> Result<MarginValuation>;
}

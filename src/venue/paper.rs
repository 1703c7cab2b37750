use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::traits::{MarginValuation, MarginVenue};
use crate::custody::AssetCustody;
use crate::domain::{ExecutionReport, MarketInfo, PerpOrder, Side, SpotOrder};
use crate::error::{Result, VaultError};

/// Spot and perp marks of one listed market pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaperMarket {
    /// Base lot size; spot limit prices are quote per base lot
    pub lot_size: u64,
    /// Quote per base unit
    pub spot_price: Decimal,
    /// Quote per base unit
    pub perp_price: Decimal,
}

#[derive(Debug, Clone, Copy, Default)]
struct PerpPosition {
    base: i64,
    /// Signed quote paid to open the position (negative for shorts)
    cost: Decimal,
}

#[derive(Debug, Default)]
struct PaperMarginAccount {
    owner: Pubkey,
    open_orders: HashSet<Pubkey>,
    quote: Decimal,
    spot: HashMap<u8, i64>,
    perp: HashMap<u8, PerpPosition>,
}

impl PaperMarginAccount {
    fn equity(&self, markets: &HashMap<u8, PaperMarket>) -> Decimal {
        let spot: Decimal = self
            .spot
            .iter()
            .map(|(index, base)| {
                let price = markets.get(index).map(|m| m.spot_price).unwrap_or_default();
                Decimal::from(*base) * price
            })
            .sum();
        let perp: Decimal = self
            .perp
            .iter()
            .map(|(index, position)| {
                let price = markets.get(index).map(|m| m.perp_price).unwrap_or_default();
                Decimal::from(position.base) * price - position.cost
            })
            .sum();
        self.quote + spot + perp
    }
}

#[derive(Default)]
struct PaperBook {
    markets: HashMap<u8, PaperMarket>,
    accounts: HashMap<Pubkey, PaperMarginAccount>,
    pending_failure: Option<String>,
}

impl PaperBook {
    fn take_failure(&mut self) -> Result<()> {
        match self.pending_failure.take() {
            Some(message) => {
                warn!(%message, "paper venue injected failure");
                Err(VaultError::ExternalVenueFailure(message))
            }
            None => Ok(()),
        }
    }

    fn market(&self, index: u8) -> Result<PaperMarket> {
        self.markets
            .get(&index)
            .copied()
            .ok_or_else(|| venue_failure(format!("market {} is not listed", index)))
    }

    fn account_mut(&mut self, margin_account: &Pubkey) -> Result<&mut PaperMarginAccount> {
        self.accounts
            .get_mut(margin_account)
            .ok_or_else(|| venue_failure(format!("margin account {} does not exist", margin_account)))
    }
}

fn venue_failure(message: impl Into<String>) -> VaultError {
    VaultError::ExternalVenueFailure(message.into())
}

/// Deterministic in-memory margin venue.
///
/// Orders fill completely at the current mark when their price crosses it.
/// Collateral moves through the shared `AssetCustody` into the venue's own
/// token vault, so vault and venue balances always reconcile.
#[derive(Clone)]
pub struct PaperVenue {
    custody: Arc<dyn AssetCustody>,
    token_vault: Pubkey,
    book: Arc<Mutex<PaperBook>>,
}

impl PaperVenue {
    pub fn new(custody: Arc<dyn AssetCustody>) -> Self {
        Self {
            custody,
            token_vault: Pubkey::new_unique(),
            book: Arc::new(Mutex::new(PaperBook::default())),
        }
    }

    /// Token account holding every margin account's collateral
    pub fn token_vault(&self) -> Pubkey {
        self.token_vault
    }

    /// List (or relist) the spot and perp markets a vault trades
    pub async fn list_market(&self, market: &MarketInfo, spot_price: Decimal, perp_price: Decimal) {
        let listing = PaperMarket {
            lot_size: market.spot_market_lot_size,
            spot_price,
            perp_price,
        };
        let mut book = self.book.lock().await;

        let spot = book.markets.entry(market.spot_market_index).or_insert(listing);
        spot.lot_size = market.spot_market_lot_size;
        spot.spot_price = spot_price;

        let perp = book.markets.entry(market.perp_market_index).or_insert(listing);
        perp.perp_price = perp_price;
        info!(
            spot_market = market.spot_market_index,
            perp_market = market.perp_market_index,
            %spot_price,
            %perp_price,
            "paper market listed"
        );
    }

    pub async fn set_spot_price(&self, market_index: u8, price: Decimal) -> Result<()> {
        let mut book = self.book.lock().await;
        let market = book
            .markets
            .get_mut(&market_index)
            .ok_or_else(|| venue_failure(format!("market {} is not listed", market_index)))?;
        market.spot_price = price;
        Ok(())
    }

    pub async fn set_perp_price(&self, market_index: u8, price: Decimal) -> Result<()> {
        let mut book = self.book.lock().await;
        let market = book
            .markets
            .get_mut(&market_index)
            .ok_or_else(|| venue_failure(format!("market {} is not listed", market_index)))?;
        market.perp_price = price;
        Ok(())
    }

    /// Make the next mutating call fail with `ExternalVenueFailure(message)`
    pub async fn fail_next(&self, message: impl Into<String>) {
        self.book.lock().await.pending_failure = Some(message.into());
    }

    /// Owner recorded for a margin account
    pub async fn margin_account_owner(&self, margin_account: &Pubkey) -> Option<Pubkey> {
        self.book
            .lock()
            .await
            .accounts
            .get(margin_account)
            .map(|a| a.owner)
    }
}

#[async_trait]
impl MarginVenue for PaperVenue {
    async fn create_margin_account(&self, margin_account: &Pubkey, owner: &Pubkey) -> Result<()> {
        let mut book = self.book.lock().await;
        book.take_failure()?;

        if book.accounts.contains_key(margin_account) {
            return Err(venue_failure(format!(
                "margin account {} already exists",
                margin_account
            )));
        }
        book.accounts.insert(
            *margin_account,
            PaperMarginAccount {
                owner: *owner,
                ..Default::default()
            },
        );
        debug!(margin_account = %margin_account, owner = %owner, "paper margin account created");
        Ok(())
    }

    async fn create_open_orders(
        &self,
        margin_account: &Pubkey,
        open_orders: &Pubkey,
        spot_market_index: u8,
    ) -> Result<()> {
        let mut book = self.book.lock().await;
        book.take_failure()?;
        book.market(spot_market_index)?;

        let account = book.account_mut(margin_account)?;
        if !account.open_orders.insert(*open_orders) {
            return Err(venue_failure(format!(
                "open orders account {} already exists",
                open_orders
            )));
        }
        Ok(())
    }

    async fn deposit(&self, margin_account: &Pubkey, source: &Pubkey, amount: u64) -> Result<()> {
        let mut book = self.book.lock().await;
        book.take_failure()?;
        book.account_mut(margin_account)?;

        self.custody
            .transfer(source, &self.token_vault, amount)
            .await
            .map_err(|e| venue_failure(format!("collateral transfer failed: {}", e)))?;

        let account = book.account_mut(margin_account)?;
        account.quote += Decimal::from(amount);
        debug!(margin_account = %margin_account, amount, quote = %account.quote, "paper deposit");
        Ok(())
    }

    async fn withdraw(
        &self,
        margin_account: &Pubkey,
        destination: &Pubkey,
        amount: u64,
    ) -> Result<()> {
        let mut book = self.book.lock().await;
        book.take_failure()?;

        let markets = book.markets.clone();
        let account = book.account_mut(margin_account)?;
        let amount_dec = Decimal::from(amount);
        if account.quote < amount_dec {
            return Err(venue_failure(format!(
                "insufficient free collateral: requested {}, available {}",
                amount, account.quote
            )));
        }
        if account.equity(&markets) < amount_dec {
            return Err(venue_failure(format!(
                "withdrawal of {} would leave negative equity",
                amount
            )));
        }

        self.custody
            .transfer(&self.token_vault, destination, amount)
            .await
            .map_err(|e| venue_failure(format!("collateral transfer failed: {}", e)))?;

        let account = book.account_mut(margin_account)?;
        account.quote -= amount_dec;
        debug!(margin_account = %margin_account, amount, quote = %account.quote, "paper withdraw");
        Ok(())
    }

    async fn place_spot_order(
        &self,
        margin_account: &Pubkey,
        open_orders: &Pubkey,
        order: &SpotOrder,
    ) -> Result<ExecutionReport> {
        let mut book = self.book.lock().await;
        book.take_failure()?;

        let market = book.market(order.market_index)?;
        let markets = book.markets.clone();
        let account = book.account_mut(margin_account)?;
        if !account.open_orders.contains(open_orders) {
            return Err(venue_failure(format!(
                "open orders account {} is not registered to {}",
                open_orders, margin_account
            )));
        }

        let limit = Decimal::from(order.limit_price);
        let mark_per_lot = market.spot_price * Decimal::from(market.lot_size);
        let crosses = match order.side {
            Side::Bid => limit >= mark_per_lot,
            Side::Ask => limit <= mark_per_lot,
        };
        if !crosses {
            debug!(order_id = order.client_order_id, %limit, %mark_per_lot, "spot order did not cross");
            return Ok(ExecutionReport {
                client_order_id: order.client_order_id,
                side: order.side,
                requested_quantity: order.max_base_quantity,
                filled_quantity: 0,
                avg_fill_price: None,
            });
        }

        let quantity = order.max_base_quantity;
        let signed = i64::try_from(quantity).map_err(|_| VaultError::MathOverflow)?;
        let notional = Decimal::from(quantity) * market.spot_price;
        let (base_delta, quote_delta) = match order.side {
            Side::Bid => (signed, -notional),
            Side::Ask => (-signed, notional),
        };

        let base = account.spot.get(&order.market_index).copied().unwrap_or(0);
        let new_base = base.checked_add(base_delta).ok_or(VaultError::MathOverflow)?;
        account.quote += quote_delta;
        account.spot.insert(order.market_index, new_base);

        if account.equity(&markets).is_sign_negative() {
            account.quote -= quote_delta;
            account.spot.insert(order.market_index, base);
            return Err(venue_failure(
                "spot order rejected: insufficient margin".to_string(),
            ));
        }

        info!(
            margin_account = %margin_account,
            order_id = order.client_order_id,
            side = %order.side,
            quantity,
            price = %market.spot_price,
            "paper spot fill"
        );
        Ok(ExecutionReport {
            client_order_id: order.client_order_id,
            side: order.side,
            requested_quantity: quantity,
            filled_quantity: quantity,
            avg_fill_price: Some(market.spot_price),
        })
    }

    async fn place_perp_order(
        &self,
        margin_account: &Pubkey,
        order: &PerpOrder,
    ) -> Result<ExecutionReport> {
        let mut book = self.book.lock().await;
        book.take_failure()?;

        let market = book.market(order.market_index)?;
        let account = book.account_mut(margin_account)?;
        let mark = market.perp_price;

        let crosses = match order.side {
            Side::Bid => Decimal::from(order.price) >= mark,
            Side::Ask => Decimal::from(order.price) <= mark,
        };
        let position = account.perp.get(&order.market_index).copied().unwrap_or_default();

        let mut quantity = if crosses { order.quantity } else { 0 };
        if order.reduce_only {
            let reducible = match order.side {
                Side::Bid if position.base < 0 => position.base.unsigned_abs(),
                Side::Ask if position.base > 0 => position.base.unsigned_abs(),
                _ => 0,
            };
            quantity = quantity.min(reducible);
        }

        if quantity == 0 {
            return Ok(ExecutionReport {
                client_order_id: order.client_order_id,
                side: order.side,
                requested_quantity: order.quantity,
                filled_quantity: 0,
                avg_fill_price: None,
            });
        }

        let signed = i64::try_from(quantity).map_err(|_| VaultError::MathOverflow)?;
        let base_delta = match order.side {
            Side::Bid => signed,
            Side::Ask => -signed,
        };
        let updated = PerpPosition {
            base: position
                .base
                .checked_add(base_delta)
                .ok_or(VaultError::MathOverflow)?,
            cost: position.cost + Decimal::from(base_delta) * mark,
        };
        account.perp.insert(order.market_index, updated);

        info!(
            margin_account = %margin_account,
            order_id = order.client_order_id,
            side = %order.side,
            quantity,
            price = %mark,
            position = updated.base,
            "paper perp fill"
        );
        Ok(ExecutionReport {
            client_order_id: order.client_order_id,
            side: order.side,
            requested_quantity: order.quantity,
            filled_quantity: quantity,
            avg_fill_price: Some(mark),
        })
    }

    async fn valuation(
        &self,
        margin_account: &Pubkey,
        market: &MarketInfo,
    ) -> Result<MarginValuation> {
        let book = self.book.lock().await;
        let account = book
            .accounts
            .get(margin_account)
            .ok_or_else(|| venue_failure(format!("margin account {} does not exist", margin_account)))?;

        let spot_price = book
            .markets
            .get(&market.spot_market_index)
            .map(|m| m.spot_price)
            .unwrap_or_default();
        let perp_price = book
            .markets
            .get(&market.perp_market_index)
            .map(|m| m.perp_price)
            .unwrap_or_default();
        let perp = account
            .perp
            .get(&market.perp_market_index)
            .copied()
            .unwrap_or_default();

        Ok(MarginValuation {
            quote_deposits: account.quote,
            spot_base_position: account
                .spot
                .get(&market.spot_market_index)
                .copied()
                .unwrap_or(0),
            spot_price,
            perp_base_position: perp.base,
            perp_pnl: Decimal::from(perp.base) * perp_price - perp.cost,
        })
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, VaultError};

/// Quote lots per base lot for a marketable spot bid
pub const MARKETABLE_SPOT_BID_LOTS: u64 = 100_000_000_000;
/// Quote lots per base lot for a marketable spot ask
pub const MARKETABLE_SPOT_ASK_LOTS: u64 = 1;
/// Perp price bound used for marketable bids
pub const MARKETABLE_PERP_BID_PRICE: i64 = i64::MAX;
/// Perp price bound used for marketable asks
pub const MARKETABLE_PERP_ASK_PRICE: i64 = 1;

/// Order side on the venue book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Positive sizes buy, negative sizes sell
    pub fn from_signed(size: i64) -> Result<Self> {
        match size {
            0 => Err(VaultError::InvalidAmount(
                "position adjustment size must be non-zero".to_string(),
            )),
            s if s > 0 => Ok(Side::Bid),
            _ => Ok(Side::Ask),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "BID",
            Side::Ask => "ASK",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Rest on the book at the limit price
    Limit,
    /// Fill what crosses now, cancel the rest
    ImmediateOrCancel,
}

fn new_client_order_id() -> u64 {
    Uuid::new_v4().as_u64_pair().0
}

/// Spot order forwarded to the venue on behalf of the vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotOrder {
    pub client_order_id: u64,
    pub market_index: u8,
    pub side: Side,
    /// Limit price in quote lots per base lot
    pub limit_price: u64,
    pub max_base_quantity: u64,
    pub max_quote_quantity: u64,
    pub order_type: OrderType,
}

impl SpotOrder {
    /// Build a spot order from a signed size.
    ///
    /// Without an explicit limit price the order is immediate-or-cancel at the
    /// extreme price for its side, scaled by the market lot size.
    pub fn from_size(
        market_index: u8,
        size: i64,
        limit_price: Option<u64>,
        lot_size: u64,
    ) -> Result<Self> {
        let side = Side::from_signed(size)?;
        let quantity = size.unsigned_abs();

        let (price, order_type) = match limit_price {
            Some(0) => {
                return Err(VaultError::InvalidAmount(
                    "limit price must be positive".to_string(),
                ))
            }
            Some(price) => (price, OrderType::Limit),
            None => {
                let lots = match side {
                    Side::Bid => MARKETABLE_SPOT_BID_LOTS,
                    Side::Ask => MARKETABLE_SPOT_ASK_LOTS,
                };
                (lots.saturating_mul(lot_size), OrderType::ImmediateOrCancel)
            }
        };

        // Upper bound on quote spent, not an amount moved
        let max_quote_quantity = quantity.saturating_mul(price);

        Ok(Self {
            client_order_id: new_client_order_id(),
            market_index,
            side,
            limit_price: price,
            max_base_quantity: quantity,
            max_quote_quantity,
            order_type,
        })
    }
}

/// Perpetual order forwarded to the venue on behalf of the vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpOrder {
    pub client_order_id: u64,
    pub market_index: u8,
    pub side: Side,
    pub price: i64,
    pub quantity: u64,
    pub order_type: OrderType,
    pub reduce_only: bool,
}

impl PerpOrder {
    /// Marketable immediate-or-cancel perp order from a signed size
    pub fn from_size(market_index: u8, size: i64, reduce_only: bool) -> Result<Self> {
        let side = Side::from_signed(size)?;
        let price = match side {
            Side::Bid => MARKETABLE_PERP_BID_PRICE,
            Side::Ask => MARKETABLE_PERP_ASK_PRICE,
        };

        Ok(Self {
            client_order_id: new_client_order_id(),
            market_index,
            side,
            price,
            quantity: size.unsigned_abs(),
            order_type: OrderType::ImmediateOrCancel,
            reduce_only,
        })
    }
}

/// Direction of a custody move between the vault token account and the margin account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceDirection {
    ToMargin,
    ToVault,
}

impl RebalanceDirection {
    /// `amount > 0` moves funds into the margin account, `amount < 0` pulls them back
    pub fn from_signed(amount: i64) -> Result<(Self, u64)> {
        match amount {
            0 => Err(VaultError::InvalidAmount(
                "rebalance amount must be non-zero".to_string(),
            )),
            a if a > 0 => Ok((RebalanceDirection::ToMargin, a.unsigned_abs())),
            a => Ok((RebalanceDirection::ToVault, a.unsigned_abs())),
        }
    }
}

impl std::fmt::Display for RebalanceDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RebalanceDirection::ToMargin => write!(f, "vault->margin"),
            RebalanceDirection::ToVault => write!(f, "margin->vault"),
        }
    }
}

/// What the venue reported back for a forwarded order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub client_order_id: u64,
    pub side: Side,
    pub requested_quantity: u64,
    pub filled_quantity: u64,
    pub avg_fill_price: Option<Decimal>,
}

impl ExecutionReport {
    pub fn is_filled(&self) -> bool {
        self.filled_quantity > 0 && self.filled_quantity == self.requested_quantity
    }
}

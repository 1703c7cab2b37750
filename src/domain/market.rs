use serde::{Deserialize, Serialize};

/// Market slots per venue group; the quote token sits after the last one
pub const MAX_PAIRS: u8 = 15;

/// Immutable market bindings fixed when a strategy is initialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInfo {
    /// Spot market slot on the margin venue
    pub spot_market_index: u8,
    /// Perpetual market slot on the margin venue
    pub perp_market_index: u8,
    /// Base lot size of the spot market, used to scale marketable limit prices
    pub spot_market_lot_size: u64,
    /// Token slot of the spot asset, used for mark-to-market valuation
    pub spot_token_index: u8,
}

impl MarketInfo {
    pub fn validate(&self) -> Result<(), String> {
        if self.spot_market_lot_size == 0 {
            return Err("spot_market_lot_size must be positive".to_string());
        }
        for (field, index) in [
            ("spot_market_index", self.spot_market_index),
            ("perp_market_index", self.perp_market_index),
            ("spot_token_index", self.spot_token_index),
        ] {
            if index >= MAX_PAIRS {
                return Err(format!(
                    "{} {} is out of range (venue has {} market slots)",
                    field, index, MAX_PAIRS
                ));
            }
        }
        Ok(())
    }
}

impl Default for MarketInfo {
    fn default() -> Self {
        // Values used by the devnet deployment
        Self {
            spot_market_index: 2,
            perp_market_index: 2,
            spot_market_lot_size: 1000,
            spot_token_index: 2,
        }
    }
}

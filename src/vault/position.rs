//! Position adjustments forwarded to the margin venue
//!
//! Nothing local is mutated before the venue call, so a venue failure needs no
//! rollback. Valuation is never cached here: the next snapshot reads the
//! venue's post-trade state.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{info, warn};

use super::strategy::StrategyState;
use crate::domain::{ExecutionReport, PerpOrder, SpotOrder};
use crate::error::Result;
use crate::venue::MarginVenue;

#[derive(Clone)]
pub struct PositionManager {
    venue: Arc<dyn MarginVenue>,
}

impl PositionManager {
    pub fn new(venue: Arc<dyn MarginVenue>) -> Self {
        Self { venue }
    }

    /// Buy (`size > 0`) or sell (`size < 0`) on the vault's spot market.
    ///
    /// Without a limit price the order is marketable immediate-or-cancel.
    pub async fn adjust_position_spot(
        &self,
        state: &StrategyState,
        caller: &Pubkey,
        size: i64,
        limit_price: Option<u64>,
    ) -> Result<ExecutionReport> {
        state.require_trigger_server(caller, "adjust_position_spot")?;
        state.require_operational("adjust_position_spot")?;

        let market = &state.market_info;
        let order = SpotOrder::from_size(
            market.spot_market_index,
            size,
            limit_price,
            market.spot_market_lot_size,
        )?;
        let open_orders = state.open_orders()?;

        let report = self
            .venue
            .place_spot_order(&state.margin_account, &open_orders, &order)
            .await
            .inspect_err(|e| {
                warn!(identity = %state.identity, size, error = %e, "spot adjustment failed at venue");
            })?;

        info!(
            identity = %state.identity,
            order_id = report.client_order_id,
            side = %report.side,
            requested = report.requested_quantity,
            filled = report.filled_quantity,
            "spot position adjusted"
        );
        Ok(report)
    }

    /// Go longer (`size > 0`) or shorter (`size < 0`) on the vault's perp market
    pub async fn adjust_position_perp(
        &self,
        state: &StrategyState,
        caller: &Pubkey,
        size: i64,
        reduce_only: bool,
    ) -> Result<ExecutionReport> {
        state.require_trigger_server(caller, "adjust_position_perp")?;
        state.require_operational("adjust_position_perp")?;

        let order = PerpOrder::from_size(state.market_info.perp_market_index, size, reduce_only)?;

        let report = self
            .venue
            .place_perp_order(&state.margin_account, &order)
            .await
            .inspect_err(|e| {
                warn!(identity = %state.identity, size, reduce_only, error = %e, "perp adjustment failed at venue");
            })?;

        info!(
            identity = %state.identity,
            order_id = report.client_order_id,
            side = %report.side,
            requested = report.requested_quantity,
            filled = report.filled_quantity,
            reduce_only,
            "perp position adjusted"
        );
        Ok(report)
    }
}

//! Custody moves between the vault token account and the margin account
//!
//! A rebalance is a pure custody move: custody plus signed margin equity must
//! be identical before and after. Any difference means the venue (or custody) did something
//! other than what was asked, and is surfaced as `ExternalVenueFailure`.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::strategy::StrategyState;
use super::valuation::{ValuationSnapshot, Valuator};
use crate::domain::RebalanceDirection;
use crate::error::{Result, VaultError};
use crate::venue::MarginVenue;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RebalanceOutcome {
    pub direction: RebalanceDirection,
    pub amount: u64,
    pub before: ValuationSnapshot,
    pub after: ValuationSnapshot,
}

#[derive(Clone)]
pub struct RebalanceCoordinator {
    venue: Arc<dyn MarginVenue>,
    valuator: Valuator,
}

impl RebalanceCoordinator {
    pub fn new(venue: Arc<dyn MarginVenue>, valuator: Valuator) -> Self {
        Self { venue, valuator }
    }

    pub async fn rebalance_mango(
        &self,
        state: &StrategyState,
        caller: &Pubkey,
        amount: u64,
        direction: RebalanceDirection,
        total_shares: u64,
    ) -> Result<RebalanceOutcome> {
        state.require_operator(caller, "rebalance_mango")?;
        state.require_operational("rebalance_mango")?;
        if amount == 0 {
            return Err(VaultError::InvalidAmount(
                "rebalance amount must be non-zero".to_string(),
            ));
        }

        let vault_token_account = state.vault_token_account()?;
        let before = self.valuator.snapshot(state, total_shares).await?;

        let moved = match direction {
            RebalanceDirection::ToMargin => {
                if before.custody_balance < amount {
                    return Err(VaultError::InsufficientLiquidity {
                        required: amount,
                        available: before.custody_balance,
                    });
                }
                self.venue
                    .deposit(&state.margin_account, &vault_token_account, amount)
                    .await
            }
            RebalanceDirection::ToVault => {
                self.venue
                    .withdraw(&state.margin_account, &vault_token_account, amount)
                    .await
            }
        };
        moved.inspect_err(|e| {
            warn!(identity = %state.identity, %direction, amount, error = %e, "rebalance failed at venue");
        })?;

        let after = self.valuator.snapshot(state, total_shares).await?;
        verify_custody_move(state, direction, amount, &before, &after)?;

        info!(
            identity = %state.identity,
            caller = %caller,
            %direction,
            amount,
            custody_balance = after.custody_balance,
            margin_value = after.margin_value,
            total_value = after.total_value,
            "rebalance committed"
        );
        Ok(RebalanceOutcome {
            direction,
            amount,
            before,
            after,
        })
    }

    /// Signed form: `amount > 0` moves into the margin account, `amount < 0` back to the vault
    pub async fn rebalance_signed(
        &self,
        state: &StrategyState,
        caller: &Pubkey,
        amount: i64,
        total_shares: u64,
    ) -> Result<RebalanceOutcome> {
        state.require_operator(caller, "rebalance_mango")?;
        let (direction, amount) = RebalanceDirection::from_signed(amount)?;
        self.rebalance_mango(state, caller, amount, direction, total_shares)
            .await
    }
}

fn verify_custody_move(
    state: &StrategyState,
    direction: RebalanceDirection,
    amount: u64,
    before: &ValuationSnapshot,
    after: &ValuationSnapshot,
) -> Result<()> {
    let (value_before, value_after) = (before.signed_value()?, after.signed_value()?);
    if value_after != value_before {
        error!(
            identity = %state.identity,
            %direction,
            amount,
            before = %value_before,
            after = %value_after,
            "vault value changed across rebalance"
        );
        return Err(VaultError::ExternalVenueFailure(format!(
            "vault value changed from {} to {} while moving {} {}",
            value_before, value_after, amount, direction
        )));
    }

    let expected_custody = match direction {
        RebalanceDirection::ToMargin => before.custody_balance.checked_sub(amount),
        RebalanceDirection::ToVault => before.custody_balance.checked_add(amount),
    }
    .ok_or(VaultError::MathOverflow)?;
    if after.custody_balance != expected_custody {
        error!(
            identity = %state.identity,
            %direction,
            amount,
            expected = expected_custody,
            actual = after.custody_balance,
            "vault custody did not move by the rebalanced amount"
        );
        return Err(VaultError::ExternalVenueFailure(format!(
            "vault custody is {} after moving {} {}, expected {}",
            after.custody_balance, amount, direction, expected_custody
        )));
    }
    Ok(())
}

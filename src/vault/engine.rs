use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::events::{EventLog, VaultEventKind};
use super::position::PositionManager;
use super::rebalance::{RebalanceCoordinator, RebalanceOutcome};
use super::share_mint::ShareMint;
use super::strategy::StrategyState;
use super::valuation::{ValuationSnapshot, Valuator};
use crate::accounting::{
    shares_to_mint_for_deposit, value_for_shares_on_withdraw, LimitsLedger, LimitsUpdate,
    RetroactivePolicy,
};
use crate::custody::AssetCustody;
use crate::derivation::{AddressBumps, ProgramIds};
use crate::domain::{ExecutionReport, MarketInfo, RebalanceDirection, VaultStatus};
use crate::error::{Result, VaultError};
use crate::venue::MarginVenue;

/// Inputs of `initialize`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeParams {
    pub identity: Pubkey,
    pub owner: Pubkey,
    pub trigger_server: Pubkey,
    pub market_info: MarketInfo,
    pub margin_account: Pubkey,
}

/// Log a rejected operation and hand the error back
fn rejected(identity: &Pubkey, operation: &str, err: VaultError) -> VaultError {
    if err.is_fatal() {
        error!(identity = %identity, operation, error = %err, "vault invariant violated");
    } else {
        warn!(identity = %identity, operation, error = %err, "operation rejected");
    }
    err
}

/// One vault instance: state record, optional limits ledger, share mint and
/// event log, plus the collaborators that touch custody and the venue.
///
/// Every method either commits completely or returns an error with nothing
/// local mutated.
pub struct StrategyVault {
    state: StrategyState,
    limits: Option<LimitsLedger>,
    shares: ShareMint,
    events: EventLog,
    retroactive_policy: RetroactivePolicy,
    custody: Arc<dyn AssetCustody>,
    valuator: Valuator,
    positions: PositionManager,
    rebalancer: RebalanceCoordinator,
}

impl StrategyVault {
    /// Create the vault's venue accounts and activate it.
    ///
    /// `bumps` must come from a successful `AddressBook::claim` for the identity.
    pub async fn initialize(
        params: InitializeParams,
        programs: ProgramIds,
        bumps: AddressBumps,
        retroactive_policy: RetroactivePolicy,
        custody: Arc<dyn AssetCustody>,
        venue: Arc<dyn MarginVenue>,
    ) -> Result<Self> {
        params
            .market_info
            .validate()
            .map_err(|e| VaultError::InvalidState(format!("invalid market info: {}", e)))?;

        let mut state = StrategyState::new(
            params.identity,
            params.owner,
            params.trigger_server,
            params.market_info,
            params.margin_account,
            programs,
            bumps,
        );
        let strategy_account = state.strategy_account()?;
        let open_orders = state.open_orders()?;

        venue
            .create_margin_account(&state.margin_account, &strategy_account)
            .await?;
        venue
            .create_open_orders(
                &state.margin_account,
                &open_orders,
                state.market_info.spot_market_index,
            )
            .await?;

        let transition = state.transition(VaultStatus::Active, "initialized")?;

        let valuator = Valuator::new(custody.clone(), venue.clone());
        let mut vault = Self {
            limits: None,
            shares: ShareMint::new(),
            events: EventLog::new(state.identity),
            retroactive_policy,
            custody,
            positions: PositionManager::new(venue.clone()),
            rebalancer: RebalanceCoordinator::new(venue, valuator.clone()),
            valuator,
            state,
        };
        vault.events.append(VaultEventKind::Initialized {
            owner: params.owner,
            trigger_server: params.trigger_server,
            margin_account: params.margin_account,
            market_info: params.market_info,
        });

        info!(
            identity = %params.identity,
            owner = %params.owner,
            trigger_server = %params.trigger_server,
            margin_account = %params.margin_account,
            from = %transition.from,
            to = %transition.to,
            "vault initialized"
        );
        Ok(vault)
    }

    pub fn state(&self) -> &StrategyState {
        &self.state
    }

    pub fn identity(&self) -> Pubkey {
        self.state.identity
    }

    pub fn status(&self) -> VaultStatus {
        self.state.status
    }

    pub fn limits(&self) -> Option<&LimitsLedger> {
        self.limits.as_ref()
    }

    pub fn share_balance(&self, holder: &Pubkey) -> u64 {
        self.shares.balance_of(holder)
    }

    pub fn total_shares(&self) -> u64 {
        self.shares.supply()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Fresh valuation; never cached between calls
    pub async fn valuation(&self) -> Result<ValuationSnapshot> {
        self.valuator
            .snapshot(&self.state, self.shares.supply())
            .await
    }

    pub async fn share_price(&self) -> Result<Decimal> {
        Ok(self.valuation().await?.share_price())
    }

    /// Fails with `InternalInvariantViolation` unless
    /// shares outstanding and vault value are both zero or both non-zero
    pub async fn check_invariants(&self) -> Result<ValuationSnapshot> {
        let snapshot = self.valuation().await?;
        if (snapshot.total_shares == 0) != (snapshot.total_value == 0) {
            return Err(rejected(
                &self.state.identity,
                "check_invariants",
                VaultError::InternalInvariantViolation(format!(
                    "{} shares outstanding against vault value {}",
                    snapshot.total_shares, snapshot.total_value
                )),
            ));
        }
        Ok(snapshot)
    }

    /// Deposit `amount` of the stable asset and mint shares to the depositor.
    ///
    /// Returns the number of shares minted.
    pub async fn deposit(&mut self, depositor: &Pubkey, amount: u64) -> Result<u64> {
        let identity = self.state.identity;
        self.try_deposit(depositor, amount)
            .await
            .map_err(|e| rejected(&identity, "deposit", e))
    }

    async fn try_deposit(&mut self, depositor: &Pubkey, amount: u64) -> Result<u64> {
        self.state.require_operational("deposit")?;
        if amount == 0 {
            return Err(VaultError::InvalidAmount(
                "deposit amount must be positive".to_string(),
            ));
        }

        let snapshot = self.valuation().await?;
        let ticket = match &self.limits {
            Some(ledger) => Some(ledger.check_deposit(depositor, amount, snapshot.total_value)?),
            None => None,
        };

        let minted =
            shares_to_mint_for_deposit(amount, snapshot.total_value, snapshot.total_shares)?;
        if minted == 0 {
            return Err(VaultError::InvalidAmount(format!(
                "deposit of {} is worth less than one share at price {}",
                amount,
                snapshot.share_price()
            )));
        }
        self.shares.ensure_mintable(depositor, minted)?;

        let vault_token_account = self.state.vault_token_account()?;
        self.custody
            .transfer(depositor, &vault_token_account, amount)
            .await?;

        // Mint was validated before custody moved
        self.shares.mint(depositor, minted)?;
        if let (Some(ledger), Some(ticket)) = (self.limits.as_mut(), ticket) {
            ledger.record(ticket);
        }
        self.events.append(VaultEventKind::Deposited {
            depositor: *depositor,
            amount,
            shares_minted: minted,
            total_value_before: snapshot.total_value,
            total_shares_before: snapshot.total_shares,
        });

        info!(
            identity = %self.state.identity,
            depositor = %depositor,
            amount,
            shares_minted = minted,
            total_value_before = snapshot.total_value,
            total_shares_before = snapshot.total_shares,
            "deposit committed"
        );
        Ok(minted)
    }

    /// Burn `share_amount` shares and pay their value out of vault custody.
    ///
    /// Returns the amount paid. Fails with `InsufficientLiquidity` when the
    /// payout is tied up in the margin account; rebalance first.
    pub async fn withdraw(&mut self, depositor: &Pubkey, share_amount: u64) -> Result<u64> {
        let identity = self.state.identity;
        self.try_withdraw(depositor, share_amount)
            .await
            .map_err(|e| rejected(&identity, "withdraw", e))
    }

    async fn try_withdraw(&mut self, depositor: &Pubkey, share_amount: u64) -> Result<u64> {
        self.state.require_operational("withdraw")?;
        if share_amount == 0 {
            return Err(VaultError::InvalidAmount(
                "withdrawal must burn at least one share".to_string(),
            ));
        }
        self.shares.ensure_burnable(depositor, share_amount)?;

        let snapshot = self.valuation().await?;
        let payout =
            value_for_shares_on_withdraw(share_amount, snapshot.total_value, snapshot.total_shares)?;
        if payout == 0 {
            return Err(VaultError::InvalidAmount(format!(
                "{} shares are worth nothing at price {}",
                share_amount,
                snapshot.share_price()
            )));
        }
        if snapshot.custody_balance < payout {
            return Err(VaultError::InsufficientLiquidity {
                required: payout,
                available: snapshot.custody_balance,
            });
        }

        let vault_token_account = self.state.vault_token_account()?;
        self.custody
            .transfer(&vault_token_account, depositor, payout)
            .await?;

        self.shares.burn(depositor, share_amount)?;
        self.events.append(VaultEventKind::Withdrawn {
            depositor: *depositor,
            shares_burned: share_amount,
            amount: payout,
            total_value_before: snapshot.total_value,
            total_shares_before: snapshot.total_shares,
        });

        info!(
            identity = %self.state.identity,
            depositor = %depositor,
            shares_burned = share_amount,
            amount = payout,
            total_value_before = snapshot.total_value,
            total_shares_before = snapshot.total_shares,
            "withdrawal committed"
        );
        Ok(payout)
    }

    /// Attach or reconfigure the limits ledger (owner only)
    pub async fn set_limits(&mut self, caller: &Pubkey, update: LimitsUpdate) -> Result<()> {
        let identity = self.state.identity;
        self.try_set_limits(caller, update)
            .await
            .map_err(|e| rejected(&identity, "set_limits", e))
    }

    async fn try_set_limits(&mut self, caller: &Pubkey, update: LimitsUpdate) -> Result<()> {
        self.state.require_owner(caller, "set_limits")?;
        if !self.state.status.accepts_limits() {
            return Err(VaultError::InvalidState(format!(
                "limits cannot be set in state {}",
                self.state.status
            )));
        }
        if update.max_per_depositor > update.max_total_value_locked {
            warn!(
                identity = %self.state.identity,
                max_per_depositor = update.max_per_depositor,
                max_total_value_locked = update.max_total_value_locked,
                "per-depositor cap exceeds TVL cap"
            );
        }

        let snapshot = self.valuation().await?;
        let whitelist_size = update.whitelist.as_ref().map(|w| w.len());
        let (max_total_value_locked, max_per_depositor) =
            (update.max_total_value_locked, update.max_per_depositor);

        match self.limits.as_mut() {
            Some(ledger) => {
                ledger.reconfigure(update, snapshot.total_value, self.retroactive_policy)?
            }
            None => {
                self.limits = Some(LimitsLedger::configure(
                    update,
                    snapshot.total_value,
                    self.retroactive_policy,
                )?)
            }
        }

        self.events.append(VaultEventKind::LimitsSet {
            max_total_value_locked,
            max_per_depositor,
            whitelist_size,
        });
        info!(
            identity = %self.state.identity,
            max_total_value_locked,
            max_per_depositor,
            whitelist_size,
            "limits set"
        );
        Ok(())
    }

    /// Remove cap enforcement for the rest of the vault's life (owner only)
    pub fn drop_limits(&mut self, caller: &Pubkey) -> Result<()> {
        let identity = self.state.identity;
        self.try_drop_limits(caller)
            .map_err(|e| rejected(&identity, "drop_limits", e))
    }

    fn try_drop_limits(&mut self, caller: &Pubkey) -> Result<()> {
        self.state.require_owner(caller, "drop_limits")?;
        self.state
            .transition(VaultStatus::LimitsDropped, "limits dropped by owner")?;

        let records = self.limits.take().map(|l| l.record_count()).unwrap_or(0);
        self.events.append(VaultEventKind::LimitsDropped);
        info!(
            identity = %self.state.identity,
            depositor_records = records,
            "limits dropped"
        );
        Ok(())
    }

    /// Move custody funds to or from the margin account (owner or trigger server)
    pub async fn rebalance_mango(
        &mut self,
        caller: &Pubkey,
        amount: u64,
        direction: RebalanceDirection,
    ) -> Result<RebalanceOutcome> {
        let outcome = self
            .rebalancer
            .rebalance_mango(&self.state, caller, amount, direction, self.shares.supply())
            .await
            .map_err(|e| rejected(&self.state.identity, "rebalance_mango", e))?;
        self.record_rebalance(caller, &outcome);
        Ok(outcome)
    }

    /// Signed rebalance: positive into the margin account, negative back to the vault
    pub async fn rebalance_signed(&mut self, caller: &Pubkey, amount: i64) -> Result<RebalanceOutcome> {
        let outcome = self
            .rebalancer
            .rebalance_signed(&self.state, caller, amount, self.shares.supply())
            .await
            .map_err(|e| rejected(&self.state.identity, "rebalance_mango", e))?;
        self.record_rebalance(caller, &outcome);
        Ok(outcome)
    }

    fn record_rebalance(&mut self, caller: &Pubkey, outcome: &RebalanceOutcome) {
        self.events.append(VaultEventKind::Rebalanced {
            caller: *caller,
            direction: outcome.direction,
            amount: outcome.amount,
            total_value: outcome.after.total_value,
        });
    }

    /// Spot adjustment (trigger server only)
    pub async fn adjust_position_spot(
        &mut self,
        caller: &Pubkey,
        size: i64,
        limit_price: Option<u64>,
    ) -> Result<ExecutionReport> {
        let report = self
            .positions
            .adjust_position_spot(&self.state, caller, size, limit_price)
            .await
            .map_err(|e| rejected(&self.state.identity, "adjust_position_spot", e))?;
        self.events.append(VaultEventKind::SpotAdjusted {
            size,
            limit_price,
            report: report.clone(),
        });
        Ok(report)
    }

    /// Perp adjustment (trigger server only)
    pub async fn adjust_position_perp(
        &mut self,
        caller: &Pubkey,
        size: i64,
        reduce_only: bool,
    ) -> Result<ExecutionReport> {
        let report = self
            .positions
            .adjust_position_perp(&self.state, caller, size, reduce_only)
            .await
            .map_err(|e| rejected(&self.state.identity, "adjust_position_perp", e))?;
        self.events.append(VaultEventKind::PerpAdjusted {
            size,
            reduce_only,
            report: report.clone(),
        });
        Ok(report)
    }
}

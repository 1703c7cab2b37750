use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::derivation::{recreate, AddressBumps, ProgramIds, Role};
use crate::domain::{MarketInfo, StateTransition, VaultStatus};
use crate::error::{Result, VaultError};

/// The persisted record of one vault instance.
///
/// Sub-account addresses are not stored: they are recomputed from the
/// identity, the role label and the stored bump every time they are needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyState {
    pub identity: Pubkey,
    pub owner: Pubkey,
    pub trigger_server: Pubkey,
    pub market_info: MarketInfo,
    pub margin_account: Pubkey,
    pub programs: ProgramIds,
    pub bumps: AddressBumps,
    pub status: VaultStatus,
    pub created_at: DateTime<Utc>,
}

impl StrategyState {
    pub fn new(
        identity: Pubkey,
        owner: Pubkey,
        trigger_server: Pubkey,
        market_info: MarketInfo,
        margin_account: Pubkey,
        programs: ProgramIds,
        bumps: AddressBumps,
    ) -> Self {
        Self {
            identity,
            owner,
            trigger_server,
            market_info,
            margin_account,
            programs,
            bumps,
            status: VaultStatus::Uninitialized,
            created_at: Utc::now(),
        }
    }

    /// Re-derive a sub-account from the identity and its stored bump
    pub fn address(&self, role: Role) -> Result<Pubkey> {
        recreate(
            &self.identity,
            role,
            &self.margin_account,
            self.bumps.get(role),
            &self.programs,
        )
    }

    pub fn vault_token_account(&self) -> Result<Pubkey> {
        self.address(Role::VaultTokenAccount)
    }

    pub fn share_mint(&self) -> Result<Pubkey> {
        self.address(Role::ShareMint)
    }

    /// Vault authority; owns the margin account on the venue
    pub fn strategy_account(&self) -> Result<Pubkey> {
        self.address(Role::StrategyAccount)
    }

    pub fn open_orders(&self) -> Result<Pubkey> {
        self.address(Role::OpenOrders)
    }

    pub fn require_owner(&self, caller: &Pubkey, operation: &'static str) -> Result<()> {
        if *caller != self.owner {
            return Err(VaultError::Unauthorized {
                operation,
                caller: *caller,
            });
        }
        Ok(())
    }

    pub fn require_trigger_server(&self, caller: &Pubkey, operation: &'static str) -> Result<()> {
        if *caller != self.trigger_server {
            return Err(VaultError::Unauthorized {
                operation,
                caller: *caller,
            });
        }
        Ok(())
    }

    /// Owner or trigger server
    pub fn require_operator(&self, caller: &Pubkey, operation: &'static str) -> Result<()> {
        if *caller != self.owner && *caller != self.trigger_server {
            return Err(VaultError::Unauthorized {
                operation,
                caller: *caller,
            });
        }
        Ok(())
    }

    pub fn require_operational(&self, operation: &str) -> Result<()> {
        if !self.status.is_operational() {
            return Err(VaultError::InvalidState(format!(
                "{} requires an active vault, state is {}",
                operation, self.status
            )));
        }
        Ok(())
    }

    pub fn transition(&mut self, to: VaultStatus, reason: &str) -> Result<StateTransition> {
        if !self.status.can_transition_to(to) {
            return Err(VaultError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        let transition = StateTransition::new(self.status, to, reason);
        self.status = to;
        Ok(transition)
    }
}

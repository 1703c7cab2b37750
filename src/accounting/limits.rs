//! Deposit limits ledger
//!
//! Caps the vault's total value and every depositor's cumulative deposits.
//! Records only ever grow: a withdrawal never gives back per-depositor headroom.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::{LimitKind, Result, VaultError};

/// Whitelisted principal with an optional pre-charged cumulative deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub key: Pubkey,
    pub deposit: u64,
}

impl WhitelistEntry {
    pub fn new(key: Pubkey) -> Self {
        Self { key, deposit: 0 }
    }
}

/// What to do when new limits are tighter than what is already recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetroactivePolicy {
    /// Accept, leaving over-cap depositors unable to deposit further
    Allow,
    /// Refuse the new limits
    #[default]
    Reject,
}

/// Parameters of a `set_limits` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsUpdate {
    pub max_total_value_locked: u64,
    pub max_per_depositor: u64,
    /// `None` leaves deposits open to everyone
    pub whitelist: Option<Vec<WhitelistEntry>>,
}

/// A deposit that passed every check and can be committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositTicket {
    pub depositor: Pubkey,
    pub amount: u64,
    pub new_record: u64,
}

#[derive(Debug, Clone)]
pub struct LimitsLedger {
    max_total_value_locked: u64,
    max_per_depositor: u64,
    whitelist: Option<HashSet<Pubkey>>,
    depositor_records: HashMap<Pubkey, u64>,
}

impl LimitsLedger {
    /// Build a ledger for a vault currently worth `current_total_value`
    pub fn configure(
        update: LimitsUpdate,
        current_total_value: u64,
        policy: RetroactivePolicy,
    ) -> Result<Self> {
        let mut ledger = Self {
            max_total_value_locked: 0,
            max_per_depositor: 0,
            whitelist: None,
            depositor_records: HashMap::new(),
        };
        ledger.reconfigure(update, current_total_value, policy)?;
        Ok(ledger)
    }

    /// Replace caps and whitelist, keeping every recorded cumulative deposit.
    ///
    /// On error the ledger is unchanged.
    pub fn reconfigure(
        &mut self,
        update: LimitsUpdate,
        current_total_value: u64,
        policy: RetroactivePolicy,
    ) -> Result<()> {
        let mut records = self.depositor_records.clone();
        let whitelist = update.whitelist.map(|entries| {
            for entry in &entries {
                let record = records.entry(entry.key).or_insert(0);
                *record = (*record).max(entry.deposit);
            }
            entries.into_iter().map(|e| e.key).collect::<HashSet<_>>()
        });

        let over_tvl = current_total_value > update.max_total_value_locked;
        let mut locked_out: Vec<(&Pubkey, &u64)> = records
            .iter()
            .filter(|(_, deposited)| **deposited > update.max_per_depositor)
            .collect();
        locked_out.sort();

        match policy {
            RetroactivePolicy::Reject => {
                if over_tvl {
                    return Err(VaultError::InvalidLimits(format!(
                        "max_total_value_locked {} is below current value {}",
                        update.max_total_value_locked, current_total_value
                    )));
                }
                if let Some((key, deposited)) = locked_out.first() {
                    return Err(VaultError::InvalidLimits(format!(
                        "max_per_depositor {} is below recorded deposit {} of {}",
                        update.max_per_depositor, deposited, key
                    )));
                }
            }
            RetroactivePolicy::Allow => {
                if over_tvl {
                    warn!(
                        current_total_value,
                        max_total_value_locked = update.max_total_value_locked,
                        "new TVL cap is below current value, deposits blocked until value falls"
                    );
                }
                for (key, deposited) in &locked_out {
                    warn!(
                        depositor = %key,
                        deposited = **deposited,
                        max_per_depositor = update.max_per_depositor,
                        "depositor already above new per-depositor cap"
                    );
                }
            }
        }

        self.max_total_value_locked = update.max_total_value_locked;
        self.max_per_depositor = update.max_per_depositor;
        self.whitelist = whitelist;
        self.depositor_records = records;

        info!(
            max_total_value_locked = self.max_total_value_locked,
            max_per_depositor = self.max_per_depositor,
            whitelisted = self.whitelist.as_ref().map(|w| w.len()),
            "limits configured"
        );
        Ok(())
    }

    /// Validate a deposit against the whitelist and both caps without mutating anything
    pub fn check_deposit(
        &self,
        depositor: &Pubkey,
        amount: u64,
        current_total_value: u64,
    ) -> Result<DepositTicket> {
        if let Some(whitelist) = &self.whitelist {
            if !whitelist.contains(depositor) {
                return Err(VaultError::NotWhitelisted(*depositor));
            }
        }

        let prospective_total = current_total_value
            .checked_add(amount)
            .ok_or(VaultError::MathOverflow)?;
        if prospective_total > self.max_total_value_locked {
            return Err(VaultError::LimitExceeded {
                kind: LimitKind::TotalValueLocked,
                limit: self.max_total_value_locked,
                requested: prospective_total,
            });
        }

        let new_record = self
            .deposited(depositor)
            .checked_add(amount)
            .ok_or(VaultError::MathOverflow)?;
        if new_record > self.max_per_depositor {
            return Err(VaultError::LimitExceeded {
                kind: LimitKind::PerDepositorCap,
                limit: self.max_per_depositor,
                requested: new_record,
            });
        }

        Ok(DepositTicket {
            depositor: *depositor,
            amount,
            new_record,
        })
    }

    /// Commit a ticket from `check_deposit`
    pub fn record(&mut self, ticket: DepositTicket) {
        debug!(
            depositor = %ticket.depositor,
            amount = ticket.amount,
            cumulative = ticket.new_record,
            "deposit recorded"
        );
        self.depositor_records.insert(ticket.depositor, ticket.new_record);
    }

    /// Check both caps and record the deposit as one all-or-nothing step
    pub fn check_and_record_deposit(
        &mut self,
        depositor: &Pubkey,
        amount: u64,
        current_total_value: u64,
    ) -> Result<()> {
        let ticket = self.check_deposit(depositor, amount, current_total_value)?;
        self.record(ticket);
        Ok(())
    }

    /// Cumulative recorded deposit of a principal (0 if none)
    pub fn deposited(&self, depositor: &Pubkey) -> u64 {
        self.depositor_records.get(depositor).copied().unwrap_or(0)
    }

    pub fn has_record(&self, depositor: &Pubkey) -> bool {
        self.depositor_records.contains_key(depositor)
    }

    pub fn is_whitelisted(&self, depositor: &Pubkey) -> bool {
        self.whitelist
            .as_ref()
            .map(|w| w.contains(depositor))
            .unwrap_or(true)
    }

    pub fn max_total_value_locked(&self) -> u64 {
        self.max_total_value_locked
    }

    pub fn max_per_depositor(&self) -> u64 {
        self.max_per_depositor
    }

    pub fn record_count(&self) -> usize {
        self.depositor_records.len()
    }
}

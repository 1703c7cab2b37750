use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use uuid::Uuid;

use crate::domain::{ExecutionReport, MarketInfo, RebalanceDirection};

/// What a committed operation did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VaultEventKind {
    Initialized {
        owner: Pubkey,
        trigger_server: Pubkey,
        margin_account: Pubkey,
        market_info: MarketInfo,
    },
    Deposited {
        depositor: Pubkey,
        amount: u64,
        shares_minted: u64,
        total_value_before: u64,
        total_shares_before: u64,
    },
    Withdrawn {
        depositor: Pubkey,
        shares_burned: u64,
        amount: u64,
        total_value_before: u64,
        total_shares_before: u64,
    },
    Rebalanced {
        caller: Pubkey,
        direction: RebalanceDirection,
        amount: u64,
        total_value: u64,
    },
    SpotAdjusted {
        size: i64,
        limit_price: Option<u64>,
        report: ExecutionReport,
    },
    PerpAdjusted {
        size: i64,
        reduce_only: bool,
        report: ExecutionReport,
    },
    LimitsSet {
        max_total_value_locked: u64,
        max_per_depositor: u64,
        whitelist_size: Option<usize>,
    },
    LimitsDropped,
}

impl VaultEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            VaultEventKind::Initialized { .. } => "initialized",
            VaultEventKind::Deposited { .. } => "deposited",
            VaultEventKind::Withdrawn { .. } => "withdrawn",
            VaultEventKind::Rebalanced { .. } => "rebalanced",
            VaultEventKind::SpotAdjusted { .. } => "spot_adjusted",
            VaultEventKind::PerpAdjusted { .. } => "perp_adjusted",
            VaultEventKind::LimitsSet { .. } => "limits_set",
            VaultEventKind::LimitsDropped => "limits_dropped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultEvent {
    pub id: Uuid,
    pub identity: Pubkey,
    /// Position in the vault's log, starting at 0
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: VaultEventKind,
}

/// Append-only log of committed operations for one vault
#[derive(Debug, Clone)]
pub struct EventLog {
    identity: Pubkey,
    events: Vec<VaultEvent>,
}

impl EventLog {
    pub fn new(identity: Pubkey) -> Self {
        Self {
            identity,
            events: Vec::new(),
        }
    }

    pub fn append(&mut self, kind: VaultEventKind) -> &VaultEvent {
        let event = VaultEvent {
            id: Uuid::new_v4(),
            identity: self.identity,
            sequence: self.events.len() as u64,
            timestamp: Utc::now(),
            kind,
        };
        self.events.push(event);
        &self.events[self.events.len() - 1]
    }

    pub fn events(&self) -> &[VaultEvent] {
        &self.events
    }

    /// Events with `sequence >= from`
    pub fn since(&self, from: u64) -> &[VaultEvent] {
        let start = (from as usize).min(self.events.len());
        &self.events[start..]
    }

    pub fn last(&self) -> Option<&VaultEvent> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

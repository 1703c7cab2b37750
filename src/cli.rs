use clap::{Parser, Subcommand};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::accounting::{LimitsUpdate, WhitelistEntry};
use crate::config::AppConfig;
use crate::custody::{AssetCustody, InMemoryCustody};
use crate::derivation::{derive, margin_account_address, Role};
use crate::domain::RebalanceDirection;
use crate::error::{Result, VaultError};
use crate::vault::{InitializeParams, VaultRegistry};
use crate::venue::PaperVenue;

#[derive(Parser)]
#[command(name = "strategy-vault")]
#[command(version = "0.1.0")]
#[command(about = "Pooled strategy vault: address derivation and paper-venue simulation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and environment overrides
    #[arg(short, long, default_value = "config", env = "STRATEGY_VAULT_CONFIG_DIR")]
    pub config_dir: String,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print every derived sub-account of a strategy identity
    Derive {
        /// Strategy identity (base58)
        #[arg(short, long)]
        identity: String,
        /// Margin account (base58); derived from the strategy account when omitted
        #[arg(short, long)]
        margin_account: Option<String>,
    },
    /// Run a deposit / rebalance / trade / withdraw scenario on the paper venue
    Simulate {
        /// Number of depositors
        #[arg(short, long, default_value = "2")]
        depositors: usize,
    },
}

fn parse_pubkey(field: &str, raw: &str) -> Result<Pubkey> {
    Pubkey::from_str(raw.trim()).map_err(|e| {
        VaultError::Config(config::ConfigError::Message(format!(
            "{} '{}' is not a valid pubkey: {}",
            field, raw, e
        )))
    })
}

#[derive(Debug, Serialize)]
struct DerivedRow {
    role: String,
    address: String,
    bump: Option<u8>,
}

/// `strategy-vault derive`
pub fn run_derive(
    config: &AppConfig,
    identity: &str,
    margin_account: Option<&str>,
    json: bool,
) -> Result<()> {
    let programs = config.program_ids()?;
    let identity = parse_pubkey("identity", identity)?;

    let strategy_account = derive(&identity, Role::StrategyAccount, &identity, &programs)?;
    let (margin_account, margin_bump) = match margin_account {
        Some(raw) => (parse_pubkey("margin_account", raw)?, None),
        None => {
            let (address, bump) = margin_account_address(&strategy_account.address, &programs)?;
            (address, Some(bump))
        }
    };

    let mut rows: Vec<DerivedRow> = Vec::with_capacity(Role::ALL.len() + 1);
    for role in Role::ALL {
        let derived = derive(&identity, role, &margin_account, &programs)?;
        rows.push(DerivedRow {
            role: role.to_string(),
            address: derived.address.to_string(),
            bump: Some(derived.bump),
        });
    }
    rows.push(DerivedRow {
        role: "margin_account".to_string(),
        address: margin_account.to_string(),
        bump: margin_bump,
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("identity: {}", identity);
        for row in &rows {
            let bump = row
                .bump
                .map(|b| b.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{:<16} {:<46} bump {}", row.role, row.address, bump);
        }
    }
    Ok(())
}

/// Outcome of one simulated vault lifecycle
#[derive(Debug, Serialize)]
pub struct SimulationSummary {
    pub identity: String,
    /// (depositor, amount, shares minted)
    pub deposits: Vec<(String, u64, u64)>,
    pub total_value_after_trades: u64,
    pub share_price_after_trades: Decimal,
    /// (depositor, amount paid out)
    pub payouts: Vec<(String, u64)>,
    pub vault_balance_after: u64,
    pub events: usize,
}

/// Run deposit, rebalance, trade, unwind and full withdrawal on the paper venue
pub async fn simulate(config: &AppConfig, depositors: usize) -> Result<SimulationSummary> {
    let sim = &config.simulation;
    let programs = config.program_ids()?;
    let market = sim.market_info();

    let custody = InMemoryCustody::new();
    let venue = PaperVenue::new(Arc::new(custody.clone()));
    venue.list_market(&market, sim.spot_price, sim.perp_price).await;

    let registry = VaultRegistry::new(
        programs,
        config.limits.retroactive_policy,
        Arc::new(custody.clone()),
        Arc::new(venue.clone()),
    );

    let identity = Pubkey::new_unique();
    let owner = Pubkey::new_unique();
    let trigger_server = Pubkey::new_unique();
    let strategy_account = derive(&identity, Role::StrategyAccount, &identity, &programs)?;
    let (margin_account, _) = margin_account_address(&strategy_account.address, &programs)?;

    registry
        .initialize(InitializeParams {
            identity,
            owner,
            trigger_server,
            market_info: market,
            margin_account,
        })
        .await?;

    let mut wallets = Vec::with_capacity(depositors);
    for _ in 0..depositors {
        let wallet = Pubkey::new_unique();
        custody.credit(&wallet, sim.depositor_balance).await?;
        wallets.push(wallet);
    }

    registry
        .set_limits(
            &identity,
            &owner,
            LimitsUpdate {
                max_total_value_locked: sim.max_total_value_locked,
                max_per_depositor: sim.max_per_depositor,
                whitelist: Some(wallets.iter().map(|w| WhitelistEntry::new(*w)).collect()),
            },
        )
        .await?;

    let mut deposits = Vec::with_capacity(depositors);
    for wallet in &wallets {
        let minted = registry
            .deposit(&identity, wallet, sim.deposit_amount)
            .await?;
        deposits.push((wallet.to_string(), sim.deposit_amount, minted));
    }

    registry
        .rebalance_mango(
            &identity,
            &owner,
            sim.rebalance_amount,
            RebalanceDirection::ToMargin,
        )
        .await?;
    if sim.spot_size != 0 {
        registry
            .adjust_position_spot(&identity, &trigger_server, sim.spot_size, None)
            .await?;
    }
    if sim.perp_size != 0 {
        registry
            .adjust_position_perp(&identity, &trigger_server, sim.perp_size, false)
            .await?;
    }

    let after_trades = registry.valuation(&identity).await?;
    info!(
        total_value = after_trades.total_value,
        share_price = %after_trades.share_price(),
        "positions opened"
    );

    // Unwind back to custody so every holder can exit
    if sim.perp_size != 0 {
        let close = sim.perp_size.checked_neg().ok_or(VaultError::MathOverflow)?;
        registry
            .adjust_position_perp(&identity, &trigger_server, close, true)
            .await?;
    }
    if sim.spot_size != 0 {
        let close = sim.spot_size.checked_neg().ok_or(VaultError::MathOverflow)?;
        registry
            .adjust_position_spot(&identity, &trigger_server, close, None)
            .await?;
    }
    let unwound = registry.valuation(&identity).await?;
    let free_collateral = unwound
        .margin
        .quote_deposits
        .trunc()
        .to_u64()
        .ok_or(VaultError::MathOverflow)?;
    if free_collateral > 0 {
        registry
            .rebalance_mango(
                &identity,
                &owner,
                free_collateral,
                RebalanceDirection::ToVault,
            )
            .await?;
    }

    let vault = registry.get(&identity)?;
    let mut payouts = Vec::with_capacity(depositors);
    for wallet in &wallets {
        let shares = vault.lock().await.share_balance(wallet);
        let paid = registry.withdraw(&identity, wallet, shares).await?;
        payouts.push((wallet.to_string(), paid));
    }

    let vault_ref = vault.lock().await;
    let vault_balance_after = custody
        .balance(&vault_ref.state().vault_token_account()?)
        .await?;
    Ok(SimulationSummary {
        identity: identity.to_string(),
        deposits,
        total_value_after_trades: after_trades.total_value,
        share_price_after_trades: after_trades.share_price(),
        payouts,
        vault_balance_after,
        events: vault_ref.events().len(),
    })
}

/// `strategy-vault simulate`
pub async fn run_simulate(config: &AppConfig, depositors: usize, json: bool) -> Result<()> {
    let summary = simulate(config, depositors).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("vault {}", summary.identity);
        for (wallet, amount, shares) in &summary.deposits {
            println!("  deposit  {} {:>14} -> {:>14} shares", wallet, amount, shares);
        }
        println!(
            "  after trades: value {} share price {}",
            summary.total_value_after_trades, summary.share_price_after_trades
        );
        for (wallet, paid) in &summary.payouts {
            println!("  withdraw {} {:>14}", wallet, paid);
        }
        println!(
            "  vault token account left with {}",
            summary.vault_balance_after
        );
        println!("  {} events", summary.events);
    }
    Ok(())
}

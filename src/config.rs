use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::path::Path;
use std::str::FromStr;

use crate::accounting::RetroactivePolicy;
use crate::derivation::ProgramIds;
use crate::domain::MarketInfo;
use crate::error::{Result, VaultError};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub programs: ProgramsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgramsConfig {
    /// Program every vault sub-account is derived under (base58)
    pub strategy_program_id: String,
    /// Margin venue program (base58)
    pub venue_program_id: String,
    /// Margin venue group (base58)
    pub venue_group: String,
    /// Account number seeded into the margin account address
    #[serde(default = "default_margin_account_num")]
    pub margin_account_num: u64,
    /// Sub-index seeded into the spot open-orders address
    #[serde(default = "default_open_orders_sub_index")]
    pub open_orders_sub_index: u64,
}

fn default_margin_account_num() -> u64 {
    1
}

fn default_open_orders_sub_index() -> u64 {
    2
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsConfig {
    /// Whether `set_limits` may lock out depositors already above the new caps
    #[serde(default)]
    pub retroactive_policy: RetroactivePolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

/// Paper venue marks and scenario sizes for `strategy-vault simulate`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub spot_market_index: u8,
    pub perp_market_index: u8,
    pub spot_market_lot_size: u64,
    pub spot_token_index: u8,
    /// Spot mark in quote per base unit
    pub spot_price: Decimal,
    /// Perp mark in quote per base unit
    pub perp_price: Decimal,
    /// Stable asset credited to each simulated depositor
    pub depositor_balance: u64,
    pub deposit_amount: u64,
    pub rebalance_amount: u64,
    pub spot_size: i64,
    pub perp_size: i64,
    pub max_total_value_locked: u64,
    pub max_per_depositor: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        use rust_decimal_macros::dec;

        let market = MarketInfo::default();
        Self {
            spot_market_index: market.spot_market_index,
            perp_market_index: market.perp_market_index,
            spot_market_lot_size: market.spot_market_lot_size,
            spot_token_index: market.spot_token_index,
            spot_price: dec!(25),
            perp_price: dec!(25),
            depositor_balance: 1_000_000_000,
            deposit_amount: 150_000_000,
            rebalance_amount: 100_000_000,
            spot_size: 1_000_000,
            perp_size: -1_000_000,
            max_total_value_locked: 1_000_000_000,
            max_per_depositor: 500_000_000,
        }
    }
}

impl SimulationConfig {
    pub fn market_info(&self) -> MarketInfo {
        MarketInfo {
            spot_market_index: self.spot_market_index,
            perp_market_index: self.perp_market_index,
            spot_market_lot_size: self.spot_market_lot_size,
            spot_token_index: self.spot_token_index,
        }
    }
}

fn parse_pubkey(field: &str, raw: &str) -> std::result::Result<Pubkey, String> {
    Pubkey::from_str(raw.trim()).map_err(|e| format!("{} '{}' is not a valid pubkey: {}", field, raw, e))
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("programs.margin_account_num", 1)?
            .set_default("programs.open_orders_sub_index", 2)?
            .set_default("limits.retroactive_policy", "reject")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/mainnet.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("STRATEGY_VAULT_ENV").unwrap_or_else(|_| "devnet".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (STRATEGY_VAULT__PROGRAMS__VENUE_GROUP, etc.)
            .add_source(
                Environment::with_prefix("STRATEGY_VAULT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Devnet deployment defaults
    pub fn default_config() -> Self {
        Self {
            programs: ProgramsConfig {
                strategy_program_id: "J8heqiEwQJs265mrMiCXjCZdDy8xAqNpBoyBRbnV3wmy".to_string(),
                venue_program_id: "4skJ85cdxQAFVKbcGgfun8iZPL7BadVYXG3kGEGkufqA".to_string(),
                venue_group: "Ec2enZyoC4nGpEfu2sUNAa2nUGJHWxoUWYSEJ2hNTWTA".to_string(),
                margin_account_num: default_margin_account_num(),
                open_orders_sub_index: default_open_orders_sub_index(),
            },
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }

    /// Parsed program ids for address derivation
    pub fn program_ids(&self) -> Result<ProgramIds> {
        let parse = |field: &str, raw: &str| {
            parse_pubkey(field, raw).map_err(|e| VaultError::Config(ConfigError::Message(e)))
        };
        Ok(ProgramIds {
            strategy_program: parse("strategy_program_id", &self.programs.strategy_program_id)?,
            venue_program: parse("venue_program_id", &self.programs.venue_program_id)?,
            venue_group: parse("venue_group", &self.programs.venue_group)?,
            margin_account_num: self.programs.margin_account_num,
            open_orders_sub_index: self.programs.open_orders_sub_index,
        })
    }

    /// Validate configuration, collecting every problem
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (field, raw) in [
            ("strategy_program_id", &self.programs.strategy_program_id),
            ("venue_program_id", &self.programs.venue_program_id),
            ("venue_group", &self.programs.venue_group),
        ] {
            if let Err(e) = parse_pubkey(field, raw) {
                errors.push(e);
            }
        }

        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            errors.push(format!("logging.level '{}' is not a log level", self.logging.level));
        }

        let sim = &self.simulation;
        if let Err(e) = sim.market_info().validate() {
            errors.push(format!("simulation: {}", e));
        }
        if sim.spot_price <= Decimal::ZERO || sim.perp_price <= Decimal::ZERO {
            errors.push("simulation prices must be positive".to_string());
        }
        if sim.deposit_amount == 0 {
            errors.push("simulation.deposit_amount must be positive".to_string());
        }
        if sim.deposit_amount > sim.depositor_balance {
            errors.push(format!(
                "simulation.deposit_amount {} exceeds depositor_balance {}",
                sim.deposit_amount, sim.depositor_balance
            ));
        }
        if sim.max_per_depositor > sim.max_total_value_locked {
            errors.push("simulation.max_per_depositor exceeds max_total_value_locked".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

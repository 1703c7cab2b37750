use anyhow::Context;
use clap::Parser;
use strategy_vault::cli::{run_derive, run_simulate, Cli, Commands};
use strategy_vault::config::AppConfig;
use strategy_vault::logging::init_logging;
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)
        .with_context(|| format!("failed to load configuration from {}", cli.config_dir))?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("config error: {}", e);
        }
        anyhow::bail!("{} configuration error(s)", errors.len());
    }
    init_logging(&config.logging);

    let result = match &cli.command {
        Commands::Derive {
            identity,
            margin_account,
        } => run_derive(&config, identity, margin_account.as_deref(), cli.json),
        Commands::Simulate { depositors } => {
            run_simulate(&config, *depositors, cli.json).await
        }
    };

    if let Err(e) = &result {
        error!(error = %e, fatal = e.is_fatal(), "command failed");
    }
    Ok(result?)
}

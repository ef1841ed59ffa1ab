mod cli;
mod config;
mod simulate;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use srm_sched::{StaticTapeInformant, StrategyRegistry};
use srm_sched_core::{load_dotenv, DiscriminatorRegistry};
use tracing::info;

use crate::cli::{CliArgs, Command};
use crate::simulate::SimulationParams;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    // Logs go to stderr so that JSON on stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    match args.command {
        Command::Strategies => list_strategies(),
        Command::Check { config } => check(&config),
        Command::Simulate {
            config,
            users,
            jobs,
            seconds,
            execute_ms,
            tapes,
        } => {
            let settings = config::load_settings(config.as_deref())?;
            settings.log_summary();
            let params = SimulationParams {
                users,
                jobs,
                seconds,
                execute_ms,
                tapes,
            };
            let report = simulate::run(settings, params).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn list_strategies() -> Result<()> {
    let registry = StrategyRegistry::with_defaults();
    println!("scheduling strategies:");
    for name in registry.scheduling_names() {
        println!("  {name}");
    }
    println!("transfer strategies:");
    for name in registry.transfer_names() {
        println!("  {name}");
    }
    println!("discriminators:");
    for key in DiscriminatorRegistry::with_defaults().keys() {
        println!("  {key}");
    }
    Ok(())
}

fn check(path: &Path) -> Result<()> {
    let settings = config::load_settings(Some(path))?;
    settings.log_summary();

    let registry = StrategyRegistry::with_defaults();
    let ctx = config::context(&settings, Arc::new(StaticTapeInformant::new()));
    registry
        .build_scheduling(&settings.scheduling, &ctx)
        .with_context(|| format!("scheduling strategy '{}'", settings.scheduling.strategy))?;
    registry
        .build_transfer(&settings.transfer, &ctx)
        .with_context(|| format!("transfer strategy '{}'", settings.transfer.strategy))?;

    info!(path = %path.display(), "settings are valid");
    println!(
        "ok: scheduler '{}' uses '{}' scheduling and '{}' admission",
        settings.scheduler.id, settings.scheduling.strategy, settings.transfer.strategy
    );
    Ok(())
}

// spot-bot: run and inspect Kraken spot trading bots

use clap::{Parser, Subcommand};
use spot_trading_bot::{
    BotMode, BotRegistry, BotResult, Config, GridBot, HoldStrategy, JsonStateStore, KrakenClient,
    SmaCrossStrategy, StrategyKind,
};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "spot-bot")]
#[command(about = "Spot trading bots for the Kraken exchange", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a template config.toml and create the state directory
    Init,
    /// Check the configuration without running anything
    Validate,
    /// Show persisted state for every known bot
    Status,
    /// Run a bot until Ctrl-C
    Run {
        #[command(subcommand)]
        flavour: RunFlavour,
    },
}

#[derive(Subcommand)]
enum RunFlavour {
    /// Fixed-price grid ladder
    Grid,
    /// Signal-driven entries with risk-managed sizing
    Signal,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(err) = dispatch(cli).await {
        error!("❌ {}", err);
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> BotResult<()> {
    match cli.command {
        Commands::Init => init(&cli.config),
        Commands::Validate => validate(&cli.config),
        Commands::Status => status(&cli.config),
        Commands::Run { flavour } => run(&cli.config, flavour).await,
    }
}

fn init(config_path: &str) -> BotResult<()> {
    if std::path::Path::new(config_path).exists() {
        warn!("{} already exists; leaving it untouched", config_path);
    } else {
        std::fs::write(config_path, spot_trading_bot::DEFAULT_CONFIG_TEMPLATE)?;
        info!("📝 Wrote template config to {}", config_path);
    }
    let config: Result<Config, _> = Config::from_file(config_path);
    if let Ok(config) = config {
        std::fs::create_dir_all(&config.persistence.state_dir)?;
        info!("📂 State directory: {}", config.persistence.state_dir);
    } else {
        info!("Fill in your API credentials, then run 'spot-bot validate'");
    }
    Ok(())
}

fn validate(config_path: &str) -> BotResult<()> {
    let config = Config::from_file(config_path)?;
    info!("✅ Configuration is valid");
    info!(
        "   bot '{}' on {} ({} mode), grid {:.4}..{:.4} x{} levels",
        config.bot.name,
        config.bot.pair,
        config.bot.mode,
        config.grid.lower_price,
        config.grid.upper_price,
        config.grid.level_num
    );
    if config.bot.mode == BotMode::Live {
        warn!("⚠️ Live mode: orders will execute with real funds");
    }
    Ok(())
}

fn status(config_path: &str) -> BotResult<()> {
    let config = Config::from_file(config_path)?;
    let state_dir = std::path::Path::new(&config.persistence.state_dir);
    if !state_dir.exists() {
        info!("No state directory yet; nothing has run");
        return Ok(());
    }

    let store = JsonStateStore::new(state_dir);
    let mut found = false;
    for entry in std::fs::read_dir(state_dir)? {
        let path = entry?.path();
        let Some(name) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|_| path.extension().is_some_and(|e| e == "json"))
        else {
            continue;
        };
        found = true;
        match store.load(name) {
            Ok(state) => info!(
                "🤖 {} [{}] {} | running: {} paused: {} | realized {:+.4} | {} orders submitted",
                state.name,
                state.mode,
                state.pair,
                state.is_running,
                state.is_paused,
                state.realized_gain,
                state.open_order_txids.len()
            ),
            Err(err) => warn!("Skipping {}: {}", path.display(), err),
        }
    }
    if !found {
        info!("No persisted bot state found in {}", state_dir.display());
    }
    Ok(())
}

async fn run(config_path: &str, flavour: RunFlavour) -> BotResult<()> {
    let config = Config::load_or_create(config_path)?;
    let exchange = Arc::new(KrakenClient::new(&config.api, config.bot.mode));
    let store = JsonStateStore::new(&config.persistence.state_dir);
    let registry = BotRegistry::new();
    let name = config.bot.name.clone();

    match flavour {
        RunFlavour::Grid => {
            let bot = GridBot::new(exchange, &config, store);
            let (control, state) = (bot.control(), bot.shared_state());
            registry.register(&name, control, state, tokio::spawn(bot.run()))?;
        }
        RunFlavour::Signal => match config.strategy.clone() {
            StrategyKind::SmaCross {
                short_window,
                long_window,
                hold_band,
            } => {
                let strategy = SmaCrossStrategy::new(
                    exchange.clone(),
                    &config.bot,
                    short_window,
                    long_window,
                    hold_band,
                );
                let bot = spot_trading_bot::BotController::new(exchange, strategy, &config, store);
                let (control, state) = (bot.control(), bot.shared_state());
                registry.register(&name, control, state, tokio::spawn(bot.run()))?;
            }
            StrategyKind::Hold => {
                let strategy = HoldStrategy::new(exchange.clone(), &config.bot);
                let bot = spot_trading_bot::BotController::new(exchange, strategy, &config, store);
                let (control, state) = (bot.control(), bot.shared_state());
                registry.register(&name, control, state, tokio::spawn(bot.run()))?;
            }
        },
    }

    info!("Press Ctrl-C to stop");
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("Could not listen for Ctrl-C; stopping immediately");
    }
    info!("Shutting down '{}'...", name);
    registry.stop(&name).await?;
    info!("👋 Done");
    Ok(())
}

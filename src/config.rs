// Configuration management for the trading bot

use crate::error::BotError;
use crate::types::BotMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

impl From<ConfigError> for BotError {
    fn from(err: ConfigError) -> Self {
        BotError::Config(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub bot: BotSettings,
    pub risk: RiskConfig,
    pub grid: GridConfig,
    pub strategy: StrategyKind,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub api_key: String,
    pub api_secret: String,
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    pub name: String,
    pub pair: String,
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    #[serde(default = "default_mode")]
    pub mode: BotMode,
    /// Seconds slept between trading cycles.
    #[serde(default = "default_latency")]
    pub latency_secs: f64,
    /// Consecutive remote failures tolerated before the bot gives up.
    #[serde(default = "default_max_error_count")]
    pub max_error_count: u32,
    /// Seconds slept between retry attempts.
    #[serde(default = "default_error_latency")]
    pub error_latency_secs: f64,
    /// OHLC candle interval in minutes.
    #[serde(default = "default_ohlc_interval")]
    pub ohlc_interval: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade: f64,
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub lower_price: f64,
    pub upper_price: f64,
    pub level_num: usize,
    pub quantity_per_level: f64,
    /// Close below this price shuts the ladder down.
    pub stop_loss: f64,
    #[serde(default = "default_cancel_orders_on_exit")]
    pub cancel_orders_on_exit: bool,
}

/// Signal source for the signal-driven bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StrategyKind {
    SmaCross {
        short_window: usize,
        long_window: usize,
        /// Dead band around a crossover ratio of 1.0 that maps to HOLD.
        #[serde(default = "default_hold_band")]
        hold_band: f64,
    },
    Hold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

fn default_rest_url() -> String {
    "https://api.kraken.com".to_string()
}

fn default_base_currency() -> String {
    "ZUSD".to_string()
}

fn default_mode() -> BotMode {
    BotMode::Test
}

fn default_latency() -> f64 {
    5.0
}

fn default_max_error_count() -> u32 {
    5
}

fn default_error_latency() -> f64 {
    5.0
}

fn default_ohlc_interval() -> u32 {
    60
}

fn default_risk_per_trade() -> f64 {
    0.01
}

fn default_max_position_pct() -> f64 {
    0.2
}

fn default_max_drawdown_pct() -> f64 {
    0.15
}

fn default_cancel_orders_on_exit() -> bool {
    true
}

fn default_hold_band() -> f64 {
    0.001
}

fn default_state_dir() -> String {
    "state".to_string()
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.name.trim().is_empty() {
            return Err(ConfigError::Validation("bot name must not be empty".into()));
        }
        if self.bot.pair.trim().is_empty() {
            return Err(ConfigError::Validation("trading pair must not be empty".into()));
        }
        if self.bot.latency_secs <= 0.0 {
            return Err(ConfigError::Validation(
                "latency_secs must be positive".into(),
            ));
        }
        if self.bot.max_error_count == 0 {
            return Err(ConfigError::Validation(
                "max_error_count must be at least 1".into(),
            ));
        }
        if self.bot.error_latency_secs < 0.0 {
            return Err(ConfigError::Validation(
                "error_latency_secs must not be negative".into(),
            ));
        }

        for (name, value) in [
            ("risk_per_trade", self.risk.risk_per_trade),
            ("max_position_pct", self.risk.max_position_pct),
            ("max_drawdown_pct", self.risk.max_drawdown_pct),
        ] {
            if value <= 0.0 || value > 1.0 {
                return Err(ConfigError::Validation(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.grid.level_num < 2 {
            return Err(ConfigError::Validation(
                "grid needs at least 2 levels".into(),
            ));
        }
        if self.grid.upper_price <= self.grid.lower_price {
            return Err(ConfigError::Validation(format!(
                "upper_price {} must exceed lower_price {}",
                self.grid.upper_price, self.grid.lower_price
            )));
        }
        if self.grid.lower_price <= 0.0 {
            return Err(ConfigError::Validation(
                "lower_price must be positive".into(),
            ));
        }
        if self.grid.quantity_per_level <= 0.0 {
            return Err(ConfigError::Validation(
                "quantity_per_level must be positive".into(),
            ));
        }
        if self.grid.stop_loss >= self.grid.lower_price {
            return Err(ConfigError::Validation(
                "grid stop_loss must sit below lower_price".into(),
            ));
        }

        if let StrategyKind::SmaCross {
            short_window,
            long_window,
            hold_band,
        } = &self.strategy
        {
            if *short_window == 0 || *long_window == 0 {
                return Err(ConfigError::Validation(
                    "SMA windows must be positive".into(),
                ));
            }
            if short_window >= long_window {
                return Err(ConfigError::Validation(format!(
                    "short_window {} must be below long_window {}",
                    short_window, long_window
                )));
            }
            if *hold_band < 0.0 || *hold_band >= 1.0 {
                return Err(ConfigError::Validation(
                    "hold_band must be in [0, 1)".into(),
                ));
            }
        }

        Ok(())
    }

    /// Load an existing config, or write the template and bail with guidance.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            std::fs::write(path, crate::DEFAULT_CONFIG_TEMPLATE)?;
            Err(ConfigError::Validation(format!(
                "created template config at {}; fill in API credentials before running",
                path.display()
            )))
        }
    }
}

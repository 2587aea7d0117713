//! Spot trading bot for the Kraken REST API.
//!
//! Two bot flavours share the same retrying execution layer, persistence,
//! and registry: a signal-driven bot that sizes entries from a fixed risk
//! budget, and a grid bot that walks a ladder of resting limit orders.

pub mod clients;
pub mod config;
pub mod core;
pub mod error;
pub mod persistence;
pub mod registry;
pub mod strategy;
pub mod types;

pub use clients::{AddOrderReceipt, Exchange, KrakenClient, OrderInfo, OrderRequest, PaperExchange};
pub use config::{Config, ConfigError, StrategyKind};
pub use crate::core::{
    BotControl, BotController, BotState, BotStatus, GridBot, GridLadder, OrderExecutionController,
    PositionManager, RiskManager,
};
pub use error::{BotError, BotResult};
pub use persistence::JsonStateStore;
pub use registry::BotRegistry;
pub use strategy::{HoldStrategy, SmaCrossStrategy, Strategy};
pub use types::{BotMode, Ohlc, OrderKind, OrderSide, PositionSide, RemoteStatus, Signal};

/// Template written by `spot-bot init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../config.toml.example");

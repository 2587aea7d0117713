// Shared types used across the trading core

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trading signal emitted by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

/// Buy/sell side of an order, matching Kraken's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type, matching Kraken's `ordertype` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
    StopLossLimit,
    TakeProfitLimit,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Market => "market",
            OrderKind::Limit => "limit",
            OrderKind::StopLossLimit => "stop-loss-limit",
            OrderKind::TakeProfitLimit => "take-profit-limit",
        }
    }
}

/// Lifecycle status reported by the exchange for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Pending,
    Open,
    Closed,
    Canceled,
    Expired,
}

impl FromStr for RemoteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RemoteStatus::Pending),
            "open" => Ok(RemoteStatus::Open),
            "closed" => Ok(RemoteStatus::Closed),
            "canceled" => Ok(RemoteStatus::Canceled),
            "expired" => Ok(RemoteStatus::Expired),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

impl RemoteStatus {
    /// The order will never fill from here on.
    pub fn is_terminal_unfilled(&self) -> bool {
        matches!(self, RemoteStatus::Canceled | RemoteStatus::Expired)
    }
}

/// A single OHLC candle as returned by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub vwap: f64,
    pub volume: f64,
    pub trades: u64,
}

/// Live orders hit the exchange for real; test orders are validate-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    Live,
    Test,
}

impl fmt::Display for BotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotMode::Live => f.write_str("live"),
            BotMode::Test => f.write_str("test"),
        }
    }
}

impl FromStr for BotMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" => Ok(BotMode::Live),
            "test" => Ok(BotMode::Test),
            other => Err(format!("unknown mode '{}', expected 'live' or 'test'", other)),
        }
    }
}

// Exchange client implementations

pub mod kraken;
pub mod paper;

pub use self::kraken::KrakenClient;
pub use self::paper::PaperExchange;

use crate::error::BotResult;
use crate::types::{Ohlc, OrderKind, OrderSide, RemoteStatus};
use async_trait::async_trait;
use std::collections::HashMap;

/// A new order to submit, exchange-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub pair: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub volume: f64,
    /// Limit or trigger price; ignored for market orders.
    pub price: Option<f64>,
    /// Conditional close attached to the order, e.g. a stop-loss-limit.
    pub close_kind: Option<OrderKind>,
    pub close_price: Option<f64>,
    pub post_only: bool,
}

impl OrderRequest {
    pub fn market(pair: &str, side: OrderSide, volume: f64) -> Self {
        Self {
            pair: pair.to_string(),
            side,
            kind: OrderKind::Market,
            volume,
            price: None,
            close_kind: None,
            close_price: None,
            post_only: false,
        }
    }

    pub fn limit(pair: &str, side: OrderSide, volume: f64, price: f64) -> Self {
        Self {
            pair: pair.to_string(),
            side,
            kind: OrderKind::Limit,
            volume,
            price: Some(price),
            close_kind: None,
            close_price: None,
            post_only: false,
        }
    }

    pub fn with_kind(mut self, kind: OrderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_close(mut self, kind: OrderKind, price: f64) -> Self {
        self.close_kind = Some(kind);
        self.close_price = Some(price);
        self
    }

    pub fn post_only(mut self) -> Self {
        self.post_only = true;
        self
    }
}

/// Acknowledgement returned when an order is accepted.
#[derive(Debug, Clone)]
pub struct AddOrderReceipt {
    /// Empty when the order was validate-only.
    pub txid: String,
    pub descr: String,
}

/// Status snapshot for a previously submitted order.
#[derive(Debug, Clone)]
pub struct OrderInfo {
    pub status: RemoteStatus,
    pub volume: f64,
    pub volume_executed: f64,
    /// Average fill price, zero until something executes.
    pub price: f64,
}

/// The remote operations both bot flavours need from an exchange.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Candles for `pair` at `interval` minutes, oldest first. The final
    /// candle is the still-forming one.
    async fn get_ohlc_data(&self, pair: &str, interval: u32) -> BotResult<Vec<Ohlc>>;

    /// Raw asset balances keyed by Kraken asset code.
    async fn get_account_balance(&self) -> BotResult<HashMap<String, f64>>;

    /// Spendable balances: balance plus credit, minus credit used and
    /// amounts held in open trades.
    async fn get_extended_balance(&self) -> BotResult<HashMap<String, f64>>;

    async fn add_order(&self, request: &OrderRequest) -> BotResult<AddOrderReceipt>;

    /// Look up orders by comma-joined transaction ids.
    async fn get_orders_info(
        &self,
        txids: &str,
        trades: bool,
    ) -> BotResult<HashMap<String, OrderInfo>>;

    async fn cancel_order(&self, txid: &str) -> BotResult<()>;
}

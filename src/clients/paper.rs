// In-memory paper exchange used by the test suite and offline experiments

use crate::clients::{AddOrderReceipt, Exchange, OrderInfo, OrderRequest};
use crate::error::{BotError, BotResult};
use crate::types::{Ohlc, OrderKind, OrderSide, RemoteStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PaperOrder {
    pub request: OrderRequest,
    pub status: RemoteStatus,
    pub fill_price: f64,
}

#[derive(Debug, Default)]
struct PaperBook {
    balances: HashMap<String, f64>,
    orders: HashMap<String, PaperOrder>,
    candles: Vec<Ohlc>,
    /// Remote failures to inject before calls succeed again.
    failures_pending: u32,
    /// Mirror Kraken's `validate=true`: acknowledge orders without booking
    /// them, returning a receipt with no txid.
    validate_only: bool,
}

/// Simulated exchange with a scriptable price tape. Market orders fill at the
/// latest close; limit orders rest until a pushed price crosses them.
pub struct PaperExchange {
    quote_currency: String,
    book: Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(quote_currency: &str, starting_balance: f64) -> Self {
        let mut balances = HashMap::new();
        balances.insert(quote_currency.to_string(), starting_balance);
        Self {
            quote_currency: quote_currency.to_string(),
            book: Mutex::new(PaperBook {
                balances,
                ..Default::default()
            }),
        }
    }

    pub fn set_candles(&self, candles: Vec<Ohlc>) {
        self.book.lock().unwrap().candles = candles;
    }

    /// Append a synthetic candle at `price` and fill any resting limit order
    /// the move crossed.
    pub fn push_price(&self, price: f64) {
        let mut book = self.book.lock().unwrap();
        let time = book.candles.last().map(|c| c.time + 60).unwrap_or(0);
        book.candles.push(synthetic_candle(time, price));

        let crossed: Vec<String> = book
            .orders
            .iter()
            .filter(|(_, order)| {
                order.status == RemoteStatus::Open
                    && order.request.kind == OrderKind::Limit
                    && match (order.request.side, order.request.price) {
                        (OrderSide::Buy, Some(limit)) => price <= limit,
                        (OrderSide::Sell, Some(limit)) => price >= limit,
                        _ => false,
                    }
            })
            .map(|(txid, _)| txid.clone())
            .collect();
        for txid in crossed {
            Self::fill_locked(&mut book, &txid, &self.quote_currency);
        }
    }

    /// Force-fill an order regardless of the tape, at its limit price.
    pub fn fill(&self, txid: &str) {
        let mut book = self.book.lock().unwrap();
        Self::fill_locked(&mut book, txid, &self.quote_currency);
    }

    pub fn order(&self, txid: &str) -> Option<PaperOrder> {
        self.book.lock().unwrap().orders.get(txid).cloned()
    }

    pub fn open_txids(&self) -> Vec<String> {
        self.book
            .lock()
            .unwrap()
            .orders
            .iter()
            .filter(|(_, o)| o.status == RemoteStatus::Open)
            .map(|(txid, _)| txid.clone())
            .collect()
    }

    pub fn open_order_count(&self) -> usize {
        self.book
            .lock()
            .unwrap()
            .orders
            .values()
            .filter(|o| o.status == RemoteStatus::Open)
            .count()
    }

    /// Make the next `count` remote calls fail with a network error.
    pub fn inject_failures(&self, count: u32) {
        self.book.lock().unwrap().failures_pending = count;
    }

    pub fn set_validate_only(&self, on: bool) {
        self.book.lock().unwrap().validate_only = on;
    }

    fn fill_locked(book: &mut PaperBook, txid: &str, quote_currency: &str) {
        let last_close = book.candles.last().map(|c| c.close).unwrap_or(0.0);
        if let Some(order) = book.orders.get_mut(txid) {
            if order.status != RemoteStatus::Open {
                return;
            }
            let price = order.request.price.unwrap_or(last_close);
            order.status = RemoteStatus::Closed;
            order.fill_price = price;
            let notional = price * order.request.volume;
            let entry = book
                .balances
                .entry(quote_currency.to_string())
                .or_insert(0.0);
            match order.request.side {
                OrderSide::Buy => *entry -= notional,
                OrderSide::Sell => *entry += notional,
            }
        }
    }

    fn consume_failure(&self) -> BotResult<()> {
        let mut book = self.book.lock().unwrap();
        if book.failures_pending > 0 {
            book.failures_pending -= 1;
            return Err(BotError::Network("injected paper failure".into()));
        }
        Ok(())
    }
}

fn synthetic_candle(time: i64, price: f64) -> Ohlc {
    Ohlc {
        time,
        open: price,
        high: price,
        low: price,
        close: price,
        vwap: price,
        volume: 0.0,
        trades: 0,
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn get_ohlc_data(&self, _pair: &str, _interval: u32) -> BotResult<Vec<Ohlc>> {
        self.consume_failure()?;
        let book = self.book.lock().unwrap();
        if book.candles.is_empty() {
            return Err(BotError::Exchange("paper exchange has no candles".into()));
        }
        Ok(book.candles.clone())
    }

    async fn get_account_balance(&self) -> BotResult<HashMap<String, f64>> {
        self.consume_failure()?;
        Ok(self.book.lock().unwrap().balances.clone())
    }

    async fn get_extended_balance(&self) -> BotResult<HashMap<String, f64>> {
        // nothing is ever held in the paper book
        self.get_account_balance().await
    }

    async fn add_order(&self, request: &OrderRequest) -> BotResult<AddOrderReceipt> {
        self.consume_failure()?;
        let mut book = self.book.lock().unwrap();
        let descr = format!(
            "{} {:.8} {} @ {}",
            request.side,
            request.volume,
            request.pair,
            request
                .price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "market".to_string()),
        );
        if book.validate_only {
            return Ok(AddOrderReceipt {
                txid: String::new(),
                descr,
            });
        }
        let txid = Uuid::new_v4().to_string();
        book.orders.insert(
            txid.clone(),
            PaperOrder {
                request: request.clone(),
                status: RemoteStatus::Open,
                fill_price: 0.0,
            },
        );
        drop(book);

        if request.kind == OrderKind::Market {
            self.fill(&txid);
        }
        Ok(AddOrderReceipt { txid, descr })
    }

    async fn get_orders_info(
        &self,
        txids: &str,
        _trades: bool,
    ) -> BotResult<HashMap<String, OrderInfo>> {
        self.consume_failure()?;
        let book = self.book.lock().unwrap();
        let mut infos = HashMap::new();
        for txid in txids.split(',').filter(|t| !t.is_empty()) {
            let order = book
                .orders
                .get(txid)
                .ok_or_else(|| BotError::Exchange(format!("unknown order {}", txid)))?;
            let executed = if order.status == RemoteStatus::Closed {
                order.request.volume
            } else {
                0.0
            };
            infos.insert(
                txid.to_string(),
                OrderInfo {
                    status: order.status,
                    volume: order.request.volume,
                    volume_executed: executed,
                    price: order.fill_price,
                },
            );
        }
        Ok(infos)
    }

    async fn cancel_order(&self, txid: &str) -> BotResult<()> {
        self.consume_failure()?;
        let mut book = self.book.lock().unwrap();
        match book.orders.get_mut(txid) {
            Some(order) if order.status == RemoteStatus::Open => {
                order.status = RemoteStatus::Canceled;
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(BotError::Exchange(format!("unknown order {}", txid))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn market_orders_fill_at_last_close() {
        let paper = PaperExchange::new("ZUSD", 1000.0);
        paper.push_price(10.0);
        let receipt = paper
            .add_order(&OrderRequest::market("XBTUSD", OrderSide::Buy, 2.0))
            .await
            .unwrap();
        let order = paper.order(&receipt.txid).unwrap();
        assert_eq!(order.status, RemoteStatus::Closed);
        assert_eq!(order.fill_price, 10.0);
        let balances = paper.get_account_balance().await.unwrap();
        assert!((balances["ZUSD"] - 980.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn limit_orders_rest_until_crossed() {
        let paper = PaperExchange::new("ZUSD", 1000.0);
        paper.push_price(10.0);
        let receipt = paper
            .add_order(&OrderRequest::limit("XBTUSD", OrderSide::Buy, 1.0, 8.0))
            .await
            .unwrap();
        assert_eq!(paper.order(&receipt.txid).unwrap().status, RemoteStatus::Open);

        paper.push_price(7.5);
        let order = paper.order(&receipt.txid).unwrap();
        assert_eq!(order.status, RemoteStatus::Closed);
        assert_eq!(order.fill_price, 8.0);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let paper = PaperExchange::new("ZUSD", 1000.0);
        paper.push_price(10.0);
        paper.inject_failures(2);
        assert!(paper.get_account_balance().await.is_err());
        assert!(paper.get_account_balance().await.is_err());
        assert!(paper.get_account_balance().await.is_ok());
    }

    #[tokio::test]
    async fn cancel_marks_open_orders() {
        let paper = PaperExchange::new("ZUSD", 1000.0);
        paper.push_price(10.0);
        let receipt = paper
            .add_order(&OrderRequest::limit("XBTUSD", OrderSide::Sell, 1.0, 12.0))
            .await
            .unwrap();
        paper.cancel_order(&receipt.txid).await.unwrap();
        let infos = paper.get_orders_info(&receipt.txid, false).await.unwrap();
        assert_eq!(infos[&receipt.txid].status, RemoteStatus::Canceled);
    }
}

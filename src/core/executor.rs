// Retrying gateway between the bots and an exchange

use crate::clients::{AddOrderReceipt, Exchange, OrderInfo, OrderRequest};
use crate::config::BotSettings;
use crate::error::{BotError, BotResult};
use crate::types::Ohlc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Wraps every remote call in the bot's retry policy: a fixed delay between
/// attempts, a bounded attempt count, and a fatal error once exhausted.
pub struct OrderExecutionController<E> {
    exchange: Arc<E>,
    max_attempts: u32,
    retry_delay: Duration,
    poll_interval: Duration,
}

impl<E: Exchange> OrderExecutionController<E> {
    pub fn new(exchange: Arc<E>, settings: &BotSettings) -> Self {
        Self {
            exchange,
            max_attempts: settings.max_error_count,
            retry_delay: Duration::from_secs_f64(settings.error_latency_secs),
            poll_interval: Duration::from_secs_f64(settings.latency_secs),
        }
    }

    pub fn exchange(&self) -> &Arc<E> {
        &self.exchange
    }

    async fn with_retries<T, F, Fut>(&self, what: &str, mut op: F) -> BotResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BotResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    if attempt >= self.max_attempts {
                        return Err(BotError::RetriesExhausted {
                            what: what.to_string(),
                            attempts: attempt,
                            last: err.to_string(),
                        });
                    }
                    warn!(
                        "⚠️ {} attempt {}/{} failed: {}; retrying in {:?}",
                        what, attempt, self.max_attempts, err, self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    pub async fn get_ohlc_data(&self, pair: &str, interval: u32) -> BotResult<Vec<Ohlc>> {
        self.with_retries("OHLC fetch", || self.exchange.get_ohlc_data(pair, interval))
            .await
    }

    /// The most recent (still forming) candle.
    pub async fn latest_candle(&self, pair: &str, interval: u32) -> BotResult<Ohlc> {
        let candles = self.get_ohlc_data(pair, interval).await?;
        candles
            .last()
            .cloned()
            .ok_or_else(|| BotError::Exchange(format!("empty OHLC response for {}", pair)))
    }

    pub async fn get_account_balance(&self) -> BotResult<HashMap<String, f64>> {
        self.with_retries("Balance fetch", || self.exchange.get_account_balance())
            .await
    }

    pub async fn get_extended_balance(&self) -> BotResult<HashMap<String, f64>> {
        self.with_retries("Extended balance fetch", || {
            self.exchange.get_extended_balance()
        })
        .await
    }

    pub async fn add_order(&self, request: &OrderRequest) -> BotResult<AddOrderReceipt> {
        let receipt = self
            .with_retries("AddOrder", || self.exchange.add_order(request))
            .await?;
        info!("📬 Order accepted: {} ({})", receipt.descr, receipt.txid);
        Ok(receipt)
    }

    /// Batched status lookup; txids are joined into one comma-separated query.
    pub async fn get_orders_info(
        &self,
        txids: &[String],
        trades: bool,
    ) -> BotResult<HashMap<String, OrderInfo>> {
        if txids.is_empty() {
            return Ok(HashMap::new());
        }
        let joined = txids.join(",");
        self.with_retries("QueryOrders", || {
            self.exchange.get_orders_info(&joined, trades)
        })
        .await
    }

    pub async fn cancel_order(&self, txid: &str) -> BotResult<()> {
        self.with_retries("CancelOrder", || self.exchange.cancel_order(txid))
            .await
    }

    /// Blocks until the order closes, polling at the bot's cycle interval.
    /// Errors if the order reaches a terminal state without filling.
    pub async fn wait_for_close(&self, txid: &str) -> BotResult<OrderInfo> {
        let query = vec![txid.to_string()];
        loop {
            let infos = self.get_orders_info(&query, true).await?;
            let info = infos
                .get(txid)
                .ok_or_else(|| BotError::Exchange(format!("order {} not found", txid)))?;
            if info.status == crate::types::RemoteStatus::Closed {
                return Ok(info.clone());
            }
            if info.status.is_terminal_unfilled() {
                return Err(BotError::OrderRejected(format!(
                    "order {} ended {:?} without filling",
                    txid, info.status
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::PaperExchange;
    use crate::types::{BotMode, OrderSide};

    fn fast_settings() -> BotSettings {
        BotSettings {
            name: "test".to_string(),
            pair: "XBTUSD".to_string(),
            base_currency: "ZUSD".to_string(),
            mode: BotMode::Test,
            latency_secs: 0.001,
            max_error_count: 3,
            error_latency_secs: 0.001,
            ohlc_interval: 60,
        }
    }

    fn controller(paper: &Arc<PaperExchange>) -> OrderExecutionController<PaperExchange> {
        OrderExecutionController::new(paper.clone(), &fast_settings())
    }

    #[tokio::test]
    async fn recovers_within_retry_budget() {
        let paper = Arc::new(PaperExchange::new("ZUSD", 1000.0));
        paper.push_price(10.0);
        paper.inject_failures(2);
        let balances = controller(&paper).get_account_balance().await.unwrap();
        assert_eq!(balances["ZUSD"], 1000.0);
    }

    #[tokio::test]
    async fn exhausted_retries_become_fatal() {
        let paper = Arc::new(PaperExchange::new("ZUSD", 1000.0));
        paper.push_price(10.0);
        paper.inject_failures(5);
        let err = controller(&paper).get_account_balance().await.unwrap_err();
        assert!(matches!(
            err,
            BotError::RetriesExhausted { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn wait_for_close_returns_fill() {
        let paper = Arc::new(PaperExchange::new("ZUSD", 1000.0));
        paper.push_price(10.0);
        let exec = controller(&paper);
        let receipt = exec
            .add_order(&OrderRequest::limit("XBTUSD", OrderSide::Buy, 1.0, 9.0))
            .await
            .unwrap();
        paper.fill(&receipt.txid);
        let info = exec.wait_for_close(&receipt.txid).await.unwrap();
        assert_eq!(info.price, 9.0);
    }

    #[tokio::test]
    async fn wait_for_close_rejects_canceled_orders() {
        let paper = Arc::new(PaperExchange::new("ZUSD", 1000.0));
        paper.push_price(10.0);
        let exec = controller(&paper);
        let receipt = exec
            .add_order(&OrderRequest::limit("XBTUSD", OrderSide::Buy, 1.0, 9.0))
            .await
            .unwrap();
        paper.cancel_order(&receipt.txid).await.unwrap();
        let err = exec.wait_for_close(&receipt.txid).await.unwrap_err();
        assert!(matches!(err, BotError::OrderRejected(_)));
    }

    #[tokio::test]
    async fn empty_txid_batch_short_circuits() {
        let paper = Arc::new(PaperExchange::new("ZUSD", 1000.0));
        let infos = controller(&paper).get_orders_info(&[], true).await.unwrap();
        assert!(infos.is_empty());
    }
}

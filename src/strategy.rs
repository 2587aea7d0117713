// Signal sources for the signal-driven bot

use crate::clients::Exchange;
use crate::config::BotSettings;
use crate::core::executor::OrderExecutionController;
use crate::error::BotResult;
use crate::types::{Ohlc, Signal};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces the BUY/SELL/HOLD decision each trading cycle. Implementations
/// fetch whatever market data they need through the retrying controller.
#[async_trait]
pub trait Strategy: Send {
    async fn generate_signal(&mut self) -> BotResult<Signal>;

    /// The most recent candle, used for marking and exit checks.
    async fn latest_ohlc(&mut self) -> BotResult<Ohlc>;
}

/// Moving-average crossover: the ratio of a short SMA over a long SMA maps
/// to BUY above the hold band, SELL below it, HOLD inside it.
pub struct SmaCrossStrategy<E> {
    exec: OrderExecutionController<E>,
    pair: String,
    interval: u32,
    short_window: usize,
    long_window: usize,
    hold_band: f64,
}

impl<E: Exchange> SmaCrossStrategy<E> {
    pub fn new(
        exchange: Arc<E>,
        settings: &BotSettings,
        short_window: usize,
        long_window: usize,
        hold_band: f64,
    ) -> Self {
        Self {
            exec: OrderExecutionController::new(exchange, settings),
            pair: settings.pair.clone(),
            interval: settings.ohlc_interval,
            short_window,
            long_window,
            hold_band,
        }
    }

    fn tail_mean(closes: &[f64], window: usize) -> f64 {
        let tail = &closes[closes.len() - window..];
        tail.iter().sum::<f64>() / window as f64
    }

    fn classify(&self, closes: &[f64]) -> Signal {
        if closes.len() < self.long_window {
            warn!(
                "Only {} candles available, need {} for the long SMA; holding",
                closes.len(),
                self.long_window
            );
            return Signal::Hold;
        }
        let short_ma = Self::tail_mean(closes, self.short_window);
        let long_ma = Self::tail_mean(closes, self.long_window);
        if long_ma <= 0.0 {
            return Signal::Hold;
        }
        let ratio = short_ma / long_ma;
        debug!(
            "SMA {}={:.6} / {}={:.6}, ratio {:.6}",
            self.short_window, short_ma, self.long_window, long_ma, ratio
        );
        if ratio > 1.0 + self.hold_band {
            Signal::Buy
        } else if ratio < 1.0 - self.hold_band {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}

#[async_trait]
impl<E: Exchange> Strategy for SmaCrossStrategy<E> {
    async fn generate_signal(&mut self) -> BotResult<Signal> {
        let candles = self.exec.get_ohlc_data(&self.pair, self.interval).await?;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        Ok(self.classify(&closes))
    }

    async fn latest_ohlc(&mut self) -> BotResult<Ohlc> {
        self.exec.latest_candle(&self.pair, self.interval).await
    }
}

/// Never trades; useful for watching a pair with the full loop running.
pub struct HoldStrategy<E> {
    exec: OrderExecutionController<E>,
    pair: String,
    interval: u32,
}

impl<E: Exchange> HoldStrategy<E> {
    pub fn new(exchange: Arc<E>, settings: &BotSettings) -> Self {
        Self {
            exec: OrderExecutionController::new(exchange, settings),
            pair: settings.pair.clone(),
            interval: settings.ohlc_interval,
        }
    }
}

#[async_trait]
impl<E: Exchange> Strategy for HoldStrategy<E> {
    async fn generate_signal(&mut self) -> BotResult<Signal> {
        Ok(Signal::Hold)
    }

    async fn latest_ohlc(&mut self) -> BotResult<Ohlc> {
        self.exec.latest_candle(&self.pair, self.interval).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::PaperExchange;
    use crate::types::BotMode;

    fn settings() -> BotSettings {
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

    fn strategy_with_tape(prices: &[f64]) -> SmaCrossStrategy<PaperExchange> {
        let paper = Arc::new(PaperExchange::new("ZUSD", 1000.0));
        for price in prices {
            paper.push_price(*price);
        }
        SmaCrossStrategy::new(paper, &settings(), 2, 4, 0.001)
    }

    #[tokio::test]
    async fn rising_tape_signals_buy() {
        let mut strategy = strategy_with_tape(&[10.0, 11.0, 12.0, 13.0]);
        assert_eq!(strategy.generate_signal().await.unwrap(), Signal::Buy);
    }

    #[tokio::test]
    async fn falling_tape_signals_sell() {
        let mut strategy = strategy_with_tape(&[13.0, 12.0, 11.0, 10.0]);
        assert_eq!(strategy.generate_signal().await.unwrap(), Signal::Sell);
    }

    #[tokio::test]
    async fn flat_tape_holds() {
        let mut strategy = strategy_with_tape(&[10.0, 10.0, 10.0, 10.0]);
        assert_eq!(strategy.generate_signal().await.unwrap(), Signal::Hold);
    }

    #[tokio::test]
    async fn short_history_holds() {
        let mut strategy = strategy_with_tape(&[10.0, 11.0]);
        assert_eq!(strategy.generate_signal().await.unwrap(), Signal::Hold);
    }

    #[tokio::test]
    async fn latest_ohlc_is_last_pushed_price() {
        let mut strategy = strategy_with_tape(&[10.0, 11.0, 12.0]);
        assert_eq!(strategy.latest_ohlc().await.unwrap().close, 12.0);
    }
}

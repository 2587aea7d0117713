// Shared fixtures for integration tests

use async_trait::async_trait;
use spot_trading_bot::config::{
    ApiConfig, BotSettings, Config, GridConfig, PersistenceConfig, RiskConfig, StrategyKind,
};
use spot_trading_bot::{BotMode, BotResult, Exchange, Ohlc, PaperExchange, Signal, Strategy};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

/// A config tuned for tests: millisecond latencies, tight retry budget.
pub fn fast_config(state_dir: &Path) -> Config {
    Config {
        api: ApiConfig {
            api_key: "test-key".to_string(),
            api_secret: "c2VjcmV0".to_string(),
            rest_url: "http://localhost:1".to_string(),
        },
        bot: BotSettings {
            name: "test-bot".to_string(),
            pair: "XBTUSD".to_string(),
            base_currency: "ZUSD".to_string(),
            mode: BotMode::Test,
            latency_secs: 0.001,
            max_error_count: 3,
            error_latency_secs: 0.001,
            ohlc_interval: 60,
        },
        risk: RiskConfig {
            risk_per_trade: 0.01,
            max_position_pct: 0.2,
            max_drawdown_pct: 0.15,
        },
        grid: GridConfig {
            lower_price: 5.0,
            upper_price: 8.0,
            level_num: 4,
            quantity_per_level: 1.0,
            stop_loss: 4.5,
            cancel_orders_on_exit: true,
        },
        strategy: StrategyKind::Hold,
        persistence: PersistenceConfig {
            state_dir: state_dir.to_string_lossy().into_owned(),
        },
    }
}

/// Emits a fixed sequence of signals, then holds forever. Market data comes
/// from the shared paper exchange.
pub struct ScriptedStrategy {
    paper: Arc<PaperExchange>,
    signals: VecDeque<Signal>,
}

impl ScriptedStrategy {
    pub fn new(paper: Arc<PaperExchange>, signals: &[Signal]) -> Self {
        Self {
            paper,
            signals: signals.iter().copied().collect(),
        }
    }
}

#[async_trait]
impl Strategy for ScriptedStrategy {
    async fn generate_signal(&mut self) -> BotResult<Signal> {
        Ok(self.signals.pop_front().unwrap_or(Signal::Hold))
    }

    async fn latest_ohlc(&mut self) -> BotResult<Ohlc> {
        let candles = self.paper.get_ohlc_data("XBTUSD", 60).await?;
        Ok(candles.last().cloned().expect("paper tape is empty"))
    }
}

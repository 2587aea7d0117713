// Grid bot control loop

use crate::clients::Exchange;
use crate::config::Config;
use crate::core::bot::{BotControl, BotState, SharedState};
use crate::core::executor::OrderExecutionController;
use crate::core::grid::GridLadder;
use crate::error::BotResult;
use crate::persistence::JsonStateStore;
use crate::types::BotMode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// Runs a fixed-price ladder on one pair: arm the grid once, then poll fills
/// and walk the ladder until stopped or the stop-loss price prints.
pub struct GridBot<E> {
    state: SharedState,
    control: Arc<BotControl>,
    exec: OrderExecutionController<E>,
    store: JsonStateStore,
    ladder: Option<GridLadder>,
    config: Config,
    latency: Duration,
}

impl<E: Exchange> GridBot<E> {
    pub fn new(exchange: Arc<E>, config: &Config, store: JsonStateStore) -> Self {
        let state = BotState::new(&config.bot.name, &config.bot.pair, config.bot.mode);
        Self {
            state: Arc::new(Mutex::new(state)),
            control: Arc::new(BotControl::new()),
            exec: OrderExecutionController::new(exchange, &config.bot),
            store,
            ladder: None,
            config: config.clone(),
            latency: Duration::from_secs_f64(config.bot.latency_secs),
        }
    }

    pub fn control(&self) -> Arc<BotControl> {
        self.control.clone()
    }

    pub fn shared_state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn ladder(&self) -> Option<&GridLadder> {
        self.ladder.as_ref()
    }

    /// Runs until stopped, the stop-loss triggers, or a fatal error. Resting
    /// orders are cancelled on the way out when configured, and the final
    /// state is persisted on every exit path.
    pub async fn run(mut self) -> BotResult<()> {
        {
            let state = self.state.lock().unwrap();
            info!(
                "🚀 Grid bot '{}' starting on {} in {} mode ({} levels {:.4}..{:.4})",
                state.name,
                state.pair,
                state.mode,
                self.config.grid.level_num,
                self.config.grid.lower_price,
                self.config.grid.upper_price
            );
            if state.mode == BotMode::Test {
                info!("🧪 Test mode: orders are validate-only");
            }
        }
        let outcome = self.trading_loop().await;

        if self.config.grid.cancel_orders_on_exit {
            self.cancel_resting_orders().await;
        }
        {
            let mut state = self.state.lock().unwrap();
            state.is_running = false;
            state.is_paused = false;
        }
        if let Err(err) = self.persist() {
            warn!("Failed to persist final grid state: {}", err);
        }
        if let Err(err) = &outcome {
            error!("💥 Grid bot stopped on error: {}", err);
        }
        outcome
    }

    async fn trading_loop(&mut self) -> BotResult<()> {
        let pair = self.config.bot.pair.clone();
        let interval = self.config.bot.ohlc_interval;

        let candle = self.exec.latest_candle(&pair, interval).await?;
        let mut ladder = GridLadder::new(&pair, &self.config.grid, candle.close)?;
        info!(
            "🪜 Ladder built around close {:.4}; hole at level {}, seed {:.8}",
            candle.close,
            ladder.inactive_index(),
            ladder.seed_quantity()
        );

        let mut journal = Vec::new();
        let armed = ladder
            .place_initial_orders(&self.exec, candle.close, &mut journal)
            .await;
        self.append_journal(journal);
        armed?;
        self.ladder = Some(ladder);
        self.persist()?;

        loop {
            if !self.control.is_running() {
                info!("🛑 Stop requested; shutting down cleanly");
                return Ok(());
            }
            if self.control.is_paused() {
                self.state.lock().unwrap().is_paused = true;
                tokio::time::sleep(self.latency).await;
                continue;
            }
            self.state.lock().unwrap().is_paused = false;

            let mut journal = Vec::new();
            let Some(ladder) = self.ladder.as_mut() else {
                return Err(crate::error::BotError::Internal("ladder was never armed".into()));
            };
            let polled = ladder.update_orders(&self.exec, &mut journal).await;
            let realized = ladder.realized_gain();
            self.append_journal(journal);
            let fills = polled?;
            if fills > 0 {
                info!("💰 {} fill(s) handled, realized gain {:+.4}", fills, realized);
            }
            self.state.lock().unwrap().realized_gain = realized;

            let candle = self.exec.latest_candle(&pair, interval).await?;
            if candle.close <= self.config.grid.stop_loss {
                warn!(
                    "🛑 Close {:.4} at or below stop-loss {:.4}; dismantling grid",
                    candle.close, self.config.grid.stop_loss
                );
                return Ok(());
            }

            self.persist()?;
            tokio::time::sleep(self.latency).await;
        }
    }

    async fn cancel_resting_orders(&self) {
        let Some(ladder) = &self.ladder else {
            return;
        };
        for (index, txid) in ladder.outstanding_txids() {
            match self.exec.cancel_order(&txid).await {
                Ok(()) => info!("🧹 Cancelled level {} order {}", index, txid),
                Err(err) => warn!("Could not cancel level {} order {}: {}", index, txid, err),
            }
        }
    }

    fn append_journal(&self, txids: Vec<String>) {
        if txids.is_empty() {
            return;
        }
        self.state
            .lock()
            .unwrap()
            .open_order_txids
            .extend(txids);
    }

    fn persist(&self) -> BotResult<()> {
        let snapshot = self.state.lock().unwrap().clone();
        self.store.save(&snapshot)?;
        Ok(())
    }
}

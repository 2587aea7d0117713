// Signal-driven bot control loop

use crate::clients::{Exchange, OrderRequest};
use crate::config::Config;
use crate::core::executor::OrderExecutionController;
use crate::core::position::PositionManager;
use crate::core::risk::{ProposedOrder, RiskManager};
use crate::error::BotResult;
use crate::persistence::JsonStateStore;
use crate::strategy::Strategy;
use crate::types::{BotMode, OrderKind, OrderSide, PositionSide, Signal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Everything about a bot worth surviving a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotState {
    pub name: String,
    pub pair: String,
    pub mode: BotMode,
    pub is_running: bool,
    pub is_paused: bool,
    pub start_time: DateTime<Utc>,
    pub realized_gain: f64,
    #[serde(default)]
    pub unrealized_gain: f64,
    /// Append-only journal of every txid this bot has submitted.
    pub open_order_txids: Vec<String>,
}

impl BotState {
    pub fn new(name: &str, pair: &str, mode: BotMode) -> Self {
        Self {
            name: name.to_string(),
            pair: pair.to_string(),
            mode,
            is_running: true,
            is_paused: false,
            start_time: Utc::now(),
            realized_gain: 0.0,
            unrealized_gain: 0.0,
            open_order_txids: Vec::new(),
        }
    }

    /// Seconds since the bot started.
    pub fn runtime_secs(&self) -> f64 {
        (Utc::now() - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    pub fn status(&self) -> BotStatus {
        BotStatus {
            name: self.name.clone(),
            pair: self.pair.clone(),
            mode: self.mode,
            is_running: self.is_running,
            is_paused: self.is_paused,
            runtime_secs: self.runtime_secs(),
            realized_gain: self.realized_gain,
            unrealized_gain: self.unrealized_gain,
        }
    }
}

pub type SharedState = Arc<Mutex<BotState>>;

/// Point-in-time view of a bot, safe to hand to a management surface.
#[derive(Debug, Clone, Serialize)]
pub struct BotStatus {
    pub name: String,
    pub pair: String,
    pub mode: BotMode,
    pub is_running: bool,
    pub is_paused: bool,
    pub runtime_secs: f64,
    pub realized_gain: f64,
    pub unrealized_gain: f64,
}

/// Cooperative flags shared between a bot's worker and its controllers.
/// The worker checks them at the top of every cycle; nothing is interrupted
/// mid-operation.
#[derive(Debug)]
pub struct BotControl {
    running: AtomicBool,
    paused: AtomicBool,
}

impl Default for BotControl {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
        }
    }
}

impl BotControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Runs one pair on one strategy: poll a signal, size the entry against the
/// risk limits, and manage the single open position until an exit.
pub struct BotController<E, S> {
    state: SharedState,
    control: Arc<BotControl>,
    strategy: S,
    risk: RiskManager,
    positions: PositionManager,
    exec: OrderExecutionController<E>,
    store: JsonStateStore,
    pair: String,
    base_currency: String,
    latency: Duration,
}

impl<E: Exchange, S: Strategy> BotController<E, S> {
    pub fn new(exchange: Arc<E>, strategy: S, config: &Config, store: JsonStateStore) -> Self {
        let state = BotState::new(&config.bot.name, &config.bot.pair, config.bot.mode);
        Self {
            state: Arc::new(Mutex::new(state)),
            control: Arc::new(BotControl::new()),
            strategy,
            // the peak starts at zero and lifts to the first observed balance
            risk: RiskManager::new(0.0, &config.risk),
            positions: PositionManager::new(),
            exec: OrderExecutionController::new(exchange, &config.bot),
            store,
            pair: config.bot.pair.clone(),
            base_currency: config.bot.base_currency.clone(),
            latency: Duration::from_secs_f64(config.bot.latency_secs),
        }
    }

    pub fn control(&self) -> Arc<BotControl> {
        self.control.clone()
    }

    pub fn shared_state(&self) -> SharedState {
        self.state.clone()
    }

    /// Runs until stopped or a fatal error. The final state is persisted on
    /// every exit path before the outcome is reported.
    pub async fn run(mut self) -> BotResult<()> {
        {
            let state = self.state.lock().unwrap();
            info!(
                "🚀 Bot '{}' starting on {} in {} mode",
                state.name, state.pair, state.mode
            );
        }
        let outcome = self.trading_loop().await;

        {
            let mut state = self.state.lock().unwrap();
            state.is_running = false;
            state.is_paused = false;
        }
        if let Err(err) = self.persist() {
            warn!("Failed to persist final bot state: {}", err);
        }
        if let Err(err) = &outcome {
            error!("💥 Bot stopped on error: {}", err);
        }
        outcome
    }

    async fn trading_loop(&mut self) -> BotResult<()> {
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

            self.run_cycle().await?;
            self.persist()?;
            tokio::time::sleep(self.latency).await;
        }
    }

    async fn run_cycle(&mut self) -> BotResult<()> {
        let candle = self.strategy.latest_ohlc().await?;
        let price = candle.close;

        let unrealized = self.positions.calculate_pnl(price);
        self.state.lock().unwrap().unrealized_gain = unrealized;

        if self.positions.check_exit_conditions(price) {
            info!("🎯 Exit condition hit at {:.4}", price);
            self.exit_position(price).await?;
            return Ok(());
        }

        let signal = self.strategy.generate_signal().await?;
        debug!("Signal at {:.4}: {:?}", price, signal);
        let desired = match signal {
            Signal::Hold => return Ok(()),
            Signal::Buy => PositionSide::Long,
            Signal::Sell => PositionSide::Short,
        };

        if let Some(position) = self.positions.position() {
            if position.side == desired {
                debug!("Already holding {:?}; no pyramiding", desired);
                return Ok(());
            }
            info!("🔄 Signal reversed; closing {:?} first", position.side);
            self.exit_position(price).await?;
        }
        self.enter_position(desired, price).await
    }

    async fn enter_position(&mut self, side: PositionSide, price: f64) -> BotResult<()> {
        let balances = self.exec.get_extended_balance().await?;
        let balance = balances.get(&self.base_currency).copied().unwrap_or(0.0);
        if balance <= 0.0 {
            warn!("No spendable {} balance; skipping entry", self.base_currency);
            return Ok(());
        }

        let (quantity, stop_price) = self.risk.calculate_position_size(balance, price, side);
        if quantity <= 0.0 {
            warn!("Position sized to zero at {:.4}; skipping entry", price);
            return Ok(());
        }
        let proposed = ProposedOrder {
            price,
            quantity,
            stop_price: Some(stop_price),
        };
        if !self.risk.validate_order(&proposed, balance) {
            return Ok(());
        }
        let take_profit = self.risk.derive_take_profit(price, side);

        let entry_side = match side {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        };
        // the stop rides along as a conditional close; the profit target is
        // its own resting order
        let entry = OrderRequest::market(&self.pair, entry_side, quantity)
            .with_close(OrderKind::StopLossLimit, stop_price);
        let receipt = self.exec.add_order(&entry).await?;
        self.journal_txid(&receipt.txid);

        let target = OrderRequest {
            pair: self.pair.clone(),
            side: entry_side.opposite(),
            kind: OrderKind::TakeProfitLimit,
            volume: quantity,
            price: Some(take_profit),
            close_kind: None,
            close_price: None,
            post_only: false,
        };
        let target_receipt = self.exec.add_order(&target).await?;
        self.journal_txid(&target_receipt.txid);

        self.positions.open_position(
            &self.pair,
            side,
            price,
            quantity,
            Some(stop_price),
            Some(take_profit),
        )?;
        self.positions.attach_protective_order(&target_receipt.txid);
        Ok(())
    }

    async fn exit_position(&mut self, price: f64) -> BotResult<()> {
        let Some(position) = self.positions.position() else {
            return Ok(());
        };
        let exit_side = match position.side {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        };
        let request = OrderRequest::market(&self.pair, exit_side, position.quantity);
        let protective = position.protective_txids.clone();
        let receipt = self.exec.add_order(&request).await?;
        self.journal_txid(&receipt.txid);

        // the profit target (and any other resting guard) must not survive
        // the position it protects
        for txid in &protective {
            if let Err(err) = self.exec.cancel_order(txid).await {
                warn!("Failed to cancel protective order {}: {}", txid, err);
            }
        }

        let pnl = self.positions.close_position(price);
        let mut state = self.state.lock().unwrap();
        state.realized_gain += pnl;
        state.unrealized_gain = 0.0;
        Ok(())
    }

    fn journal_txid(&self, txid: &str) {
        if !txid.is_empty() {
            self.state
                .lock()
                .unwrap()
                .open_order_txids
                .push(txid.to_string());
        }
    }

    fn persist(&self) -> BotResult<()> {
        let snapshot = self.state.lock().unwrap().clone();
        self.store.save(&snapshot)?;
        Ok(())
    }
}

// Fixed-price grid ladder and its order lifecycle

use crate::clients::Exchange;
use crate::config::GridConfig;
use crate::core::executor::OrderExecutionController;
use crate::error::{BotError, BotResult};
use crate::types::{OrderSide, RemoteStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelStatus {
    /// The level has (or is about to get) a resting limit order.
    Active,
    /// The hole in the ladder: the level closest to the last traded region.
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelOrder {
    pub txid: String,
    pub status: RemoteStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridLevel {
    pub index: usize,
    pub limit_price: f64,
    pub side: OrderSide,
    pub status: LevelStatus,
    pub order: Option<LevelOrder>,
}

/// A level order that filled, kept for accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilledLevelOrder {
    pub txid: String,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: f64,
    pub filled_at: DateTime<Utc>,
}

/// Evenly spaced ladder of limit orders between two price bounds.
///
/// Steady state keeps exactly one level inactive; every fill deactivates the
/// filled level and re-arms its neighbour on the opposite side, walking the
/// hole up and down with the price.
pub struct GridLadder {
    pair: String,
    quantity_per_level: f64,
    levels: Vec<GridLevel>,
    filled: Vec<FilledLevelOrder>,
    realized_gain: f64,
}

impl GridLadder {
    pub fn new(pair: &str, grid: &GridConfig, latest_close: f64) -> BotResult<Self> {
        if grid.level_num < 2 {
            return Err(BotError::Config("grid needs at least 2 levels".into()));
        }
        if grid.upper_price <= grid.lower_price {
            return Err(BotError::Config("grid bounds are inverted".into()));
        }

        let step = (grid.upper_price - grid.lower_price) / (grid.level_num - 1) as f64;
        let mut levels = Vec::with_capacity(grid.level_num);
        for index in 0..grid.level_num {
            let limit_price = grid.lower_price + step * index as f64;
            let side = if latest_close > limit_price {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            };
            levels.push(GridLevel {
                index,
                limit_price,
                side,
                status: LevelStatus::Active,
                order: None,
            });
        }

        // Leave the level closest to the current price without an order.
        // Ties resolve to the first minimum in an ascending scan.
        let mut closest = 0;
        let mut best = f64::INFINITY;
        for level in &levels {
            let distance = (level.limit_price - latest_close).abs();
            if distance < best {
                best = distance;
                closest = level.index;
            }
        }
        levels[closest].status = LevelStatus::Inactive;

        let ladder = Self {
            pair: pair.to_string(),
            quantity_per_level: grid.quantity_per_level,
            levels,
            filled: Vec::new(),
            realized_gain: 0.0,
        };
        ladder.check_invariants()?;
        Ok(ladder)
    }

    pub fn levels(&self) -> &[GridLevel] {
        &self.levels
    }

    pub fn filled_orders(&self) -> &[FilledLevelOrder] {
        &self.filled
    }

    pub fn realized_gain(&self) -> f64 {
        self.realized_gain
    }

    pub fn inactive_index(&self) -> usize {
        self.levels
            .iter()
            .position(|l| l.status == LevelStatus::Inactive)
            .unwrap_or(0)
    }

    /// Base inventory the ladder needs before its sell orders can rest:
    /// one level quantity per active sell level.
    pub fn seed_quantity(&self) -> f64 {
        let sell_levels = self
            .levels
            .iter()
            .filter(|l| l.status == LevelStatus::Active && l.side == OrderSide::Sell)
            .count();
        sell_levels as f64 * self.quantity_per_level
    }

    /// Quote capital needed if every level order filled once.
    pub fn total_investment(&self) -> f64 {
        self.levels
            .iter()
            .map(|l| l.limit_price * self.quantity_per_level)
            .sum()
    }

    /// Largest per-level quantity a capital budget supports on this ladder.
    pub fn max_quantity_per_level(&self, total_investment: f64) -> f64 {
        let price_sum: f64 = self.levels.iter().map(|l| l.limit_price).sum();
        if price_sum <= 0.0 {
            return 0.0;
        }
        total_investment / price_sum
    }

    /// Transaction ids of level orders that are still working.
    pub fn outstanding_txids(&self) -> Vec<(usize, String)> {
        self.levels
            .iter()
            .filter_map(|level| {
                level.order.as_ref().and_then(|order| {
                    (!order.txid.is_empty() && order.status != RemoteStatus::Closed)
                        .then(|| (level.index, order.txid.clone()))
                })
            })
            .collect()
    }

    /// Buys seed inventory (blocking until it fills), then rests one limit
    /// order per active level. Every submitted txid is appended to the
    /// caller's journal before anything can fail.
    pub async fn place_initial_orders<E: Exchange>(
        &mut self,
        exec: &OrderExecutionController<E>,
        latest_close: f64,
        order_journal: &mut Vec<String>,
    ) -> BotResult<()> {
        let seed = self.seed_quantity();
        if seed > 0.0 {
            info!(
                "🌱 Buying {:.8} seed inventory for {} sell levels",
                seed,
                self.levels
                    .iter()
                    .filter(|l| l.status == LevelStatus::Active && l.side == OrderSide::Sell)
                    .count()
            );
            let request = crate::clients::OrderRequest::limit(
                &self.pair,
                OrderSide::Buy,
                seed,
                latest_close,
            )
            .post_only();
            let receipt = exec.add_order(&request).await?;
            if !receipt.txid.is_empty() {
                order_journal.push(receipt.txid.clone());
                exec.wait_for_close(&receipt.txid).await?;
                info!("🌱 Seed order {} filled", receipt.txid);
            }
        }

        for index in 0..self.levels.len() {
            if self.levels[index].status != LevelStatus::Active {
                continue;
            }
            let txid = self.place_level_order(exec, index, order_journal).await?;
            info!(
                "🪜 Level {} armed: {} {:.8} @ {:.4} ({})",
                index,
                self.levels[index].side,
                self.quantity_per_level,
                self.levels[index].limit_price,
                txid
            );
        }
        self.check_invariants()
    }

    /// Polls every working level order in one batched query and walks the
    /// ladder for each fill. Returns the number of fills handled.
    pub async fn update_orders<E: Exchange>(
        &mut self,
        exec: &OrderExecutionController<E>,
        order_journal: &mut Vec<String>,
    ) -> BotResult<usize> {
        let outstanding = self.outstanding_txids();
        if outstanding.is_empty() {
            return Ok(0);
        }
        let txids: Vec<String> = outstanding.iter().map(|(_, t)| t.clone()).collect();
        let infos = exec.get_orders_info(&txids, true).await?;

        let mut filled_buys = Vec::new();
        let mut filled_sells = Vec::new();
        for (index, txid) in &outstanding {
            let Some(info) = infos.get(txid) else {
                warn!("Order {} missing from QueryOrders response", txid);
                continue;
            };
            if info.status.is_terminal_unfilled() {
                return Err(BotError::OrderRejected(format!(
                    "level {} order {} ended {:?}; ladder cannot continue",
                    index, txid, info.status
                )));
            }
            if let Some(order) = self.levels[*index].order.as_mut() {
                order.status = info.status;
            }
            if info.status == RemoteStatus::Closed {
                match self.levels[*index].side {
                    OrderSide::Buy => filled_buys.push(*index),
                    OrderSide::Sell => filled_sells.push(*index),
                }
            }
        }

        // When one poll reports several fills, each must meet the hole in
        // turn: buys walk down from the top, sells walk up from the bottom.
        filled_buys.sort_unstable_by(|a, b| b.cmp(a));
        filled_sells.sort_unstable();
        let fills = filled_buys.len() + filled_sells.len();

        for index in filled_buys.into_iter().chain(filled_sells) {
            let neighbour = self.apply_fill(index)?;
            let txid = self.place_level_order(exec, neighbour, order_journal).await?;
            info!(
                "🪜 Level {} filled, re-armed level {} as {} ({})",
                index, neighbour, self.levels[neighbour].side, txid
            );
        }
        Ok(fills)
    }

    /// Pure ladder transition for a fill at `index`: the filled level becomes
    /// the hole and its neighbour on the trade's far side is flipped active.
    /// Returns the neighbour's index, which needs a fresh order.
    pub fn apply_fill(&mut self, index: usize) -> BotResult<usize> {
        let level = self
            .levels
            .get(index)
            .ok_or_else(|| BotError::InvariantViolation(format!("no grid level {}", index)))?;
        if level.status != LevelStatus::Active {
            return Err(BotError::InvariantViolation(format!(
                "fill reported for level {} which holds no order",
                index
            )));
        }
        let side = level.side;
        let price = level.limit_price;

        let neighbour = match side {
            OrderSide::Buy => {
                if index + 1 >= self.levels.len() {
                    return Err(BotError::InvariantViolation(
                        "buy filled at the top of the ladder; no level left to sell on".into(),
                    ));
                }
                index + 1
            }
            OrderSide::Sell => {
                if index == 0 {
                    return Err(BotError::InvariantViolation(
                        "sell filled at the bottom of the ladder; no level left to buy on".into(),
                    ));
                }
                index - 1
            }
        };
        if self.levels[neighbour].status != LevelStatus::Inactive {
            return Err(BotError::InvariantViolation(format!(
                "level {} filled but neighbour {} is not the ladder hole",
                index, neighbour
            )));
        }

        if let Some(order) = self.levels[index].order.take() {
            self.filled.push(FilledLevelOrder {
                txid: order.txid,
                side,
                price,
                quantity: self.quantity_per_level,
                filled_at: Utc::now(),
            });
        }
        // a sell unloads inventory bought one level below
        if side == OrderSide::Sell {
            let bought_at = self.levels[index - 1].limit_price;
            self.realized_gain += (price - bought_at) * self.quantity_per_level;
        }

        self.levels[index].status = LevelStatus::Inactive;
        self.levels[neighbour].status = LevelStatus::Active;
        self.levels[neighbour].side = side.opposite();
        self.check_invariants()?;
        Ok(neighbour)
    }

    async fn place_level_order<E: Exchange>(
        &mut self,
        exec: &OrderExecutionController<E>,
        index: usize,
        order_journal: &mut Vec<String>,
    ) -> BotResult<String> {
        let level = &self.levels[index];
        let request = crate::clients::OrderRequest::limit(
            &self.pair,
            level.side,
            self.quantity_per_level,
            level.limit_price,
        )
        .post_only();
        let receipt = exec.add_order(&request).await?;
        // validate-only submissions come back without a txid; there is
        // nothing resting on the book to track or poll
        if receipt.txid.is_empty() {
            self.levels[index].order = None;
            return Ok(receipt.txid);
        }
        order_journal.push(receipt.txid.clone());
        self.levels[index].order = Some(LevelOrder {
            txid: receipt.txid.clone(),
            status: RemoteStatus::Open,
        });
        Ok(receipt.txid)
    }

    /// The ladder's structural invariants, checked after every mutation:
    /// strictly increasing prices, exactly one inactive hole with no order,
    /// buys below the hole and sells above it.
    pub fn check_invariants(&self) -> BotResult<()> {
        for pair in self.levels.windows(2) {
            if pair[1].limit_price <= pair[0].limit_price {
                return Err(BotError::InvariantViolation(format!(
                    "level prices not strictly increasing at index {}",
                    pair[1].index
                )));
            }
        }

        let inactive: Vec<usize> = self
            .levels
            .iter()
            .filter(|l| l.status == LevelStatus::Inactive)
            .map(|l| l.index)
            .collect();
        if inactive.len() != 1 {
            return Err(BotError::InvariantViolation(format!(
                "ladder has {} inactive levels, expected exactly 1",
                inactive.len()
            )));
        }
        let hole = inactive[0];
        if self.levels[hole].order.is_some() {
            return Err(BotError::InvariantViolation(format!(
                "inactive level {} still holds an order",
                hole
            )));
        }

        for level in &self.levels {
            if level.status != LevelStatus::Active {
                continue;
            }
            let expected = if level.index < hole {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            };
            if level.side != expected {
                return Err(BotError::InvariantViolation(format!(
                    "level {} is {} but sits {} the hole at {}",
                    level.index,
                    level.side,
                    if level.index < hole { "below" } else { "above" },
                    hole
                )));
            }
        }
        Ok(())
    }
}

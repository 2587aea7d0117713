// Single-position bookkeeping for the signal-driven bot

use crate::error::{BotError, BotResult};
use crate::types::PositionSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
    /// Resting protective orders (stop / profit target) guarding this
    /// position; they must be cancelled when the position closes.
    #[serde(default)]
    pub protective_txids: Vec<String>,
}

impl Position {
    /// Signed PnL of this position marked at `current_price`.
    pub fn pnl_at(&self, current_price: f64) -> f64 {
        let per_unit = match self.side {
            PositionSide::Long => current_price - self.entry_price,
            PositionSide::Short => self.entry_price - current_price,
        };
        per_unit * self.quantity
    }
}

/// Holds at most one open position and the realized result of closed ones.
#[derive(Debug, Default)]
pub struct PositionManager {
    position: Option<Position>,
    realized_pnl: f64,
    history: Vec<Position>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a position. Fails while one is already held; there is no
    /// pyramiding.
    #[allow(clippy::too_many_arguments)]
    pub fn open_position(
        &mut self,
        ticker: &str,
        side: PositionSide,
        entry_price: f64,
        quantity: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> BotResult<()> {
        if self.position.is_some() {
            return Err(BotError::InvariantViolation(format!(
                "cannot open {} position on {}: a position is already held",
                match side {
                    PositionSide::Long => "long",
                    PositionSide::Short => "short",
                },
                ticker
            )));
        }
        info!(
            "📈 Opened {:?} {} x{:.8} @ {:.4} (stop {:?}, target {:?})",
            side, ticker, quantity, entry_price, stop_loss, take_profit
        );
        self.position = Some(Position {
            ticker: ticker.to_string(),
            side,
            entry_price,
            quantity,
            stop_loss,
            take_profit,
            status: PositionStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
            exit_price: None,
            protective_txids: Vec::new(),
        });
        Ok(())
    }

    /// Records a resting protective order on the held position. No-op when
    /// flat.
    pub fn attach_protective_order(&mut self, txid: &str) {
        if txid.is_empty() {
            return;
        }
        if let Some(position) = self.position.as_mut() {
            position.protective_txids.push(txid.to_string());
        }
    }

    /// Closes the held position at `exit_price` and returns the realized
    /// PnL of that trade. Idempotent: returns 0.0 when flat.
    pub fn close_position(&mut self, exit_price: f64) -> f64 {
        let Some(mut position) = self.position.take() else {
            return 0.0;
        };
        let pnl = position.pnl_at(exit_price);
        position.status = PositionStatus::Closed;
        position.closed_at = Some(Utc::now());
        position.exit_price = Some(exit_price);
        info!(
            "📉 Closed {:?} {} @ {:.4}, pnl {:+.4}",
            position.side, position.ticker, exit_price, pnl
        );
        self.realized_pnl += pnl;
        self.history.push(position);
        pnl
    }

    /// Unrealized PnL at `current_price`; 0.0 when flat.
    pub fn calculate_pnl(&self, current_price: f64) -> f64 {
        self.position
            .as_ref()
            .map(|p| p.pnl_at(current_price))
            .unwrap_or(0.0)
    }

    /// True when the price has reached the stop-loss or take-profit of the
    /// held position.
    pub fn check_exit_conditions(&self, current_price: f64) -> bool {
        let Some(position) = &self.position else {
            return false;
        };
        match position.side {
            PositionSide::Long => {
                position.stop_loss.is_some_and(|s| current_price <= s)
                    || position.take_profit.is_some_and(|t| current_price >= t)
            }
            PositionSide::Short => {
                position.stop_loss.is_some_and(|s| current_price >= s)
                    || position.take_profit.is_some_and(|t| current_price <= t)
            }
        }
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn is_holding(&self) -> bool {
        self.position.is_some()
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn history(&self) -> &[Position] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_open_is_rejected() {
        let mut manager = PositionManager::new();
        manager
            .open_position("XBTUSD", PositionSide::Long, 100.0, 1.0, Some(99.0), None)
            .unwrap();
        let err = manager
            .open_position("XBTUSD", PositionSide::Short, 100.0, 1.0, None, None)
            .unwrap_err();
        assert!(matches!(err, BotError::InvariantViolation(_)));
    }

    #[test]
    fn close_is_idempotent() {
        let mut manager = PositionManager::new();
        manager
            .open_position("XBTUSD", PositionSide::Long, 100.0, 2.0, None, None)
            .unwrap();
        let pnl = manager.close_position(105.0);
        assert!((pnl - 10.0).abs() < 1e-9);
        assert_eq!(manager.close_position(110.0), 0.0);
        assert!((manager.realized_pnl() - 10.0).abs() < 1e-9);
        assert_eq!(manager.history().len(), 1);
    }

    #[test]
    fn short_pnl_inverts() {
        let mut manager = PositionManager::new();
        manager
            .open_position("XBTUSD", PositionSide::Short, 100.0, 3.0, None, None)
            .unwrap();
        assert!((manager.calculate_pnl(90.0) - 30.0).abs() < 1e-9);
        assert!((manager.calculate_pnl(110.0) + 30.0).abs() < 1e-9);
    }

    #[test]
    fn exit_conditions_respect_side() {
        let mut manager = PositionManager::new();
        manager
            .open_position(
                "XBTUSD",
                PositionSide::Long,
                100.0,
                1.0,
                Some(95.0),
                Some(110.0),
            )
            .unwrap();
        assert!(!manager.check_exit_conditions(100.0));
        assert!(manager.check_exit_conditions(94.0));
        assert!(manager.check_exit_conditions(111.0));

        let mut manager = PositionManager::new();
        manager
            .open_position(
                "XBTUSD",
                PositionSide::Short,
                100.0,
                1.0,
                Some(105.0),
                Some(90.0),
            )
            .unwrap();
        assert!(manager.check_exit_conditions(106.0));
        assert!(manager.check_exit_conditions(89.0));
        assert!(!manager.check_exit_conditions(100.0));
    }

    #[test]
    fn protective_orders_ride_on_the_held_position() {
        let mut manager = PositionManager::new();
        manager.attach_protective_order("O-ORPHAN");

        manager
            .open_position("XBTUSD", PositionSide::Long, 100.0, 1.0, Some(99.0), None)
            .unwrap();
        manager.attach_protective_order("O-TP");
        manager.attach_protective_order("");
        assert_eq!(
            manager.position().unwrap().protective_txids,
            vec!["O-TP"]
        );

        manager.close_position(100.0);
        assert_eq!(manager.history()[0].protective_txids, vec!["O-TP"]);
    }

    #[test]
    fn flat_manager_reports_nothing() {
        let manager = PositionManager::new();
        assert!(!manager.is_holding());
        assert_eq!(manager.calculate_pnl(123.0), 0.0);
        assert!(!manager.check_exit_conditions(123.0));
    }
}

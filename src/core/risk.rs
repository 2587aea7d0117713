// Position sizing and account-level risk limits

use crate::config::RiskConfig;
use crate::types::PositionSide;
use tracing::warn;

const RISK_EPSILON: f64 = 1e-9;

/// An order about to be submitted, as seen by the risk checks.
#[derive(Debug, Clone)]
pub struct ProposedOrder {
    pub price: f64,
    pub quantity: f64,
    pub stop_price: Option<f64>,
}

/// Sizes entries from a fixed risk budget and vetoes orders that would
/// breach position or drawdown limits.
pub struct RiskManager {
    risk_per_trade: f64,
    max_position_pct: f64,
    max_drawdown_pct: f64,
    peak_balance: f64,
}

impl RiskManager {
    pub fn new(initial_balance: f64, config: &RiskConfig) -> Self {
        Self {
            risk_per_trade: config.risk_per_trade,
            max_position_pct: config.max_position_pct,
            max_drawdown_pct: config.max_drawdown_pct,
            peak_balance: initial_balance,
        }
    }

    /// Returns `(quantity, stop_price)` for an entry at `entry_price`.
    ///
    /// The stop sits one risk-per-trade fraction away from the entry, and the
    /// quantity is what puts exactly the per-trade risk budget on the line,
    /// capped so the position's notional value stays within the position
    /// limit. Degenerate inputs size to zero rather than erroring.
    pub fn calculate_position_size(
        &self,
        balance: f64,
        entry_price: f64,
        side: PositionSide,
    ) -> (f64, f64) {
        let stop_price = match side {
            PositionSide::Long => entry_price * (1.0 - self.risk_per_trade),
            PositionSide::Short => entry_price * (1.0 + self.risk_per_trade),
        };

        let risk_per_unit = (entry_price - stop_price).abs();
        if balance <= 0.0 || entry_price <= 0.0 || risk_per_unit <= 0.0 {
            return (0.0, stop_price);
        }

        let risk_quantity = (balance * self.risk_per_trade) / risk_per_unit;
        let position_cap = (balance * self.max_position_pct) / entry_price;
        (risk_quantity.min(position_cap), stop_price)
    }

    /// Profit target mirroring the derived stop on the other side of entry.
    pub fn derive_take_profit(&self, entry_price: f64, side: PositionSide) -> f64 {
        match side {
            PositionSide::Long => entry_price * (1.0 + self.risk_per_trade),
            PositionSide::Short => entry_price * (1.0 - self.risk_per_trade),
        }
    }

    /// Final gate before submission. Fails closed: any breached limit vetoes
    /// the order.
    pub fn validate_order(&mut self, order: &ProposedOrder, balance: f64) -> bool {
        if !self.check_drawdown(balance) {
            warn!("🛑 Order vetoed: drawdown limit breached");
            return false;
        }

        let position_value = order.price * order.quantity;
        let max_value = self.calculate_max_position(balance);
        if position_value > max_value + RISK_EPSILON {
            warn!(
                "🛑 Order vetoed: position value {:.2} exceeds limit {:.2}",
                position_value, max_value
            );
            return false;
        }

        if let Some(stop_price) = order.stop_price {
            let risk_amount = (order.price - stop_price).abs() * order.quantity;
            let risk_budget = balance * self.risk_per_trade;
            if risk_amount > risk_budget + RISK_EPSILON {
                warn!(
                    "🛑 Order vetoed: risk {:.2} exceeds budget {:.2}",
                    risk_amount, risk_budget
                );
                return false;
            }
        }

        true
    }

    /// Tracks the balance high-water mark and passes while the drop from it
    /// stays within the configured fraction. A non-positive peak passes.
    pub fn check_drawdown(&mut self, balance: f64) -> bool {
        if balance > self.peak_balance {
            self.peak_balance = balance;
        }
        if self.peak_balance <= 0.0 {
            return true;
        }
        let drawdown = (self.peak_balance - balance) / self.peak_balance;
        drawdown <= self.max_drawdown_pct
    }

    pub fn calculate_max_position(&self, balance: f64) -> f64 {
        balance * self.max_position_pct
    }

    pub fn peak_balance(&self) -> f64 {
        self.peak_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RiskConfig {
        RiskConfig {
            risk_per_trade: 0.01,
            max_position_pct: 0.2,
            max_drawdown_pct: 0.15,
        }
    }

    #[test]
    fn long_entry_is_capped_by_position_limit() {
        let risk = RiskManager::new(10_000.0, &config());
        let (quantity, stop) = risk.calculate_position_size(10_000.0, 100.0, PositionSide::Long);
        assert!((stop - 99.0).abs() < 1e-9);
        // risk budget alone would allow 100 units; the 20% cap wins
        assert!((quantity - 20.0).abs() < 1e-9);
    }

    #[test]
    fn short_stop_sits_above_entry() {
        let risk = RiskManager::new(10_000.0, &config());
        let (quantity, stop) = risk.calculate_position_size(10_000.0, 100.0, PositionSide::Short);
        assert!((stop - 101.0).abs() < 1e-9);
        assert!((quantity - 20.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_inputs_size_to_zero() {
        let risk = RiskManager::new(10_000.0, &config());
        let (quantity, _) = risk.calculate_position_size(0.0, 100.0, PositionSide::Long);
        assert_eq!(quantity, 0.0);
        let (quantity, _) = risk.calculate_position_size(10_000.0, 0.0, PositionSide::Long);
        assert_eq!(quantity, 0.0);
    }

    #[test]
    fn self_sized_order_passes_validation() {
        let mut risk = RiskManager::new(10_000.0, &config());
        let (quantity, stop) = risk.calculate_position_size(10_000.0, 100.0, PositionSide::Long);
        let order = ProposedOrder {
            price: 100.0,
            quantity,
            stop_price: Some(stop),
        };
        assert!(risk.validate_order(&order, 10_000.0));
    }

    #[test]
    fn oversized_position_is_vetoed() {
        let mut risk = RiskManager::new(10_000.0, &config());
        let order = ProposedOrder {
            price: 100.0,
            quantity: 25.0,
            stop_price: Some(99.0),
        };
        assert!(!risk.validate_order(&order, 10_000.0));
    }

    #[test]
    fn oversized_risk_is_vetoed() {
        let mut risk = RiskManager::new(10_000.0, &config());
        // within the position cap but the stop is far enough to risk 2%
        let order = ProposedOrder {
            price: 100.0,
            quantity: 10.0,
            stop_price: Some(80.0),
        };
        assert!(!risk.validate_order(&order, 10_000.0));
    }

    #[test]
    fn drawdown_peak_is_monotone() {
        let mut risk = RiskManager::new(10_000.0, &config());
        assert!(risk.check_drawdown(12_000.0));
        assert_eq!(risk.peak_balance(), 12_000.0);
        // 15% below the new 12k peak, not the original 10k
        assert!(risk.check_drawdown(10_500.0));
        assert!(!risk.check_drawdown(10_000.0));
        // peak never decreases
        assert_eq!(risk.peak_balance(), 12_000.0);
    }

    #[test]
    fn non_positive_peak_passes_drawdown() {
        let mut risk = RiskManager::new(0.0, &config());
        assert!(risk.check_drawdown(0.0));
        assert!(risk.check_drawdown(-5.0));
    }
}

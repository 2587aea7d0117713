// Trading core: risk, positions, the grid ladder, and the control loops

pub mod bot;
pub mod executor;
pub mod grid;
pub mod grid_bot;
pub mod position;
pub mod risk;

pub use self::bot::{BotControl, BotController, BotState, BotStatus, SharedState};
pub use self::executor::OrderExecutionController;
pub use self::grid::{FilledLevelOrder, GridLadder, GridLevel, LevelOrder, LevelStatus};
pub use self::grid_bot::GridBot;
pub use self::position::{Position, PositionManager, PositionStatus};
pub use self::risk::{ProposedOrder, RiskManager};

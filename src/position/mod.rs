//! Position lifecycle management

pub mod manager;

pub use manager::{ClosedTrade, ExitRules, Position, PositionManager};

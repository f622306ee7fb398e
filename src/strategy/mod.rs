//! Decision core: scoring, gating, cooldowns and the scan-cycle engine

pub mod cooldown;
pub mod engine;
pub mod gate;
pub mod regime;
pub mod scoring;
pub mod types;

pub use cooldown::{Clock, CooldownLedger, SystemClock};
pub use engine::ScanEngine;
pub use gate::RiskGate;
pub use regime::RegimeFilter;
pub use types::{ExitReason, GateRejection, Opportunity, ScoreBreakdown};

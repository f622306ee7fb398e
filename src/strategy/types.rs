//! Shared types for the decision core

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named additive score contributions for one candidate.
///
/// Kept on the Opportunity so logs and tests can see exactly which factor
/// produced which points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    points: BTreeMap<&'static str, u32>,
}

impl ScoreBreakdown {
    pub fn add(&mut self, factor: &'static str, points: u32) {
        if points > 0 {
            self.points.insert(factor, points);
        }
    }

    pub fn get(&self, factor: &str) -> u32 {
        self.points.get(factor).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.points.values().sum()
    }

    pub fn factors(&self) -> impl Iterator<Item = (&'static str, u32)> + '_ {
        self.points.iter().map(|(k, v)| (*k, *v))
    }
}

impl std::fmt::Display for ScoreBreakdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (factor, points) in &self.points {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}:{}", factor, points)?;
            first = false;
        }
        write!(f, " = {}", self.total())
    }
}

/// A scored entry candidate. Immutable once produced; lives for one cycle.
#[derive(Debug, Clone)]
pub struct Opportunity {
    /// Token mint address
    pub token: String,
    pub symbol: String,
    pub chain: String,
    pub price_usd: f64,
    pub liquidity_usd: f64,
    pub volume_24h_usd: f64,
    pub volume_1h_usd: f64,
    pub change_5m_pct: f64,
    pub change_1h_pct: f64,
    pub buys_24h: u32,
    pub sells_24h: u32,
    /// buys / total transactions, 0 when the pair has no transactions
    pub buy_ratio: f64,
    pub score: ScoreBreakdown,
    /// Slippage budget from the volatility tier table
    pub slippage_pct: f64,
    pub trending: bool,
}

impl Opportunity {
    pub fn txns_24h(&self) -> u32 {
        self.buys_24h + self.sells_24h
    }

    pub fn sell_ratio(&self) -> f64 {
        let total = self.txns_24h();
        if total == 0 {
            return 0.0;
        }
        self.sells_24h as f64 / total as f64
    }
}

/// Why the risk gate rejected a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    /// Reference asset trend below the configured floors
    BearishRegime,
    /// Token has an unexpired loss record
    OnCooldown,
    /// Buy ratio under the configured floor
    WeakBuyPressure,
    /// Too few sells to prove exits work
    HoneypotSuspect,
    /// 5m momentum under the hard gate floor
    NoMomentum,
    /// Recent volume not spiking above its 24h baseline
    NoVolumeSpike,
    /// A round-trip quote leg failed or had no route
    NoRoute,
    /// Momentum minus round-trip cost under the profit buffer
    ThinEdge,
}

impl std::fmt::Display for GateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GateRejection::BearishRegime => "bearish regime",
            GateRejection::OnCooldown => "on cooldown",
            GateRejection::WeakBuyPressure => "weak buy pressure",
            GateRejection::HoneypotSuspect => "honeypot suspect",
            GateRejection::NoMomentum => "no momentum",
            GateRejection::NoVolumeSpike => "no volume spike",
            GateRejection::NoRoute => "no route",
            GateRejection::ThinEdge => "thin edge",
        };
        write!(f, "{}", s)
    }
}

/// Why a position left the open set. Every closed trade carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    MaxHoldTime,
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "stop loss",
            ExitReason::TakeProfit => "take profit",
            ExitReason::TrailingStop => "trailing stop",
            ExitReason::MaxHoldTime => "max hold time",
            ExitReason::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakdown_totals_named_factors() {
        let mut breakdown = ScoreBreakdown::default();
        breakdown.add("liquidity", 15);
        breakdown.add("volume", 15);
        breakdown.add("trending", 0); // zero contributions are not recorded

        assert_eq!(breakdown.total(), 30);
        assert_eq!(breakdown.get("liquidity"), 15);
        assert_eq!(breakdown.get("trending"), 0);
        assert_eq!(breakdown.factors().count(), 2);
    }

    #[test]
    fn test_exit_reason_serde_round_trip() {
        let json = serde_json::to_string(&ExitReason::TrailingStop).unwrap();
        assert_eq!(json, r#""trailing_stop""#);
        let back: ExitReason = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ExitReason::TrailingStop);
    }

    #[test]
    fn test_sell_ratio_guards_empty_pair() {
        let opp = Opportunity {
            token: "t".into(),
            symbol: "T".into(),
            chain: "solana".into(),
            price_usd: 1.0,
            liquidity_usd: 0.0,
            volume_24h_usd: 0.0,
            volume_1h_usd: 0.0,
            change_5m_pct: 0.0,
            change_1h_pct: 0.0,
            buys_24h: 0,
            sells_24h: 0,
            buy_ratio: 0.0,
            score: ScoreBreakdown::default(),
            slippage_pct: 10.0,
            trending: false,
        };
        assert_eq!(opp.sell_ratio(), 0.0);
    }
}

//! Position lifecycle management
//!
//! Owns the open-position set and runs the exit state machine every scan
//! cycle, before any new entry is considered. Exit thresholds are frozen
//! into each position at open; the priority order below is fixed and only
//! the first matching condition fires.
//!
//! A position whose sell fails on-chain still leaves the open set: the
//! slot is released and the close is booked at the decision price, even
//! though the wallet may still hold the token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ExitConfig;
use crate::dexscreener::DiscoveryFeed;
use crate::error::{Error, Result};
use crate::ledger::TradeLedger;
use crate::strategy::cooldown::{Clock, CooldownLedger};
use crate::strategy::types::ExitReason;
use crate::trading::executor::ExecutionCoordinator;

/// Exit thresholds captured at open. A config change mid-run cannot
/// retroactively alter a live position's rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitRules {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub trailing_activation_pct: f64,
    pub trailing_distance_pct: f64,
    pub max_hold_secs: u64,
}

impl ExitRules {
    pub fn from_config(config: &ExitConfig) -> Self {
        Self {
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
            trailing_activation_pct: config.trailing_activation_pct,
            trailing_distance_pct: config.trailing_distance_pct,
            max_hold_secs: config.max_hold_secs,
        }
    }
}

impl Default for ExitRules {
    fn default() -> Self {
        Self::from_config(&ExitConfig::default())
    }
}

/// One open holding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    /// Token mint address
    pub token: String,
    pub symbol: String,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    /// USD notional committed at entry
    pub size_usd: f64,
    /// Token base units received, used to size the exit swap
    pub token_amount: u64,
    /// Highest price seen since entry; never decreases
    pub peak_price: f64,
    pub rules: ExitRules,
}

impl Position {
    pub fn open(
        token: &str,
        symbol: &str,
        entry_price: f64,
        size_usd: f64,
        token_amount: u64,
        rules: ExitRules,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            token: token.to_string(),
            symbol: symbol.to_string(),
            entry_price,
            entry_time: Utc::now(),
            size_usd,
            token_amount,
            peak_price: entry_price,
            rules,
        }
    }

    pub fn pnl_pct(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) / self.entry_price * 100.0
    }

    pub fn hold_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.entry_time).num_seconds().max(0) as u64
    }
}

/// Immutable record of a finished position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position_id: Uuid,
    pub token: String,
    pub symbol: String,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub size_usd: f64,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub pnl_pct: f64,
    pub pnl_usd: f64,
    pub closed_at: DateTime<Utc>,
}

impl ClosedTrade {
    pub fn from_position(
        position: &Position,
        exit_price: f64,
        exit_reason: ExitReason,
        pnl_pct: f64,
        pnl_usd: f64,
        closed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            position_id: position.id,
            token: position.token.clone(),
            symbol: position.symbol.clone(),
            entry_price: position.entry_price,
            entry_time: position.entry_time,
            size_usd: position.size_usd,
            exit_price,
            exit_reason,
            pnl_pct,
            pnl_usd,
            closed_at,
        }
    }
}

/// Position manager
pub struct PositionManager {
    positions: RwLock<HashMap<String, Position>>,
    path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl PositionManager {
    pub fn new(path: Option<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            path,
            clock,
        }
    }

    /// Load open positions from disk
    pub async fn load(&self) -> Result<()> {
        if let Some(path) = &self.path {
            if Path::new(path).exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| Error::Persistence(e.to_string()))?;
                let positions: HashMap<String, Position> =
                    serde_json::from_str(&data).map_err(|e| Error::Persistence(e.to_string()))?;

                let mut guard = self.positions.write().await;
                *guard = positions;
                info!("Loaded {} open positions from {}", guard.len(), path.display());
            }
        }
        Ok(())
    }

    /// Save open positions to disk
    pub async fn save(&self) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| Error::Persistence(e.to_string()))?;
            }
            let positions = self.positions.read().await;
            let data = serde_json::to_string_pretty(&*positions)
                .map_err(|e| Error::Persistence(e.to_string()))?;
            tokio::fs::write(path, data)
                .await
                .map_err(|e| Error::Persistence(e.to_string()))?;
            debug!("Saved {} positions to {}", positions.len(), path.display());
        }
        Ok(())
    }

    /// Register a freshly bought position. One open position per token.
    pub async fn open_position(&self, position: Position) -> Result<()> {
        let token = position.token.clone();
        {
            let mut positions = self.positions.write().await;
            if positions.contains_key(&token) {
                return Err(Error::Internal(format!(
                    "Position already open for {}",
                    token
                )));
            }
            positions.insert(token.clone(), position);
        }

        info!("Tracking position in {}", token);
        self.save().await
    }

    pub async fn contains(&self, token: &str) -> bool {
        self.positions.read().await.contains_key(token)
    }

    pub async fn open_count(&self) -> usize {
        self.positions.read().await.len()
    }

    pub async fn all_positions(&self) -> Vec<Position> {
        self.positions.read().await.values().cloned().collect()
    }

    /// Evaluate one position against its frozen rules. Updates the peak
    /// first (it tracks every favorable tick whether or not an exit
    /// fires), then checks conditions in fixed priority order.
    pub fn evaluate_exit(
        position: &mut Position,
        current_price: f64,
        now: DateTime<Utc>,
    ) -> Option<ExitReason> {
        if current_price > position.peak_price {
            position.peak_price = current_price;
        }

        let pnl_pct = position.pnl_pct(current_price);
        let rules = &position.rules;

        if pnl_pct <= -rules.stop_loss_pct {
            return Some(ExitReason::StopLoss);
        }

        if pnl_pct >= rules.take_profit_pct {
            return Some(ExitReason::TakeProfit);
        }

        if pnl_pct >= rules.trailing_activation_pct {
            let drawdown_pct =
                (current_price - position.peak_price) / position.peak_price * 100.0;
            if drawdown_pct <= -rules.trailing_distance_pct {
                return Some(ExitReason::TrailingStop);
            }
        }

        if position.hold_secs(now) >= rules.max_hold_secs {
            return Some(ExitReason::MaxHoldTime);
        }

        None
    }

    /// Exit pass for every open position; runs before entries each cycle.
    /// A position with no price this cycle is skipped, not exited. Returns
    /// the number of positions closed.
    pub async fn run_exit_cycle(
        &self,
        feed: &Arc<dyn DiscoveryFeed>,
        executor: &ExecutionCoordinator,
        ledger: &TradeLedger,
        cooldown: &CooldownLedger,
    ) -> usize {
        let tokens: Vec<String> = {
            let positions = self.positions.read().await;
            positions.keys().cloned().collect()
        };

        let mut closed = 0;
        for token in tokens {
            let current_price = match feed.token_pair(&token).await {
                Ok(Some(snap)) => snap.price_usd,
                Ok(None) => {
                    warn!("No price for {}, skipping exit check this cycle", token);
                    continue;
                }
                Err(e) => {
                    warn!("Price fetch for {} failed ({}), skipping", token, e);
                    continue;
                }
            };

            let now = self.clock.now();
            let decision = {
                let mut positions = self.positions.write().await;
                let Some(position) = positions.get_mut(&token) else {
                    continue;
                };
                Self::evaluate_exit(position, current_price, now).map(|r| (r, position.clone()))
            };

            let Some((reason, position)) = decision else {
                continue;
            };

            info!(
                "Exit {} for {} at {:.8} USD ({:+.2}%)",
                reason,
                position.symbol,
                current_price,
                position.pnl_pct(current_price)
            );

            self.close_position(&position, current_price, reason, executor, ledger, cooldown)
                .await;
            closed += 1;
        }

        closed
    }

    /// Close one position through the executor's sell path. Whatever the
    /// on-chain outcome, the position leaves the open set and the close is
    /// settled; a losing close feeds the cooldown ledger.
    pub async fn close_position(
        &self,
        position: &Position,
        current_price: f64,
        reason: ExitReason,
        executor: &ExecutionCoordinator,
        ledger: &TradeLedger,
        cooldown: &CooldownLedger,
    ) {
        let outcome = match executor.execute_sell(position, current_price, reason).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("Sell path error for {}: {}", position.symbol, e);
                None
            }
        };

        let exit_price = outcome.as_ref().map(|o| o.exit_price).unwrap_or(current_price);
        let pnl_pct = position.pnl_pct(exit_price);
        let pnl_usd = position.size_usd * pnl_pct / 100.0;

        {
            let mut positions = self.positions.write().await;
            positions.remove(&position.token);
        }
        if let Err(e) = self.save().await {
            warn!("Position save failed: {}", e);
        }

        let trade = ClosedTrade::from_position(
            position,
            exit_price,
            reason,
            pnl_pct,
            pnl_usd,
            self.clock.now(),
        );
        match ledger.apply_close(&trade).await {
            Ok(_) => {}
            Err(e) => warn!("Close settlement failed for {}: {}", position.symbol, e),
        }

        if pnl_usd < 0.0 {
            cooldown.record_loss(&position.token);
        }
    }

    /// Manual close from the CLI; bypasses the threshold checks
    pub async fn close_manual(
        &self,
        token: &str,
        feed: &Arc<dyn DiscoveryFeed>,
        executor: &ExecutionCoordinator,
        ledger: &TradeLedger,
        cooldown: &CooldownLedger,
    ) -> Result<()> {
        let position = self
            .positions
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| Error::PositionNotFound(token.to_string()))?;

        let current_price = match feed.token_pair(token).await? {
            Some(snap) => snap.price_usd,
            // No market data: book the close at entry, the slot matters more
            None => position.entry_price,
        };

        self.close_position(
            &position,
            current_price,
            ExitReason::Manual,
            executor,
            ledger,
            cooldown,
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CooldownConfig, TradingConfig};
    use crate::dexscreener::tests::{snapshot, StubFeed};
    use crate::notify::tests::RecordingNotifier;
    use crate::strategy::cooldown::tests::ManualClock;
    use crate::trading::quote::tests::StubSwapProvider;
    use crate::trading::wallet::tests::StubSubmitter;

    const NATIVE: &str = "So11111111111111111111111111111111111111112";

    fn rules() -> ExitRules {
        ExitRules {
            stop_loss_pct: 5.0,
            take_profit_pct: 10.0,
            trailing_activation_pct: 4.0,
            trailing_distance_pct: 3.0,
            max_hold_secs: 1800,
        }
    }

    fn position(entry_price: f64) -> Position {
        Position::open("mint_a", "A", entry_price, 4.0, 4_000_000, rules())
    }

    #[test]
    fn test_stop_loss_fires_exactly_at_boundary() {
        let mut p = position(100.0);
        // -5.00% exactly must fire
        assert_eq!(
            PositionManager::evaluate_exit(&mut p, 95.0, Utc::now()),
            Some(ExitReason::StopLoss)
        );

        let mut p = position(100.0);
        // -4.9%: no exit
        assert_eq!(
            PositionManager::evaluate_exit(&mut p, 95.1, Utc::now()),
            None
        );
    }

    #[test]
    fn test_take_profit_fires_at_boundary() {
        let mut p = position(100.0);
        assert_eq!(
            PositionManager::evaluate_exit(&mut p, 110.0, Utc::now()),
            Some(ExitReason::TakeProfit)
        );
    }

    #[test]
    fn test_stop_loss_outranks_max_hold() {
        let mut p = position(100.0);
        p.entry_time = Utc::now() - chrono::Duration::seconds(4000);
        // Both conditions true; priority picks the stop
        assert_eq!(
            PositionManager::evaluate_exit(&mut p, 90.0, Utc::now()),
            Some(ExitReason::StopLoss)
        );
    }

    #[test]
    fn test_peak_is_monotonic() {
        let mut p = position(100.0);

        PositionManager::evaluate_exit(&mut p, 102.0, Utc::now());
        assert_eq!(p.peak_price, 102.0);

        // A lower tick never lowers the peak
        PositionManager::evaluate_exit(&mut p, 101.0, Utc::now());
        assert_eq!(p.peak_price, 102.0);

        PositionManager::evaluate_exit(&mut p, 103.0, Utc::now());
        assert_eq!(p.peak_price, 103.0);
    }

    #[test]
    fn test_trailing_stop_needs_activation() {
        // Peak at +3.5%, below the 4% activation: a pullback does not fire
        let mut p = position(100.0);
        PositionManager::evaluate_exit(&mut p, 103.5, Utc::now());
        assert_eq!(
            PositionManager::evaluate_exit(&mut p, 100.0, Utc::now()),
            None
        );
    }

    #[test]
    fn test_trailing_stop_fires_after_pullback_from_peak() {
        let mut p = position(100.0);
        // Run up to +8%
        assert_eq!(
            PositionManager::evaluate_exit(&mut p, 108.0, Utc::now()),
            None
        );
        assert_eq!(p.peak_price, 108.0);

        // Pull back 3.7% off the peak while still +4% over entry
        assert_eq!(
            PositionManager::evaluate_exit(&mut p, 104.0, Utc::now()),
            Some(ExitReason::TrailingStop)
        );
    }

    #[test]
    fn test_max_hold_fires_at_deadline() {
        let mut p = position(100.0);
        p.entry_time = Utc::now() - chrono::Duration::seconds(1800);
        assert_eq!(
            PositionManager::evaluate_exit(&mut p, 100.0, Utc::now()),
            Some(ExitReason::MaxHoldTime)
        );

        let mut p = position(100.0);
        p.entry_time = Utc::now() - chrono::Duration::seconds(1700);
        assert_eq!(
            PositionManager::evaluate_exit(&mut p, 100.0, Utc::now()),
            None
        );
    }

    struct Harness {
        manager: PositionManager,
        feed: Arc<dyn DiscoveryFeed>,
        executor: ExecutionCoordinator,
        ledger: Arc<TradeLedger>,
        cooldown: CooldownLedger,
    }

    fn harness(current_price: f64) -> Harness {
        let clock = ManualClock::new();

        let mut feed = StubFeed::new();
        let mut snap = snapshot("mint_a", "solana");
        snap.price_usd = current_price;
        feed.by_query.insert("q".into(), vec![snap]);
        let feed: Arc<dyn DiscoveryFeed> = Arc::new(feed);

        let quotes = Arc::new(StubSwapProvider::new());
        quotes.set_quote("mint_a", NATIVE, 26_000_000, 0.5);
        quotes.set_quote(NATIVE, "mint_a", 4_000_000, 0.5);

        let ledger = Arc::new(TradeLedger::in_memory(96.0));
        let executor = ExecutionCoordinator::new(
            TradingConfig {
                retry_delay_ms: 1,
                ..Default::default()
            },
            ExitConfig::default(),
            quotes,
            Arc::new(StubSubmitter::always_ok()),
            ledger.clone(),
            RecordingNotifier::new(),
            NATIVE.into(),
        );

        Harness {
            manager: PositionManager::new(None, clock.clone()),
            feed,
            executor,
            ledger,
            cooldown: CooldownLedger::new(CooldownConfig::default(), clock),
        }
    }

    #[tokio::test]
    async fn test_exit_cycle_closes_take_profit_and_settles() {
        // Entry 0.001, current 0.00106: +6% against a 5% take profit
        let h = harness(0.00106);
        let mut p = position(0.001);
        p.rules.take_profit_pct = 5.0;
        h.manager.open_position(p).await.unwrap();

        let closed = h
            .manager
            .run_exit_cycle(&h.feed, &h.executor, &h.ledger, &h.cooldown)
            .await;

        assert_eq!(closed, 1);
        assert_eq!(h.manager.open_count().await, 0);

        // 96 + 4 + 0.24 settled exactly once
        assert!((h.ledger.balance_usd().await - 100.24).abs() < 1e-9);
        let trades = h.ledger.closed_trades().await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_reason, ExitReason::TakeProfit);
        assert!((trades[0].pnl_usd - 0.24).abs() < 1e-9);

        // Winning closes never touch the loss memory
        assert!(!h.cooldown.is_on_cooldown("mint_a"));
    }

    #[tokio::test]
    async fn test_losing_close_records_loss() {
        let h = harness(0.0009); // -10%
        h.manager.open_position(position(0.001)).await.unwrap();

        h.manager
            .run_exit_cycle(&h.feed, &h.executor, &h.ledger, &h.cooldown)
            .await;

        assert!(h.cooldown.is_on_cooldown("mint_a"));
        assert_eq!(h.manager.open_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_price_skips_position() {
        let h = harness(0.001);
        // A token the feed knows nothing about
        let mut p = position(0.001);
        p.token = "mint_unknown".into();
        h.manager.open_position(p).await.unwrap();

        let closed = h
            .manager
            .run_exit_cycle(&h.feed, &h.executor, &h.ledger, &h.cooldown)
            .await;

        assert_eq!(closed, 0);
        assert_eq!(h.manager.open_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_sell_still_releases_slot() {
        let clock = ManualClock::new();
        let mut feed = StubFeed::new();
        let mut snap = snapshot("mint_a", "solana");
        snap.price_usd = 0.0009;
        feed.by_query.insert("q".into(), vec![snap]);
        let feed: Arc<dyn DiscoveryFeed> = Arc::new(feed);

        let quotes = Arc::new(StubSwapProvider::new());
        quotes.set_quote("mint_a", NATIVE, 26_000_000, 0.5);
        let ledger = Arc::new(TradeLedger::in_memory(96.0));
        let executor = ExecutionCoordinator::new(
            TradingConfig {
                retry_delay_ms: 1,
                ..Default::default()
            },
            ExitConfig::default(),
            quotes,
            Arc::new(StubSubmitter::new(vec![Err(Error::TransactionSend(
                "node is behind".into(),
            ))])),
            ledger.clone(),
            RecordingNotifier::new(),
            NATIVE.into(),
        );
        let manager = PositionManager::new(None, clock.clone());
        let cooldown = CooldownLedger::new(CooldownConfig::default(), clock);

        manager.open_position(position(0.001)).await.unwrap();
        let closed = manager
            .run_exit_cycle(&feed, &executor, &ledger, &cooldown)
            .await;

        // The sell failed on-chain, the slot is free anyway
        assert_eq!(closed, 1);
        assert_eq!(manager.open_count().await, 0);
        assert_eq!(ledger.closed_trades().await.len(), 1);
        assert!(cooldown.is_on_cooldown("mint_a"));
    }

    #[tokio::test]
    async fn test_duplicate_open_rejected() {
        let h = harness(0.001);
        h.manager.open_position(position(0.001)).await.unwrap();
        assert!(h.manager.open_position(position(0.001)).await.is_err());
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");

        {
            let manager = PositionManager::new(Some(path.clone()), ManualClock::new());
            manager.open_position(position(0.001)).await.unwrap();
        }

        let manager = PositionManager::new(Some(path), ManualClock::new());
        manager.load().await.unwrap();
        assert_eq!(manager.open_count().await, 1);
        assert!(manager.contains("mint_a").await);
    }
}

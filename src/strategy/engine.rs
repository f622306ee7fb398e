//! Scan-cycle engine
//!
//! One periodic task drives everything: exits are evaluated before entries,
//! at most one buy per cycle fills one free slot, and every sub-operation
//! settles before the next tick. Shutdown is observed between cycles only,
//! so an in-flight trade attempt always completes before state is
//! persisted and the engine exits.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dexscreener::{DiscoveryFeed, SnapshotCollector};
use crate::error::Result;
use crate::ledger::TradeLedger;
use crate::notify::Notifier;
use crate::position::manager::PositionManager;
use crate::strategy::cooldown::CooldownLedger;
use crate::strategy::gate::RiskGate;
use crate::strategy::regime::RegimeFilter;
use crate::strategy::scoring;
use crate::trading::executor::ExecutionCoordinator;

pub struct ScanEngine {
    config: Arc<Config>,
    feed: Arc<dyn DiscoveryFeed>,
    collector: SnapshotCollector,
    regime: Arc<RegimeFilter>,
    gate: RiskGate,
    cooldown: Arc<CooldownLedger>,
    positions: Arc<PositionManager>,
    executor: Arc<ExecutionCoordinator>,
    ledger: Arc<TradeLedger>,
    notifier: Arc<dyn Notifier>,
}

impl ScanEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        feed: Arc<dyn DiscoveryFeed>,
        regime: Arc<RegimeFilter>,
        gate: RiskGate,
        cooldown: Arc<CooldownLedger>,
        positions: Arc<PositionManager>,
        executor: Arc<ExecutionCoordinator>,
        ledger: Arc<TradeLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let collector = SnapshotCollector::new(feed.clone(), config.scanner.clone());
        Self {
            config,
            feed,
            collector,
            regime,
            gate,
            cooldown,
            positions,
            executor,
            ledger,
            notifier,
        }
    }

    /// Run scan cycles until shutdown. The token is only checked between
    /// cycles: a cycle that started finishes its position checks and its
    /// one trade attempt first.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut ticker = interval(Duration::from_secs(self.config.scanner.scan_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Engine started: {}s cycle, {} mode",
            self.config.scanner.scan_interval_secs,
            if self.config.trading.live {
                "live"
            } else {
                "paper"
            }
        );
        self.notifier.send("Engine started").await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, finishing up");
                    break;
                }
            }
        }

        // Final persist so a restart resumes exactly here
        self.positions.save().await?;
        let balance = self.ledger.balance_usd().await;
        info!(
            "Engine stopped: {} open positions, balance {:.2} USD",
            self.positions.open_count().await,
            balance
        );
        self.notifier.send("Engine stopped").await;
        Ok(())
    }

    /// One full cycle: exits first, then at most one entry
    pub async fn run_cycle(&self) {
        let closed = self
            .positions
            .run_exit_cycle(&self.feed, &self.executor, &self.ledger, &self.cooldown)
            .await;

        let open = self.positions.open_count().await;
        if open >= self.config.trading.max_positions {
            debug!("All {} position slots in use, no entry this cycle", open);
            return;
        }

        let snapshots = self.collector.collect().await;
        if snapshots.is_empty() {
            debug!("No candidates this cycle");
            return;
        }
        let trending = self.collector.trending_set().await;

        let opportunities = scoring::build_opportunities(
            &snapshots,
            &trending,
            &self.config.scoring,
            &self.config.trading,
        );

        // Tokens already held can't be entered again
        let mut candidates = Vec::with_capacity(opportunities.len());
        for opp in opportunities {
            if !self.positions.contains(&opp.token).await {
                candidates.push(opp);
            }
        }

        let balance = self.ledger.balance_usd().await;
        let notional_usd = balance * self.config.trading.position_size_pct / 100.0;
        let admitted = self.gate.admit(candidates, notional_usd).await;

        info!(
            "Cycle: {} closed, {} snapshots, {} admitted, balance {:.2} USD",
            closed,
            snapshots.len(),
            admitted.len(),
            balance
        );

        // One buy per cycle, the best admitted candidate
        let Some(best) = admitted.into_iter().next() else {
            return;
        };

        let native_price_usd = self.regime.verdict().await.native_price_usd;
        match self.executor.execute_buy(&best, native_price_usd).await {
            Ok(Some(position)) => {
                if let Err(e) = self.positions.open_position(position).await {
                    warn!("Could not track new position: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Buy attempt errored: {}", e),
        }
    }
}

//! Command handlers for the scout binary

use anyhow::{Context, Result};
use dialoguer::Confirm;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, NATIVE_MINT};
use crate::dexscreener::{DexScreenerClient, DiscoveryFeed};
use crate::ledger::TradeLedger;
use crate::notify::{self, Notifier};
use crate::position::manager::PositionManager;
use crate::strategy::cooldown::{CooldownLedger, SystemClock};
use crate::strategy::engine::ScanEngine;
use crate::strategy::gate::RiskGate;
use crate::strategy::regime::RegimeFilter;
use crate::trading::executor::ExecutionCoordinator;
use crate::trading::quote::JupiterClient;
use crate::trading::wallet::{PaperSubmitter, RpcSubmitter, TxSubmitter};

/// Everything a trading command needs wired together
struct Runtime {
    config: Arc<Config>,
    feed: Arc<dyn DiscoveryFeed>,
    regime: Arc<RegimeFilter>,
    cooldown: Arc<CooldownLedger>,
    positions: Arc<PositionManager>,
    executor: Arc<ExecutionCoordinator>,
    ledger: Arc<TradeLedger>,
    gate: RiskGate,
    notifier: Arc<dyn Notifier>,
}

impl Runtime {
    async fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let state_dir = PathBuf::from(&config.persistence.state_dir);

        let feed: Arc<dyn DiscoveryFeed> =
            Arc::new(DexScreenerClient::new(config.scanner.feed_timeout_ms));
        let quotes = Arc::new(JupiterClient::new(
            &config.quote,
            config.trading.priority_fee_lamports,
        ));

        let submitter: Arc<dyn TxSubmitter> = if config.trading.live {
            Arc::new(RpcSubmitter::from_env(&config.rpc).context("Failed to load wallet")?)
        } else {
            Arc::new(PaperSubmitter)
        };

        let ledger = Arc::new(
            TradeLedger::load(
                state_dir.join("session.json"),
                config.trading.starting_balance_usd,
            )
            .await?,
        );

        let clock = Arc::new(SystemClock);
        let positions = Arc::new(PositionManager::new(
            Some(state_dir.join("positions.json")),
            clock.clone(),
        ));
        positions.load().await?;

        let cooldown = Arc::new(CooldownLedger::new(config.cooldown.clone(), clock));
        let regime = Arc::new(RegimeFilter::new(feed.clone(), config.gate.clone()));
        let notifier = notify::from_config(&config.notify);

        let executor = Arc::new(ExecutionCoordinator::new(
            config.trading.clone(),
            config.exits.clone(),
            quotes.clone(),
            submitter,
            ledger.clone(),
            notifier.clone(),
            NATIVE_MINT.to_string(),
        ));

        let gate = RiskGate::new(
            config.gate.clone(),
            regime.clone(),
            cooldown.clone(),
            quotes,
            NATIVE_MINT.to_string(),
        );

        Ok(Self {
            config,
            feed,
            regime,
            cooldown,
            positions,
            executor,
            ledger,
            gate,
            notifier,
        })
    }
}

/// Run the engine until ctrl-c
pub async fn run_start(mut config: Config, paper: bool) -> Result<()> {
    if paper && config.trading.live {
        warn!("--paper overrides trading.live");
        config.trading.live = false;
    }

    let rt = Runtime::build(config).await?;

    let engine = ScanEngine::new(
        rt.config.clone(),
        rt.feed,
        rt.regime,
        rt.gate,
        rt.cooldown,
        rt.positions,
        rt.executor,
        rt.ledger,
        rt.notifier,
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_token.cancel();
        }
    });

    engine.run(shutdown).await?;
    Ok(())
}

/// Print open positions and balance from persisted state
pub async fn run_status(config: Config) -> Result<()> {
    let rt = Runtime::build(config).await?;

    let balance = rt.ledger.balance_usd().await;
    let positions = rt.positions.all_positions().await;

    println!("Balance: {:.2} USD", balance);
    println!("Open positions: {}", positions.len());
    for p in positions {
        println!(
            "  {:<10} entry {:.8} USD  size {:.2} USD  peak {:.8}  since {}",
            p.symbol,
            p.entry_price,
            p.size_usd,
            p.peak_price,
            p.entry_time.format("%Y-%m-%d %H:%M:%S")
        );
    }

    let trades = rt.ledger.closed_trades().await;
    if !trades.is_empty() {
        let realized: f64 = trades.iter().map(|t| t.pnl_usd).sum();
        let wins = trades.iter().filter(|t| t.pnl_usd >= 0.0).count();
        println!(
            "Closed trades: {} ({} wins), realized {:+.2} USD",
            trades.len(),
            wins,
            realized
        );
    }

    Ok(())
}

/// Print recent ledger records
pub async fn run_history(config: Config, limit: usize) -> Result<()> {
    let rt = Runtime::build(config).await?;

    let records = rt.ledger.recent_records(limit).await;
    if records.is_empty() {
        println!("No trades recorded");
        return Ok(());
    }

    for r in records {
        let pnl = r
            .realized_pnl_usd
            .map(|p| format!(" {:+.2} USD", p))
            .unwrap_or_default();
        let detail = r
            .tx_ref
            .clone()
            .or(r.failure.clone())
            .unwrap_or_default();
        println!(
            "{}  {:<4} {:<10} {:>8.2} USD  {:?}{}  {}",
            r.created_at.format("%m-%d %H:%M:%S"),
            format!("{:?}", r.side).to_lowercase(),
            r.symbol,
            r.notional_usd,
            r.status,
            pnl,
            detail
        );
    }

    Ok(())
}

/// Manually close a position
pub async fn run_sell(config: Config, token: String, force: bool) -> Result<()> {
    let rt = Runtime::build(config).await?;

    if !rt.positions.contains(&token).await {
        anyhow::bail!("No open position for {}", token);
    }

    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Sell position in {}?", token))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted");
            return Ok(());
        }
    }

    rt.positions
        .close_manual(&token, &rt.feed, &rt.executor, &rt.ledger, &rt.cooldown)
        .await?;

    println!("Position in {} closed", token);
    Ok(())
}

/// Print the validated configuration with secrets masked
pub fn run_show_config(config: &Config) {
    println!("{}", config.masked_display());
}

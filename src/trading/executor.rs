//! Execution coordinator
//!
//! Turns an admitted opportunity or an exit instruction into a submitted
//! swap. Every attempt opens a ledger record at build time and updates it
//! in place; outcomes are reported, never thrown. The sell path retries a
//! slippage rejection a bounded number of times, each time with a brand
//! new quote - replaying a stale quote against a moved price only burns
//! the retry budget.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{ExitConfig, TradingConfig};
use crate::error::{classify_submit_error, Error, Result, SubmitErrorKind};
use crate::ledger::{TradeLedger, TradeSide};
use crate::notify::Notifier;
use crate::position::manager::{ExitRules, Position};
use crate::strategy::types::{ExitReason, Opportunity};
use crate::trading::quote::SwapProvider;
use crate::trading::wallet::TxSubmitter;

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Result of a sell attempt after retries are spent
#[derive(Debug, Clone)]
pub struct SellOutcome {
    /// Whether the swap was accepted on-chain (or by the paper submitter)
    pub submitted: bool,
    /// Price the close is booked at
    pub exit_price: f64,
    pub attempts: u32,
    pub failure: Option<String>,
}

pub struct ExecutionCoordinator {
    config: TradingConfig,
    exits: ExitConfig,
    quotes: Arc<dyn SwapProvider>,
    submitter: Arc<dyn TxSubmitter>,
    ledger: Arc<TradeLedger>,
    notifier: Arc<dyn Notifier>,
    native_mint: String,
}

impl ExecutionCoordinator {
    pub fn new(
        config: TradingConfig,
        exits: ExitConfig,
        quotes: Arc<dyn SwapProvider>,
        submitter: Arc<dyn TxSubmitter>,
        ledger: Arc<TradeLedger>,
        notifier: Arc<dyn Notifier>,
        native_mint: String,
    ) -> Self {
        Self {
            config,
            exits,
            quotes,
            submitter,
            ledger,
            notifier,
            native_mint,
        }
    }

    /// Entry path. Sizes the notional off the running balance, builds and
    /// submits one swap, and returns the opened Position on success. The
    /// exit thresholds are snapshotted into the position at open and
    /// never re-read from config.
    pub async fn execute_buy(
        &self,
        opp: &Opportunity,
        native_price_usd: Option<f64>,
    ) -> Result<Option<Position>> {
        let balance = self.ledger.balance_usd().await;
        let notional_usd = balance * self.config.position_size_pct / 100.0;

        if notional_usd < self.config.min_notional_usd {
            debug!(
                "Skipping {}: notional {:.2} USD below dust floor",
                opp.symbol, notional_usd
            );
            return Ok(None);
        }

        let record_id = self
            .ledger
            .open_record(TradeSide::Buy, &opp.token, &opp.symbol, notional_usd, opp.price_usd)
            .await?;

        match self.try_buy(opp, record_id, notional_usd, native_price_usd).await {
            Ok((tx_ref, token_amount)) => {
                self.ledger.mark_completed(record_id, &tx_ref).await?;
                self.ledger.debit_entry(notional_usd).await?;

                let position = Position::open(
                    &opp.token,
                    &opp.symbol,
                    opp.price_usd,
                    notional_usd,
                    token_amount,
                    ExitRules::from_config(&self.exits),
                );

                info!(
                    "Opened {} at {:.8} USD, {:.2} USD notional ({})",
                    opp.symbol, opp.price_usd, notional_usd, tx_ref
                );
                self.notifier
                    .send(&format!(
                        "BUY {} | {:.2} USD at {:.8} | score {} | {}",
                        opp.symbol,
                        notional_usd,
                        opp.price_usd,
                        opp.score.total(),
                        tx_ref
                    ))
                    .await;

                Ok(Some(position))
            }
            Err(e) => {
                warn!("Buy of {} failed: {}", opp.symbol, e);
                self.ledger.mark_failed(record_id, &e.to_string()).await?;
                self.notifier
                    .send(&format!("BUY FAILED {} | {}", opp.symbol, e))
                    .await;
                Ok(None)
            }
        }
    }

    async fn try_buy(
        &self,
        opp: &Opportunity,
        record_id: uuid::Uuid,
        notional_usd: f64,
        native_price_usd: Option<f64>,
    ) -> Result<(String, u64)> {
        let native_usd = native_price_usd
            .ok_or_else(|| Error::Internal("reference price unavailable for sizing".into()))?;

        let lamports = (((notional_usd / native_usd) * LAMPORTS_PER_SOL) as u64).max(1);
        let slippage_bps = (opp.slippage_pct * 100.0) as u16;

        let quote = self
            .quotes
            .quote(&self.native_mint, &opp.token, lamports, slippage_bps)
            .await?;
        let tx = self
            .quotes
            .build_swap(&quote, &self.submitter.pubkey())
            .await?;

        self.ledger.mark_executing(record_id).await?;
        let tx_ref = self.submitter.sign_and_submit(&tx).await?;
        Ok((tx_ref, quote.out_amount))
    }

    /// Exit path with the bounded slippage retry. Called by the lifecycle
    /// manager; the close is booked by the caller whatever happens here.
    pub async fn execute_sell(
        &self,
        position: &Position,
        current_price: f64,
        reason: ExitReason,
    ) -> Result<SellOutcome> {
        let pnl_pct = position.pnl_pct(current_price);
        let pnl_usd = position.size_usd * pnl_pct / 100.0;

        let record_id = self
            .ledger
            .open_record(
                TradeSide::Sell,
                &position.token,
                &position.symbol,
                position.size_usd,
                current_price,
            )
            .await?;
        self.ledger
            .annotate_sell(record_id, reason, pnl_usd)
            .await?;

        let slippage_bps = (self.config.slippage_for(pnl_pct.abs()) * 100.0) as u16;

        let mut attempt = 0u32;
        let failure = loop {
            attempt += 1;

            match self.try_sell(position, record_id, slippage_bps).await {
                Ok(tx_ref) => {
                    self.ledger.mark_completed(record_id, &tx_ref).await?;
                    info!(
                        "Closed {} ({}) at {:.8} USD, {:+.2}% ({})",
                        position.symbol, reason, current_price, pnl_pct, tx_ref
                    );
                    self.notifier
                        .send(&format!(
                            "SELL {} | {} | {:+.2}% {:+.2} USD | {}",
                            position.symbol, reason, pnl_pct, pnl_usd, tx_ref
                        ))
                        .await;

                    return Ok(SellOutcome {
                        submitted: true,
                        exit_price: current_price,
                        attempts: attempt,
                        failure: None,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    let kind = classify_submit_error(&message);

                    if kind == SubmitErrorKind::SlippageExceeded
                        && attempt < self.config.max_sell_attempts
                    {
                        warn!(
                            "Sell of {} hit slippage (attempt {}/{}), refreshing quote",
                            position.symbol, attempt, self.config.max_sell_attempts
                        );
                        tokio::time::sleep(self.retry_delay()).await;
                        continue;
                    }

                    break message;
                }
            }
        };

        warn!(
            "Sell of {} failed after {} attempt(s): {}",
            position.symbol, attempt, failure
        );
        self.ledger.mark_failed(record_id, &failure).await?;
        self.notifier
            .send(&format!(
                "SELL FAILED {} | {} | {}",
                position.symbol, reason, failure
            ))
            .await;

        Ok(SellOutcome {
            submitted: false,
            exit_price: current_price,
            attempts: attempt,
            failure: Some(failure),
        })
    }

    /// One sell attempt, always against a freshly fetched quote
    async fn try_sell(
        &self,
        position: &Position,
        record_id: uuid::Uuid,
        slippage_bps: u16,
    ) -> Result<String> {
        let quote = self
            .quotes
            .quote(
                &position.token,
                &self.native_mint,
                position.token_amount,
                slippage_bps,
            )
            .await?;
        let tx = self
            .quotes
            .build_swap(&quote, &self.submitter.pubkey())
            .await?;
        self.ledger.mark_executing(record_id).await?;
        self.submitter.sign_and_submit(&tx).await
    }

    /// Fixed backoff with a little jitter before the next fresh quote
    fn retry_delay(&self) -> Duration {
        let jitter = rand::thread_rng().gen_range(0..250);
        Duration::from_millis(self.config.retry_delay_ms + jitter)
    }
}

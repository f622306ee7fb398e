//! Pre-trade risk gate
//!
//! Seven checks between a scored candidate and the executor, applied in a
//! fixed order and short-circuiting on the first failure. The first six are
//! free; the round-trip quote probe costs two external calls per candidate
//! and therefore only runs for the top-K survivors.

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::GateConfig;
use crate::error::Error;
use crate::strategy::cooldown::CooldownLedger;
use crate::strategy::regime::RegimeFilter;
use crate::strategy::types::{GateRejection, Opportunity};
use crate::trading::quote::SwapProvider;

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Probe size when the reference price is unavailable this cycle
const FALLBACK_PROBE_SOL: f64 = 0.1;

pub struct RiskGate {
    config: GateConfig,
    regime: Arc<RegimeFilter>,
    cooldown: Arc<CooldownLedger>,
    quotes: Arc<dyn SwapProvider>,
    native_mint: String,
}

impl RiskGate {
    pub fn new(
        config: GateConfig,
        regime: Arc<RegimeFilter>,
        cooldown: Arc<CooldownLedger>,
        quotes: Arc<dyn SwapProvider>,
        native_mint: String,
    ) -> Self {
        Self {
            config,
            regime,
            cooldown,
            quotes,
            native_mint,
        }
    }

    /// Admit candidates in descending score order. `notional_usd` sizes the
    /// forward probe leg to the trade the executor would actually place.
    pub async fn admit(&self, candidates: Vec<Opportunity>, notional_usd: f64) -> Vec<Opportunity> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let verdict = self.regime.verdict().await;
        if !verdict.tradable {
            info!(
                "Bearish regime, rejecting all {} candidates this cycle",
                candidates.len()
            );
            return Vec::new();
        }

        let survivors: Vec<Opportunity> = candidates
            .into_iter()
            .filter(|opp| match self.precheck(opp) {
                Ok(()) => true,
                Err(reason) => {
                    debug!("Rejected {} ({}): {}", opp.symbol, opp.token, reason);
                    false
                }
            })
            .collect();

        let probe_lamports = {
            let native_usd = verdict.native_price_usd.unwrap_or(0.0);
            if native_usd > 0.0 {
                ((notional_usd / native_usd) * LAMPORTS_PER_SOL) as u64
            } else {
                (FALLBACK_PROBE_SOL * LAMPORTS_PER_SOL) as u64
            }
        }
        .max(1);

        let mut admitted = Vec::new();
        for opp in survivors.into_iter().take(self.config.max_quote_probes) {
            match self.probe_round_trip(&opp, probe_lamports).await {
                Ok(cost_pct) => {
                    debug!(
                        "Admitted {} score {} round-trip cost {:.2}%",
                        opp.symbol,
                        opp.score.total(),
                        cost_pct
                    );
                    admitted.push(opp);
                }
                Err(reason) => {
                    debug!("Rejected {} ({}): {}", opp.symbol, opp.token, reason);
                }
            }
        }

        admitted
    }

    /// Checks 2-6: everything that needs no external call
    fn precheck(&self, opp: &Opportunity) -> Result<(), GateRejection> {
        if self.cooldown.is_on_cooldown(&opp.token) {
            return Err(GateRejection::OnCooldown);
        }

        if opp.buy_ratio < self.config.min_buy_ratio {
            return Err(GateRejection::WeakBuyPressure);
        }

        // A pool nobody has sold into may be a pool nobody can sell into
        if opp.sells_24h < self.config.min_sells_24h
            || opp.sell_ratio() < self.config.min_sell_ratio
        {
            return Err(GateRejection::HoneypotSuspect);
        }

        if opp.change_5m_pct < self.config.hard_min_change_5m_pct {
            return Err(GateRejection::NoMomentum);
        }

        if !self.volume_spiking(opp) {
            return Err(GateRejection::NoVolumeSpike);
        }

        Ok(())
    }

    /// Spike confirmation: recent 5m volume (h1/12) against the 24h
    /// baseline (h24/288) must clear the configured multiple.
    fn volume_spiking(&self, opp: &Opportunity) -> bool {
        let expected_5m = opp.volume_24h_usd / 288.0;
        let actual_5m = opp.volume_1h_usd / 12.0;

        if expected_5m <= 0.0 {
            return actual_5m > 0.0;
        }

        actual_5m / expected_5m >= self.config.volume_spike_multiplier
    }

    /// Check 7: quote the actual entry and the exit it implies. Either leg
    /// failing reads as "cannot round-trip this token"; the reverse leg
    /// in particular is the honeypot tell.
    async fn probe_round_trip(
        &self,
        opp: &Opportunity,
        lamports: u64,
    ) -> Result<f64, GateRejection> {
        let slippage_bps = (opp.slippage_pct * 100.0) as u16;

        let forward = self
            .quotes
            .quote(&self.native_mint, &opp.token, lamports, slippage_bps)
            .await
            .map_err(|e| route_rejection(&e))?;

        let reverse = self
            .quotes
            .quote(
                &opp.token,
                &self.native_mint,
                forward.out_amount,
                slippage_bps,
            )
            .await
            .map_err(|e| route_rejection(&e))?;

        let cost_pct = forward.price_impact_pct.abs() + reverse.price_impact_pct.abs();
        let net_pct = opp.change_5m_pct - cost_pct;

        if net_pct < self.config.profit_buffer_pct {
            return Err(GateRejection::ThinEdge);
        }

        Ok(cost_pct)
    }
}

fn route_rejection(e: &Error) -> GateRejection {
    if !e.is_no_route() {
        debug!("Quote probe failed: {}", e);
    }
    GateRejection::NoRoute
}

//! Opportunity scoring
//!
//! Pure additive point contributions over one pair snapshot. Each factor is
//! independently testable and lands in the named breakdown the Opportunity
//! carries.

use std::collections::HashSet;

use crate::config::{ScoringConfig, TradingConfig};
use crate::dexscreener::PairSnapshot;
use crate::strategy::types::{Opportunity, ScoreBreakdown};

/// Score one snapshot against the configured thresholds
pub fn score(
    snap: &PairSnapshot,
    trending: &HashSet<String>,
    cfg: &ScoringConfig,
) -> ScoreBreakdown {
    let mut breakdown = ScoreBreakdown::default();

    breakdown.add("liquidity", liquidity_points(snap.liquidity_usd, cfg));

    if snap.volume_24h_usd >= cfg.min_volume_24h_usd {
        breakdown.add("volume_24h", 15);
    }

    breakdown.add("momentum_5m", momentum_points(snap.change_5m_pct, cfg));

    if snap.change_1h_pct > 5.0 && snap.change_1h_pct < 100.0 {
        breakdown.add("momentum_1h", 15);
    }

    if snap.buy_ratio() > 0.55 {
        breakdown.add("buy_pressure", 10);
    }

    if snap.txns_24h() > 100 {
        breakdown.add("activity", 10);
    }

    if trending.contains(&snap.token) {
        breakdown.add("trending", 15);
    }

    // Zero or negative liquidity cannot pass the turnover check
    if snap.liquidity_usd > 0.0 && snap.volume_24h_usd / snap.liquidity_usd > 1.0 {
        breakdown.add("turnover", 10);
    }

    breakdown
}

/// Liquidity band: full points inside [min, max], half-band consolation
/// below, nothing otherwise. Boundaries are inclusive at min and max.
fn liquidity_points(liquidity_usd: f64, cfg: &ScoringConfig) -> u32 {
    if liquidity_usd >= cfg.min_liquidity_usd && liquidity_usd <= cfg.max_liquidity_usd {
        15
    } else if liquidity_usd >= cfg.min_liquidity_usd * 0.5 && liquidity_usd < cfg.min_liquidity_usd
    {
        5
    } else {
        0
    }
}

/// 5-minute momentum: 20 base + up to 20 bonus inside the band (capped at
/// 40), 10 for positive-but-early, nothing otherwise.
fn momentum_points(change_5m_pct: f64, cfg: &ScoringConfig) -> u32 {
    if change_5m_pct >= cfg.min_change_5m_pct && change_5m_pct <= cfg.max_change_5m_pct {
        let bonus = change_5m_pct.min(20.0).max(0.0) as u32;
        (20 + bonus).min(40)
    } else if change_5m_pct > 0.0 && change_5m_pct < cfg.min_change_5m_pct {
        10
    } else {
        0
    }
}

/// Score every snapshot, keep those at or above the minimum, and return
/// them best-first. Ties order by 24h volume, then token address, so the
/// ranking is deterministic regardless of collection order.
pub fn build_opportunities(
    snapshots: &[PairSnapshot],
    trending: &HashSet<String>,
    scoring_cfg: &ScoringConfig,
    trading_cfg: &TradingConfig,
) -> Vec<Opportunity> {
    let mut opportunities: Vec<Opportunity> = snapshots
        .iter()
        .filter_map(|snap| {
            let breakdown = score(snap, trending, scoring_cfg);
            if breakdown.total() < scoring_cfg.min_score {
                return None;
            }
            Some(Opportunity {
                token: snap.token.clone(),
                symbol: snap.symbol.clone(),
                chain: snap.chain.clone(),
                price_usd: snap.price_usd,
                liquidity_usd: snap.liquidity_usd,
                volume_24h_usd: snap.volume_24h_usd,
                volume_1h_usd: snap.volume_1h_usd,
                change_5m_pct: snap.change_5m_pct,
                change_1h_pct: snap.change_1h_pct,
                buys_24h: snap.buys_24h,
                sells_24h: snap.sells_24h,
                buy_ratio: snap.buy_ratio(),
                slippage_pct: trading_cfg.slippage_for(snap.change_5m_pct),
                trending: trending.contains(&snap.token),
                score: breakdown,
            })
        })
        .collect();

    opportunities.sort_by(|a, b| {
        b.score
            .total()
            .cmp(&a.score.total())
            .then_with(|| {
                b.volume_24h_usd
                    .partial_cmp(&a.volume_24h_usd)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.token.cmp(&b.token))
    });

    opportunities
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ScoringConfig {
        ScoringConfig {
            min_liquidity_usd: 25_000.0,
            max_liquidity_usd: 500_000.0,
            min_volume_24h_usd: 50_000.0,
            min_change_5m_pct: 2.0,
            max_change_5m_pct: 40.0,
            min_score: 60,
        }
    }

    fn snap() -> PairSnapshot {
        PairSnapshot {
            token: "mint_a".into(),
            symbol: "A".into(),
            chain: "solana".into(),
            price_usd: 0.001,
            liquidity_usd: 50_000.0,
            volume_24h_usd: 100_000.0,
            volume_1h_usd: 10_000.0,
            change_5m_pct: 5.0,
            change_1h_pct: 12.0,
            buys_24h: 300,
            sells_24h: 200,
        }
    }

    #[test]
    fn test_liquidity_band_boundaries() {
        let cfg = cfg();
        // Inclusive at min and max
        assert_eq!(liquidity_points(25_000.0, &cfg), 15);
        assert_eq!(liquidity_points(500_000.0, &cfg), 15);
        assert_eq!(liquidity_points(500_000.01, &cfg), 0);
        // Half band [0.5*min, min)
        assert_eq!(liquidity_points(12_500.0, &cfg), 5);
        assert_eq!(liquidity_points(24_999.0, &cfg), 5);
        assert_eq!(liquidity_points(12_499.0, &cfg), 0);
        // Non-positive liquidity scores nothing
        assert_eq!(liquidity_points(0.0, &cfg), 0);
        assert_eq!(liquidity_points(-1.0, &cfg), 0);
    }

    #[test]
    fn test_momentum_band_and_cap() {
        let cfg = cfg();
        // In band: 20 + min(change, 20)
        assert_eq!(momentum_points(5.0, &cfg), 25);
        assert_eq!(momentum_points(2.0, &cfg), 22);
        // Bonus caps at 40 total
        assert_eq!(momentum_points(20.0, &cfg), 40);
        assert_eq!(momentum_points(35.0, &cfg), 40);
        // Positive but below the band
        assert_eq!(momentum_points(1.0, &cfg), 10);
        // Over the band or flat/negative
        assert_eq!(momentum_points(41.0, &cfg), 0);
        assert_eq!(momentum_points(0.0, &cfg), 0);
        assert_eq!(momentum_points(-3.0, &cfg), 0);
    }

    #[test]
    fn test_one_hour_band_is_exclusive() {
        let cfg = cfg();
        let mut s = snap();

        s.change_1h_pct = 5.0;
        assert_eq!(score(&s, &HashSet::new(), &cfg).get("momentum_1h"), 0);
        s.change_1h_pct = 5.1;
        assert_eq!(score(&s, &HashSet::new(), &cfg).get("momentum_1h"), 15);
        s.change_1h_pct = 100.0;
        assert_eq!(score(&s, &HashSet::new(), &cfg).get("momentum_1h"), 0);
    }

    #[test]
    fn test_full_breakdown() {
        let cfg = cfg();
        let mut trending = HashSet::new();
        trending.insert("mint_a".to_string());

        let breakdown = score(&snap(), &trending, &cfg);

        assert_eq!(breakdown.get("liquidity"), 15);
        assert_eq!(breakdown.get("volume_24h"), 15);
        assert_eq!(breakdown.get("momentum_5m"), 25);
        assert_eq!(breakdown.get("momentum_1h"), 15);
        assert_eq!(breakdown.get("buy_pressure"), 10); // 300/500 = 0.6
        assert_eq!(breakdown.get("activity"), 10);
        assert_eq!(breakdown.get("trending"), 15);
        assert_eq!(breakdown.get("turnover"), 10); // 100k/50k = 2
        assert_eq!(breakdown.total(), 115);
    }

    #[test]
    fn test_buy_ratio_threshold() {
        let cfg = cfg();
        let mut s = snap();
        // Exactly 0.55 does not earn points
        s.buys_24h = 55;
        s.sells_24h = 45;
        assert_eq!(score(&s, &HashSet::new(), &cfg).get("buy_pressure"), 0);
        s.buys_24h = 56;
        s.sells_24h = 44;
        assert_eq!(score(&s, &HashSet::new(), &cfg).get("buy_pressure"), 10);
    }

    #[test]
    fn test_rank_orders_by_score_then_volume_then_token() {
        let cfg = cfg();
        let trading = TradingConfig::default();
        let trending = HashSet::new();

        let mut low = snap();
        low.token = "mint_low".into();
        low.change_1h_pct = 0.0; // loses the 1h factor

        // Two equal-score candidates separated by volume
        let mut high_vol = snap();
        high_vol.token = "mint_zz".into();
        high_vol.volume_24h_usd = 200_000.0;
        let mut low_vol = snap();
        low_vol.token = "mint_aa".into();

        // Identical twins fall back to address order
        let mut twin = snap();
        twin.token = "mint_ab".into();

        let ranked = build_opportunities(
            &[low, low_vol, high_vol, twin],
            &trending,
            &cfg,
            &trading,
        );

        let tokens: Vec<&str> = ranked.iter().map(|o| o.token.as_str()).collect();
        assert_eq!(tokens, vec!["mint_zz", "mint_aa", "mint_ab", "mint_low"]);
    }

    #[test]
    fn test_rank_filters_below_min_score() {
        let mut cfg = cfg();
        cfg.min_score = 200;
        let ranked = build_opportunities(
            &[snap()],
            &HashSet::new(),
            &cfg,
            &TradingConfig::default(),
        );
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_opportunity_carries_slippage_tier() {
        let cfg = cfg();
        let mut s = snap();
        s.change_5m_pct = 30.0;
        let ranked =
            build_opportunities(&[s], &HashSet::new(), &cfg, &TradingConfig::default());
        assert_eq!(ranked[0].slippage_pct, 25.0);
    }
}

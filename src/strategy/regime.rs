//! Market regime filter
//!
//! One coarse health read per cycle: the chain's reference asset must not
//! be trending down past the configured floors, otherwise every candidate
//! is rejected for the cycle. The verdict is cached for a configured
//! number of seconds and the check fails open: a feed error must not
//! halt trading, only a confirmed bearish read does.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::GateConfig;
use crate::dexscreener::DiscoveryFeed;

/// Cached outcome of one regime read
#[derive(Debug, Clone, Copy)]
pub struct RegimeVerdict {
    pub tradable: bool,
    /// Reference asset price, reused for notional/lamport conversion
    pub native_price_usd: Option<f64>,
}

struct CachedVerdict {
    at: Instant,
    verdict: RegimeVerdict,
}

pub struct RegimeFilter {
    feed: Arc<dyn DiscoveryFeed>,
    config: GateConfig,
    cached: Mutex<Option<CachedVerdict>>,
}

impl RegimeFilter {
    pub fn new(feed: Arc<dyn DiscoveryFeed>, config: GateConfig) -> Self {
        Self {
            feed,
            config,
            cached: Mutex::new(None),
        }
    }

    /// Current verdict, served from cache within the configured window
    pub async fn verdict(&self) -> RegimeVerdict {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref() {
            if entry.at.elapsed().as_secs() < self.config.regime_cache_secs {
                return entry.verdict;
            }
        }

        let verdict = self.fetch_verdict().await;
        *cached = Some(CachedVerdict {
            at: Instant::now(),
            verdict,
        });
        verdict
    }

    async fn fetch_verdict(&self) -> RegimeVerdict {
        match self.feed.token_pair(&self.config.reference_token).await {
            Ok(Some(snap)) => {
                let bearish = snap.change_1h_pct < self.config.regime_min_change_1h_pct
                    || snap.change_5m_pct < self.config.regime_min_change_5m_pct;

                if bearish {
                    debug!(
                        "Bearish regime: reference 1h {:.2}% 5m {:.2}%",
                        snap.change_1h_pct, snap.change_5m_pct
                    );
                }

                RegimeVerdict {
                    tradable: !bearish,
                    native_price_usd: Some(snap.price_usd),
                }
            }
            Ok(None) => {
                warn!("Regime check: no data for reference asset, proceeding");
                RegimeVerdict {
                    tradable: true,
                    native_price_usd: None,
                }
            }
            Err(e) => {
                // Fail open: a broken feed must not freeze the engine
                warn!("Regime check failed ({}), proceeding with caution", e);
                RegimeVerdict {
                    tradable: true,
                    native_price_usd: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dexscreener::tests::{snapshot, StubFeed};
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::dexscreener::PairSnapshot;

    struct CountingFeed {
        inner: StubFeed,
        calls: AtomicU32,
    }

    #[async_trait]
    impl DiscoveryFeed for CountingFeed {
        async fn search_pairs(&self, query: &str) -> Result<Vec<PairSnapshot>> {
            self.inner.search_pairs(query).await
        }

        async fn token_pair(&self, token: &str) -> Result<Option<PairSnapshot>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.token_pair(token).await
        }

        async fn trending(&self) -> Result<HashSet<String>> {
            self.inner.trending().await
        }
    }

    struct FailingFeed;

    #[async_trait]
    impl DiscoveryFeed for FailingFeed {
        async fn search_pairs(&self, _query: &str) -> Result<Vec<PairSnapshot>> {
            Err(Error::FeedTimeout(10_000))
        }

        async fn token_pair(&self, _token: &str) -> Result<Option<PairSnapshot>> {
            Err(Error::FeedTimeout(10_000))
        }

        async fn trending(&self) -> Result<HashSet<String>> {
            Err(Error::FeedTimeout(10_000))
        }
    }

    fn config(reference: &str) -> GateConfig {
        GateConfig {
            reference_token: reference.into(),
            regime_min_change_1h_pct: -2.0,
            regime_min_change_5m_pct: -1.5,
            regime_cache_secs: 60,
            ..Default::default()
        }
    }

    fn feed_with_reference(change_1h: f64, change_5m: f64) -> StubFeed {
        let mut feed = StubFeed::new();
        let mut reference = snapshot("ref_mint", "solana");
        reference.change_1h_pct = change_1h;
        reference.change_5m_pct = change_5m;
        reference.price_usd = 150.0;
        feed.by_query.insert("q".into(), vec![reference]);
        feed
    }

    #[tokio::test]
    async fn test_healthy_regime_is_tradable() {
        let filter = RegimeFilter::new(
            Arc::new(feed_with_reference(1.0, 0.2)),
            config("ref_mint"),
        );
        let verdict = filter.verdict().await;
        assert!(verdict.tradable);
        assert_eq!(verdict.native_price_usd, Some(150.0));
    }

    #[tokio::test]
    async fn test_bearish_hour_blocks_cycle() {
        let filter = RegimeFilter::new(
            Arc::new(feed_with_reference(-2.5, 0.0)),
            config("ref_mint"),
        );
        assert!(!filter.verdict().await.tradable);
    }

    #[tokio::test]
    async fn test_bearish_five_minutes_blocks_cycle() {
        let filter = RegimeFilter::new(
            Arc::new(feed_with_reference(0.0, -1.6)),
            config("ref_mint"),
        );
        assert!(!filter.verdict().await.tradable);
    }

    #[tokio::test]
    async fn test_fetch_error_fails_open() {
        let filter = RegimeFilter::new(Arc::new(FailingFeed), config("ref_mint"));
        let verdict = filter.verdict().await;
        assert!(verdict.tradable);
        assert_eq!(verdict.native_price_usd, None);
    }

    #[tokio::test]
    async fn test_verdict_is_cached() {
        let feed = Arc::new(CountingFeed {
            inner: feed_with_reference(1.0, 0.2),
            calls: AtomicU32::new(0),
        });
        let filter = RegimeFilter::new(feed.clone(), config("ref_mint"));

        filter.verdict().await;
        filter.verdict().await;
        filter.verdict().await;

        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
    }
}

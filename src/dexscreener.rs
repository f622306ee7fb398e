// DexScreener API client: pair discovery, trending set, price lookups
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ScannerConfig;
use crate::error::{Error, Result};

const DEXSCREENER_BASE: &str = "https://api.dexscreener.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBoost {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "tokenAddress")]
    pub token_address: String,
    #[serde(rename = "totalAmount")]
    pub total_amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceChange {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Txns {
    pub m5: Option<TxnCount>,
    pub h1: Option<TxnCount>,
    pub h6: Option<TxnCount>,
    pub h24: Option<TxnCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxnCount {
    pub buys: u32,
    pub sells: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
    pub base: Option<f64>,
    pub quote: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseToken {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPair {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "dexId")]
    pub dex_id: String,
    #[serde(rename = "pairAddress")]
    pub pair_address: String,
    #[serde(rename = "baseToken")]
    pub base_token: BaseToken,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    #[serde(rename = "priceChange")]
    pub price_change: Option<PriceChange>,
    pub txns: Option<Txns>,
    pub volume: Option<Volume>,
    pub liquidity: Option<Liquidity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub pairs: Option<Vec<DexPair>>,
}

/// One trading-pair snapshot, normalized for the decision core
#[derive(Debug, Clone)]
pub struct PairSnapshot {
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
}

impl PairSnapshot {
    /// Normalize a raw API pair. Returns None for malformed snapshots
    /// (missing or unparseable price), which are dropped upstream.
    pub fn from_pair(pair: &DexPair) -> Option<Self> {
        let price_usd = pair.price_usd.as_ref()?.parse::<f64>().ok()?;
        if !price_usd.is_finite() || price_usd <= 0.0 {
            return None;
        }

        let change = pair.price_change.as_ref();
        let volume = pair.volume.as_ref();
        let (buys_24h, sells_24h) = pair
            .txns
            .as_ref()
            .and_then(|t| t.h24.as_ref())
            .map(|h24| (h24.buys, h24.sells))
            .unwrap_or((0, 0));

        Some(Self {
            token: pair.base_token.address.clone(),
            symbol: pair
                .base_token
                .symbol
                .clone()
                .unwrap_or_else(|| "???".to_string()),
            chain: pair.chain_id.clone(),
            price_usd,
            liquidity_usd: pair.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0),
            volume_24h_usd: volume.and_then(|v| v.h24).unwrap_or(0.0),
            volume_1h_usd: volume.and_then(|v| v.h1).unwrap_or(0.0),
            change_5m_pct: change.and_then(|c| c.m5).unwrap_or(0.0),
            change_1h_pct: change.and_then(|c| c.h1).unwrap_or(0.0),
            buys_24h,
            sells_24h,
        })
    }

    pub fn txns_24h(&self) -> u32 {
        self.buys_24h + self.sells_24h
    }

    /// Buys over total transactions; an empty pair counts as zero pressure
    pub fn buy_ratio(&self) -> f64 {
        let total = self.txns_24h();
        if total == 0 {
            return 0.0;
        }
        self.buys_24h as f64 / total as f64
    }

    pub fn sell_ratio(&self) -> f64 {
        let total = self.txns_24h();
        if total == 0 {
            return 0.0;
        }
        self.sells_24h as f64 / total as f64
    }
}

/// Discovery/price collaborator the decision core depends on
#[async_trait]
pub trait DiscoveryFeed: Send + Sync {
    /// Free-text pair search
    async fn search_pairs(&self, query: &str) -> Result<Vec<PairSnapshot>>;

    /// Best pair for one token, None when the feed has no data for it
    async fn token_pair(&self, token: &str) -> Result<Option<PairSnapshot>>;

    /// Trending/boosted token addresses
    async fn trending(&self) -> Result<HashSet<String>>;
}

pub struct DexScreenerClient {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl DexScreenerClient {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout_ms,
        }
    }

    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::FeedTimeout(self.timeout_ms)
        } else {
            Error::Feed(e.to_string())
        }
    }
}

#[async_trait]
impl DiscoveryFeed for DexScreenerClient {
    async fn search_pairs(&self, query: &str) -> Result<Vec<PairSnapshot>> {
        let url = format!("{}/latest/dex/search?q={}", DEXSCREENER_BASE, query);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let data: SearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Feed(format!("Failed to parse search response: {}", e)))?;

        Ok(data
            .pairs
            .unwrap_or_default()
            .iter()
            .filter_map(PairSnapshot::from_pair)
            .collect())
    }

    async fn token_pair(&self, token: &str) -> Result<Option<PairSnapshot>> {
        let url = format!("{}/latest/dex/tokens/{}", DEXSCREENER_BASE, token);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let data: SearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Feed(format!("Failed to parse token response: {}", e)))?;

        // The most liquid pair is the reference for price checks
        let best = data.pairs.unwrap_or_default().iter().filter_map(PairSnapshot::from_pair).fold(
            None::<PairSnapshot>,
            |best, snap| match best {
                Some(b) if b.liquidity_usd >= snap.liquidity_usd => Some(b),
                _ => Some(snap),
            },
        );
        Ok(best)
    }

    async fn trending(&self) -> Result<HashSet<String>> {
        let url = format!("{}/token-boosts/top/v1", DEXSCREENER_BASE);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let boosts: Vec<TokenBoost> = resp
            .json()
            .await
            .map_err(|e| Error::Feed(format!("Failed to parse boosts: {}", e)))?;

        Ok(boosts.into_iter().map(|b| b.token_address).collect())
    }
}

/// Merges concurrent discovery queries into one deduplicated candidate set
pub struct SnapshotCollector {
    feed: Arc<dyn DiscoveryFeed>,
    config: ScannerConfig,
}

impl SnapshotCollector {
    pub fn new(feed: Arc<dyn DiscoveryFeed>, config: ScannerConfig) -> Self {
        Self { feed, config }
    }

    /// Fan out every configured search query plus the chain-wide query,
    /// concurrently. A failed query contributes nothing; this never errors
    /// and never aborts the cycle.
    pub async fn collect(&self) -> Vec<PairSnapshot> {
        let mut queries: Vec<&str> = self
            .config
            .search_queries
            .iter()
            .map(String::as_str)
            .collect();
        queries.push(self.config.chain_id.as_str());

        let fetches = queries.iter().map(|q| {
            let feed = self.feed.clone();
            let query = q.to_string();
            async move {
                match feed.search_pairs(&query).await {
                    Ok(pairs) => pairs,
                    Err(e) => {
                        warn!("Discovery query '{}' failed: {}", query, e);
                        Vec::new()
                    }
                }
            }
        });

        let results = join_all(fetches).await;

        // Dedupe by token address, first occurrence wins
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for snap in results.into_iter().flatten() {
            if snap.chain != self.config.chain_id {
                continue;
            }
            if seen.insert(snap.token.clone()) {
                merged.push(snap);
            }
        }

        debug!("Collected {} unique candidates", merged.len());
        merged
    }

    /// Trending set for the score bonus; degrades to empty on failure
    pub async fn trending_set(&self) -> HashSet<String> {
        match self.feed.trending().await {
            Ok(set) => set,
            Err(e) => {
                warn!("Trending fetch failed: {}", e);
                HashSet::new()
            }
        }
    }
}

//! Configuration loading and validation
//!
//! One immutable snapshot per run. Every threshold the decision loop uses is
//! read from here at startup and never re-read, so a config edit cannot
//! change the rules of a running session (restart to apply).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Wrapped SOL mint, the chain's reference asset
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Environment variable holding the base58 wallet secret key (live mode)
pub const WALLET_KEY_ENV: &str = "SCOUT_WALLET_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub cooldown: CooldownConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub exits: ExitConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub quote: QuoteConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Chain to trade on (snapshots from other chains are dropped)
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    /// Free-text discovery queries, fanned out concurrently each cycle
    #[serde(default = "default_search_queries")]
    pub search_queries: Vec<String>,
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_feed_timeout_ms")]
    pub feed_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: f64,
    #[serde(default = "default_max_liquidity_usd")]
    pub max_liquidity_usd: f64,
    #[serde(default = "default_min_volume_24h_usd")]
    pub min_volume_24h_usd: f64,
    /// Soft 5-minute momentum band scored at full points
    #[serde(default = "default_min_change_5m_pct")]
    pub min_change_5m_pct: f64,
    #[serde(default = "default_max_change_5m_pct")]
    pub max_change_5m_pct: f64,
    /// Candidates below this total never reach the risk gate
    #[serde(default = "default_min_score")]
    pub min_score: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Reject candidates whose buy ratio falls below this floor
    #[serde(default = "default_min_buy_ratio")]
    pub min_buy_ratio: f64,
    /// Honeypot proxy: minimum 24h sell count
    #[serde(default = "default_min_sells_24h")]
    pub min_sells_24h: u32,
    /// Honeypot proxy: minimum sells / total transactions
    #[serde(default = "default_min_sell_ratio")]
    pub min_sell_ratio: f64,
    /// Hard 5-minute momentum floor (stricter than the scorer's soft band)
    #[serde(default = "default_hard_min_change_5m_pct")]
    pub hard_min_change_5m_pct: f64,
    /// Actual-vs-expected 5m volume multiple required as spike confirmation
    #[serde(default = "default_volume_spike_multiplier")]
    pub volume_spike_multiplier: f64,
    /// Round-trip quote probes per cycle (bounds external calls)
    #[serde(default = "default_max_quote_probes")]
    pub max_quote_probes: usize,
    /// Minimum net edge after round-trip cost; negative allows data
    /// collection in paper mode
    #[serde(default = "default_profit_buffer_pct")]
    pub profit_buffer_pct: f64,
    /// Regime floor on the reference asset's 1h change
    #[serde(default = "default_regime_min_change_1h_pct")]
    pub regime_min_change_1h_pct: f64,
    /// Regime floor on the reference asset's 5m change
    #[serde(default = "default_regime_min_change_5m_pct")]
    pub regime_min_change_5m_pct: f64,
    #[serde(default = "default_regime_cache_secs")]
    pub regime_cache_secs: u64,
    /// Reference asset used for the market-regime read
    #[serde(default = "default_reference_token")]
    pub reference_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CooldownConfig {
    /// Base exclusion window after a losing trade
    #[serde(default = "default_token_cooldown_secs")]
    pub token_cooldown_secs: u64,
    /// Escalated window once a token keeps losing
    #[serde(default = "default_extended_cooldown_secs")]
    pub extended_cooldown_secs: u64,
    /// Loss count at which the extended window applies
    #[serde(default = "default_max_losses_per_token")]
    pub max_losses_per_token: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Submit real transactions; false runs the paper submitter
    #[serde(default)]
    pub live: bool,
    /// Percent of running balance committed per entry
    #[serde(default = "default_position_size_pct")]
    pub position_size_pct: f64,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Entries below this notional are skipped as dust
    #[serde(default = "default_min_notional_usd")]
    pub min_notional_usd: f64,
    /// Slippage budget by 5m momentum, steepest matching tier wins
    #[serde(default = "default_slippage_tiers")]
    pub slippage_tiers: Vec<SlippageTier>,
    /// Total sell attempts when the chain rejects on slippage
    #[serde(default = "default_max_sell_attempts")]
    pub max_sell_attempts: u32,
    /// Fixed delay before a fresh-quote retry
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_priority_fee_lamports")]
    pub priority_fee_lamports: u64,
    /// Paper starting balance
    #[serde(default = "default_starting_balance_usd")]
    pub starting_balance_usd: f64,
}

/// One row of the volatility-tiered slippage table
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SlippageTier {
    /// Tier applies when 5m change is at least this
    pub min_change_5m_pct: f64,
    /// Slippage budget in percent
    pub slippage_pct: f64,
}

impl TradingConfig {
    /// Slippage budget for a candidate's volatility class.
    /// Tiers are validated ascending; the last one at or below the
    /// observed momentum wins.
    pub fn slippage_for(&self, change_5m_pct: f64) -> f64 {
        self.slippage_tiers
            .iter()
            .rev()
            .find(|t| change_5m_pct >= t.min_change_5m_pct)
            .or_else(|| self.slippage_tiers.first())
            .map(|t| t.slippage_pct)
            .unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExitConfig {
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    /// Profit % at which the trailing stop arms
    #[serde(default = "default_trailing_activation_pct")]
    pub trailing_activation_pct: f64,
    /// Pullback from peak that fires the trailing stop
    #[serde(default = "default_trailing_distance_pct")]
    pub trailing_distance_pct: f64,
    #[serde(default = "default_max_hold_secs")]
    pub max_hold_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_rpc_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteConfig {
    #[serde(default = "default_quote_base_url")]
    pub base_url: String,
    #[serde(default = "default_quote_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Webhook to POST trade outcomes to; empty logs locally instead
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Directory for positions.json and session.json
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

// Default value functions
fn default_chain_id() -> String {
    "solana".into()
}

fn default_search_queries() -> Vec<String> {
    vec!["pump".into(), "bonk".into(), "trending".into()]
}

fn default_scan_interval_secs() -> u64 {
    30
}

fn default_feed_timeout_ms() -> u64 {
    10_000
}

fn default_min_liquidity_usd() -> f64 {
    25_000.0
}

fn default_max_liquidity_usd() -> f64 {
    500_000.0
}

fn default_min_volume_24h_usd() -> f64 {
    50_000.0
}

fn default_min_change_5m_pct() -> f64 {
    2.0
}

fn default_max_change_5m_pct() -> f64 {
    40.0
}

fn default_min_score() -> u32 {
    60
}

fn default_min_buy_ratio() -> f64 {
    0.55
}

fn default_min_sells_24h() -> u32 {
    30
}

fn default_min_sell_ratio() -> f64 {
    0.25
}

fn default_hard_min_change_5m_pct() -> f64 {
    1.0
}

fn default_volume_spike_multiplier() -> f64 {
    1.5
}

fn default_max_quote_probes() -> usize {
    5
}

fn default_profit_buffer_pct() -> f64 {
    0.5
}

fn default_regime_min_change_1h_pct() -> f64 {
    -2.0
}

fn default_regime_min_change_5m_pct() -> f64 {
    -1.5
}

fn default_regime_cache_secs() -> u64 {
    60
}

fn default_reference_token() -> String {
    NATIVE_MINT.into()
}

fn default_token_cooldown_secs() -> u64 {
    1800
}

fn default_extended_cooldown_secs() -> u64 {
    7200
}

fn default_max_losses_per_token() -> u32 {
    2
}

fn default_position_size_pct() -> f64 {
    4.0
}

fn default_max_positions() -> usize {
    3
}

fn default_min_notional_usd() -> f64 {
    1.0
}

fn default_slippage_tiers() -> Vec<SlippageTier> {
    vec![
        SlippageTier {
            min_change_5m_pct: 0.0,
            slippage_pct: 10.0,
        },
        SlippageTier {
            min_change_5m_pct: 10.0,
            slippage_pct: 15.0,
        },
        SlippageTier {
            min_change_5m_pct: 25.0,
            slippage_pct: 25.0,
        },
    ]
}

fn default_max_sell_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_priority_fee_lamports() -> u64 {
    100_000
}

fn default_starting_balance_usd() -> f64 {
    100.0
}

fn default_stop_loss_pct() -> f64 {
    6.0
}

fn default_take_profit_pct() -> f64 {
    10.0
}

fn default_trailing_activation_pct() -> f64 {
    4.0
}

fn default_trailing_distance_pct() -> f64 {
    3.0
}

fn default_max_hold_secs() -> u64 {
    1800
}

fn default_rpc_endpoint() -> String {
    std::env::var("RPC_ENDPOINT").unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())
}

fn default_rpc_timeout_ms() -> u64 {
    30_000
}

fn default_rpc_max_retries() -> u32 {
    3
}

fn default_quote_base_url() -> String {
    "https://quote-api.jup.ag/v6".into()
}

fn default_quote_timeout_ms() -> u64 {
    10_000
}

fn default_notify_timeout_ms() -> u64 {
    5_000
}

fn default_state_dir() -> String {
    "state".into()
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            search_queries: default_search_queries(),
            scan_interval_secs: default_scan_interval_secs(),
            feed_timeout_ms: default_feed_timeout_ms(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_liquidity_usd: default_min_liquidity_usd(),
            max_liquidity_usd: default_max_liquidity_usd(),
            min_volume_24h_usd: default_min_volume_24h_usd(),
            min_change_5m_pct: default_min_change_5m_pct(),
            max_change_5m_pct: default_max_change_5m_pct(),
            min_score: default_min_score(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_buy_ratio: default_min_buy_ratio(),
            min_sells_24h: default_min_sells_24h(),
            min_sell_ratio: default_min_sell_ratio(),
            hard_min_change_5m_pct: default_hard_min_change_5m_pct(),
            volume_spike_multiplier: default_volume_spike_multiplier(),
            max_quote_probes: default_max_quote_probes(),
            profit_buffer_pct: default_profit_buffer_pct(),
            regime_min_change_1h_pct: default_regime_min_change_1h_pct(),
            regime_min_change_5m_pct: default_regime_min_change_5m_pct(),
            regime_cache_secs: default_regime_cache_secs(),
            reference_token: default_reference_token(),
        }
    }
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            token_cooldown_secs: default_token_cooldown_secs(),
            extended_cooldown_secs: default_extended_cooldown_secs(),
            max_losses_per_token: default_max_losses_per_token(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            live: false,
            position_size_pct: default_position_size_pct(),
            max_positions: default_max_positions(),
            min_notional_usd: default_min_notional_usd(),
            slippage_tiers: default_slippage_tiers(),
            max_sell_attempts: default_max_sell_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            priority_fee_lamports: default_priority_fee_lamports(),
            starting_balance_usd: default_starting_balance_usd(),
        }
    }
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            trailing_activation_pct: default_trailing_activation_pct(),
            trailing_distance_pct: default_trailing_distance_pct(),
            max_hold_secs: default_max_hold_secs(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_ms: default_rpc_timeout_ms(),
            max_retries: default_rpc_max_retries(),
        }
    }
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_quote_base_url(),
            timeout_ms: default_quote_timeout_ms(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            timeout_ms: default_notify_timeout_ms(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scanner: ScannerConfig::default(),
            scoring: ScoringConfig::default(),
            gate: GateConfig::default(),
            cooldown: CooldownConfig::default(),
            trading: TradingConfig::default(),
            exits: ExitConfig::default(),
            rpc: RpcConfig::default(),
            quote: QuoteConfig::default(),
            notify: NotifyConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SCOUT_)
            .add_source(
                config::Environment::with_prefix("SCOUT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.scanner.search_queries.is_empty() {
            anyhow::bail!("scanner.search_queries must not be empty");
        }

        if self.scanner.scan_interval_secs == 0 {
            anyhow::bail!("scanner.scan_interval_secs must be positive");
        }

        if self.scoring.min_liquidity_usd <= 0.0
            || self.scoring.max_liquidity_usd < self.scoring.min_liquidity_usd
        {
            anyhow::bail!("scoring liquidity bounds must satisfy 0 < min <= max");
        }

        if self.trading.position_size_pct <= 0.0 || self.trading.position_size_pct > 100.0 {
            anyhow::bail!("trading.position_size_pct must be in (0, 100]");
        }

        if self.trading.max_positions == 0 {
            anyhow::bail!("trading.max_positions must be at least 1");
        }

        if self.trading.max_sell_attempts == 0 {
            anyhow::bail!("trading.max_sell_attempts must be at least 1");
        }

        if self.trading.slippage_tiers.is_empty() {
            anyhow::bail!("trading.slippage_tiers must not be empty");
        }

        let mut last = f64::NEG_INFINITY;
        for tier in &self.trading.slippage_tiers {
            if tier.min_change_5m_pct < last {
                anyhow::bail!("trading.slippage_tiers must be sorted by min_change_5m_pct");
            }
            if tier.slippage_pct <= 0.0 || tier.slippage_pct > 100.0 {
                anyhow::bail!("slippage_pct must be in (0, 100]");
            }
            last = tier.min_change_5m_pct;
        }

        if self.exits.stop_loss_pct <= 0.0 || self.exits.stop_loss_pct >= 100.0 {
            anyhow::bail!("exits.stop_loss_pct must be between 0 and 100");
        }

        if self.exits.take_profit_pct <= 0.0 {
            anyhow::bail!("exits.take_profit_pct must be positive");
        }

        if self.exits.trailing_distance_pct <= 0.0 {
            anyhow::bail!("exits.trailing_distance_pct must be positive");
        }

        if self.cooldown.extended_cooldown_secs < self.cooldown.token_cooldown_secs {
            anyhow::bail!("cooldown.extended_cooldown_secs must be >= token_cooldown_secs");
        }

        if self.cooldown.max_losses_per_token == 0 {
            anyhow::bail!("cooldown.max_losses_per_token must be at least 1");
        }

        // Live trading needs a signing key before the first cycle, not mid-run
        if self.trading.live && std::env::var(WALLET_KEY_ENV).is_err() {
            anyhow::bail!("{} must be set for live trading", WALLET_KEY_ENV);
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Scanner:
    chain: {}
    queries: {:?}
    interval: {}s
  Scoring:
    liquidity: {} - {} USD
    min_volume_24h: {} USD
    min_score: {}
  Gate:
    min_buy_ratio: {}
    honeypot: >= {} sells, sell ratio >= {}
    profit_buffer: {}%
    quote_probes: {}
  Trading:
    live: {}
    position_size: {}%
    max_positions: {}
    sell_attempts: {}
  Exits:
    stop_loss: {}%
    take_profit: {}%
    trailing: {}% after +{}%
    max_hold: {}s
  RPC:
    endpoint: {}
  Notify:
    webhook: {}
"#,
            self.scanner.chain_id,
            self.scanner.search_queries,
            self.scanner.scan_interval_secs,
            self.scoring.min_liquidity_usd,
            self.scoring.max_liquidity_usd,
            self.scoring.min_volume_24h_usd,
            self.scoring.min_score,
            self.gate.min_buy_ratio,
            self.gate.min_sells_24h,
            self.gate.min_sell_ratio,
            self.gate.profit_buffer_pct,
            self.gate.max_quote_probes,
            self.trading.live,
            self.trading.position_size_pct,
            self.trading.max_positions,
            self.trading.max_sell_attempts,
            self.exits.stop_loss_pct,
            self.exits.take_profit_pct,
            self.exits.trailing_distance_pct,
            self.exits.trailing_activation_pct,
            self.exits.max_hold_secs,
            mask_url(&self.rpc.endpoint),
            if self.notify.webhook_url.is_empty() {
                "(log only)".to_string()
            } else {
                mask_url(&self.notify.webhook_url)
            },
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

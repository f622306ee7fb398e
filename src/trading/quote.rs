//! Swap quote provider
//!
//! Jupiter-style aggregator API: quotes carry the output amount and the
//! price impact of the route, swap builds return a signable base64
//! transaction. "No route" is reported distinctly from transient errors
//! because the gate treats it as a honeypot signal, never a retry.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::QuoteConfig;
use crate::error::{Error, Result};

/// One priced swap leg
#[derive(Debug, Clone)]
pub struct SwapQuote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    /// Absolute value is the cost of this leg
    pub price_impact_pct: f64,
    pub slippage_bps: u16,
    /// Raw quote payload, passed back verbatim on swap build
    pub response: serde_json::Value,
}

/// Swap/quote collaborator the gate and executor depend on
#[async_trait]
pub trait SwapProvider: Send + Sync {
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<SwapQuote>;

    /// Build a signable transaction for a previously fetched quote
    async fn build_swap(&self, quote: &SwapQuote, user_pubkey: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "outAmount")]
    out_amount: Option<String>,
    #[serde(rename = "inAmount")]
    in_amount: Option<String>,
    #[serde(rename = "priceImpactPct")]
    price_impact_pct: Option<String>,
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SwapResponse {
    #[serde(rename = "swapTransaction")]
    swap_transaction: Option<String>,
    error: Option<String>,
}

pub struct JupiterClient {
    client: reqwest::Client,
    base_url: String,
    priority_fee_lamports: u64,
}

impl JupiterClient {
    pub fn new(config: &QuoteConfig, priority_fee_lamports: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(config.timeout_ms))
                .build()
                .unwrap_or_default(),
            base_url: config.base_url.clone(),
            priority_fee_lamports,
        }
    }
}

#[async_trait]
impl SwapProvider for JupiterClient {
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<SwapQuote> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.base_url, input_mint, output_mint, amount, slippage_bps
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Quote(format!("quote request failed: {}", e)))?;

        let raw: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Quote(format!("quote response unreadable: {}", e)))?;

        let parsed: QuoteResponse = serde_json::from_value(raw.clone())?;

        if let Some(code) = &parsed.error_code {
            if code.eq_ignore_ascii_case("COULD_NOT_FIND_ANY_ROUTE") {
                return Err(Error::NoRoute(format!("{} -> {}", input_mint, output_mint)));
            }
            return Err(Error::Quote(code.clone()));
        }
        if let Some(error) = parsed.error {
            if error.to_lowercase().contains("route") {
                return Err(Error::NoRoute(error));
            }
            return Err(Error::Quote(error));
        }

        let out_amount = parsed
            .out_amount
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::Quote("quote missing outAmount".into()))?;
        let in_amount = parsed
            .in_amount
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(amount);
        let price_impact_pct = parsed
            .price_impact_pct
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);

        debug!(
            "Quote {} -> {}: out {} impact {:.4}%",
            input_mint, output_mint, out_amount, price_impact_pct
        );

        Ok(SwapQuote {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            in_amount,
            out_amount,
            price_impact_pct,
            slippage_bps,
            response: raw,
        })
    }

    async fn build_swap(&self, quote: &SwapQuote, user_pubkey: &str) -> Result<String> {
        let url = format!("{}/swap", self.base_url);
        let body = json!({
            "quoteResponse": quote.response,
            "userPublicKey": user_pubkey,
            "wrapAndUnwrapSol": true,
            "prioritizationFeeLamports": self.priority_fee_lamports,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::TransactionBuild(format!("swap request failed: {}", e)))?;

        let parsed: SwapResponse = resp
            .json()
            .await
            .map_err(|e| Error::TransactionBuild(format!("swap response unreadable: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(Error::TransactionBuild(error));
        }

        parsed
            .swap_transaction
            .ok_or_else(|| Error::TransactionBuild("no transaction in response".into()))
    }
}

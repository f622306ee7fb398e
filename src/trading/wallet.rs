//! Wallet and transaction submission
//!
//! The submitter signs the base64 transaction the quote provider built and
//! pushes it through RPC. Failure strings are passed through untouched so
//! the coordinator's classifier can tell a slippage rejection from the
//! rest. Paper mode swaps in a submitter that fills instantly.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use solana_client::client_error::ClientErrorKind;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::VersionedTransaction;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{RpcConfig, WALLET_KEY_ENV};
use crate::error::{classify_submit_error, Error, Result, SubmitErrorKind};

/// Wallet/submitter collaborator
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    /// Public key quoted swaps are built against
    fn pubkey(&self) -> String;

    /// Sign and submit; returns the transaction reference
    async fn sign_and_submit(&self, tx_base64: &str) -> Result<String>;
}

/// Paper submitter: accepts everything, fills nothing on-chain
pub struct PaperSubmitter;

#[async_trait]
impl TxSubmitter for PaperSubmitter {
    fn pubkey(&self) -> String {
        // Placeholder key; paper swaps are never submitted
        "11111111111111111111111111111111".to_string()
    }

    async fn sign_and_submit(&self, _tx_base64: &str) -> Result<String> {
        Ok(format!("paper-{}", Uuid::new_v4()))
    }
}

/// Live submitter over Solana RPC
pub struct RpcSubmitter {
    keypair: Keypair,
    client: RpcClient,
    retry_base_delay_ms: u64,
}

impl RpcSubmitter {
    /// Build from config plus the key in SCOUT_WALLET_KEY (base58 secret)
    pub fn from_env(config: &RpcConfig) -> Result<Self> {
        let encoded = std::env::var(WALLET_KEY_ENV)
            .map_err(|_| Error::MissingEnvVar(WALLET_KEY_ENV.to_string()))?;
        let keypair = parse_keypair(&encoded)?;

        let client = RpcClient::new_with_timeout(
            config.endpoint.clone(),
            Duration::from_millis(config.timeout_ms),
        );

        info!("Wallet loaded: {}", keypair.pubkey());

        Ok(Self {
            keypair,
            client,
            retry_base_delay_ms: 200,
        })
    }
}

fn parse_keypair(encoded: &str) -> Result<Keypair> {
    let bytes = bs58::decode(encoded.trim())
        .into_vec()
        .map_err(|e| Error::InvalidKeypair(format!("not base58: {}", e)))?;
    Keypair::from_bytes(&bytes).map_err(|e| Error::InvalidKeypair(e.to_string()))
}

#[async_trait]
impl TxSubmitter for RpcSubmitter {
    fn pubkey(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    async fn sign_and_submit(&self, tx_base64: &str) -> Result<String> {
        let bytes = BASE64
            .decode(tx_base64)
            .map_err(|e| Error::TransactionBuild(format!("transaction not base64: {}", e)))?;

        let mut tx: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|e| Error::TransactionBuild(format!("transaction undecodable: {}", e)))?;

        let message_data = tx.message.serialize();
        let signature = self.keypair.sign_message(&message_data);
        if tx.signatures.is_empty() {
            tx.signatures.push(signature);
        } else {
            tx.signatures[0] = signature;
        }

        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(self.retry_base_delay_ms),
            max_interval: Duration::from_millis(self.retry_base_delay_ms * 4),
            max_elapsed_time: Some(Duration::from_secs(5)),
            ..Default::default()
        };

        let signature = retry(backoff, || async {
            match self.client.send_transaction(&tx).await {
                Ok(sig) => Ok(sig),
                Err(e) => {
                    let message = e.to_string();
                    // Slippage and route rejections belong to the
                    // coordinator's fresh-quote logic, never retried here
                    if classify_submit_error(&message) != SubmitErrorKind::Other {
                        return Err(backoff::Error::permanent(Error::TransactionSend(message)));
                    }
                    if matches!(e.kind(), ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_)) {
                        warn!("Transient RPC error, retrying: {}", message);
                        Err(backoff::Error::transient(Error::TransactionSend(message)))
                    } else {
                        Err(backoff::Error::permanent(Error::TransactionSend(message)))
                    }
                }
            }
        })
        .await?;

        debug!("Submitted transaction {}", signature);
        Ok(signature.to_string())
    }
}

//! Ledger RPC capabilities: blockhash anchors and confirmation polling.
//!
//! `RpcAnchorSource` rotates across endpoints with retry/backoff for the
//! blockhash fetch; `RpcLedgerClient` polls signature statuses until the
//! transaction reaches the requested commitment or the anchor expires.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{commitment_config::CommitmentConfig, signature::Signature};
use solana_transaction_status::TransactionStatus;
use thiserror::Error;
use tokio::time::sleep;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::debug;

use crate::types::AnchorContext;

const RPC_TIMEOUT: Duration = Duration::from_millis(8_000);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The anchor's valid window closed before the signature was seen.
    #[error("anchor expired at block height {0}")]
    Expired(u64),
    #[error("rpc request failed: {0}")]
    Rpc(String),
}

/// Source of fresh network anchors. Fetched immediately before signing.
#[async_trait]
pub trait AnchorSource: Send + Sync {
    async fn latest_anchor(&self, commitment: CommitmentConfig) -> Result<AnchorContext>;
}

/// Ledger confirmation capability. Owns its own polling cadence; the anchor's
/// expiry height is the only deadline imposed on it.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Blocks until the signature reaches the commitment or the anchor
    /// expires. `Ok(None)` means landed cleanly, `Ok(Some(err))` means the
    /// transaction executed with an error.
    async fn await_confirmation(
        &self,
        signature: &Signature,
        anchor: &AnchorContext,
        commitment: CommitmentConfig,
    ) -> Result<Option<String>, LedgerError>;
}

/// Production anchor source over one or more RPC endpoints.
pub struct RpcAnchorSource {
    endpoints: Vec<String>,
    clients: Vec<Arc<RpcClient>>,
    rotation_index: AtomicUsize,
}

impl RpcAnchorSource {
    pub fn new(endpoints: Vec<String>) -> Self {
        let clients = endpoints
            .iter()
            .map(|endpoint| Arc::new(RpcClient::new_with_timeout(endpoint.clone(), RPC_TIMEOUT)))
            .collect();
        Self {
            endpoints,
            clients,
            rotation_index: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AnchorSource for RpcAnchorSource {
    async fn latest_anchor(&self, commitment: CommitmentConfig) -> Result<AnchorContext> {
        if self.clients.is_empty() {
            return Err(anyhow!("no rpc endpoints configured"));
        }

        let mut last_err = None;

        for _ in 0..self.endpoints.len() {
            let index = self.rotation_index.fetch_add(1, Ordering::Relaxed) % self.clients.len();
            let client = self.clients[index].clone();

            let retry_strategy = ExponentialBackoff::from_millis(50)
                .max_delay(Duration::from_millis(1_000))
                .map(jitter)
                .take(3);

            match Retry::spawn(retry_strategy, || async {
                client
                    .get_latest_blockhash_with_commitment(commitment)
                    .await
                    .map_err(|e| anyhow!(e.to_string()))
            })
            .await
            {
                Ok((blockhash, last_valid_block_height)) => {
                    return Ok(AnchorContext {
                        blockhash,
                        last_valid_block_height,
                    });
                }
                Err(e) => {
                    debug!(endpoint = %self.endpoints[index], "blockhash fetch failed: {}", e);
                    last_err = Some(e);
                }
            }
        }

        Err(anyhow!("all rpc endpoints failed: {:?}", last_err))
    }
}

/// Production confirmation poller.
pub struct RpcLedgerClient {
    client: Arc<RpcClient>,
    poll_interval: Duration,
}

impl RpcLedgerClient {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: Arc::new(RpcClient::new_with_timeout(endpoint, RPC_TIMEOUT)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn await_confirmation(
        &self,
        signature: &Signature,
        anchor: &AnchorContext,
        commitment: CommitmentConfig,
    ) -> Result<Option<String>, LedgerError> {
        loop {
            let statuses = self
                .client
                .get_signature_statuses(&[*signature])
                .await
                .map_err(|e| LedgerError::Rpc(e.to_string()))?;

            let status: Option<TransactionStatus> =
                statuses.value.into_iter().flatten().next();
            if let Some(status) = status {
                if status.satisfies_commitment(commitment) {
                    return Ok(status.err.map(|e| e.to_string()));
                }
            }

            let height = self
                .client
                .get_block_height_with_commitment(commitment)
                .await
                .map_err(|e| LedgerError::Rpc(e.to_string()))?;

            if height > anchor.last_valid_block_height {
                return Err(LedgerError::Expired(anchor.last_valid_block_height));
            }

            sleep(self.poll_interval).await;
        }
    }
}

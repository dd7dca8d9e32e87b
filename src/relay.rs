//! Block-engine relay transport.
//!
//! `RelayClient` is the capability the submission loop depends on;
//! `JitoRelayClient` is the production implementation speaking the
//! block-engine JSON-RPC API (`sendBundle`, `getTipAccounts`) with
//! base58-encoded bincode transactions.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};
use thiserror::Error;
use tracing::debug;

const JSONRPC_VERSION: &str = "2.0";
const REQUEST_ID: &str = "jito-bundler";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("relay rejected request: {0}")]
    Rejected(String),
    #[error("bundle encoding failed: {0}")]
    Encode(String),
}

/// Relay capability: tip-account discovery and bundle transport.
#[async_trait]
pub trait RelayClient: Send + Sync {
    async fn tip_accounts(&self) -> Result<Vec<Pubkey>, RelayError>;

    /// Sends an ordered bundle; returns the relay's bundle id.
    async fn send_bundle(
        &self,
        transactions: &[VersionedTransaction],
    ) -> Result<String, RelayError>;
}

pub struct JitoRelayClient {
    endpoint: String,
    http: Client,
}

impl JitoRelayClient {
    pub fn new(endpoint: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_millis(8_000))
            .build()
            .unwrap_or_default();
        Self { endpoint, http }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RelayError> {
        let payload = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": REQUEST_ID,
            "method": method,
            "params": params,
        });

        let response = self.http.post(&self.endpoint).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(RelayError::Rejected(format!(
                "{} returned status {}",
                method,
                response.status()
            )));
        }

        let value: Value = response.json().await?;
        if let Some(error) = value.get("error") {
            return Err(RelayError::Rejected(format!("{}: {}", method, error)));
        }

        Ok(value)
    }
}

#[async_trait]
impl RelayClient for JitoRelayClient {
    async fn tip_accounts(&self) -> Result<Vec<Pubkey>, RelayError> {
        let value = self.call("getTipAccounts", json!([])).await?;

        let accounts = value
            .get("result")
            .and_then(|v| v.as_array())
            .ok_or_else(|| RelayError::Rejected("getTipAccounts: malformed result".to_string()))?
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(|s| Pubkey::from_str(s).ok())
            .collect::<Vec<_>>();

        debug!(count = accounts.len(), "discovered relay tip accounts");
        Ok(accounts)
    }

    async fn send_bundle(
        &self,
        transactions: &[VersionedTransaction],
    ) -> Result<String, RelayError> {
        let encoded = transactions
            .iter()
            .map(encode_transaction)
            .collect::<Result<Vec<_>, _>>()?;

        let value = self
            .call("sendBundle", json!([Value::Array(
                encoded.into_iter().map(Value::String).collect()
            )]))
            .await?;

        let bundle_id = value
            .get("result")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RelayError::Rejected("sendBundle: missing bundle id".to_string()))?;

        debug!(bundle_id, transactions = transactions.len(), "bundle accepted by relay");
        Ok(bundle_id.to_string())
    }
}

fn encode_transaction(tx: &VersionedTransaction) -> Result<String, RelayError> {
    let bytes = bincode::serialize(tx).map_err(|e| RelayError::Encode(e.to_string()))?;
    Ok(bs58::encode(bytes).into_string())
}

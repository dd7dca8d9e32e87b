//! Wallet manager.
//!
//! Loads the fee-payer keypair from the file named in the configuration and
//! provides the signing interface for bundle transactions. The keypair never
//! leaves this module.

use anyhow::{Context, Result};
use solana_sdk::{
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};
use std::fs;

use crate::config::Config;

#[derive(Debug)]
pub struct WalletManager {
    keypair: Keypair,
}

impl WalletManager {
    /// Loads the keypair from the path specified in the application config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let keypair_path = &config.keypair_path;
        let keypair_data = fs::read_to_string(keypair_path)
            .with_context(|| format!("Failed to read keypair file at '{}'", keypair_path))?;

        let keypair_bytes: Vec<u8> = serde_json::from_str(&keypair_data)
            .with_context(|| format!("Failed to parse keypair JSON from '{}'", keypair_path))?;

        let keypair = Keypair::try_from(&keypair_bytes[..])
            .map_err(|e| anyhow::anyhow!("Failed to create keypair from bytes: {}", e))?;

        tracing::info!("Wallet loaded. Pubkey: {}", keypair.pubkey());
        Ok(Self { keypair })
    }

    /// Wraps an already-constructed keypair; used by tests and embedders.
    pub fn from_keypair(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Signs a compiled v0 message into a sendable transaction.
    pub fn sign_message(&self, message: VersionedMessage) -> Result<VersionedTransaction> {
        VersionedTransaction::try_new(message, &[&self.keypair])
            .map_err(|e| anyhow::anyhow!("Failed to sign transaction: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        hash::Hash,
        message::{v0::Message as MessageV0, VersionedMessage},
        system_instruction,
    };

    #[test]
    fn signs_a_simple_transfer_message() {
        let wallet = WalletManager::from_keypair(Keypair::new());
        let payer = wallet.pubkey();
        let ix = system_instruction::transfer(&payer, &Pubkey::new_unique(), 1);

        let message = MessageV0::try_compile(&payer, &[ix], &[], Hash::new_unique()).unwrap();
        let tx = wallet
            .sign_message(VersionedMessage::V0(message))
            .expect("signing should succeed");

        assert_eq!(tx.signatures.len(), 1);
        assert!(tx.verify_with_results().iter().all(|ok| *ok));
    }
}

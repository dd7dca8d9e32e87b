//! Bundle assembly.
//!
//! Compiles the filtered instruction set into a signed v0 transaction against
//! a blockhash fetched immediately before signing, enforces the wire-size
//! limit before anything touches the network, builds the tip-payment
//! transaction, and composes the capped, ordered bundle with the tip last.

use std::sync::{Arc, Mutex, PoisonError};

use solana_sdk::{
    commitment_config::CommitmentConfig,
    instruction::Instruction,
    message::{v0::Message as MessageV0, VersionedMessage},
    packet::PACKET_DATA_SIZE,
    pubkey::Pubkey,
    system_instruction,
    transaction::VersionedTransaction,
};
use thiserror::Error;
use tracing::debug;

use crate::rpc::AnchorSource;
use crate::types::AnchorContext;
use crate::wallet::WalletManager;

/// Relays reject transactions above the wire limit, so this is checked
/// before submission, never truncated.
pub const MAX_SERIALIZED_TX_BYTES: usize = PACKET_DATA_SIZE;

/// Hard cap on transactions per bundle, tip transaction included.
pub const BUNDLE_TRANSACTION_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("transaction is {size} bytes, wire limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("bundle holds {count} transactions, cap is {limit} including the tip")]
    BundleFull { count: usize, limit: usize },
    #[error("anchor fetch failed: {0}")]
    Anchor(String),
    #[error("message compile failed: {0}")]
    Compile(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
}

pub struct BundleAssembler {
    wallet: Arc<WalletManager>,
    anchors: Arc<dyn AnchorSource>,
    commitment: CommitmentConfig,
    rng: Mutex<fastrand::Rng>,
}

impl BundleAssembler {
    pub fn new(
        wallet: Arc<WalletManager>,
        anchors: Arc<dyn AnchorSource>,
        commitment: CommitmentConfig,
    ) -> Self {
        Self::with_rng(wallet, anchors, commitment, fastrand::Rng::new())
    }

    /// Seedable variant for deterministic tip-account selection in tests.
    pub fn with_rng(
        wallet: Arc<WalletManager>,
        anchors: Arc<dyn AnchorSource>,
        commitment: CommitmentConfig,
        rng: fastrand::Rng,
    ) -> Self {
        Self {
            wallet,
            anchors,
            commitment,
            rng: Mutex::new(rng),
        }
    }

    /// Fetches a fresh anchor at the configured commitment.
    pub async fn capture_anchor(&self) -> Result<AnchorContext, AssembleError> {
        self.anchors
            .latest_anchor(self.commitment)
            .await
            .map_err(|e| AssembleError::Anchor(e.to_string()))
    }

    /// Builds and signs the primary transaction, rejecting it if the
    /// serialized form exceeds the wire limit. Returns the anchor it was
    /// signed against so the caller can bound confirmation by its expiry.
    pub async fn build_primary(
        &self,
        instructions: &[Instruction],
    ) -> Result<(VersionedTransaction, AnchorContext), AssembleError> {
        let anchor = self.capture_anchor().await?;
        let tx = self.compile_and_sign(instructions, &anchor)?;

        let size = serialized_size(&tx)?;
        if size > MAX_SERIALIZED_TX_BYTES {
            return Err(AssembleError::TooLarge {
                size,
                limit: MAX_SERIALIZED_TX_BYTES,
            });
        }

        debug!(size, instructions = instructions.len(), "primary transaction built");
        Ok((tx, anchor))
    }

    /// Picks a tip recipient uniformly at random from the discovered set.
    /// Spreading tips across the relay's accounts is a relay requirement.
    pub fn select_tip_account(&self, accounts: &[Pubkey]) -> Option<Pubkey> {
        if accounts.is_empty() {
            return None;
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        accounts.get(rng.usize(..accounts.len())).copied()
    }

    /// Builds the tip-payment transaction against a freshly fetched anchor.
    /// Called once per attempt; a retry never reuses the previous anchor.
    pub async fn build_tip_transaction(
        &self,
        tip_account: &Pubkey,
        lamports: u64,
    ) -> Result<VersionedTransaction, AssembleError> {
        let anchor = self.capture_anchor().await?;
        let transfer =
            system_instruction::transfer(&self.wallet.pubkey(), tip_account, lamports);
        self.compile_and_sign(&[transfer], &anchor)
    }

    /// Fails fast when appending a tip transaction would blow the bundle cap.
    pub fn ensure_bundle_capacity(transaction_count: usize) -> Result<(), AssembleError> {
        if transaction_count + 1 > BUNDLE_TRANSACTION_LIMIT {
            return Err(AssembleError::BundleFull {
                count: transaction_count,
                limit: BUNDLE_TRANSACTION_LIMIT,
            });
        }
        Ok(())
    }

    /// Orders the bundle: caller transactions first, tip last.
    pub fn compose(
        &self,
        mut transactions: Vec<VersionedTransaction>,
        tip_transaction: VersionedTransaction,
    ) -> Result<Vec<VersionedTransaction>, AssembleError> {
        Self::ensure_bundle_capacity(transactions.len())?;
        transactions.push(tip_transaction);
        Ok(transactions)
    }

    fn compile_and_sign(
        &self,
        instructions: &[Instruction],
        anchor: &AnchorContext,
    ) -> Result<VersionedTransaction, AssembleError> {
        let payer = self.wallet.pubkey();
        let message = MessageV0::try_compile(&payer, instructions, &[], anchor.blockhash)
            .map_err(|e| AssembleError::Compile(e.to_string()))?;

        self.wallet
            .sign_message(VersionedMessage::V0(message))
            .map_err(|e| AssembleError::Signing(e.to_string()))
    }
}

fn serialized_size(tx: &VersionedTransaction) -> Result<usize, AssembleError> {
    bincode::serialize(tx)
        .map(|bytes| bytes.len())
        .map_err(|e| AssembleError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use solana_sdk::{hash::Hash, instruction::AccountMeta, signature::Keypair};

    struct StaticAnchorSource;

    #[async_trait]
    impl AnchorSource for StaticAnchorSource {
        async fn latest_anchor(&self, _commitment: CommitmentConfig) -> Result<AnchorContext> {
            Ok(AnchorContext {
                blockhash: Hash::new_unique(),
                last_valid_block_height: 100,
            })
        }
    }

    fn assembler_with_seed(seed: u64) -> BundleAssembler {
        BundleAssembler::with_rng(
            Arc::new(WalletManager::from_keypair(Keypair::new())),
            Arc::new(StaticAnchorSource),
            CommitmentConfig::confirmed(),
            fastrand::Rng::with_seed(seed),
        )
    }

    fn payload_ix(payer: Pubkey, data_len: usize) -> Instruction {
        Instruction {
            program_id: Pubkey::new_unique(),
            accounts: vec![AccountMeta::new_readonly(payer, false)],
            data: vec![7u8; data_len],
        }
    }

    #[tokio::test]
    async fn builds_and_signs_primary_within_limit() {
        let assembler = assembler_with_seed(1);
        let payer = assembler.wallet.pubkey();

        let (tx, anchor) = assembler
            .build_primary(&[payload_ix(payer, 32)])
            .await
            .expect("small transaction should assemble");

        assert_eq!(tx.signatures.len(), 1);
        assert_eq!(anchor.last_valid_block_height, 100);
        assert!(serialized_size(&tx).unwrap() <= MAX_SERIALIZED_TX_BYTES);
    }

    #[tokio::test]
    async fn rejects_oversized_primary() {
        let assembler = assembler_with_seed(1);
        let payer = assembler.wallet.pubkey();

        let err = assembler
            .build_primary(&[payload_ix(payer, MAX_SERIALIZED_TX_BYTES)])
            .await
            .expect_err("oversized transaction must be rejected");

        match err {
            AssembleError::TooLarge { size, limit } => {
                assert!(size > limit);
                assert_eq!(limit, MAX_SERIALIZED_TX_BYTES);
            }
            other => panic!("expected TooLarge, got {other:?}"),
        }
    }

    #[test]
    fn tip_account_selection_is_deterministic_with_seed() {
        let accounts: Vec<Pubkey> = (0..8).map(|_| Pubkey::new_unique()).collect();

        let first = assembler_with_seed(42).select_tip_account(&accounts).unwrap();
        let second = assembler_with_seed(42).select_tip_account(&accounts).unwrap();
        assert_eq!(first, second);

        let expected = accounts[fastrand::Rng::with_seed(42).usize(..accounts.len())];
        assert_eq!(first, expected);
    }

    #[test]
    fn tip_account_selection_handles_empty_set() {
        assert!(assembler_with_seed(1).select_tip_account(&[]).is_none());
    }

    #[tokio::test]
    async fn tip_transaction_pays_the_selected_account() {
        let assembler = assembler_with_seed(3);
        let tip_account = Pubkey::new_unique();

        let tx = assembler
            .build_tip_transaction(&tip_account, 5_000)
            .await
            .expect("tip transaction should build");

        let keys = tx.message.static_account_keys();
        assert!(keys.contains(&tip_account));
        assert_eq!(keys[0], assembler.wallet.pubkey());
    }

    #[tokio::test]
    async fn bundle_cap_includes_the_tip() {
        let assembler = assembler_with_seed(5);
        let payer = assembler.wallet.pubkey();

        let mut txs = Vec::new();
        for _ in 0..BUNDLE_TRANSACTION_LIMIT {
            let (tx, _) = assembler.build_primary(&[payload_ix(payer, 8)]).await.unwrap();
            txs.push(tx);
        }
        let tip = assembler
            .build_tip_transaction(&Pubkey::new_unique(), 5_000)
            .await
            .unwrap();

        match assembler.compose(txs, tip) {
            Err(AssembleError::BundleFull { count, limit }) => {
                assert_eq!(count, BUNDLE_TRANSACTION_LIMIT);
                assert_eq!(limit, BUNDLE_TRANSACTION_LIMIT);
            }
            other => panic!("expected BundleFull, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn compose_places_tip_last() {
        let assembler = assembler_with_seed(7);
        let payer = assembler.wallet.pubkey();
        let tip_account = Pubkey::new_unique();

        let (primary, _) = assembler.build_primary(&[payload_ix(payer, 8)]).await.unwrap();
        let tip = assembler
            .build_tip_transaction(&tip_account, 5_000)
            .await
            .unwrap();

        let bundle = assembler.compose(vec![primary], tip).unwrap();
        assert_eq!(bundle.len(), 2);
        assert!(bundle[1].message.static_account_keys().contains(&tip_account));
    }
}

//! Public submission surface.
//!
//! `BundleEngine` wires the filter, assembler, tip cache, driver and waiter
//! over injected capabilities. Two operations only: build-and-submit from raw
//! instructions, or submit caller-prepared transactions. Everything else
//! (sizing, filtering, tipping, retry, confirmation) is internal policy.

use std::sync::Arc;

use solana_sdk::{instruction::Instruction, transaction::VersionedTransaction};
use tracing::{debug, info};

use crate::bundle_assembler::BundleAssembler;
use crate::config::Config;
use crate::confirmation::ConfirmationWaiter;
use crate::instruction_filter::filter_instructions;
use crate::relay::RelayClient;
use crate::rpc::{AnchorSource, LedgerClient};
use crate::submitter::{SubmissionDriver, SubmitError};
use crate::tip_cache::{TipCache, TipFeed};
use crate::types::{CancelFlag, SubmissionReport};
use crate::wallet::WalletManager;

pub struct BundleEngine {
    assembler: Arc<BundleAssembler>,
    driver: SubmissionDriver,
}

impl BundleEngine {
    pub fn new(
        wallet: Arc<WalletManager>,
        anchors: Arc<dyn AnchorSource>,
        relay: Arc<dyn RelayClient>,
        ledger: Arc<dyn LedgerClient>,
        tip_feed: Arc<dyn TipFeed>,
        config: &Config,
    ) -> Self {
        let commitment = config.commitment();
        let assembler = Arc::new(BundleAssembler::new(wallet, anchors, commitment));
        let driver = SubmissionDriver {
            relay,
            assembler: assembler.clone(),
            tip_cache: Arc::new(TipCache::new(tip_feed)),
            waiter: ConfirmationWaiter::new(ledger, commitment),
            tip_tier: config.tip_tier,
            max_retries: config.max_retries,
            backoff_base: config.backoff_base(),
        };

        Self { assembler, driver }
    }

    /// Filters the instructions, packs them into one signed transaction and
    /// submits it as a bundle with a tip transaction appended.
    pub async fn submit_bundle(
        &self,
        instructions: Vec<Instruction>,
        cancel: &CancelFlag,
    ) -> Result<SubmissionReport, SubmitError> {
        let before = instructions.len();
        let filtered = filter_instructions(instructions);
        if filtered.is_empty() {
            return Err(SubmitError::EmptyBundle);
        }
        debug!(before, after = filtered.len(), "instructions filtered");

        // The size gate lives here: an oversized transaction never reaches
        // the relay.
        let (primary, anchor) = self.assembler.build_primary(&filtered).await?;
        info!(sig = %primary.signatures[0], "primary transaction signed");

        self.driver.submit(vec![primary], anchor, cancel).await
    }

    /// Submits caller-prepared, already-signed transactions in their given
    /// order, appending one tip transaction. The confirmation deadline comes
    /// from an anchor captured at entry, since the callers' transactions were
    /// signed elsewhere.
    pub async fn submit_prebuilt_bundle(
        &self,
        transactions: Vec<VersionedTransaction>,
        cancel: &CancelFlag,
    ) -> Result<SubmissionReport, SubmitError> {
        if transactions.is_empty() {
            return Err(SubmitError::EmptyBundle);
        }

        let anchor = self.assembler.capture_anchor().await?;
        self.driver.submit(transactions, anchor, cancel).await
    }
}

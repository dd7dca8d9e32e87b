//! Bundle submission driver.
//!
//! Runs the bounded retry loop around the relay: discover tip accounts once
//! per submission, quote the tip once, then per attempt rebuild the tip
//! transaction against a fresh anchor, compose the bundle, and send. Linear
//! backoff between attempts; cancellation is honored between attempts only.
//! On success the primary signature is handed to the confirmation waiter and
//! its outcome folded into the report.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::bundle_assembler::{AssembleError, BundleAssembler};
use crate::confirmation::ConfirmationWaiter;
use crate::relay::{RelayClient, RelayError};
use crate::tip_cache::TipCache;
use crate::types::{AnchorContext, CancelFlag, SubmissionReport, TipTier};

/// Retries after the first failed attempt, so total attempts is this plus one.
pub const MAX_RETRIES: u32 = 2;

/// Base delay for the linear inter-attempt backoff.
pub const BACKOFF_BASE: Duration = Duration::from_millis(1_000);

/// Failure cause of a single attempt. Both kinds are transient: the next
/// attempt gets a fresh anchor and a fresh tip transaction.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error(transparent)]
    Relay(#[from] RelayError),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("nothing to submit: bundle is empty")]
    EmptyBundle,
    #[error("primary transaction carries no signature")]
    UnsignedPrimary,
    #[error("bundle assembly failed: {0}")]
    Assemble(#[from] AssembleError),
    #[error("tip account discovery failed: {0}")]
    TipAccountDiscovery(#[source] RelayError),
    #[error("relay returned no tip accounts")]
    NoTipAccounts,
    #[error("all {attempts} submission attempts failed: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: AttemptError,
    },
    #[error("submission cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
    #[error("confirmation request failed: {0}")]
    Confirmation(String),
}

/// Where a submission stands in its bounded retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// About to run the 1-based attempt number held inside.
    Attempting(u32),
    /// The retry budget is spent; holds the total attempts made.
    Exhausted(u32),
}

impl Attempt {
    pub fn first() -> Self {
        Attempt::Attempting(1)
    }

    pub fn number(&self) -> u32 {
        match self {
            Attempt::Attempting(n) | Attempt::Exhausted(n) => *n,
        }
    }

    /// Transition taken when the relay rejects the attempt.
    pub fn on_failure(self, max_retries: u32) -> Attempt {
        match self {
            Attempt::Attempting(n) if n <= max_retries => Attempt::Attempting(n + 1),
            Attempt::Attempting(n) => Attempt::Exhausted(n),
            exhausted => exhausted,
        }
    }

    /// Delay before running this attempt: zero for the first, then growing
    /// linearly with the attempts already spent.
    pub fn backoff(&self, base: Duration) -> Duration {
        match self {
            Attempt::Attempting(n) => base * n.saturating_sub(1),
            Attempt::Exhausted(_) => Duration::ZERO,
        }
    }
}

pub struct SubmissionDriver {
    pub relay: Arc<dyn RelayClient>,
    pub assembler: Arc<BundleAssembler>,
    pub tip_cache: Arc<TipCache>,
    pub waiter: ConfirmationWaiter,
    pub tip_tier: TipTier,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl SubmissionDriver {
    /// Submits the ordered transactions as a bundle, appending one tip
    /// transaction. `anchor` is the context the primary was signed against;
    /// it bounds the confirmation wait.
    pub async fn submit(
        &self,
        transactions: Vec<VersionedTransaction>,
        anchor: AnchorContext,
        cancel: &CancelFlag,
    ) -> Result<SubmissionReport, SubmitError> {
        if transactions.is_empty() {
            return Err(SubmitError::EmptyBundle);
        }
        BundleAssembler::ensure_bundle_capacity(transactions.len())?;

        let primary_signature = match transactions[0].signatures.first() {
            Some(sig) => *sig,
            None => return Err(SubmitError::UnsignedPrimary),
        };

        // Discovered once per submission; retries re-derive the recipient
        // from this same set.
        let tip_accounts = self
            .relay
            .tip_accounts()
            .await
            .map_err(SubmitError::TipAccountDiscovery)?;
        if tip_accounts.is_empty() {
            return Err(SubmitError::NoTipAccounts);
        }

        let tip_lamports = self.tip_cache.tip(self.tip_tier).await;
        debug!(tip_lamports, tier = ?self.tip_tier, "tip quoted for bundle");

        let mut state = Attempt::first();
        loop {
            if cancel.is_cancelled() {
                return Err(SubmitError::Cancelled {
                    attempts: state.number().saturating_sub(1),
                });
            }

            let delay = state.backoff(self.backoff_base);
            if !delay.is_zero() {
                sleep(delay).await;
                if cancel.is_cancelled() {
                    return Err(SubmitError::Cancelled {
                        attempts: state.number().saturating_sub(1),
                    });
                }
            }

            let tip_account = match self.assembler.select_tip_account(&tip_accounts) {
                Some(account) => account,
                None => return Err(SubmitError::NoTipAccounts),
            };

            match self
                .try_once(&transactions, tip_account, tip_lamports)
                .await
            {
                Ok(bundle_id) => {
                    info!(
                        bundle_id = %bundle_id,
                        attempt = state.number(),
                        sig = %primary_signature,
                        "bundle accepted, awaiting confirmation"
                    );

                    let confirmation = self
                        .waiter
                        .confirm(primary_signature, &anchor)
                        .await
                        .map_err(|e| SubmitError::Confirmation(e.to_string()))?;

                    return Ok(SubmissionReport {
                        bundle_id,
                        attempts: state.number(),
                        confirmation,
                    });
                }
                Err(err) => {
                    warn!(attempt = state.number(), error = %err, "bundle submission attempt failed");
                    match state.on_failure(self.max_retries) {
                        Attempt::Exhausted(attempts) => {
                            return Err(SubmitError::Exhausted {
                                attempts,
                                source: err,
                            })
                        }
                        next => state = next,
                    }
                }
            }
        }
    }

    async fn try_once(
        &self,
        transactions: &[VersionedTransaction],
        tip_account: Pubkey,
        tip_lamports: u64,
    ) -> Result<String, AttemptError> {
        let tip_tx = self
            .assembler
            .build_tip_transaction(&tip_account, tip_lamports)
            .await?;
        let bundle = self.assembler.compose(transactions.to_vec(), tip_tx)?;

        debug!(
            transactions = bundle.len(),
            tip_account = %tip_account,
            "sending bundle to relay"
        );
        Ok(self.relay.send_bundle(&bundle).await?)
    }
}
